//! Événements publiés par la session et poignée de contrôle

use std::fmt;

use tokio::sync::{mpsc, watch};

use crate::{SessionError, SessionResult, SessionState};

/// Ce que l'interface observe de la session
#[derive(Clone, Debug, PartialEq)]
pub enum SessionEvent {
    StateChanged(SessionState),

    /// La lecture démarre : indicateur "l'assistant parle"
    Speaking,

    /// Plus rien à jouer : indicateur "à vous"
    Listening,

    /// Transcription cumulée du tour en cours
    Transcript(String),

    /// Fin du tour, avec le texte complet
    TurnComplete(String),

    /// Barge-in : nombre d'unités coupées
    Interrupted { flushed: usize },

    /// Chunk audio ignoré, la session continue
    ChunkDropped { reason: String },

    Closed { reason: CloseReason },
}

/// Pourquoi la session s'est fermée
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CloseReason {
    /// `stop()` demandé par l'utilisateur
    UserStop,
    /// Annulation pendant la connexion
    Cancelled,
    /// Le distant a fermé le canal
    RemoteClosed,
    /// Erreur fatale (message de l'erreur)
    Error(String),
}

impl CloseReason {
    /// Fermeture attendue, pas une erreur à afficher
    pub fn is_expected(&self) -> bool {
        !matches!(self, CloseReason::Error(_))
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::UserStop => f.write_str("arrêt demandé"),
            CloseReason::Cancelled => f.write_str("connexion annulée"),
            CloseReason::RemoteClosed => f.write_str("canal fermé par le distant"),
            CloseReason::Error(message) => write!(f, "erreur: {}", message),
        }
    }
}

/// Commandes acceptées par la session en cours
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionCommand {
    Stop,
    Interrupt,
}

/// Compteurs d'une session
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub frames_sent: u64,
    pub chunks_received: u64,
    pub chunks_dropped: u64,
    pub units_flushed: u64,
    pub interruptions: u64,
    pub turns: u64,
}

/// Bilan rendu par une session fermée proprement
#[derive(Clone, Debug)]
pub struct SessionReport {
    pub reason: CloseReason,
    pub stats: SessionStats,
}

/// Poignée clonable pour piloter une session depuis une autre tâche
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<SessionCommand>,
    state: watch::Receiver<SessionState>,
}

impl SessionHandle {
    pub(crate) fn new(
        commands: mpsc::UnboundedSender<SessionCommand>,
        state: watch::Receiver<SessionState>,
    ) -> Self {
        Self { commands, state }
    }

    /// Demande la fermeture (ou annule une connexion en cours)
    pub fn stop(&self) -> SessionResult<()> {
        self.send(SessionCommand::Stop)
    }

    /// Coupe la voix en cours, comme une interruption du distant
    pub fn interrupt(&self) -> SessionResult<()> {
        self.send(SessionCommand::Interrupt)
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Attend que la session atteigne `target` (ou `Closed`)
    pub async fn wait_for(&self, target: SessionState) -> SessionState {
        let mut state = self.state.clone();
        match state
            .wait_for(|s| *s == target || *s == SessionState::Closed)
            .await
        {
            Ok(reached) => *reached,
            Err(_) => SessionState::Closed,
        }
    }

    fn send(&self, command: SessionCommand) -> SessionResult<()> {
        if self.state() == SessionState::Closed {
            return Err(SessionError::Closed);
        }
        self.commands.send(command).map_err(|_| SessionError::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_handle_rejects_commands_after_close() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(SessionState::Active);
        let handle = SessionHandle::new(tx, state_rx);

        handle.interrupt().unwrap();
        assert_eq!(rx.recv().await, Some(SessionCommand::Interrupt));

        state_tx.send(SessionState::Closed).unwrap();
        assert!(matches!(handle.stop(), Err(SessionError::Closed)));
        assert_eq!(handle.wait_for(SessionState::Active).await, SessionState::Closed);
    }

    #[tokio::test]
    async fn test_wait_for_state() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(SessionState::Connecting);
        let handle = SessionHandle::new(tx, state_rx);

        let waiter = tokio::spawn({
            let handle = handle.clone();
            async move { handle.wait_for(SessionState::Active).await }
        });
        state_tx.send(SessionState::Active).unwrap();
        assert_eq!(waiter.await.unwrap(), SessionState::Active);
    }

    #[test]
    fn test_close_reason_display() {
        assert!(CloseReason::UserStop.is_expected());
        assert!(!CloseReason::Error("x".into()).is_expected());
        assert_eq!(CloseReason::RemoteClosed.to_string(), "canal fermé par le distant");
    }
}
