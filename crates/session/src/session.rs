//! Session vocale : cycle de vie complet d'une conversation
//!
//! `VoiceSession::run` enchaîne les étapes :
//!
//! 1. **Connecting** : micro acquis et démarré, canal ouvert, `setup`
//!    négocié, sortie audio ouverte
//! 2. **Active** : la pompe de capture tourne dans sa tâche, la boucle
//!    principale reçoit les messages du distant, les commandes de la
//!    poignée, les fins de lecture et la perte de la sortie audio
//! 3. **Closed** : pompe arrêtée, voix en attente jetée, micro et sortie
//!    libérés, canal fermé
//!
//! Les erreurs fatales ferment la session et sont rendues par `run`. Un
//! chunk audio illisible est seulement ignoré.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use audio::{
    AudioCapture, AudioCodec, DeviceProvider, EnvelopePayload, OutputEvent, PcmEnvelopeCodec, PlaybackScheduler,
};
use network::{negotiate, Connector, FrameReceiver, FrameSender, ServerEvent};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::events::{CloseReason, SessionCommand, SessionEvent, SessionHandle, SessionReport, SessionStats};
use crate::pump::{CapturePump, PumpOutcome};
use crate::state::{SessionState, StateMachine};
use crate::transcript::TranscriptAccumulator;
use crate::{SessionConfig, SessionError, SessionResult};

/// Une conversation vocale, de la connexion à la fermeture
pub struct VoiceSession {
    config: SessionConfig,
    devices: Arc<dyn DeviceProvider>,
    connector: Arc<dyn Connector>,

    machine: StateMachine,
    transcript: TranscriptAccumulator,
    stats: SessionStats,

    events: mpsc::Sender<SessionEvent>,
    commands_tx: mpsc::UnboundedSender<SessionCommand>,
    commands_rx: mpsc::UnboundedReceiver<SessionCommand>,
    state_tx: watch::Sender<SessionState>,
}

/// Ressources détenues pendant l'état Active
struct LiveSession {
    pump: Option<JoinHandle<PumpOutcome>>,
    pump_outcome: Option<PumpOutcome>,
    stop_pump: watch::Sender<bool>,
    frames_sent: Arc<AtomicU64>,
    receiver: Box<dyn FrameReceiver>,
    /// Événements arrivés avec `setupComplete`, appliqués en entrant dans Active
    early_events: Vec<ServerEvent>,
    scheduler: PlaybackScheduler,
    output_events: mpsc::UnboundedReceiver<OutputEvent>,
    output_codec: PcmEnvelopeCodec,
}

/// Ce qui a mis fin à la boucle principale
enum Ending {
    Stop,
    RemoteClosed,
    Failed(SessionError),
}

impl VoiceSession {
    /// Crée une session `Idle` et le flux de ses événements
    pub fn new(
        config: SessionConfig,
        devices: Arc<dyn DeviceProvider>,
        connector: Arc<dyn Connector>,
    ) -> (Self, mpsc::Receiver<SessionEvent>) {
        let (events, events_rx) = mpsc::channel(config.event_queue_depth.max(1));
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (state_tx, _) = watch::channel(SessionState::Idle);

        let session = Self {
            config,
            devices,
            connector,
            machine: StateMachine::new(),
            transcript: TranscriptAccumulator::new(),
            stats: SessionStats::default(),
            events,
            commands_tx,
            commands_rx,
            state_tx,
        };
        (session, events_rx)
    }

    pub fn handle(&self) -> SessionHandle {
        SessionHandle::new(self.commands_tx.clone(), self.state_tx.subscribe())
    }

    pub fn state(&self) -> SessionState {
        self.machine.state()
    }

    /// Déroule la session jusqu'à sa fermeture
    ///
    /// `Ok` pour une fermeture attendue (stop, annulation, fermeture par le
    /// distant), `Err` pour toute fermeture sur erreur.
    pub async fn run(mut self) -> SessionResult<SessionReport> {
        self.config.validate().map_err(SessionError::ConnectionFailed)?;

        self.machine.begin_connect()?;
        self.publish_state();

        let live = match self.connect().await {
            Ok(Some(live)) => live,
            Ok(None) => {
                info!("Connexion annulée");
                return self.finish(CloseReason::Cancelled, None);
            }
            Err(e) => {
                error!(error = %e, "Échec de l'ouverture de session");
                return self.finish(CloseReason::Error(e.to_string()), Some(e));
            }
        };

        self.machine.activate()?;
        self.publish_state();
        info!("Session active");

        self.stream(live).await
    }

    // ------------------------------------------------------------------
    // Connecting
    // ------------------------------------------------------------------

    /// Acquiert le micro, ouvre et négocie le canal, ouvre la sortie
    ///
    /// `None` si un `Stop` arrive pendant la connexion. Tout ce qui a été
    /// acquis est relâché avant de rendre la main.
    async fn connect(&mut self) -> SessionResult<Option<LiveSession>> {
        let audio_config = self.config.audio.clone();
        let network_config = self.config.network.clone();

        // Micro d'abord : sans micro, le réseau n'est jamais contacté
        let mut capture = self.devices.open_capture(&audio_config)?;
        capture.start().await?;
        info!(device = %capture.device_info(), "Micro acquis");

        let connector = Arc::clone(&self.connector);
        let opened = cancellable(&mut self.commands_rx, connector.open(&network_config)).await;
        let mut channel = match opened {
            Some(Ok(channel)) => channel,
            Some(Err(e)) => {
                release_capture(capture).await;
                return Err(SessionError::ConnectionFailed(e.to_string()));
            }
            None => {
                release_capture(capture).await;
                return Ok(None);
            }
        };

        let negotiated = cancellable(&mut self.commands_rx, negotiate(&mut channel, &network_config)).await;
        let early_events = match negotiated {
            Some(Ok(events)) => events,
            Some(Err(e)) => {
                release_capture(capture).await;
                close_sender(channel.sender.as_mut()).await;
                return Err(SessionError::ConnectionFailed(e.to_string()));
            }
            None => {
                release_capture(capture).await;
                close_sender(channel.sender.as_mut()).await;
                return Ok(None);
            }
        };

        let (output_tx, output_events) = mpsc::unbounded_channel();
        let sink = match self.devices.open_output(&audio_config, output_tx) {
            Ok(sink) => sink,
            Err(e) => {
                release_capture(capture).await;
                close_sender(channel.sender.as_mut()).await;
                return Err(e.into());
            }
        };
        info!(device = %sink.device_info(), "Sortie audio ouverte");

        let (stop_pump, stop_rx) = watch::channel(false);
        let pump = CapturePump::new(capture, channel.sender, PcmEnvelopeCodec::for_input(&audio_config), stop_rx);
        let frames_sent = pump.frames_sent();

        Ok(Some(LiveSession {
            pump: Some(tokio::spawn(pump.run())),
            pump_outcome: None,
            stop_pump,
            frames_sent,
            receiver: channel.receiver,
            early_events,
            scheduler: PlaybackScheduler::new(sink),
            output_events,
            output_codec: PcmEnvelopeCodec::for_output(&audio_config),
        }))
    }

    // ------------------------------------------------------------------
    // Active
    // ------------------------------------------------------------------

    async fn stream(mut self, mut live: LiveSession) -> SessionResult<SessionReport> {
        let ending = self.main_loop(&mut live).await;

        let (reason, failure) = match ending {
            Ending::Stop => (CloseReason::UserStop, None),
            Ending::RemoteClosed => (CloseReason::RemoteClosed, None),
            Ending::Failed(e) => {
                error!(error = %e, "Fermeture de la session sur erreur");
                (CloseReason::Error(e.to_string()), Some(e))
            }
        };

        self.teardown(live).await;
        self.finish(reason, failure)
    }

    async fn main_loop(&mut self, live: &mut LiveSession) -> Ending {
        let LiveSession {
            pump,
            pump_outcome,
            receiver,
            early_events,
            scheduler,
            output_events,
            output_codec,
            ..
        } = live;

        for event in std::mem::take(early_events) {
            if let Err(e) = self.dispatch(event, scheduler, output_codec) {
                return Ending::Failed(e);
            }
        }

        loop {
            tokio::select! {
                biased;

                command = self.commands_rx.recv() => match command {
                    Some(SessionCommand::Stop) | None => {
                        info!("Arrêt demandé");
                        return Ending::Stop;
                    }
                    Some(SessionCommand::Interrupt) => {
                        if let Err(e) = self.on_interrupted(scheduler) {
                            return Ending::Failed(e);
                        }
                    }
                },

                Some(event) = output_events.recv() => match event {
                    OutputEvent::Finished(id) => {
                        if scheduler.unit_finished(id) {
                            debug!(unit_id = %id, "Lecture terminée");
                            self.emit(SessionEvent::Listening);
                        }
                    }
                    OutputEvent::DeviceLost(reason) => {
                        return Ending::Failed(SessionError::DeviceUnavailable(format!("sortie audio perdue: {}", reason)));
                    }
                },

                joined = join_pump(pump) => {
                    *pump = None;
                    match joined {
                        Ok(PumpOutcome { capture, sender, result }) => {
                            *pump_outcome = Some(PumpOutcome { capture, sender, result: Ok(()) });
                            // La pompe ne s'arrête seule que sur erreur
                            let error = result.err().unwrap_or_else(|| {
                                SessionError::ProtocolError("pompe de capture arrêtée".to_string())
                            });
                            return Ending::Failed(error);
                        }
                        Err(e) => {
                            return Ending::Failed(SessionError::ProtocolError(format!("tâche de capture: {}", e)));
                        }
                    }
                },

                received = receiver.next_events() => match received {
                    Ok(Some(events)) => {
                        for event in events {
                            if let Err(e) = self.dispatch(event, scheduler, output_codec) {
                                return Ending::Failed(e);
                            }
                        }
                    }
                    Ok(None) => {
                        info!("Canal fermé par le distant");
                        return Ending::RemoteClosed;
                    }
                    Err(e) => return Ending::Failed(e.into()),
                },
            }
        }
    }

    /// Applique un événement du distant
    fn dispatch(
        &mut self,
        event: ServerEvent,
        scheduler: &PlaybackScheduler,
        codec: &PcmEnvelopeCodec,
    ) -> SessionResult<()> {
        match event {
            ServerEvent::SetupComplete => {
                debug!("setupComplete en double ignoré");
            }
            ServerEvent::Transcription(fragment) => {
                self.transcript.push(&fragment);
                self.emit(SessionEvent::Transcript(self.transcript.current().to_string()));
            }
            ServerEvent::Audio(bytes) => {
                self.on_audio(bytes, scheduler, codec)?;
            }
            ServerEvent::MalformedAudio(reason) => {
                self.drop_chunk(reason);
            }
            ServerEvent::Interrupted => {
                self.on_interrupted(scheduler)?;
            }
            ServerEvent::TurnComplete => {
                // Pas de flush : la voix déjà programmée finit de jouer
                let text = self.transcript.complete_turn();
                self.machine.resume();
                self.stats.turns += 1;
                info!(chars = text.chars().count(), "Fin du tour");
                self.emit(SessionEvent::TurnComplete(text));
            }
        }
        Ok(())
    }

    fn on_audio(&mut self, bytes: Vec<u8>, scheduler: &PlaybackScheduler, codec: &PcmEnvelopeCodec) -> SessionResult<()> {
        let payload = EnvelopePayload::new(bytes, self.config.audio.output_mime_type());
        let frame = match codec.decode(&payload) {
            Ok(frame) => frame,
            Err(e) if e.is_chunk_local() => {
                self.drop_chunk(e.to_string());
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        self.stats.chunks_received += 1;
        if frame.is_empty() {
            debug!("Chunk audio vide ignoré");
            return Ok(());
        }

        match scheduler.enqueue(frame) {
            Ok(unit) => {
                self.machine.resume();
                if unit.started_speaking {
                    self.emit(SessionEvent::Speaking);
                }
                Ok(())
            }
            Err(e) if e.is_chunk_local() => {
                self.drop_chunk(e.to_string());
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Barge-in : barrière dure, rien de programmé avant ne reste audible
    fn on_interrupted(&mut self, scheduler: &PlaybackScheduler) -> SessionResult<()> {
        self.machine.interrupt()?;
        let flushed = scheduler.flush();

        self.stats.interruptions += 1;
        self.stats.units_flushed += flushed as u64;
        info!(flushed, "Interruption");

        self.emit(SessionEvent::Interrupted { flushed });
        if flushed > 0 {
            self.emit(SessionEvent::Listening);
        }
        Ok(())
    }

    fn drop_chunk(&mut self, reason: String) {
        self.stats.chunks_dropped += 1;
        warn!(reason = %reason, "Chunk audio ignoré");
        self.emit(SessionEvent::ChunkDropped { reason });
    }

    // ------------------------------------------------------------------
    // Closed
    // ------------------------------------------------------------------

    /// Libère tout, dans l'ordre : pompe, voix en attente, micro, sortie, canal
    async fn teardown(&mut self, mut live: LiveSession) {
        let timeout = self.config.shutdown_timeout;

        let _ = live.stop_pump.send(true);
        if let Some(mut task) = live.pump.take() {
            match tokio::time::timeout(timeout, &mut task).await {
                Ok(Ok(outcome)) => live.pump_outcome = Some(outcome),
                Ok(Err(e)) => warn!(error = %e, "Tâche de capture perdue"),
                Err(_) => {
                    warn!(timeout_ms = timeout.as_millis() as u64, "Pompe bloquée, abandon de la tâche");
                    task.abort();
                }
            }
        }
        self.stats.frames_sent = live.frames_sent.load(Ordering::Relaxed);

        let flushed = live.scheduler.flush();
        self.stats.units_flushed += flushed as u64;

        if let Some(PumpOutcome { capture, mut sender, .. }) = live.pump_outcome.take() {
            release_capture(capture).await;
            live.scheduler.release();
            if tokio::time::timeout(timeout, sender.close()).await.is_err() {
                warn!("Fermeture du canal trop lente, abandon");
            }
        } else {
            live.scheduler.release();
        }

        drop(live.receiver);
        debug!(flushed, "Ressources libérées");
    }

    fn finish(mut self, reason: CloseReason, failure: Option<SessionError>) -> SessionResult<SessionReport> {
        if let Err(e) = self.machine.close() {
            warn!(error = %e, "Session déjà fermée");
        }
        self.publish_state();
        info!(reason = %reason, "Session fermée");
        self.emit(SessionEvent::Closed { reason: reason.clone() });

        match failure {
            Some(e) => Err(e),
            None => Ok(SessionReport {
                reason,
                stats: self.stats,
            }),
        }
    }

    fn publish_state(&self) {
        let state = self.machine.state();
        self.state_tx.send_replace(state);
        info!(state = %state, "Changement d'état");
        self.emit(SessionEvent::StateChanged(state));
    }

    fn emit(&self, event: SessionEvent) {
        match self.events.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                warn!(?event, "File d'événements pleine, événement perdu");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }
}

/// Attend la fin de la pompe, ou jamais si elle est déjà récupérée
async fn join_pump(pump: &mut Option<JoinHandle<PumpOutcome>>) -> Result<PumpOutcome, tokio::task::JoinError> {
    match pump.as_mut() {
        Some(task) => task.await,
        None => std::future::pending().await,
    }
}

/// Exécute `fut` sauf si un `Stop` arrive avant ; `Interrupt` est ignoré
async fn cancellable<F: std::future::Future>(
    commands: &mut mpsc::UnboundedReceiver<SessionCommand>,
    fut: F,
) -> Option<F::Output> {
    tokio::pin!(fut);
    loop {
        tokio::select! {
            biased;
            command = commands.recv() => match command {
                Some(SessionCommand::Interrupt) => debug!("Interruption ignorée pendant la connexion"),
                Some(SessionCommand::Stop) | None => return None,
            },
            output = &mut fut => return Some(output),
        }
    }
}

async fn release_capture(mut capture: Box<dyn AudioCapture>) {
    if let Err(e) = capture.stop().await {
        warn!(error = %e, "Arrêt du micro en erreur");
    }
    debug!("Micro libéré");
}

async fn close_sender(sender: &mut dyn FrameSender) {
    if let Err(e) = sender.close().await {
        debug!(error = %e, "Fermeture du canal en erreur");
    }
}
