//! Machine à états de la session
//!
//! ```text
//! Idle ──► Connecting ──► Active ──► Closed
//!              │            │ ▲
//!              │            └─┘ interruption (sous-état Interrupted)
//!              └──────────────────► Closed
//! ```
//!
//! `Closed` est terminal : une nouvelle conversation construit une
//! nouvelle machine.

use std::fmt;

use crate::{SessionError, SessionResult};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum SessionState {
    Idle,
    Connecting,
    Active,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "Idle",
            SessionState::Connecting => "Connecting",
            SessionState::Active => "Active",
            SessionState::Closed => "Closed",
        };
        f.write_str(name)
    }
}

impl SessionState {
    /// Transitions autorisées (Active → Active est l'interruption)
    pub fn can_transition_to(self, to: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, to),
            (Idle, Connecting) | (Connecting, Active) | (Connecting, Closed) | (Active, Active) | (Active, Closed)
        )
    }
}

/// État courant et sous-état d'interruption
#[derive(Debug)]
pub struct StateMachine {
    state: SessionState,
    interrupted: bool,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StateMachine {
    pub fn new() -> Self {
        Self {
            state: SessionState::Idle,
            interrupted: false,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Vrai entre une interruption et le prochain chunk audio ou fin de tour
    pub fn is_interrupted(&self) -> bool {
        self.interrupted
    }

    fn transition(&mut self, to: SessionState) -> SessionResult<()> {
        if !self.state.can_transition_to(to) {
            return Err(SessionError::InvalidTransition { from: self.state, to });
        }
        self.state = to;
        Ok(())
    }

    pub fn begin_connect(&mut self) -> SessionResult<()> {
        self.transition(SessionState::Connecting)
    }

    pub fn activate(&mut self) -> SessionResult<()> {
        self.transition(SessionState::Active)
    }

    /// Boucle Active → Active, passe dans le sous-état Interrupted
    pub fn interrupt(&mut self) -> SessionResult<()> {
        if self.state != SessionState::Active {
            return Err(SessionError::InvalidTransition {
                from: self.state,
                to: SessionState::Active,
            });
        }
        self.interrupted = true;
        Ok(())
    }

    /// Sort du sous-état Interrupted
    pub fn resume(&mut self) {
        self.interrupted = false;
    }

    pub fn close(&mut self) -> SessionResult<()> {
        self.transition(SessionState::Closed)?;
        self.interrupted = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use SessionState::*;

    const ALL: [SessionState; 4] = [Idle, Connecting, Active, Closed];

    #[test]
    fn test_idle_only_reaches_connecting() {
        let reachable: Vec<_> = ALL.into_iter().filter(|s| Idle.can_transition_to(*s)).collect();
        assert_eq!(reachable, vec![Connecting]);
    }

    #[test]
    fn test_closed_is_terminal() {
        assert!(ALL.into_iter().all(|s| !Closed.can_transition_to(s)));

        let mut machine = StateMachine::new();
        machine.begin_connect().unwrap();
        machine.close().unwrap();
        assert!(matches!(
            machine.begin_connect(),
            Err(SessionError::InvalidTransition { from: Closed, to: Connecting })
        ));
        assert!(machine.close().is_err());
    }

    #[test]
    fn test_interrupt_only_when_active() {
        let mut machine = StateMachine::new();
        assert!(machine.interrupt().is_err());

        machine.begin_connect().unwrap();
        assert!(machine.interrupt().is_err());

        machine.activate().unwrap();
        machine.interrupt().unwrap();
        assert!(machine.is_interrupted());
        assert_eq!(machine.state(), Active);

        machine.resume();
        assert!(!machine.is_interrupted());

        machine.interrupt().unwrap();
        machine.close().unwrap();
        assert!(!machine.is_interrupted());
    }

    #[test]
    fn test_cannot_skip_connecting() {
        let mut machine = StateMachine::new();
        assert!(machine.activate().is_err());
        assert!(machine.close().is_err());
        assert_eq!(machine.state(), Idle);
    }
}
