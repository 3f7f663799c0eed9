//! Crate session - Gestionnaire de session vocale temps réel
//!
//! Ce crate coordonne la chaîne audio locale et le canal réseau :
//! - Machine à états `Idle → Connecting → Active → Closed`
//! - Pompe de capture (micro → canal) dans sa propre tâche
//! - Ordonnancement de la voix reçue et barge-in
//! - Accumulation de la transcription
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use audio::CpalDevices;
//! use network::WebSocketConnector;
//! use session::{SessionConfig, SessionEvent, VoiceSession};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let (session, mut events) = VoiceSession::new(
//!     SessionConfig::default(),
//!     Arc::new(CpalDevices),
//!     Arc::new(WebSocketConnector),
//! );
//! let handle = session.handle();
//! let task = tokio::spawn(session.run());
//!
//! while let Some(event) = events.recv().await {
//!     if let SessionEvent::Transcript(text) = event {
//!         println!("{}", text);
//!     }
//! }
//! # handle.stop().ok();
//! let _report = task.await??;
//! # Ok(())
//! # }
//! ```

mod config;
mod error;
mod events;
mod pump;
mod session;
mod state;
mod transcript;

pub use config::SessionConfig;
pub use error::{SessionError, SessionResult};
pub use events::{CloseReason, SessionCommand, SessionEvent, SessionHandle, SessionReport, SessionStats};
pub use pump::{CapturePump, PumpOutcome};
pub use session::VoiceSession;
pub use state::{SessionState, StateMachine};
pub use transcript::TranscriptAccumulator;

/// Version du crate session
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
