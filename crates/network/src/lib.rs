//! Crate network - Canal vocal temps réel vers le service conversationnel
//!
//! Ce crate fournit le protocole du canal (messages JSON, audio en base64),
//! la négociation de session et deux implémentations du transport.
//!
//! # Architecture
//!
//! - `error` : Gestion d'erreurs avec types spécialisés réseau
//! - `types` : Configuration et messages du protocole
//! - `traits` : Moitiés émettrice/réceptrice du canal et connecteur
//! - `handshake` : Négociation `setup` / `setupComplete`
//! - `transport` : WebSocket réel et distant simulé
//!
//! # Example
//!
//! ```rust
//! use network::{negotiate, Connector, NetworkConfig, SimulatedConnector};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let (connector, remote) = SimulatedConnector::new();
//! let config = NetworkConfig::test_config();
//!
//! let mut channel = connector.open(&config).await?;
//! negotiate(&mut channel, &config).await?;
//!
//! remote.send_transcript("Bonjour");
//! let events = channel.receiver.next_events().await?;
//! # Ok(())
//! # }
//! ```

// Modules internes
mod error;
mod types;
mod traits;
mod handshake;
mod transport;

// Re-exports publics
pub use error::{NetworkError, NetworkResult};

pub use types::{
    parse_server_message, ClientMessage, EmptyObject, MediaBlob, NetworkConfig, PrebuiltVoiceConfig,
    ServerEvent, SetupPayload, SpeechConfig, VoiceConfig, DEFAULT_SYSTEM_INSTRUCTION,
};

pub use traits::{ChannelHalves, Connector, FrameReceiver, FrameSender};

pub use handshake::negotiate;

pub use transport::{SimulatedConnector, SimulatedRemote, WebSocketConnector};

/// Version du crate network
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
