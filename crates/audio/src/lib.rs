//! Crate audio de l'assistant vocal
//!
//! Ce crate gère toute la chaîne audio locale :
//! - Conversion PCM f32 ↔ i16 et enveloppe de transport
//! - Capture microphone avec cpal
//! - Ordonnancement sans trou ni chevauchement de la voix reçue
//! - Sortie haut-parleurs avec cpal
//! - Périphériques simulés pour les tests et la démo

pub mod config;      // Configuration audio
pub mod types;       // Types de données (AudioFrame, etc.)
pub mod traits;      // Traits abstraits
pub mod pcm;         // Conversion d'échantillons
pub mod codec;       // Enveloppe PCM
pub mod scheduler;   // Timeline de lecture
pub mod capture;     // Capture avec cpal
pub mod playback;    // Sortie avec cpal
pub mod devices;     // Fabrique cpal
pub mod simulated;   // Périphériques simulés
pub mod error;       // Gestion d'erreurs

// Réexports pour faciliter l'utilisation
pub use config::*;
pub use types::*;
pub use traits::*;
pub use error::*;

// Réexports des implémentations principales
pub use capture::CpalCapture;
pub use playback::CpalOutput;
pub use codec::PcmEnvelopeCodec;
pub use devices::CpalDevices;
pub use scheduler::PlaybackScheduler;
pub use simulated::{OutputControl, SimulatedDevices};
