//! Configuration de la session

use std::time::Duration;

use audio::AudioConfig;
use network::NetworkConfig;

/// Paramètres de la session et des deux couches qu'elle pilote
#[derive(Clone, Debug)]
pub struct SessionConfig {
    pub audio: AudioConfig,
    pub network: NetworkConfig,

    /// Délai laissé à la pompe de capture pour s'arrêter à la fermeture
    ///
    /// Au-delà, la tâche est abandonnée.
    pub shutdown_timeout: Duration,

    /// Capacité du canal d'événements vers l'interface
    pub event_queue_depth: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            audio: AudioConfig::default(),
            network: NetworkConfig::default(),
            shutdown_timeout: Duration::from_secs(2),
            event_queue_depth: 256,
        }
    }
}

impl SessionConfig {
    pub fn validate(&self) -> Result<(), String> {
        self.audio.validate()?;
        self.network.validate()?;

        if self.shutdown_timeout.is_zero() {
            return Err("shutdown_timeout doit être > 0".to_string());
        }
        if self.event_queue_depth == 0 {
            return Err("event_queue_depth doit être > 0".to_string());
        }
        Ok(())
    }

    /// Configuration pour tests (délais courts, endpoint local)
    pub fn test_config() -> Self {
        Self {
            audio: AudioConfig::test_config(),
            network: NetworkConfig::test_config(),
            shutdown_timeout: Duration::from_millis(200),
            event_queue_depth: 256,
        }
    }
}
