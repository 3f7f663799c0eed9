//! Configuration audio pour la session vocale
//!
//! Ce module définit les paramètres audio des deux sens du canal :
//! - la capture microphone (envoyée au service distant)
//! - la voix synthétisée reçue (jouée sur les haut-parleurs)

use std::time::Duration;
use serde::{Deserialize, Serialize};

/// Configuration principale du système audio
///
/// Les deux directions n'ont pas la même fréquence : le service distant
/// attend du 16 kHz en entrée et renvoie du 24 kHz en sortie.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Fréquence d'échantillonnage de la capture en Hz
    pub input_sample_rate: u32,

    /// Fréquence d'échantillonnage de la voix reçue en Hz
    pub output_sample_rate: u32,

    /// Nombre de canaux (1 = mono, suffisant pour la voix)
    pub channels: u16,

    /// Nombre d'échantillons par bloc capturé
    ///
    /// 4096 échantillons à 16 kHz = 256ms par bloc
    pub capture_block_size: usize,

    /// Nombre de blocs capturés en attente avant de dropper
    pub capture_queue_depth: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            input_sample_rate: 16000,
            output_sample_rate: 24000,
            channels: 1,
            capture_block_size: 4096,
            capture_queue_depth: 8,
        }
    }
}

impl AudioConfig {
    /// Tag MIME des trames envoyées au service distant
    ///
    /// Exemple : "audio/pcm;rate=16000"
    pub fn input_mime_type(&self) -> String {
        crate::codec::mime_type_for(self.input_sample_rate)
    }

    /// Tag MIME attendu pour la voix reçue
    pub fn output_mime_type(&self) -> String {
        crate::codec::mime_type_for(self.output_sample_rate)
    }

    /// Durée d'un bloc capturé
    pub fn block_duration(&self) -> Duration {
        let nanos = self.capture_block_size as u64 * 1_000_000_000 / self.input_sample_rate.max(1) as u64;
        Duration::from_nanos(nanos)
    }

    /// Valide que la configuration est cohérente
    pub fn validate(&self) -> Result<(), String> {
        for (name, rate) in [("entrée", self.input_sample_rate), ("sortie", self.output_sample_rate)] {
            if !(8000..=48000).contains(&rate) {
                return Err(format!("Sample rate {} invalide: {} (doit être entre 8000 et 48000)", name, rate));
            }
        }

        if self.channels == 0 || self.channels > 2 {
            return Err(format!("Nombre de canaux invalide: {} (doit être 1 ou 2)", self.channels));
        }

        if self.capture_block_size < 256 || self.capture_block_size > 16384 {
            return Err(format!("Taille de bloc invalide: {} (doit être entre 256 et 16384)", self.capture_block_size));
        }

        if self.capture_queue_depth == 0 {
            return Err("La file de capture doit contenir au moins un bloc".to_string());
        }

        Ok(())
    }

    /// Blocs plus petits : moins de latence à l'envoi, plus de messages
    pub fn low_latency() -> Self {
        Self {
            capture_block_size: 1024,
            capture_queue_depth: 16,
            ..Default::default()
        }
    }

    /// Configuration pour tests (petits blocs, file courte)
    pub fn test_config() -> Self {
        Self {
            capture_block_size: 256,
            capture_queue_depth: 4,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AudioConfig::default();

        assert_eq!(config.input_mime_type(), "audio/pcm;rate=16000");
        assert_eq!(config.output_mime_type(), "audio/pcm;rate=24000");
        assert_eq!(config.block_duration(), Duration::from_millis(256));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_config() {
        let mut config = AudioConfig::default();

        config.output_sample_rate = 1000;
        assert!(config.validate().is_err());

        config.output_sample_rate = 24000;
        config.channels = 0;
        assert!(config.validate().is_err());

        config.channels = 1;
        config.capture_queue_depth = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_preset_configs() {
        assert!(AudioConfig::low_latency().validate().is_ok());
        assert!(AudioConfig::test_config().validate().is_ok());
        assert!(AudioConfig::low_latency().block_duration() < AudioConfig::default().block_duration());
    }
}
