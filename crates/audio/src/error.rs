//! Gestion d'erreurs pour le système audio
//!
//! Ce module définit tous les types d'erreurs possibles côté audio :
//! périphériques, conversion PCM et ordonnancement de la lecture.

use thiserror::Error;

/// Énumération de toutes les erreurs possibles dans le système audio
#[derive(Error, Debug)]
pub enum AudioError {
    /// Le microphone ou les haut-parleurs ne peuvent pas être acquis
    #[error("Périphérique audio indisponible: {0}")]
    DeviceUnavailable(String),

    /// Erreur lors de la configuration des paramètres audio (sample rate, etc.)
    #[error("Erreur de configuration audio: {0}")]
    ConfigError(String),

    /// Erreur provenant de la librairie cpal (Cross-Platform Audio Library)
    #[error("Erreur cpal: {0}")]
    CpalError(#[from] cpal::PlayStreamError),

    /// Payload dont la longueur n'est pas un multiple de (canaux * 2) bytes
    #[error("Payload PCM invalide: {len} bytes pour {channels} canal(aux)")]
    MalformedPayload { len: usize, channels: u16 },

    /// Frame reçue à une fréquence que la sortie ouverte ne joue pas
    #[error("Fréquence {rate} Hz non supportée par la sortie ({expected} Hz)")]
    UnsupportedRate { rate: u32, expected: u32 },

    /// Le périphérique audio a été débranché pendant l'utilisation
    #[error("Périphérique audio déconnecté")]
    DeviceDisconnected,

    /// Opération tentée sur un composant déjà libéré
    #[error("Composant audio déjà fermé")]
    Closed,
}

/// Conversion des erreurs cpal::BuildStreamError
impl From<cpal::BuildStreamError> for AudioError {
    fn from(err: cpal::BuildStreamError) -> Self {
        AudioError::DeviceUnavailable(format!("Erreur construction stream: {:?}", err))
    }
}

/// Conversion des erreurs cpal::DefaultStreamConfigError
impl From<cpal::DefaultStreamConfigError> for AudioError {
    fn from(err: cpal::DefaultStreamConfigError) -> Self {
        AudioError::ConfigError(format!("Erreur config par défaut: {:?}", err))
    }
}

/// Conversion des erreurs cpal::PauseStreamError
impl From<cpal::PauseStreamError> for AudioError {
    fn from(err: cpal::PauseStreamError) -> Self {
        AudioError::ConfigError(format!("Erreur pause stream: {:?}", err))
    }
}

impl AudioError {
    /// Vrai si l'erreur ne concerne qu'un seul chunk (on le droppe, la session continue)
    pub fn is_chunk_local(&self) -> bool {
        matches!(
            self,
            AudioError::MalformedPayload { .. } | AudioError::UnsupportedRate { .. }
        )
    }
}

/// Type Result personnalisé pour notre crate
pub type AudioResult<T> = Result<T, AudioError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = AudioError::DeviceUnavailable("aucun micro".to_string());
        assert_eq!(error.to_string(), "Périphérique audio indisponible: aucun micro");

        let error = AudioError::MalformedPayload { len: 3, channels: 1 };
        assert_eq!(error.to_string(), "Payload PCM invalide: 3 bytes pour 1 canal(aux)");
    }

    #[test]
    fn test_chunk_local() {
        assert!(AudioError::MalformedPayload { len: 1, channels: 1 }.is_chunk_local());
        assert!(AudioError::UnsupportedRate { rate: 48000, expected: 24000 }.is_chunk_local());
        assert!(!AudioError::DeviceDisconnected.is_chunk_local());
    }
}
