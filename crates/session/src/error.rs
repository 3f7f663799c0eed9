//! Erreurs de la session vocale
//!
//! La session est la seule autorité qui décide de fermer : les erreurs
//! audio et réseau remontent ici et sont traduites dans cette taxonomie.

use audio::AudioError;
use network::NetworkError;
use thiserror::Error;

use crate::SessionState;

#[derive(Error, Debug)]
pub enum SessionError {
    /// Micro ou haut-parleurs impossibles à acquérir (ou perdus en cours de route)
    #[error("Périphérique audio indisponible: {0}")]
    DeviceUnavailable(String),

    /// Canal impossible à ouvrir ou négociation échouée
    #[error("Connexion échouée: {0}")]
    ConnectionFailed(String),

    /// Donnée entrante ou sortante invalide : la session est fermée
    #[error("Erreur de protocole: {0}")]
    ProtocolError(String),

    /// Chunk audio illisible : il est ignoré, la session continue
    #[error("Payload audio invalide: {0}")]
    MalformedPayload(String),

    /// Opération sur une session déjà fermée
    #[error("Session fermée")]
    Closed,

    /// Transition refusée par la machine à états
    #[error("Transition invalide: {from} → {to}")]
    InvalidTransition { from: SessionState, to: SessionState },
}

pub type SessionResult<T> = Result<T, SessionError>;

impl SessionError {
    /// Vrai si l'erreur doit être montrée à l'utilisateur
    ///
    /// `Closed` et `InvalidTransition` sont des erreurs de programmation.
    pub fn is_user_facing(&self) -> bool {
        !matches!(self, SessionError::Closed | SessionError::InvalidTransition { .. })
    }
}

impl From<AudioError> for SessionError {
    fn from(err: AudioError) -> Self {
        match err {
            AudioError::MalformedPayload { .. } | AudioError::UnsupportedRate { .. } => {
                SessionError::MalformedPayload(err.to_string())
            }
            AudioError::Closed => SessionError::Closed,
            AudioError::DeviceUnavailable(reason) => SessionError::DeviceUnavailable(reason),
            other => SessionError::DeviceUnavailable(other.to_string()),
        }
    }
}

impl From<NetworkError> for SessionError {
    fn from(err: NetworkError) -> Self {
        if err.is_connection_failure() {
            SessionError::ConnectionFailed(err.to_string())
        } else {
            SessionError::ProtocolError(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_error_mapping() {
        let err: SessionError = AudioError::DeviceUnavailable("aucun micro".into()).into();
        assert!(matches!(err, SessionError::DeviceUnavailable(ref r) if r == "aucun micro"));

        let err: SessionError = AudioError::DeviceDisconnected.into();
        assert!(matches!(err, SessionError::DeviceUnavailable(_)));

        let err: SessionError = AudioError::MalformedPayload { len: 3, channels: 1 }.into();
        assert!(matches!(err, SessionError::MalformedPayload(_)));
    }

    #[test]
    fn test_network_error_mapping() {
        let err: SessionError = NetworkError::HandshakeTimeout { timeout_ms: 10 }.into();
        assert!(matches!(err, SessionError::ConnectionFailed(_)));

        let err: SessionError = NetworkError::ProtocolError("json".into()).into();
        assert!(matches!(err, SessionError::ProtocolError(_)));
    }

    #[test]
    fn test_user_facing() {
        assert!(SessionError::DeviceUnavailable("x".into()).is_user_facing());
        assert!(!SessionError::Closed.is_user_facing());
        let err = SessionError::InvalidTransition {
            from: SessionState::Closed,
            to: SessionState::Connecting,
        };
        assert!(!err.is_user_facing());
        assert_eq!(err.to_string(), "Transition invalide: Closed → Connecting");
    }
}
