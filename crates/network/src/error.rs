//! Gestion d'erreurs pour le canal vocal
//!
//! Ce module définit les erreurs possibles côté réseau : ouverture du
//! canal, négociation, protocole, sérialisation. Il suit les mêmes
//! patterns que le module audio pour la cohérence du code.

use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Énumération de toutes les erreurs possibles dans le système réseau
#[derive(Error, Debug)]
pub enum NetworkError {
    /// Impossible d'ouvrir le canal vers le service distant
    #[error("Connexion impossible vers {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    /// Le service n'a pas confirmé la négociation à temps
    #[error("Négociation non confirmée après {timeout_ms}ms")]
    HandshakeTimeout { timeout_ms: u64 },

    /// Le canal a été fermé (par le distant ou localement)
    #[error("Canal fermé")]
    ChannelClosed,

    /// Message reçu ou émis qui ne respecte pas le protocole
    #[error("Erreur de protocole: {0}")]
    ProtocolError(String),

    /// Erreur lors de la sérialisation JSON d'un message sortant
    #[error("Erreur de sérialisation: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Erreur remontée par la couche WebSocket
    #[error("Erreur WebSocket: {0}")]
    WebSocket(#[from] tungstenite::Error),

    /// Opération tentée alors que le canal n'est pas dans le bon état
    #[error("Opération {operation} invalide dans l'état {current_state}")]
    InvalidState { operation: String, current_state: String },

    /// Erreur de configuration réseau
    #[error("Configuration réseau invalide: {0}")]
    ConfigError(String),
}

/// Type Result personnalisé pour notre crate network
pub type NetworkResult<T> = Result<T, NetworkError>;

impl NetworkError {
    /// Crée une erreur de connexion avec contexte
    pub fn connection_failed(url: impl Into<String>, reason: impl ToString) -> Self {
        Self::ConnectionFailed {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    /// Vrai si l'erreur doit fermer la session
    ///
    /// Seule la fermeture du canal est une fin attendue.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, NetworkError::ChannelClosed)
    }

    /// Vrai si l'erreur survient avant que le canal soit utilisable
    ///
    /// L'utilisateur peut alors relancer la session à la main.
    pub fn is_connection_failure(&self) -> bool {
        matches!(
            self,
            NetworkError::ConnectionFailed { .. } | NetworkError::HandshakeTimeout { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = NetworkError::connection_failed("wss://voice.local", "refusé");
        assert!(error.to_string().contains("wss://voice.local"));
        assert!(error.to_string().contains("refusé"));

        let error = NetworkError::HandshakeTimeout { timeout_ms: 500 };
        assert_eq!(error.to_string(), "Négociation non confirmée après 500ms");
    }

    #[test]
    fn test_error_classification() {
        assert!(!NetworkError::ChannelClosed.is_fatal());
        assert!(NetworkError::ProtocolError("json".into()).is_fatal());

        assert!(NetworkError::HandshakeTimeout { timeout_ms: 1 }.is_connection_failure());
        assert!(!NetworkError::ProtocolError("json".into()).is_connection_failure());
    }
}
