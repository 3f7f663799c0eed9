//! Négociation de session
//!
//! Une fois le canal ouvert, le client envoie `setup` et attend
//! `setupComplete`. Les messages qui arrivent avant l'accusé sont ignorés.
//! Les autres champs du message qui porte l'accusé sont rendus à
//! l'appelant, qui les applique une fois la session active.

use tokio::time::timeout;
use tracing::{debug, info};

use crate::{ChannelHalves, ClientMessage, NetworkConfig, NetworkError, NetworkResult, ServerEvent};

/// Envoie la configuration et attend que le service soit prêt
///
/// Retourne les événements qui accompagnaient `setupComplete` dans le même
/// message, dans leur ordre d'application.
///
/// # Erreurs
/// - `NetworkError::HandshakeTimeout` : pas d'accusé dans `handshake_timeout`
/// - `NetworkError::ChannelClosed` : canal fermé pendant la négociation
/// - toute erreur d'envoi ou de protocole
pub async fn negotiate(channel: &mut ChannelHalves, config: &NetworkConfig) -> NetworkResult<Vec<ServerEvent>> {
    channel.sender.send(&ClientMessage::setup(config)).await?;
    debug!(model = %config.model, voice = %config.voice_name, "setup envoyé");

    let leftover = timeout(config.handshake_timeout, wait_for_ack(channel))
        .await
        .map_err(|_| NetworkError::HandshakeTimeout {
            timeout_ms: config.handshake_timeout.as_millis() as u64,
        })??;

    info!(leftover = leftover.len(), "négociation terminée");
    Ok(leftover)
}

async fn wait_for_ack(channel: &mut ChannelHalves) -> NetworkResult<Vec<ServerEvent>> {
    loop {
        match channel.receiver.next_events().await? {
            None => return Err(NetworkError::ChannelClosed),
            Some(events) if events.contains(&ServerEvent::SetupComplete) => {
                return Ok(events.into_iter().filter(|e| *e != ServerEvent::SetupComplete).collect());
            }
            Some(events) => {
                debug!(ignored = events.len(), "message reçu avant setupComplete");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Connector, SimulatedConnector};
    use tokio_test::assert_ok;

    #[tokio::test]
    async fn test_negotiate_with_auto_ack() {
        let (connector, remote) = SimulatedConnector::new();
        let config = NetworkConfig::test_config();

        let mut channel = connector.open(&config).await.unwrap();
        let leftover = assert_ok!(negotiate(&mut channel, &config).await);
        assert!(leftover.is_empty());

        let sent = remote.sent_messages();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].get("setup").is_some());
    }

    #[tokio::test]
    async fn test_messages_before_ack_are_ignored() {
        let (connector, remote) = SimulatedConnector::without_ack();
        let config = NetworkConfig::test_config();
        let mut channel = connector.open(&config).await.unwrap();

        remote.send_raw(r#"{"outputTranscriptionDelta":"trop tôt"}"#);
        remote.acknowledge_setup();
        assert_ok!(negotiate(&mut channel, &config).await);
    }

    #[tokio::test]
    async fn test_fields_next_to_ack_are_returned() {
        let (connector, remote) = SimulatedConnector::without_ack();
        let config = NetworkConfig::test_config();
        let mut channel = connector.open(&config).await.unwrap();

        remote.send_raw(r#"{"setupComplete":{},"outputTranscriptionDelta":"Bonjour","turnComplete":true}"#);
        let leftover = negotiate(&mut channel, &config).await.unwrap();
        assert_eq!(
            leftover,
            vec![ServerEvent::Transcription("Bonjour".to_string()), ServerEvent::TurnComplete]
        );
    }

    #[tokio::test]
    async fn test_negotiate_timeout() {
        let (connector, _remote) = SimulatedConnector::without_ack();
        let config = NetworkConfig::test_config();
        let mut channel = connector.open(&config).await.unwrap();

        let result = negotiate(&mut channel, &config).await;
        assert!(matches!(result, Err(NetworkError::HandshakeTimeout { timeout_ms: 200 })));
    }

    #[tokio::test]
    async fn test_close_during_negotiation() {
        let (connector, remote) = SimulatedConnector::without_ack();
        let config = NetworkConfig::test_config();
        let mut channel = connector.open(&config).await.unwrap();

        remote.close();
        let result = negotiate(&mut channel, &config).await;
        assert!(matches!(result, Err(NetworkError::ChannelClosed)));
    }
}
