//! Traits abstraits pour le canal vocal
//!
//! Le canal est découpé en deux moitiés possédées séparément :
//! l'émetteur appartient à la pompe de capture, le récepteur à la machine
//! à états de la session. Chaque implémentation (WebSocket réel, distant
//! simulé) fournit les deux.

use async_trait::async_trait;

use crate::{ClientMessage, NetworkConfig, NetworkResult, ServerEvent};

/// Moitié émettrice du canal
#[async_trait]
pub trait FrameSender: Send {
    /// Sérialise et envoie un message
    ///
    /// # Erreurs
    /// - `NetworkError::ChannelClosed` : le canal n'accepte plus rien
    /// - `NetworkError::WebSocket` : échec d'écriture
    async fn send(&mut self, message: &ClientMessage) -> NetworkResult<()>;

    /// Ferme proprement le canal (meilleur effort)
    async fn close(&mut self) -> NetworkResult<()>;
}

/// Moitié réceptrice du canal
#[async_trait]
pub trait FrameReceiver: Send {
    /// Attend le prochain message et en extrait les événements
    ///
    /// Retourne `Ok(None)` quand le distant a fermé le canal.
    /// Doit pouvoir être annulé (utilisé dans un `select!`) sans perdre
    /// de message déjà lu.
    ///
    /// # Erreurs
    /// - `NetworkError::ProtocolError` : message illisible
    async fn next_events(&mut self) -> NetworkResult<Option<Vec<ServerEvent>>>;
}

/// Les deux moitiés d'un canal ouvert
pub struct ChannelHalves {
    pub sender: Box<dyn FrameSender>,
    pub receiver: Box<dyn FrameReceiver>,
}

/// Ouvre des canaux vers le service distant
#[async_trait]
pub trait Connector: Send + Sync {
    /// Ouvre un canal (sans négociation)
    ///
    /// # Erreurs
    /// - `NetworkError::ConnectionFailed` : service injoignable ou refus
    async fn open(&self, config: &NetworkConfig) -> NetworkResult<ChannelHalves>;
}
