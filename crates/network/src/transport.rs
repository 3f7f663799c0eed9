//! Implémentations du canal vocal
//!
//! Ce module contient deux implémentations du trait Connector :
//! - WebSocketConnector : vraie connexion WebSocket avec tokio-tungstenite
//! - SimulatedConnector : distant simulé en mémoire, piloté par les tests

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::{
    parse_server_message, ChannelHalves, ClientMessage, Connector, FrameReceiver, FrameSender,
    NetworkConfig, NetworkError, NetworkResult, ServerEvent,
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connecteur WebSocket vers le service vocal réel
#[derive(Clone, Copy, Debug, Default)]
pub struct WebSocketConnector;

#[async_trait]
impl Connector for WebSocketConnector {
    async fn open(&self, config: &NetworkConfig) -> NetworkResult<ChannelHalves> {
        config.validate().map_err(NetworkError::ConfigError)?;

        // L'URL complète contient la clé : seul l'endpoint apparaît dans les erreurs
        let url = config.connection_url();
        let (stream, response) = tokio::time::timeout(config.connect_timeout, connect_async(url.as_str()))
            .await
            .map_err(|_| {
                NetworkError::connection_failed(
                    &config.endpoint,
                    format!("timeout après {}ms", config.connect_timeout.as_millis()),
                )
            })?
            .map_err(|e| NetworkError::connection_failed(&config.endpoint, e))?;

        info!(endpoint = %config.endpoint, status = %response.status(), "canal WebSocket ouvert");

        let (write, read) = stream.split();
        Ok(ChannelHalves {
            sender: Box::new(WebSocketSender { write }),
            receiver: Box::new(WebSocketReceiver { read }),
        })
    }
}

struct WebSocketSender {
    write: SplitSink<WsStream, Message>,
}

#[async_trait]
impl FrameSender for WebSocketSender {
    async fn send(&mut self, message: &ClientMessage) -> NetworkResult<()> {
        let json = serde_json::to_string(message)?;
        debug!(kind = message.kind(), bytes = json.len(), "envoi message");
        self.write.send(Message::Text(json)).await.map_err(closed_or_ws)
    }

    async fn close(&mut self) -> NetworkResult<()> {
        self.write.close().await.map_err(closed_or_ws)
    }
}

struct WebSocketReceiver {
    read: SplitStream<WsStream>,
}

#[async_trait]
impl FrameReceiver for WebSocketReceiver {
    async fn next_events(&mut self) -> NetworkResult<Option<Vec<ServerEvent>>> {
        loop {
            let message = match self.read.next().await {
                None => return Ok(None),
                Some(Err(e)) => {
                    return match closed_or_ws(e) {
                        NetworkError::ChannelClosed => Ok(None),
                        other => Err(other),
                    };
                }
                Some(Ok(message)) => message,
            };

            match message {
                Message::Text(text) => return parse_server_message(&text).map(Some),
                Message::Binary(bytes) => {
                    let text = std::str::from_utf8(&bytes)
                        .map_err(|e| NetworkError::ProtocolError(format!("trame binaire non UTF-8: {}", e)))?;
                    return parse_server_message(text).map(Some);
                }
                Message::Close(frame) => {
                    debug!(?frame, "fermeture reçue du distant");
                    return Ok(None);
                }
                // Ping/Pong gérés par tungstenite
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => continue,
            }
        }
    }
}

fn closed_or_ws(err: tungstenite::Error) -> NetworkError {
    match err {
        tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => NetworkError::ChannelClosed,
        other => NetworkError::WebSocket(other),
    }
}

/// Trame injectée par le distant simulé
enum RemoteFrame {
    Text(String),
    Close,
}

#[derive(Default)]
struct RemoteState {
    sent: Vec<Value>,
    opens: usize,
    auto_ack: bool,
    fail_open: bool,
    fail_sends: bool,
    client_closed: bool,
    remote_closed: bool,
}

/// Connecteur vers un distant simulé en mémoire
///
/// Un seul canal peut être ouvert par connecteur. Les trames envoyées par
/// le distant avant l'ouverture sont conservées et lues en premier.
pub struct SimulatedConnector {
    state: Arc<Mutex<RemoteState>>,
    inbound_tx: mpsc::UnboundedSender<RemoteFrame>,
    inbound_rx: Mutex<Option<mpsc::UnboundedReceiver<RemoteFrame>>>,
}

/// Poignée de pilotage du distant simulé
#[derive(Clone)]
pub struct SimulatedRemote {
    state: Arc<Mutex<RemoteState>>,
    inbound_tx: mpsc::UnboundedSender<RemoteFrame>,
}

impl SimulatedConnector {
    /// Distant qui accuse réception du `setup` automatiquement
    pub fn new() -> (Self, SimulatedRemote) {
        let (tx, rx) = mpsc::unbounded_channel();
        let state = Arc::new(Mutex::new(RemoteState {
            auto_ack: true,
            ..Default::default()
        }));
        let remote = SimulatedRemote {
            state: Arc::clone(&state),
            inbound_tx: tx.clone(),
        };
        (
            Self {
                state,
                inbound_tx: tx,
                inbound_rx: Mutex::new(Some(rx)),
            },
            remote,
        )
    }

    /// Distant qui ne répond jamais au `setup`
    pub fn without_ack() -> (Self, SimulatedRemote) {
        let (connector, remote) = Self::new();
        connector.state.lock().auto_ack = false;
        (connector, remote)
    }

    /// Distant injoignable
    pub fn unreachable() -> (Self, SimulatedRemote) {
        let (connector, remote) = Self::new();
        connector.state.lock().fail_open = true;
        (connector, remote)
    }
}

#[async_trait]
impl Connector for SimulatedConnector {
    async fn open(&self, config: &NetworkConfig) -> NetworkResult<ChannelHalves> {
        let fail_open = {
            let mut state = self.state.lock();
            state.opens += 1;
            state.fail_open
        };
        if fail_open {
            return Err(NetworkError::connection_failed(&config.endpoint, "distant simulé injoignable"));
        }

        let rx = self
            .inbound_rx
            .lock()
            .take()
            .ok_or_else(|| NetworkError::connection_failed(&config.endpoint, "canal simulé déjà utilisé"))?;

        Ok(ChannelHalves {
            sender: Box::new(SimulatedSender {
                state: Arc::clone(&self.state),
                inbound_tx: self.inbound_tx.clone(),
            }),
            receiver: Box::new(SimulatedReceiver { rx }),
        })
    }
}

struct SimulatedSender {
    state: Arc<Mutex<RemoteState>>,
    inbound_tx: mpsc::UnboundedSender<RemoteFrame>,
}

#[async_trait]
impl FrameSender for SimulatedSender {
    async fn send(&mut self, message: &ClientMessage) -> NetworkResult<()> {
        let value = serde_json::to_value(message)?;
        let mut state = self.state.lock();
        if state.client_closed || state.remote_closed || state.fail_sends {
            return Err(NetworkError::ChannelClosed);
        }
        state.sent.push(value);

        if matches!(message, ClientMessage::Setup(_)) && state.auto_ack {
            let _ = self.inbound_tx.send(RemoteFrame::Text(json!({ "setupComplete": {} }).to_string()));
        }
        Ok(())
    }

    async fn close(&mut self) -> NetworkResult<()> {
        self.state.lock().client_closed = true;
        Ok(())
    }
}

struct SimulatedReceiver {
    rx: mpsc::UnboundedReceiver<RemoteFrame>,
}

#[async_trait]
impl FrameReceiver for SimulatedReceiver {
    async fn next_events(&mut self) -> NetworkResult<Option<Vec<ServerEvent>>> {
        match self.rx.recv().await {
            None | Some(RemoteFrame::Close) => Ok(None),
            Some(RemoteFrame::Text(text)) => parse_server_message(&text).map(Some),
        }
    }
}

impl SimulatedRemote {
    /// Injecte un message brut (JSON valide ou non)
    pub fn send_raw(&self, text: &str) {
        if self.inbound_tx.send(RemoteFrame::Text(text.to_string())).is_err() {
            warn!("distant simulé : récepteur déjà fermé");
        }
    }

    pub fn send_json(&self, value: Value) {
        self.send_raw(&value.to_string());
    }

    pub fn acknowledge_setup(&self) {
        self.send_json(json!({ "setupComplete": {} }));
    }

    pub fn send_transcript(&self, delta: &str) {
        self.send_json(json!({ "outputTranscriptionDelta": delta }));
    }

    /// Envoie des bytes PCM en base64
    pub fn send_audio(&self, pcm: &[u8]) {
        self.send_json(json!({ "audioChunk": STANDARD.encode(pcm) }));
    }

    pub fn interrupt(&self) {
        self.send_json(json!({ "interrupted": true }));
    }

    pub fn turn_complete(&self) {
        self.send_json(json!({ "turnComplete": true }));
    }

    /// Ferme le canal côté distant
    pub fn close(&self) {
        self.state.lock().remote_closed = true;
        let _ = self.inbound_tx.send(RemoteFrame::Close);
    }

    /// Fait échouer tous les envois suivants
    pub fn fail_sends(&self) {
        self.state.lock().fail_sends = true;
    }

    /// Messages reçus du client, en JSON
    pub fn sent_messages(&self) -> Vec<Value> {
        self.state.lock().sent.clone()
    }

    /// Messages audio reçus du client
    pub fn media_messages(&self) -> Vec<Value> {
        self.sent_messages()
            .into_iter()
            .filter_map(|mut message| message.get_mut("media").map(Value::take))
            .collect()
    }

    /// Nombre de tentatives d'ouverture
    pub fn opens(&self) -> usize {
        self.state.lock().opens
    }

    pub fn client_closed(&self) -> bool {
        self.state.lock().client_closed
    }

    /// Attend qu'au moins `count` messages audio soient arrivés (2s max)
    pub async fn wait_for_media(&self, count: usize) -> bool {
        for _ in 0..400 {
            if self.media_messages().len() >= count {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        false
    }
}
