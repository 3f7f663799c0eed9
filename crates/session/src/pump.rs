//! Pompe de capture : micro → enveloppe PCM → canal
//!
//! La pompe tourne dans sa propre tâche tant que la session est active.
//! Elle attend chaque bloc du micro (pas de polling actif), le convertit,
//! l'emballe et l'envoie. Les trames partent dans l'ordre de capture.
//!
//! Un envoi qui échoue arrête la pompe avec `ProtocolError` : pas de
//! retry, la session entière est fermée.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use audio::{pcm, AudioCapture, AudioCodec, PcmEnvelopeCodec};
use network::{ClientMessage, FrameSender};
use tokio::sync::watch;
use tracing::{debug, info};

use crate::{SessionError, SessionResult};

/// Ce que la pompe rend à la session quand elle s'arrête
pub struct PumpOutcome {
    pub capture: Box<dyn AudioCapture>,
    pub sender: Box<dyn FrameSender>,
    pub result: SessionResult<()>,
}

pub struct CapturePump {
    capture: Box<dyn AudioCapture>,
    sender: Box<dyn FrameSender>,
    codec: PcmEnvelopeCodec,
    stop: watch::Receiver<bool>,
    frames_sent: Arc<AtomicU64>,
}

impl CapturePump {
    pub fn new(
        capture: Box<dyn AudioCapture>,
        sender: Box<dyn FrameSender>,
        codec: PcmEnvelopeCodec,
        stop: watch::Receiver<bool>,
    ) -> Self {
        Self {
            capture,
            sender,
            codec,
            stop,
            frames_sent: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Compteur partagé des trames envoyées
    pub fn frames_sent(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.frames_sent)
    }

    /// Tourne jusqu'à l'arrêt demandé ou la première erreur
    pub async fn run(mut self) -> PumpOutcome {
        let result = self.pump().await;
        match &result {
            Ok(()) => info!(frames = self.frames_sent.load(Ordering::Relaxed), "Pompe de capture arrêtée"),
            Err(e) => info!(error = %e, "Pompe de capture interrompue"),
        }
        PumpOutcome {
            capture: self.capture,
            sender: self.sender,
            result,
        }
    }

    async fn pump(&mut self) -> SessionResult<()> {
        loop {
            if *self.stop.borrow() {
                return Ok(());
            }

            // Un stop (ou la disparition de la session) gagne toujours
            let block = tokio::select! {
                biased;
                _ = self.stop.changed() => return Ok(()),
                block = self.capture.next_block() => block.map_err(SessionError::from)?,
            };

            let frame = pcm::frame_from_f32(&block, self.codec.sample_rate(), self.codec.channels());
            let payload = self.codec.encode(&frame);
            let bytes = payload.data.len();
            let message = ClientMessage::media(&payload);

            tokio::select! {
                biased;
                _ = self.stop.changed() => return Ok(()),
                sent = self.sender.send(&message) => {
                    sent.map_err(|e| SessionError::ProtocolError(format!("envoi audio impossible: {}", e)))?;
                }
            }

            let n = self.frames_sent.fetch_add(1, Ordering::Relaxed) + 1;
            debug!(frame = n, bytes, "Trame micro envoyée");
        }
    }
}
