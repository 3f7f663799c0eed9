//! Module de capture audio utilisant cpal
//!
//! Ce module implémente le trait AudioCapture pour le microphone par défaut.
//!
//! cpal fonctionne avec des callbacks. Le callback accumule les
//! échantillons du premier canal et, dès qu'un bloc de
//! `capture_block_size` est complet, l'envoie sur un channel borné.
//! Si la file est pleine (consommateur en retard), le bloc est perdu :
//! on ne bloque jamais le thread audio et on ne réordonne jamais.
//!
//! Si cpal signale la disparition du micro, `next_block` rend
//! `DeviceDisconnected` au lieu d'attendre des blocs qui ne viendront plus.

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, SampleFormat, SizedSample, Stream, StreamConfig};
use cpal::Sample as _;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Notify};
use tracing::{debug, error, info, warn};

use crate::{AudioCapture, AudioConfig, AudioError, AudioResult, Sample};

/// Perte du périphérique, signalée par le callback d'erreur cpal
#[derive(Debug, Default)]
struct DeviceLoss {
    lost: AtomicBool,
    notify: Notify,
}

impl DeviceLoss {
    fn report(&self) {
        self.lost.store(true, Ordering::Release);
        self.notify.notify_one();
    }

    fn is_lost(&self) -> bool {
        self.lost.load(Ordering::Acquire)
    }
}

/// Côté async de la capture : blocs complets ou perte du micro
struct BlockSource {
    receiver: mpsc::Receiver<Vec<Sample>>,
    loss: Arc<DeviceLoss>,
}

impl BlockSource {
    async fn next(&mut self) -> AudioResult<Vec<Sample>> {
        loop {
            if self.loss.is_lost() {
                return Err(AudioError::DeviceDisconnected);
            }
            tokio::select! {
                block = self.receiver.recv() => return block.ok_or(AudioError::DeviceDisconnected),
                _ = self.loss.notify.notified() => {}
            }
        }
    }
}

fn report_stream_error(err: &cpal::StreamError, loss: &DeviceLoss) {
    error!(error = %err, "erreur stream audio entrée");
    if matches!(err, cpal::StreamError::DeviceNotAvailable) {
        loss.report();
    }
}

/// Implémentation de capture audio avec cpal
///
/// Le périphérique est acquis dans `new` et libéré au drop : le stream est
/// la ressource, le garder en vie c'est garder le micro.
pub struct CpalCapture {
    /// Périphérique audio d'entrée (microphone)
    device: Device,

    /// Configuration audio de notre application
    config: AudioConfig,

    /// Stream audio actif (None si arrêté)
    stream: Option<Stream>,

    /// Blocs complets envoyés par le callback
    blocks: BlockSource,

    /// Sender cloné dans le callback à chaque démarrage
    block_sender: mpsc::Sender<Vec<Sample>>,

    /// Blocs perdus parce que la file était pleine
    dropped_blocks: Arc<AtomicU64>,

    /// Nom du périphérique pour debug
    device_name: String,
}

impl CpalCapture {
    /// Acquiert le microphone par défaut
    ///
    /// # Erreurs
    /// - `AudioError::DeviceUnavailable` si aucun microphone n'est disponible
    pub fn new(config: AudioConfig) -> AudioResult<Self> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| AudioError::DeviceUnavailable("aucun microphone".to_string()))?;

        let device_name = device
            .description()
            .ok()
            .map(|desc| desc.name().to_string())
            .unwrap_or_else(|| "Périphérique inconnu".to_string());

        let (block_sender, block_receiver) = mpsc::channel(config.capture_queue_depth);

        info!(device = %device_name, "microphone trouvé");

        Ok(Self {
            device,
            config,
            stream: None,
            blocks: BlockSource {
                receiver: block_receiver,
                loss: Arc::new(DeviceLoss::default()),
            },
            block_sender,
            dropped_blocks: Arc::new(AtomicU64::new(0)),
            device_name,
        })
    }

    /// Nombre de blocs perdus depuis la création
    pub fn dropped_blocks(&self) -> u64 {
        self.dropped_blocks.load(Ordering::Relaxed)
    }

    /// Construit le stream à la fréquence d'entrée configurée
    fn build_stream(&self) -> AudioResult<Stream> {
        let rate = self.config.input_sample_rate;
        let supported = self
            .device
            .supported_input_configs()
            .map_err(|e| AudioError::ConfigError(format!("Impossible d'obtenir configs supportées: {}", e)))?
            .find(|range| range.min_sample_rate() <= rate && rate <= range.max_sample_rate())
            .ok_or_else(|| {
                AudioError::DeviceUnavailable(format!("{} ne capture pas à {} Hz", self.device_name, rate))
            })?
            .with_sample_rate(rate);

        let sample_format = supported.sample_format();
        let stream_config: StreamConfig = supported.into();

        debug!(
            rate,
            channels = stream_config.channels,
            format = ?sample_format,
            block = self.config.capture_block_size,
            "configuration capture"
        );

        match sample_format {
            SampleFormat::F32 => self.build_typed_stream::<f32>(&stream_config),
            SampleFormat::I16 => self.build_typed_stream::<i16>(&stream_config),
            SampleFormat::U16 => self.build_typed_stream::<u16>(&stream_config),
            format => Err(AudioError::ConfigError(format!("Format d'échantillon non supporté : {:?}", format))),
        }
    }

    fn build_typed_stream<T>(&self, config: &StreamConfig) -> AudioResult<Stream>
    where
        T: SizedSample + Send + 'static,
        f32: FromSample<T>,
    {
        let sender = self.block_sender.clone();
        let dropped = Arc::clone(&self.dropped_blocks);
        let loss = Arc::clone(&self.blocks.loss);
        let channels = config.channels.max(1) as usize;
        let block_size = self.config.capture_block_size;
        let mut block: Vec<Sample> = Vec::with_capacity(block_size);

        let stream = self.device.build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                // Premier canal seulement
                for frame in data.chunks(channels) {
                    block.push(f32::from_sample(frame[0]));
                    if block.len() == block_size {
                        let full = std::mem::replace(&mut block, Vec::with_capacity(block_size));
                        if sender.try_send(full).is_err() {
                            dropped.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                }
            },
            move |err| report_stream_error(&err, &loss),
            None,
        )?;
        Ok(stream)
    }
}

#[async_trait]
impl AudioCapture for CpalCapture {
    async fn start(&mut self) -> AudioResult<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let stream = self.build_stream()?;
        stream.play()?;
        self.stream = Some(stream);

        info!(device = %self.device_name, "capture audio démarrée");
        Ok(())
    }

    async fn stop(&mut self) -> AudioResult<()> {
        if let Some(stream) = self.stream.take() {
            stream.pause()?;
            let dropped = self.dropped_blocks();
            if dropped > 0 {
                warn!(dropped, "blocs capturés perdus (file pleine)");
            }
            info!("capture audio arrêtée");
        }
        Ok(())
    }

    async fn next_block(&mut self) -> AudioResult<Vec<Sample>> {
        if self.stream.is_none() {
            return Err(AudioError::Closed);
        }
        self.blocks.next().await
    }

    fn is_recording(&self) -> bool {
        self.stream.is_some()
    }

    fn device_info(&self) -> String {
        self.device_name.clone()
    }
}

impl Drop for CpalCapture {
    fn drop(&mut self) {
        if self.stream.take().is_some() {
            debug!("microphone libéré au drop");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{timeout, Duration};

    #[test]
    fn test_capture_creation() {
        // Peut échouer si aucun microphone n'est disponible
        match CpalCapture::new(AudioConfig::default()) {
            Ok(capture) => {
                assert!(!capture.is_recording());
                assert!(!capture.device_info().is_empty());
                assert_eq!(capture.dropped_blocks(), 0);
            }
            Err(AudioError::DeviceUnavailable(_)) => {
                println!("⚠️  Pas de microphone disponible pour le test");
            }
            Err(e) => panic!("Erreur inattendue: {}", e),
        }
    }

    #[tokio::test]
    async fn test_next_block_requires_start() {
        if let Ok(mut capture) = CpalCapture::new(AudioConfig::test_config()) {
            assert!(matches!(capture.next_block().await, Err(AudioError::Closed)));
        }
    }

    #[tokio::test]
    async fn test_lost_microphone_wakes_waiting_reader() {
        let (sender, receiver) = mpsc::channel(4);
        let loss = Arc::new(DeviceLoss::default());
        let mut source = BlockSource { receiver, loss: Arc::clone(&loss) };

        sender.send(vec![0.25; 4]).await.unwrap();
        assert_eq!(source.next().await.unwrap(), vec![0.25; 4]);

        // Le lecteur attend, le callback d'erreur le réveille
        let reader = tokio::spawn(async move { source.next().await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        report_stream_error(&cpal::StreamError::DeviceNotAvailable, &loss);

        let result = timeout(Duration::from_secs(1), reader).await.unwrap().unwrap();
        assert!(matches!(result, Err(AudioError::DeviceDisconnected)));
        drop(sender);
    }

    #[tokio::test]
    async fn test_loss_reported_before_read() {
        let (_sender, receiver) = mpsc::channel(4);
        let loss = Arc::new(DeviceLoss::default());
        let mut source = BlockSource { receiver, loss: Arc::clone(&loss) };

        loss.report();
        assert!(matches!(source.next().await, Err(AudioError::DeviceDisconnected)));
    }

    // Nécessite un vrai microphone
    #[tokio::test]
    #[ignore]
    async fn test_capture_block() {
        let config = AudioConfig::default();
        let mut capture = CpalCapture::new(config.clone()).unwrap();
        capture.start().await.unwrap();

        let block = timeout(Duration::from_secs(5), capture.next_block())
            .await
            .expect("aucun bloc reçu")
            .unwrap();
        assert_eq!(block.len(), config.capture_block_size);

        capture.stop().await.unwrap();
        assert!(!capture.is_recording());
    }
}
