//! Module de lecture audio utilisant cpal
//!
//! Ce module implémente le trait AudioSink pour les haut-parleurs.
//!
//! L'horloge de la sortie est le nombre de frames effectivement rendues par
//! le callback cpal : c'est la seule horloge qui corresponde à ce que
//! l'utilisateur entend. Le scheduler place chaque unité sur cette horloge,
//! le callback la rend à sa position exacte, puis notifie sa fin.
//!
//! # Architecture thread
//!
//! Le callback (thread temps réel) possède seul la file de rendu. Le
//! scheduler lui transmet ses commandes (programmer, arrêter, tout vider)
//! par un ring buffer SPSC : le callback les applique au début de chaque
//! buffer, sans verrou, donc sans jamais rendre de silence à la place
//! d'une unité programmée.
//!
//! # Positions en frames
//!
//! Les instants du scheduler sont en nanosecondes arrondies, les positions
//! du callback en frames. Une unité ne commence jamais avant la fin de la
//! précédente encore en file : l'arrondi ne peut pas faire se chevaucher
//! deux unités consécutives.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, SampleFormat, SizedSample, Stream, StreamConfig};
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::pcm::frame_to_f32;
use crate::{AudioConfig, AudioError, AudioResult, AudioSink, OutputEvent, PlaybackUnit, Sample, UnitId};

/// Capacité du ring de commandes (largement plus que ce qu'un buffer cpal voit passer)
const COMMAND_CAPACITY: usize = 1024;

/// Unité prête à être rendue, en positions de frames
struct RenderUnit {
    id: UnitId,
    start_frame: u64,
    samples: Vec<Sample>,
}

impl RenderUnit {
    fn end_frame(&self) -> u64 {
        self.start_frame + self.samples.len() as u64
    }
}

/// Ordre envoyé au callback
enum RenderCommand {
    Start(RenderUnit),
    Stop(UnitId),
    Clear,
}

/// File de rendu, propriété exclusive du callback cpal
struct RenderQueue {
    /// Triées par position de départ, sans chevauchement
    units: VecDeque<RenderUnit>,
    events: Option<mpsc::UnboundedSender<OutputEvent>>,
}

impl RenderQueue {
    fn new(events: mpsc::UnboundedSender<OutputEvent>) -> Self {
        Self {
            units: VecDeque::new(),
            events: Some(events),
        }
    }

    fn apply(&mut self, command: RenderCommand) {
        match command {
            RenderCommand::Start(unit) => self.schedule(unit),
            RenderCommand::Stop(id) => self.units.retain(|unit| unit.id != id),
            RenderCommand::Clear => {
                self.units.clear();
                self.events = None;
            }
        }
    }

    /// Insère une unité, jamais avant la fin de celles déjà en file
    fn schedule(&mut self, mut unit: RenderUnit) {
        if let Some(tail) = self.units.iter().map(RenderUnit::end_frame).max() {
            unit.start_frame = unit.start_frame.max(tail);
        }
        let index = self.units.partition_point(|u| u.start_frame <= unit.start_frame);
        self.units.insert(index, unit);
    }

    /// Rend les unités qui couvrent [base, base + out.len()) et retire celles terminées
    fn render_into(&mut self, out: &mut [Sample], base: u64) {
        let window_end = base + out.len() as u64;

        for unit in self.units.iter() {
            if unit.start_frame >= window_end {
                break;
            }
            let from = unit.start_frame.max(base);
            let to = unit.end_frame().min(window_end);
            for pos in from..to {
                out[(pos - base) as usize] += unit.samples[(pos - unit.start_frame) as usize];
            }
        }

        while self.units.front().is_some_and(|unit| unit.end_frame() <= window_end) {
            if let Some(unit) = self.units.pop_front() {
                if let Some(tx) = &self.events {
                    let _ = tx.send(OutputEvent::Finished(unit.id));
                }
            }
        }
    }
}

/// Position en frames la plus proche de `at`
fn frames_at(at: Duration, sample_rate: u32) -> u64 {
    ((at.as_nanos() * sample_rate as u128 + 500_000_000) / 1_000_000_000) as u64
}

/// Erreur du stream de sortie : la perte du périphérique est remontée à la session
fn report_stream_error(err: &cpal::StreamError, events: &mpsc::UnboundedSender<OutputEvent>) {
    error!(error = %err, "erreur stream audio sortie");
    if matches!(err, cpal::StreamError::DeviceNotAvailable) {
        let _ = events.send(OutputEvent::DeviceLost(err.to_string()));
    }
}

/// Sortie audio cpal pilotée par le scheduler
pub struct CpalOutput {
    /// Stream actif (None une fois fermé)
    stream: Option<Stream>,

    sample_rate: u32,

    /// Frames rendues depuis l'ouverture
    rendered: Arc<AtomicU64>,

    /// Côté producteur du ring de commandes
    commands: HeapProd<RenderCommand>,

    /// Commandes en attente quand le ring est plein, renvoyées dans l'ordre
    backlog: VecDeque<RenderCommand>,

    device_name: String,
}

impl CpalOutput {
    /// Ouvre le périphérique de sortie par défaut à `output_sample_rate`
    ///
    /// Les fins d'unités et la perte du périphérique arrivent sur `events`.
    ///
    /// # Erreurs
    /// - `AudioError::DeviceUnavailable` : aucun haut-parleur, ou fréquence non supportée
    pub fn open(config: &AudioConfig, events: mpsc::UnboundedSender<OutputEvent>) -> AudioResult<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| AudioError::DeviceUnavailable("aucun périphérique de sortie".to_string()))?;

        let device_name = device
            .description()
            .ok()
            .map(|desc| desc.name().to_string())
            .unwrap_or_else(|| "Périphérique inconnu".to_string());

        let rate = config.output_sample_rate;
        let supported = device
            .supported_output_configs()
            .map_err(|e| AudioError::ConfigError(format!("Impossible d'obtenir configs supportées: {}", e)))?
            .find(|range| range.min_sample_rate() <= rate && rate <= range.max_sample_rate())
            .ok_or_else(|| {
                AudioError::DeviceUnavailable(format!("{} ne joue pas à {} Hz", device_name, rate))
            })?
            .with_sample_rate(rate);

        let sample_format = supported.sample_format();
        let stream_config: StreamConfig = supported.into();
        let device_channels = stream_config.channels as usize;

        let rendered = Arc::new(AtomicU64::new(0));
        let (commands, pending) = HeapRb::<RenderCommand>::new(COMMAND_CAPACITY).split();
        let queue = RenderQueue::new(events.clone());

        let stream = match sample_format {
            SampleFormat::F32 => {
                Self::build_stream::<f32>(&device, &stream_config, device_channels, &rendered, pending, queue, events)?
            }
            SampleFormat::I16 => {
                Self::build_stream::<i16>(&device, &stream_config, device_channels, &rendered, pending, queue, events)?
            }
            SampleFormat::U16 => {
                Self::build_stream::<u16>(&device, &stream_config, device_channels, &rendered, pending, queue, events)?
            }
            format => {
                return Err(AudioError::ConfigError(format!("Format d'échantillon non supporté : {:?}", format)));
            }
        };
        stream.play()?;

        info!(device = %device_name, rate, channels = device_channels, "sortie audio ouverte");

        Ok(Self {
            stream: Some(stream),
            sample_rate: rate,
            rendered,
            commands,
            backlog: VecDeque::new(),
            device_name,
        })
    }

    fn build_stream<T>(
        device: &Device,
        config: &StreamConfig,
        device_channels: usize,
        rendered: &Arc<AtomicU64>,
        mut pending: HeapCons<RenderCommand>,
        mut queue: RenderQueue,
        events: mpsc::UnboundedSender<OutputEvent>,
    ) -> AudioResult<Stream>
    where
        T: SizedSample + FromSample<f32> + Send + 'static,
    {
        let rendered = Arc::clone(rendered);
        let mut mono = Vec::new();

        let stream = device.build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                while let Some(command) = pending.try_pop() {
                    queue.apply(command);
                }

                let frames = data.len() / device_channels;
                let base = rendered.load(Ordering::Acquire);

                mono.clear();
                mono.resize(frames, 0.0);
                queue.render_into(&mut mono, base);

                for (frame, &sample) in data.chunks_mut(device_channels).zip(mono.iter()) {
                    frame.fill(T::from_sample(sample));
                }
                rendered.store(base + frames as u64, Ordering::Release);
            },
            move |err| report_stream_error(&err, &events),
            None,
        )?;
        Ok(stream)
    }

    /// Transmet une commande au callback, sans jamais bloquer
    fn send(&mut self, command: RenderCommand) {
        while let Some(waiting) = self.backlog.pop_front() {
            if let Err(waiting) = self.commands.try_push(waiting) {
                self.backlog.push_front(waiting);
                break;
            }
        }
        if !self.backlog.is_empty() {
            self.backlog.push_back(command);
            return;
        }
        if let Err(command) = self.commands.try_push(command) {
            warn!(backlog = self.backlog.len() + 1, "ring de commandes plein");
            self.backlog.push_back(command);
        }
    }
}

impl AudioSink for CpalOutput {
    fn current_time(&self) -> Duration {
        let frames = self.rendered.load(Ordering::Acquire);
        Duration::from_nanos((frames as u128 * 1_000_000_000 / self.sample_rate as u128) as u64)
    }

    fn start_unit(&mut self, unit: PlaybackUnit) -> AudioResult<()> {
        if self.stream.is_none() {
            return Err(AudioError::Closed);
        }
        if unit.frame.sample_rate() != self.sample_rate {
            return Err(AudioError::UnsupportedRate {
                rate: unit.frame.sample_rate(),
                expected: self.sample_rate,
            });
        }

        // Mono côté rendu : premier canal de chaque frame
        let channels = unit.frame.channels() as usize;
        let samples: Vec<Sample> = frame_to_f32(&unit.frame).into_iter().step_by(channels).collect();

        self.send(RenderCommand::Start(RenderUnit {
            id: unit.id,
            start_frame: frames_at(unit.start, self.sample_rate),
            samples,
        }));
        Ok(())
    }

    fn stop_unit(&mut self, id: UnitId) {
        if self.stream.is_some() {
            self.send(RenderCommand::Stop(id));
        }
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            self.send(RenderCommand::Clear);
            if let Err(e) = stream.pause() {
                debug!(error = %e, "pause de la sortie impossible");
            }
        }
        self.backlog.clear();
    }

    fn device_info(&self) -> String {
        self.device_name.clone()
    }
}

impl Drop for CpalOutput {
    fn drop(&mut self) {
        self.close();
    }
}
