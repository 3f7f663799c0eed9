//! Périphériques simulés
//!
//! Implémentations des traits audio sans matériel, pour les tests et le
//! mode démo : un microphone qui rejoue des blocs scriptés et une sortie
//! dont l'horloge avance à la main.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::{
    AudioCapture, AudioConfig, AudioError, AudioResult, AudioSink, DeviceProvider, OutputEvent,
    PlaybackUnit, Sample, UnitId,
};

/// Génère un bloc sinusoïdal (utile pour la démo)
pub fn sine_block(len: usize, sample_rate: u32, frequency: f32, amplitude: f32) -> Vec<Sample> {
    (0..len)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            amplitude * (2.0 * std::f32::consts::PI * frequency * t).sin()
        })
        .collect()
}

/// Observateur partagé de l'état du micro simulé
#[derive(Clone, Debug, Default)]
pub struct CaptureProbe {
    recording: Arc<AtomicBool>,
    opened: Arc<AtomicUsize>,
    delivered: Arc<AtomicUsize>,
}

impl CaptureProbe {
    pub fn is_recording(&self) -> bool {
        self.recording.load(Ordering::SeqCst)
    }

    /// Nombre d'acquisitions du micro
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// Nombre de blocs rendus à l'appelant
    pub fn delivered(&self) -> usize {
        self.delivered.load(Ordering::SeqCst)
    }
}

/// Microphone simulé qui rejoue une liste de blocs
///
/// Une fois le script épuisé, `next_block` suspend indéfiniment (comme un
/// micro silencieux qui n'envoie plus rien), ou retourne
/// `DeviceDisconnected` si `disconnect_when_done` est activé.
pub struct SimulatedCapture {
    blocks: VecDeque<Vec<Sample>>,
    interval: Option<Duration>,
    disconnect_when_done: bool,
    probe: CaptureProbe,
}

impl SimulatedCapture {
    pub fn new(blocks: Vec<Vec<Sample>>) -> Self {
        Self {
            blocks: blocks.into(),
            interval: None,
            disconnect_when_done: false,
            probe: CaptureProbe::default(),
        }
    }

    /// Attend `interval` avant chaque bloc (cadence temps réel)
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }

    pub fn disconnect_when_done(mut self) -> Self {
        self.disconnect_when_done = true;
        self
    }

    pub fn probe(&self) -> CaptureProbe {
        self.probe.clone()
    }
}

#[async_trait]
impl AudioCapture for SimulatedCapture {
    async fn start(&mut self) -> AudioResult<()> {
        self.probe.recording.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&mut self) -> AudioResult<()> {
        self.probe.recording.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn next_block(&mut self) -> AudioResult<Vec<Sample>> {
        if !self.is_recording() {
            return Err(AudioError::Closed);
        }
        if let Some(interval) = self.interval {
            tokio::time::sleep(interval).await;
        }
        match self.blocks.pop_front() {
            Some(block) => {
                self.probe.delivered.fetch_add(1, Ordering::SeqCst);
                Ok(block)
            }
            None if self.disconnect_when_done => Err(AudioError::DeviceDisconnected),
            None => std::future::pending().await,
        }
    }

    fn is_recording(&self) -> bool {
        self.probe.is_recording()
    }

    fn device_info(&self) -> String {
        "Microphone simulé".to_string()
    }
}

#[derive(Default)]
struct OutputState {
    now: Duration,
    events: Option<mpsc::UnboundedSender<OutputEvent>>,
    /// Unités programmées : id → (début, fin)
    pending: BTreeMap<UnitId, (Duration, Duration)>,
    started: Vec<(UnitId, Duration)>,
    stopped: Vec<UnitId>,
    completed: Vec<UnitId>,
    closed: bool,
}

/// Sortie audio simulée
///
/// Rien n'est joué : l'horloge n'avance que via `OutputControl::advance`,
/// qui notifie la fin des unités dont la fin est atteinte.
pub struct SimulatedOutput {
    state: Arc<Mutex<OutputState>>,
}

/// Poignée de pilotage d'une sortie simulée
#[derive(Clone, Default)]
pub struct OutputControl {
    state: Arc<Mutex<OutputState>>,
}

impl SimulatedOutput {
    pub fn new(events: mpsc::UnboundedSender<OutputEvent>) -> (Self, OutputControl) {
        let control = OutputControl::default();
        control.state.lock().events = Some(events);
        (
            Self {
                state: Arc::clone(&control.state),
            },
            control,
        )
    }
}

impl AudioSink for SimulatedOutput {
    fn current_time(&self) -> Duration {
        self.state.lock().now
    }

    fn start_unit(&mut self, unit: PlaybackUnit) -> AudioResult<()> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(AudioError::Closed);
        }
        state.pending.insert(unit.id, (unit.start, unit.end()));
        state.started.push((unit.id, unit.start));
        Ok(())
    }

    fn stop_unit(&mut self, id: UnitId) {
        let mut state = self.state.lock();
        if state.pending.remove(&id).is_some() {
            state.stopped.push(id);
        }
    }

    fn close(&mut self) {
        let mut state = self.state.lock();
        state.closed = true;
        state.pending.clear();
        state.events = None;
    }

    fn device_info(&self) -> String {
        "Sortie simulée".to_string()
    }
}

impl OutputControl {
    /// Avance l'horloge et notifie les unités terminées, dans l'ordre de fin
    pub fn advance(&self, elapsed: Duration) {
        let mut state = self.state.lock();
        state.now += elapsed;
        let now = state.now;

        let mut finished: Vec<(Duration, UnitId)> = state
            .pending
            .iter()
            .filter(|(_, (_, end))| *end <= now)
            .map(|(id, (_, end))| (*end, *id))
            .collect();
        finished.sort();

        for (_, id) in finished {
            state.pending.remove(&id);
            state.completed.push(id);
            if let Some(tx) = &state.events {
                let _ = tx.send(OutputEvent::Finished(id));
            }
        }
    }

    /// Simule un haut-parleur débranché : plus rien ne joue
    pub fn lose_device(&self) {
        let mut state = self.state.lock();
        state.pending.clear();
        if let Some(tx) = &state.events {
            let _ = tx.send(OutputEvent::DeviceLost("sortie simulée débranchée".to_string()));
        }
    }

    pub fn now(&self) -> Duration {
        self.state.lock().now
    }

    /// (id, début) de chaque unité programmée, dans l'ordre d'appel
    pub fn started(&self) -> Vec<(UnitId, Duration)> {
        self.state.lock().started.clone()
    }

    pub fn stopped(&self) -> Vec<UnitId> {
        self.state.lock().stopped.clone()
    }

    pub fn completed(&self) -> Vec<UnitId> {
        self.state.lock().completed.clone()
    }

    /// Intervalles (début, fin) des unités ni terminées ni arrêtées, triés
    pub fn live_units(&self) -> Vec<(Duration, Duration)> {
        let mut live: Vec<_> = self.state.lock().pending.values().copied().collect();
        live.sort();
        live
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}

/// Fabrique de périphériques simulés
///
/// Le script du micro est rejoué à chaque ouverture ; la sortie partage
/// toujours la même `OutputControl`, disponible avant même l'ouverture.
pub struct SimulatedDevices {
    blocks: Vec<Vec<Sample>>,
    interval: Option<Duration>,
    disconnect_when_done: bool,
    fail_capture: bool,
    probe: CaptureProbe,
    output: OutputControl,
}

impl SimulatedDevices {
    pub fn new(blocks: Vec<Vec<Sample>>) -> Self {
        Self {
            blocks,
            interval: None,
            disconnect_when_done: false,
            fail_capture: false,
            probe: CaptureProbe::default(),
            output: OutputControl::default(),
        }
    }

    /// Micro qui ne produit rien
    pub fn silent() -> Self {
        Self::new(Vec::new())
    }

    /// Le micro refuse l'acquisition
    pub fn without_microphone() -> Self {
        Self {
            fail_capture: true,
            ..Self::silent()
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }

    pub fn disconnect_when_done(mut self) -> Self {
        self.disconnect_when_done = true;
        self
    }

    pub fn capture_probe(&self) -> CaptureProbe {
        self.probe.clone()
    }

    pub fn output(&self) -> OutputControl {
        self.output.clone()
    }
}

impl DeviceProvider for SimulatedDevices {
    fn open_capture(&self, _config: &AudioConfig) -> AudioResult<Box<dyn AudioCapture>> {
        if self.fail_capture {
            return Err(AudioError::DeviceUnavailable("microphone simulé refusé".to_string()));
        }
        self.probe.opened.fetch_add(1, Ordering::SeqCst);

        let mut capture = SimulatedCapture::new(self.blocks.clone());
        capture.interval = self.interval;
        capture.disconnect_when_done = self.disconnect_when_done;
        capture.probe = self.probe.clone();
        Ok(Box::new(capture))
    }

    fn open_output(
        &self,
        _config: &AudioConfig,
        events: mpsc::UnboundedSender<OutputEvent>,
    ) -> AudioResult<Box<dyn AudioSink>> {
        {
            let mut state = self.output.state.lock();
            state.closed = false;
            state.events = Some(events);
        }
        Ok(Box::new(SimulatedOutput {
            state: Arc::clone(&self.output.state),
        }))
    }
}
