//! Ordonnancement de la voix reçue sur la timeline de sortie
//!
//! Les chunks audio arrivent du réseau par morceaux, avec du jitter. Les
//! jouer "maintenant" à leur arrivée produit des clics et des chevauchements.
//! Le scheduler maintient donc un curseur monotone `next_start_time` :
//!
//! ```text
//! start = max(next_start_time, now)
//! next_start_time = start + durée
//! ```
//!
//! - chunks plus rapides que le temps réel : lecture bout à bout, sans trou
//! - réseau lent : trou silencieux, jamais de chevauchement
//!
//! Sur interruption (barge-in), `flush()` arrête toutes les unités et
//! ramène le curseur à "maintenant".
//!
//! `enqueue` et `flush` prennent le même verrou pendant toute la durée de
//! leurs appels au sink : une unité ne peut pas être programmée avec un
//! curseur périmé après un flush.

use std::collections::BTreeSet;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::{AudioError, AudioFrame, AudioResult, AudioSink, PlaybackUnit, ScheduledUnit, UnitId};

/// Scheduler de lecture, propriétaire exclusif du sink de sortie
pub struct PlaybackScheduler {
    inner: Mutex<SchedulerInner>,
}

struct SchedulerInner {
    /// None une fois le périphérique libéré
    sink: Option<Box<dyn AudioSink>>,

    /// Premier instant où la prochaine unité peut commencer
    next_start_time: Duration,

    /// Unités programmées et pas encore terminées
    active: BTreeSet<UnitId>,

    next_id: u64,
}

impl PlaybackScheduler {
    pub fn new(sink: Box<dyn AudioSink>) -> Self {
        let now = sink.current_time();
        Self {
            inner: Mutex::new(SchedulerInner {
                sink: Some(sink),
                next_start_time: now,
                active: BTreeSet::new(),
                next_id: 0,
            }),
        }
    }

    /// Programme une frame juste après la précédente (ou maintenant si la timeline est en retard)
    ///
    /// Ne bloque pas l'appelant : le sink joue l'unité de lui-même.
    ///
    /// # Erreurs
    /// - `AudioError::Closed` : la sortie a déjà été libérée
    pub fn enqueue(&self, frame: AudioFrame) -> AudioResult<ScheduledUnit> {
        let mut inner = self.inner.lock();
        let SchedulerInner {
            sink,
            next_start_time,
            active,
            next_id,
        } = &mut *inner;
        let sink = sink.as_mut().ok_or(AudioError::Closed)?;

        let start = (*next_start_time).max(sink.current_time());
        let duration = frame.duration();
        let id = UnitId(*next_id);

        sink.start_unit(PlaybackUnit { id, frame, start })?;

        *next_id += 1;
        *next_start_time = start + duration;
        let started_speaking = active.is_empty();
        active.insert(id);

        debug!(
            unit_id = id.0,
            start_ms = start.as_millis() as u64,
            duration_ms = duration.as_millis() as u64,
            "unité programmée"
        );

        Ok(ScheduledUnit {
            id,
            start,
            duration,
            started_speaking,
        })
    }

    /// Arrête et oublie toutes les unités, puis ramène le curseur à maintenant
    ///
    /// Idempotent. Retourne le nombre d'unités arrêtées.
    pub fn flush(&self) -> usize {
        let mut inner = self.inner.lock();
        Self::flush_locked(&mut inner)
    }

    fn flush_locked(inner: &mut SchedulerInner) -> usize {
        let flushed = inner.active.len();
        if let Some(sink) = inner.sink.as_mut() {
            for id in &inner.active {
                sink.stop_unit(*id);
            }
            inner.next_start_time = sink.current_time();
        }
        inner.active.clear();

        if flushed > 0 {
            info!(flushed, "lecture vidée");
        }
        flushed
    }

    /// Enregistre la fin d'une unité
    ///
    /// Retourne true si la lecture vient de devenir silencieuse.
    /// Les ids inconnus (unités déjà vidées) sont ignorés.
    pub fn unit_finished(&self, id: UnitId) -> bool {
        let mut inner = self.inner.lock();
        inner.active.remove(&id) && inner.active.is_empty()
    }

    /// Vrai tant qu'au moins une unité est programmée
    pub fn is_playing(&self) -> bool {
        !self.inner.lock().active.is_empty()
    }

    pub fn active_count(&self) -> usize {
        self.inner.lock().active.len()
    }

    /// Valeur courante du curseur
    pub fn next_start_time(&self) -> Duration {
        self.inner.lock().next_start_time
    }

    /// Horloge du sink (zéro une fois libéré)
    pub fn now(&self) -> Duration {
        self.inner
            .lock()
            .sink
            .as_ref()
            .map(|sink| sink.current_time())
            .unwrap_or_default()
    }

    /// Vide la lecture et libère le périphérique de sortie
    ///
    /// Les appels suivants à `enqueue` échouent avec `AudioError::Closed`.
    pub fn release(&self) -> usize {
        let mut inner = self.inner.lock();
        let flushed = Self::flush_locked(&mut inner);
        if let Some(mut sink) = inner.sink.take() {
            sink.close();
            debug!("sortie audio libérée");
        }
        flushed
    }

    pub fn is_released(&self) -> bool {
        self.inner.lock().sink.is_none()
    }
}

impl Drop for PlaybackScheduler {
    fn drop(&mut self) {
        let inner = self.inner.get_mut();
        if let Some(mut sink) = inner.sink.take() {
            for id in &inner.active {
                sink.stop_unit(*id);
            }
            sink.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulated::SimulatedOutput;
    use crate::OutputEvent;
    use proptest::prelude::*;
    use std::sync::Arc;
    use tokio::sync::mpsc;

    fn chunk_ms(ms: u64) -> AudioFrame {
        AudioFrame::new(vec![0; (24 * ms) as usize], 24000, 1)
    }

    #[test]
    fn test_back_to_back_then_gap() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let (sink, control) = SimulatedOutput::new(tx);
        let scheduler = PlaybackScheduler::new(Box::new(sink));

        let a = scheduler.enqueue(chunk_ms(200)).unwrap();
        control.advance(Duration::from_millis(50));
        let b = scheduler.enqueue(chunk_ms(200)).unwrap();
        control.advance(Duration::from_millis(450));
        let c = scheduler.enqueue(chunk_ms(200)).unwrap();

        assert_eq!(a.start, Duration::ZERO);
        assert_eq!(b.start, Duration::from_millis(200));
        assert_eq!(c.start, Duration::from_millis(500));

        assert!(a.started_speaking);
        assert!(!b.started_speaking);
        assert_eq!(scheduler.next_start_time(), Duration::from_millis(700));
    }

    #[test]
    fn test_flush_resets_cursor() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let (sink, control) = SimulatedOutput::new(tx);
        let scheduler = PlaybackScheduler::new(Box::new(sink));

        let first = scheduler.enqueue(chunk_ms(200)).unwrap();
        let second = scheduler.enqueue(chunk_ms(200)).unwrap();
        control.advance(Duration::from_millis(10));

        assert_eq!(scheduler.flush(), 2);
        assert_eq!(scheduler.next_start_time(), Duration::from_millis(10));
        assert_eq!(control.stopped(), vec![first.id, second.id]);
        assert!(!scheduler.is_playing());

        control.advance(Duration::from_millis(1));
        let after = scheduler.enqueue(chunk_ms(200)).unwrap();
        assert_eq!(after.start, Duration::from_millis(11));
        assert!(after.started_speaking);
    }

    #[test]
    fn test_flush_is_idempotent() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let (sink, control) = SimulatedOutput::new(tx);
        let scheduler = PlaybackScheduler::new(Box::new(sink));

        scheduler.enqueue(chunk_ms(100)).unwrap();
        assert_eq!(scheduler.flush(), 1);
        assert_eq!(scheduler.flush(), 0);
        assert_eq!(control.stopped().len(), 1);
    }

    #[test]
    fn test_idle_after_last_completion() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (sink, control) = SimulatedOutput::new(tx);
        let scheduler = PlaybackScheduler::new(Box::new(sink));

        scheduler.enqueue(chunk_ms(100)).unwrap();
        scheduler.enqueue(chunk_ms(100)).unwrap();
        control.advance(Duration::from_millis(250));

        let finished = |event| match event {
            OutputEvent::Finished(id) => id,
            other => panic!("événement inattendu: {:?}", other),
        };
        let first = finished(rx.try_recv().unwrap());
        assert!(!scheduler.unit_finished(first));
        let second = finished(rx.try_recv().unwrap());
        assert!(scheduler.unit_finished(second));
        assert!(!scheduler.is_playing());

        // Complétion tardive d'une unité déjà vidée
        assert!(!scheduler.unit_finished(UnitId(99)));
    }

    #[test]
    fn test_release_closes_sink() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let (sink, control) = SimulatedOutput::new(tx);
        let scheduler = PlaybackScheduler::new(Box::new(sink));

        scheduler.enqueue(chunk_ms(100)).unwrap();
        assert_eq!(scheduler.release(), 1);
        assert!(control.is_closed());
        assert!(scheduler.is_released());
        assert!(matches!(scheduler.enqueue(chunk_ms(100)), Err(AudioError::Closed)));
        assert_eq!(scheduler.release(), 0);
    }

    #[test]
    fn test_concurrent_enqueue_and_flush() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let (sink, control) = SimulatedOutput::new(tx);
        let scheduler = Arc::new(PlaybackScheduler::new(Box::new(sink)));

        let mut workers = Vec::new();
        for _ in 0..4 {
            let scheduler = Arc::clone(&scheduler);
            workers.push(std::thread::spawn(move || {
                for _ in 0..50 {
                    scheduler.enqueue(chunk_ms(20)).unwrap();
                }
            }));
        }
        let flusher = {
            let scheduler = Arc::clone(&scheduler);
            let control = control.clone();
            std::thread::spawn(move || {
                for _ in 0..20 {
                    control.advance(Duration::from_millis(5));
                    scheduler.flush();
                }
            })
        };
        for worker in workers {
            worker.join().unwrap();
        }
        flusher.join().unwrap();

        // Les unités encore actives ne se chevauchent jamais
        let live = control.live_units();
        assert!(live.len() <= scheduler.active_count());
        for pair in live.windows(2) {
            assert!(pair[1].0 >= pair[0].1);
        }

        // Après un flush final, rien ne reste programmé avant le curseur
        scheduler.flush();
        assert!(control.live_units().is_empty());
        assert_eq!(scheduler.next_start_time(), control.now());
    }

    proptest! {
        /// start(i+1) == max(fin(i), arrivée(i+1)) : ni chevauchement, ni trou inutile
        #[test]
        fn prop_no_overlap_no_needless_gap(
            chunks in prop::collection::vec((0u64..300, 1u64..300), 1..40)
        ) {
            let (tx, _rx) = mpsc::unbounded_channel();
            let (sink, control) = SimulatedOutput::new(tx);
            let scheduler = PlaybackScheduler::new(Box::new(sink));

            let mut previous_end: Option<Duration> = None;
            for (wait_ms, len_ms) in chunks {
                control.advance(Duration::from_millis(wait_ms));
                let arrival = control.now();
                let unit = scheduler.enqueue(chunk_ms(len_ms)).unwrap();

                let expected = previous_end.map_or(arrival, |end| end.max(arrival));
                prop_assert_eq!(unit.start, expected);
                prop_assert_eq!(unit.duration, Duration::from_millis(len_ms));
                previous_end = Some(unit.start + unit.duration);
            }
        }
    }
}
