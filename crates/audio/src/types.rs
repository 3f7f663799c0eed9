//! Types de données pour le système audio
//!
//! Ce module définit les structures qui circulent entre les étages :
//! - AudioFrame : échantillons PCM 16 bits, immuables une fois produits
//! - EnvelopePayload : bytes opaques + tag MIME, tel que transmis au réseau
//! - PlaybackUnit : frame décodée avec son instant de départ sur la timeline de sortie
//! - OutputEvent : ce que la sortie audio signale à son propriétaire

use std::fmt;
use std::time::Duration;

/// Type pour un échantillon capturé (flottant dans [-1.0, 1.0])
pub type Sample = f32;

/// Frame d'audio PCM 16 bits
///
/// Les champs sont privés : une frame ne change plus après sa création,
/// elle passe simplement de main en main (capture → codec → scheduler).
///
/// Pour du stéréo, les échantillons sont entrelacés [L, R, L, R, ...]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AudioFrame {
    samples: Vec<i16>,
    sample_rate: u32,
    channels: u16,
}

impl AudioFrame {
    /// Crée une nouvelle frame
    ///
    /// # Example
    /// ```rust
    /// use audio::AudioFrame;
    ///
    /// let frame = AudioFrame::new(vec![0, 1200, -1200, 0], 16000, 1);
    /// assert_eq!(frame.frame_count(), 4);
    /// ```
    pub fn new(samples: Vec<i16>, sample_rate: u32, channels: u16) -> Self {
        Self {
            samples,
            sample_rate,
            channels: channels.max(1),
        }
    }

    /// Crée une frame de silence d'une durée donnée
    pub fn silence(duration: Duration, sample_rate: u32, channels: u16) -> Self {
        let frames = (duration.as_nanos() * sample_rate as u128 / 1_000_000_000) as usize;
        Self::new(vec![0; frames * channels.max(1) as usize], sample_rate, channels)
    }

    /// Les échantillons entrelacés
    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    /// Récupère les échantillons en consommant la frame
    pub fn into_samples(self) -> Vec<i16> {
        self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Nombre d'instants d'échantillonnage (échantillons / canaux)
    pub fn frame_count(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Durée de lecture de la frame
    ///
    /// Calcul entier en nanosecondes : 4800 frames à 24 kHz donnent
    /// exactement 200ms, sans erreur d'arrondi flottant.
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        let nanos = self.frame_count() as u128 * 1_000_000_000 / self.sample_rate as u128;
        Duration::from_nanos(nanos as u64)
    }
}

/// Enveloppe transmise sur le canal : payload opaque + tag d'encodage
///
/// Exemple de tag : "audio/pcm;rate=16000". Aucune autre métadonnée.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EnvelopePayload {
    pub data: Vec<u8>,
    pub mime_type: String,
}

impl EnvelopePayload {
    pub fn new(data: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            data,
            mime_type: mime_type.into(),
        }
    }
}

/// Identifiant d'une unité de lecture, attribué par compteur croissant
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UnitId(pub u64);

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Frame décodée, placée sur la timeline de sortie
///
/// `start` est une position sur l'horloge du périphérique de sortie,
/// pas une heure murale.
#[derive(Clone, Debug, PartialEq)]
pub struct PlaybackUnit {
    pub id: UnitId,
    pub frame: AudioFrame,
    pub start: Duration,
}

impl PlaybackUnit {
    /// Instant où l'unité a fini de jouer
    pub fn end(&self) -> Duration {
        self.start + self.frame.duration()
    }
}

/// Résumé d'un enqueue, retourné à l'appelant
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ScheduledUnit {
    pub id: UnitId,
    pub start: Duration,
    pub duration: Duration,
    /// Vrai si la lecture était silencieuse avant cette unité
    pub started_speaking: bool,
}

/// Notification de la sortie audio vers la session
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OutputEvent {
    /// L'unité a fini de jouer
    Finished(UnitId),
    /// Le périphérique de sortie ne rend plus rien (débranché, perdu)
    DeviceLost(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_frame_duration() {
        let frame = AudioFrame::new(vec![0; 4800], 24000, 1);
        assert_eq!(frame.duration(), Duration::from_millis(200));

        let stereo = AudioFrame::new(vec![0; 3200], 16000, 2);
        assert_eq!(stereo.frame_count(), 1600);
        assert_eq!(stereo.duration(), Duration::from_millis(100));
    }

    #[test]
    fn test_silence() {
        let frame = AudioFrame::silence(Duration::from_millis(20), 16000, 1);
        assert_eq!(frame.samples().len(), 320);
        assert!(frame.samples().iter().all(|&s| s == 0));
    }

    #[test]
    fn test_unit_end() {
        let unit = PlaybackUnit {
            id: UnitId(3),
            frame: AudioFrame::new(vec![0; 2400], 24000, 1),
            start: Duration::from_millis(50),
        };
        assert_eq!(unit.end(), Duration::from_millis(150));
        assert_eq!(unit.id.to_string(), "#3");
    }
}
