//! Conversion PCM entre échantillons flottants et entiers 16 bits
//!
//! Côté capture, les périphériques fournissent des f32 dans [-1.0, 1.0].
//! Sur le fil, le service distant attend du PCM 16 bits little-endian.
//!
//! Règles de conversion :
//! - f32 → i16 : écrêtage dans [-1.0, 1.0], multiplication par 32768, troncature,
//!   puis saturation à 32767 (1.0 * 32768 ne tient pas dans un i16)
//! - i16 → f32 : division par 32768.0

use crate::{AudioFrame, Sample};

/// Facteur d'échelle entre les deux représentations
pub const PCM_SCALE: f32 = 32768.0;

/// Convertit un échantillon flottant en entier 16 bits
///
/// Les valeurs hors plage sont écrêtées, jamais repliées :
/// `1.5 → 1.0 → 32767`, `-2.0 → -1.0 → -32768`.
pub fn sample_to_i16(sample: Sample) -> i16 {
    // NaN devient du silence
    if sample.is_nan() {
        return 0;
    }
    let scaled = (sample.clamp(-1.0, 1.0) * PCM_SCALE).trunc();
    scaled.clamp(i16::MIN as f32, i16::MAX as f32) as i16
}

/// Convertit un échantillon 16 bits en flottant
pub fn sample_to_f32(sample: i16) -> Sample {
    sample as f32 / PCM_SCALE
}

/// Construit une AudioFrame depuis un bloc capturé
pub fn frame_from_f32(samples: &[Sample], sample_rate: u32, channels: u16) -> AudioFrame {
    let pcm = samples.iter().map(|&s| sample_to_i16(s)).collect();
    AudioFrame::new(pcm, sample_rate, channels)
}

/// Reconvertit une frame en flottants pour le périphérique de sortie
pub fn frame_to_f32(frame: &AudioFrame) -> Vec<Sample> {
    frame.samples().iter().map(|&s| sample_to_f32(s)).collect()
}

/// Sérialise des échantillons en bytes little-endian
pub fn to_le_bytes(samples: &[i16]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for sample in samples {
        bytes.extend_from_slice(&sample.to_le_bytes());
    }
    bytes
}

/// Désérialise des bytes little-endian (longueur paire attendue)
pub fn from_le_bytes(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}
