//! Codec d'enveloppe PCM
//!
//! Ce module implémente le trait AudioCodec pour le format attendu par le
//! service vocal distant : du PCM 16 bits little-endian brut, accompagné
//! d'un tag MIME qui nomme l'encodage et la fréquence.
//!
//! Il n'y a aucune compression : le codec est pur et sans état, on peut
//! donc le partager librement entre la capture et la réception.

use tracing::debug;

use crate::pcm::{from_le_bytes, to_le_bytes};
use crate::{AudioCodec, AudioConfig, AudioError, AudioFrame, AudioResult, EnvelopePayload};

const MIME_PREFIX: &str = "audio/pcm";

/// Construit le tag MIME pour une fréquence donnée
///
/// ```rust
/// assert_eq!(audio::codec::mime_type_for(16000), "audio/pcm;rate=16000");
/// ```
pub fn mime_type_for(sample_rate: u32) -> String {
    format!("{MIME_PREFIX};rate={sample_rate}")
}

/// Extrait la fréquence d'un tag MIME, si elle est présente
///
/// Accepte aussi la forme courte "pcm;rate=24000".
pub fn rate_from_mime(mime_type: &str) -> Option<u32> {
    mime_type
        .split(';')
        .skip(1)
        .filter_map(|param| param.trim().split_once('='))
        .find(|(key, _)| key.trim().eq_ignore_ascii_case("rate"))
        .and_then(|(_, value)| value.trim().parse().ok())
}

/// Codec PCM pour un sens du canal
///
/// `sample_rate` sert de valeur par défaut quand le tag reçu ne précise
/// pas la fréquence. `channels` détermine la taille d'une frame en bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PcmEnvelopeCodec {
    sample_rate: u32,
    channels: u16,
}

impl PcmEnvelopeCodec {
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels: channels.max(1),
        }
    }

    /// Codec pour l'audio envoyé (capture microphone)
    pub fn for_input(config: &AudioConfig) -> Self {
        Self::new(config.input_sample_rate, config.channels)
    }

    /// Codec pour la voix reçue
    pub fn for_output(config: &AudioConfig) -> Self {
        Self::new(config.output_sample_rate, config.channels)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }
}

impl AudioCodec for PcmEnvelopeCodec {
    fn encode(&self, frame: &AudioFrame) -> EnvelopePayload {
        EnvelopePayload::new(to_le_bytes(frame.samples()), mime_type_for(frame.sample_rate()))
    }

    fn decode(&self, payload: &EnvelopePayload) -> AudioResult<AudioFrame> {
        let frame_bytes = self.channels as usize * 2;
        if payload.data.len() % frame_bytes != 0 {
            return Err(AudioError::MalformedPayload {
                len: payload.data.len(),
                channels: self.channels,
            });
        }

        let rate = rate_from_mime(&payload.mime_type).unwrap_or(self.sample_rate);
        debug!(bytes = payload.data.len(), rate, "payload PCM décodé");

        Ok(AudioFrame::new(from_le_bytes(&payload.data), rate, self.channels))
    }

    fn codec_info(&self) -> String {
        format!("PCM 16 bits LE, {} Hz, {} canal(aux)", self.sample_rate, self.channels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pcm::frame_from_f32;
    use std::time::Duration;

    #[test]
    fn test_mime_parsing() {
        assert_eq!(rate_from_mime("audio/pcm;rate=16000"), Some(16000));
        assert_eq!(rate_from_mime("pcm; rate=24000"), Some(24000));
        assert_eq!(rate_from_mime("audio/pcm"), None);
        assert_eq!(rate_from_mime("audio/pcm;rate=abc"), None);
    }

    #[test]
    fn test_encode_tags_with_frame_rate() {
        let codec = PcmEnvelopeCodec::for_input(&AudioConfig::default());
        let frame = frame_from_f32(&[0.0, 0.25, -1.0], 16000, 1);

        let payload = codec.encode(&frame);
        assert_eq!(payload.mime_type, "audio/pcm;rate=16000");
        assert_eq!(payload.data.len(), 6);
        assert_eq!(codec.decode(&payload).unwrap(), frame);
    }

    #[test]
    fn test_decode_uses_tag_rate_then_default() {
        let codec = PcmEnvelopeCodec::for_output(&AudioConfig::default());

        let tagged = EnvelopePayload::new(vec![0; 960], "audio/pcm;rate=48000");
        let frame = codec.decode(&tagged).unwrap();
        assert_eq!(frame.sample_rate(), 48000);
        assert_eq!(frame.duration(), Duration::from_millis(10));

        let untagged = EnvelopePayload::new(vec![0; 960], "audio/pcm");
        assert_eq!(codec.decode(&untagged).unwrap().sample_rate(), 24000);
    }

    #[test]
    fn test_decode_rejects_partial_frames() {
        let mono = PcmEnvelopeCodec::new(24000, 1);
        let err = mono.decode(&EnvelopePayload::new(vec![0; 3], "audio/pcm")).unwrap_err();
        assert!(matches!(err, AudioError::MalformedPayload { len: 3, channels: 1 }));

        // 6 bytes = 3 échantillons, pas un nombre entier de frames stéréo
        let stereo = PcmEnvelopeCodec::new(24000, 2);
        assert!(stereo.decode(&EnvelopePayload::new(vec![0; 6], "audio/pcm")).is_err());
        assert!(stereo.decode(&EnvelopePayload::new(vec![0; 8], "audio/pcm")).is_ok());
    }

    #[test]
    fn test_empty_payload_is_empty_frame() {
        let codec = PcmEnvelopeCodec::new(24000, 1);
        let frame = codec.decode(&EnvelopePayload::new(Vec::new(), "audio/pcm")).unwrap();
        assert!(frame.is_empty());
        assert_eq!(frame.duration(), Duration::ZERO);
    }
}
