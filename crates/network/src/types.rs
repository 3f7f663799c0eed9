//! Types de données pour le canal vocal
//!
//! Ce module définit :
//! - NetworkConfig : configuration du service distant
//! - ClientMessage : messages JSON émis (négociation, audio)
//! - ServerEvent : événements extraits d'un message JSON reçu
//!
//! Format des messages reçus : un objet JSON qui peut porter n'importe quel
//! sous-ensemble des champs connus. Un message sans champ connu est ignoré
//! (compatibilité avec les évolutions du protocole).
//!
//! ```text
//! { "setupComplete": {} }
//! { "outputTranscriptionDelta": "Bonjour" }
//! { "audioChunk": "<base64 PCM>" }
//! { "interrupted": true }
//! { "turnComplete": true }
//! ```

use std::time::Duration;

use audio::EnvelopePayload;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::{NetworkError, NetworkResult};

/// Instruction système par défaut de l'assistant
pub const DEFAULT_SYSTEM_INSTRUCTION: &str = "You are MediInsight AI, a helpful medical assistant. \
You can hear and speak to the user. Keep responses concise and friendly. \
Remind users that you provide educational information, not medical advice.";

/// Configuration du canal vers le service vocal
#[derive(Clone, Debug, PartialEq)]
pub struct NetworkConfig {
    /// URL WebSocket du service (ws:// ou wss://)
    pub endpoint: String,

    /// Clé d'API, ajoutée à l'URL en paramètre `key`
    pub api_key: String,

    /// Modèle conversationnel demandé
    pub model: String,

    /// Voix de synthèse prédéfinie
    pub voice_name: String,

    /// Instruction système envoyée à la négociation
    pub system_instruction: Option<String>,

    /// Timeout d'ouverture du canal (défaut: 10s)
    pub connect_timeout: Duration,

    /// Timeout d'attente de `setupComplete` (défaut: 10s)
    pub handshake_timeout: Duration,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            endpoint: "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent".to_string(),
            api_key: String::new(),
            model: "models/gemini-2.5-flash-native-audio-preview-12-2025".to_string(),
            voice_name: "Kore".to_string(),
            system_instruction: Some(DEFAULT_SYSTEM_INSTRUCTION.to_string()),
            connect_timeout: Duration::from_secs(10),
            handshake_timeout: Duration::from_secs(10),
        }
    }
}

impl NetworkConfig {
    /// Configuration pour tests (timeouts courts, endpoint local)
    pub fn test_config() -> Self {
        Self {
            endpoint: "ws://127.0.0.1:9/voice".to_string(),
            api_key: "test-key".to_string(),
            connect_timeout: Duration::from_millis(200),
            handshake_timeout: Duration::from_millis(200),
            ..Default::default()
        }
    }

    /// URL effective, clé d'API comprise
    ///
    /// Ne pas logger : elle contient la clé.
    pub fn connection_url(&self) -> String {
        if self.api_key.is_empty() {
            return self.endpoint.clone();
        }
        let separator = if self.endpoint.contains('?') { '&' } else { '?' };
        format!("{}{}key={}", self.endpoint, separator, self.api_key)
    }

    /// Valide que la configuration est cohérente
    pub fn validate(&self) -> Result<(), String> {
        if !(self.endpoint.starts_with("ws://") || self.endpoint.starts_with("wss://")) {
            return Err(format!("Endpoint invalide: {} (ws:// ou wss:// attendu)", self.endpoint));
        }
        if self.model.trim().is_empty() {
            return Err("Le modèle ne peut pas être vide".to_string());
        }
        if self.voice_name.trim().is_empty() {
            return Err("La voix ne peut pas être vide".to_string());
        }
        if self.connect_timeout.is_zero() || self.handshake_timeout.is_zero() {
            return Err("Les timeouts doivent être strictement positifs".to_string());
        }
        Ok(())
    }
}

/// Message émis vers le service distant
///
/// Sérialisé en objet à une seule clé : `{"setup": {...}}` ou `{"media": {...}}`.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ClientMessage {
    Setup(SetupPayload),
    Media(MediaBlob),
}

impl ClientMessage {
    /// Message de négociation construit depuis la configuration
    pub fn setup(config: &NetworkConfig) -> Self {
        ClientMessage::Setup(SetupPayload {
            model: config.model.clone(),
            response_modalities: vec!["AUDIO".to_string()],
            output_audio_transcription: EmptyObject {},
            speech_config: SpeechConfig {
                voice_config: VoiceConfig {
                    prebuilt_voice_config: PrebuiltVoiceConfig {
                        voice_name: config.voice_name.clone(),
                    },
                },
            },
            system_instruction: config.system_instruction.clone(),
        })
    }

    /// Message audio depuis une enveloppe PCM
    pub fn media(payload: &EnvelopePayload) -> Self {
        ClientMessage::Media(MediaBlob {
            data: STANDARD.encode(&payload.data),
            mime_type: payload.mime_type.clone(),
        })
    }

    /// Nom court pour les logs
    pub fn kind(&self) -> &'static str {
        match self {
            ClientMessage::Setup(_) => "setup",
            ClientMessage::Media(_) => "media",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetupPayload {
    pub model: String,
    pub response_modalities: Vec<String>,
    pub output_audio_transcription: EmptyObject,
    pub speech_config: SpeechConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<String>,
}

/// Sérialisé en `{}`
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct EmptyObject {}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechConfig {
    pub voice_config: VoiceConfig,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceConfig {
    pub prebuilt_voice_config: PrebuiltVoiceConfig,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrebuiltVoiceConfig {
    pub voice_name: String,
}

/// Audio sortant : PCM en base64 + tag MIME
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaBlob {
    pub data: String,
    pub mime_type: String,
}

/// Événement extrait d'un message reçu
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ServerEvent {
    /// Le service est prêt (fin de la négociation)
    SetupComplete,
    /// Fragment de transcription de la voix synthétisée
    Transcription(String),
    /// Chunk audio PCM décodé du base64
    Audio(Vec<u8>),
    /// Chunk audio illisible : à ignorer, la session continue
    MalformedAudio(String),
    /// L'utilisateur a coupé la parole à l'assistant
    Interrupted,
    /// Le service a fini sa réponse
    TurnComplete,
}

/// Analyse un message JSON reçu
///
/// Les événements sont rendus dans l'ordre d'application :
/// setupComplete, transcription, audio, interruption, fin de tour.
///
/// # Erreurs
/// - `NetworkError::ProtocolError` : JSON invalide, ou champ connu du mauvais type
pub fn parse_server_message(text: &str) -> NetworkResult<Vec<ServerEvent>> {
    let value: Value = serde_json::from_str(text)
        .map_err(|e| NetworkError::ProtocolError(format!("JSON invalide: {}", e)))?;

    let Value::Object(fields) = value else {
        return Ok(Vec::new());
    };

    let mut events = Vec::new();

    if present(&fields, "setupComplete").is_some() {
        events.push(ServerEvent::SetupComplete);
    }

    if let Some(delta) = present(&fields, "outputTranscriptionDelta") {
        let text = delta.as_str().ok_or_else(|| wrong_type("outputTranscriptionDelta", "texte"))?;
        events.push(ServerEvent::Transcription(text.to_string()));
    }

    if let Some(chunk) = present(&fields, "audioChunk") {
        let encoded = chunk.as_str().ok_or_else(|| wrong_type("audioChunk", "texte base64"))?;
        match STANDARD.decode(encoded) {
            Ok(bytes) => events.push(ServerEvent::Audio(bytes)),
            Err(e) => events.push(ServerEvent::MalformedAudio(format!("base64 invalide: {}", e))),
        }
    }

    if let Some(flag) = present(&fields, "interrupted") {
        if flag.as_bool().ok_or_else(|| wrong_type("interrupted", "booléen"))? {
            events.push(ServerEvent::Interrupted);
        }
    }

    if let Some(flag) = present(&fields, "turnComplete") {
        if flag.as_bool().ok_or_else(|| wrong_type("turnComplete", "booléen"))? {
            events.push(ServerEvent::TurnComplete);
        }
    }

    Ok(events)
}

/// Un champ à `null` est traité comme absent
fn present<'a>(fields: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    fields.get(key).filter(|value| !value.is_null())
}

fn wrong_type(field: &str, expected: &str) -> NetworkError {
    NetworkError::ProtocolError(format!("champ {} : {} attendu", field, expected))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_setup_message_shape() {
        let config = NetworkConfig::default();
        let value = serde_json::to_value(ClientMessage::setup(&config)).unwrap();

        assert_eq!(value["setup"]["model"], json!(config.model));
        assert_eq!(value["setup"]["responseModalities"], json!(["AUDIO"]));
        assert_eq!(value["setup"]["outputAudioTranscription"], json!({}));
        assert_eq!(
            value["setup"]["speechConfig"]["voiceConfig"]["prebuiltVoiceConfig"]["voiceName"],
            json!("Kore")
        );
        assert!(value["setup"]["systemInstruction"].as_str().unwrap().contains("not medical advice"));
    }

    #[test]
    fn test_media_message_shape() {
        let payload = EnvelopePayload::new(vec![1, 0, 255, 255], "audio/pcm;rate=16000");
        let value = serde_json::to_value(ClientMessage::media(&payload)).unwrap();
        assert_eq!(value, json!({ "media": { "data": "AQD//w==", "mimeType": "audio/pcm;rate=16000" } }));
    }

    #[test]
    fn test_parse_all_fields_in_dispatch_order() {
        let text = r#"{"turnComplete":true,"interrupted":true,"audioChunk":"AQD//w==","outputTranscriptionDelta":"Salut"}"#;
        let events = parse_server_message(text).unwrap();
        assert_eq!(
            events,
            vec![
                ServerEvent::Transcription("Salut".to_string()),
                ServerEvent::Audio(vec![1, 0, 255, 255]),
                ServerEvent::Interrupted,
                ServerEvent::TurnComplete,
            ]
        );
    }

    #[test]
    fn test_unknown_shapes_are_noops() {
        assert!(parse_server_message(r#"{"usageMetadata":{"tokens":3}}"#).unwrap().is_empty());
        assert!(parse_server_message("[1,2,3]").unwrap().is_empty());
        assert!(parse_server_message(r#"{"interrupted":false,"audioChunk":null}"#).unwrap().is_empty());
    }

    #[test]
    fn test_protocol_errors() {
        assert!(matches!(parse_server_message("{not json"), Err(NetworkError::ProtocolError(_))));
        assert!(matches!(
            parse_server_message(r#"{"audioChunk":42}"#),
            Err(NetworkError::ProtocolError(_))
        ));
        assert!(matches!(
            parse_server_message(r#"{"turnComplete":"yes"}"#),
            Err(NetworkError::ProtocolError(_))
        ));
    }

    #[test]
    fn test_bad_base64_is_chunk_local() {
        let events = parse_server_message(r#"{"audioChunk":"@@@","turnComplete":true}"#).unwrap();
        assert!(matches!(events[0], ServerEvent::MalformedAudio(_)));
        assert_eq!(events[1], ServerEvent::TurnComplete);
    }

    #[test]
    fn test_connection_url() {
        let mut config = NetworkConfig::test_config();
        assert_eq!(config.connection_url(), "ws://127.0.0.1:9/voice?key=test-key");

        config.endpoint = "ws://host/voice?v=1".to_string();
        assert_eq!(config.connection_url(), "ws://host/voice?v=1&key=test-key");

        config.api_key.clear();
        assert_eq!(config.connection_url(), "ws://host/voice?v=1");
    }

    #[test]
    fn test_config_validation() {
        assert!(NetworkConfig::default().validate().is_ok());
        assert!(NetworkConfig::test_config().validate().is_ok());

        let mut config = NetworkConfig::default();
        config.endpoint = "https://example.org".to_string();
        assert!(config.validate().is_err());

        let mut config = NetworkConfig::default();
        config.handshake_timeout = Duration::ZERO;
        assert!(config.validate().is_err());
    }
}
