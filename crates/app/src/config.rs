// Configuration de l'application
//
// Fichier TOML optionnel, tous les champs facultatifs :
//
//   [audio]
//   capture_block_size = 2048
//
//   [network]
//   voice_name = "Puck"
//   handshake_timeout_ms = 5000
//
//   [records]
//   data_dir = "./data"
//
// La clé d'API vient de l'environnement (ou d'un fichier .env) :
// VOICE_API_KEY.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use audio::AudioConfig;
use serde::Deserialize;
use session::SessionConfig;

pub const API_KEY_VAR: &str = "VOICE_API_KEY";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub audio: AudioConfig,
    pub network: NetworkSection,
    pub session: SessionSection,
    pub records: RecordsSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct NetworkSection {
    pub endpoint: Option<String>,
    pub model: Option<String>,
    pub voice_name: Option<String>,
    pub system_instruction: Option<String>,
    pub connect_timeout_ms: Option<u64>,
    pub handshake_timeout_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SessionSection {
    pub shutdown_timeout_ms: Option<u64>,
    pub event_queue_depth: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RecordsSection {
    pub data_dir: PathBuf,
}

impl Default for RecordsSection {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
        }
    }
}

impl FileConfig {
    /// Lit le fichier s'il est donné, sinon les valeurs par défaut
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Lecture impossible: {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("Configuration invalide: {}", path.display()))
    }

    /// Configuration de session complète, clé d'API incluse
    pub fn session_config(&self, api_key: String) -> SessionConfig {
        let mut config = SessionConfig {
            audio: self.audio.clone(),
            ..SessionConfig::default()
        };

        let network = &mut config.network;
        network.api_key = api_key;
        if let Some(endpoint) = &self.network.endpoint {
            network.endpoint = endpoint.clone();
        }
        if let Some(model) = &self.network.model {
            network.model = model.clone();
        }
        if let Some(voice) = &self.network.voice_name {
            network.voice_name = voice.clone();
        }
        if let Some(instruction) = &self.network.system_instruction {
            network.system_instruction = Some(instruction.clone());
        }
        if let Some(ms) = self.network.connect_timeout_ms {
            network.connect_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = self.network.handshake_timeout_ms {
            network.handshake_timeout = Duration::from_millis(ms);
        }

        if let Some(ms) = self.session.shutdown_timeout_ms {
            config.shutdown_timeout = Duration::from_millis(ms);
        }
        if let Some(depth) = self.session.event_queue_depth {
            config.event_queue_depth = depth;
        }
        config
    }
}

/// Clé d'API depuis l'environnement, après chargement du .env éventuel
pub fn api_key() -> Option<String> {
    if let Err(e) = dotenvy::dotenv() {
        tracing::debug!(error = %e, "Pas de fichier .env");
    }
    std::env::var(API_KEY_VAR).ok().filter(|key| !key.trim().is_empty())
}
