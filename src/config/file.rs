//! TOML configuration file loading
//!
//! Supports `~/.config/ecomvoice/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct ConfigFile {
    /// Chat relay the client talks to
    #[serde(default)]
    pub relay: RelayFileConfig,

    /// Content-extraction relay
    #[serde(default)]
    pub content: ContentFileConfig,

    /// Voice/audio configuration
    #[serde(default)]
    pub voice: VoiceFileConfig,

    /// API keys for speech services
    #[serde(default)]
    pub api_keys: ApiKeysFileConfig,

    /// Relay server configuration (upstream credentials live here)
    #[serde(default)]
    pub server: ServerFileConfig,

    /// Conversation session behavior
    #[serde(default)]
    pub session: SessionFileConfig,
}

#[derive(Debug, Default, Deserialize)]
pub struct RelayFileConfig {
    /// Base URL of the chat relay (e.g. "http://127.0.0.1:3000")
    pub url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ContentFileConfig {
    /// Base URL of the content-extraction relay (e.g. "https://r.jina.ai")
    pub url: Option<String>,
}

/// Voice processing configuration
#[derive(Debug, Default, Deserialize)]
pub struct VoiceFileConfig {
    /// TTS provider ("openai" or "elevenlabs")
    pub tts_provider: Option<String>,

    /// TTS model (e.g. "tts-1")
    pub tts_model: Option<String>,

    /// TTS voice identifier (e.g. "alloy")
    pub tts_voice: Option<String>,

    /// TTS speed multiplier
    pub tts_speed: Option<f64>,

    /// External player command for synthesized audio (e.g. "mpv")
    pub player: Option<String>,

    /// Capture backend ("typed", "microphone" or "none")
    pub capture: Option<String>,

    /// STT provider ("whisper" or "deepgram")
    pub stt_provider: Option<String>,

    /// STT model (e.g. "whisper-1")
    pub stt_model: Option<String>,

    /// Seconds of capture before giving up with no speech
    pub max_listen_secs: Option<u64>,
}

/// API keys configuration
#[derive(Debug, Default, Deserialize)]
pub struct ApiKeysFileConfig {
    pub openai: Option<String>,
    pub elevenlabs: Option<String>,
    pub deepgram: Option<String>,
}

/// Relay server configuration
#[derive(Debug, Default, Deserialize)]
pub struct ServerFileConfig {
    /// Relay server port
    pub port: Option<u16>,

    /// Upstream chat API base URL
    pub upstream_url: Option<String>,

    /// Upstream organization secret
    pub api_key: Option<String>,

    /// Upstream replica identifier
    pub replica_id: Option<String>,

    /// Upstream user identifier
    pub user_id: Option<String>,

    /// Upstream API version header value
    pub api_version: Option<String>,
}

/// Conversation session configuration
#[derive(Debug, Default, Deserialize)]
pub struct SessionFileConfig {
    /// Ask the chat service not to use its stored history
    pub skip_chat_history: Option<bool>,

    /// Read remote chat history when a session starts
    pub bootstrap_history: Option<bool>,

    /// Optional timeout for remote calls, in seconds
    pub request_timeout_secs: Option<u64>,
}

/// Load the TOML config file from the standard path
///
/// Returns `ConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> ConfigFile {
    let Some(path) = config_file_path() else {
        return ConfigFile::default();
    };

    load_config_file_from(&path)
}

/// Load a TOML config file from an explicit path
pub fn load_config_file_from(path: &Path) -> ConfigFile {
    if !path.exists() {
        return ConfigFile::default();
    }

    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                ConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            ConfigFile::default()
        }
    }
}

/// Return the config file path
///
/// `ECOMVOICE_CONFIG` wins; otherwise `~/.config/ecomvoice/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("ECOMVOICE_CONFIG") {
        return Some(PathBuf::from(path));
    }

    directories::BaseDirs::new().map(|d| d.config_dir().join("ecomvoice").join("config.toml"))
}
