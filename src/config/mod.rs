//! Configuration management for EcomVoice
//!
//! Values resolve env > TOML file > default.

pub mod file;

use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;

use crate::{Error, Result};
use file::ConfigFile;

/// Default chat relay (the `relay` subcommand listens here)
pub const DEFAULT_RELAY_URL: &str = "http://127.0.0.1:3000";

/// Default content-extraction relay
pub const DEFAULT_CONTENT_URL: &str = "https://r.jina.ai";

/// Default upstream chat API
pub const DEFAULT_UPSTREAM_URL: &str = "https://api.sensay.io";

/// Stock `ElevenLabs` voice used when none is configured
pub const DEFAULT_ELEVENLABS_VOICE: &str = "21m00Tcm4TlvDq8ikWAM";

/// Upstream API version header value
pub const DEFAULT_API_VERSION: &str = "2025-03-25";

/// EcomVoice configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the chat relay
    pub relay_url: String,

    /// Base URL of the content-extraction relay
    pub content_url: String,

    /// Conversation session behavior
    pub session: SessionConfig,

    /// Voice configuration
    pub voice: VoiceConfig,

    /// API keys for speech services
    pub api_keys: ApiKeys,

    /// Relay server configuration
    pub server: ServerConfig,
}

/// Conversation session behavior
#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    /// Sent as `skip_chat_history` on every chat request
    pub skip_chat_history: bool,

    /// Read remote chat history before loading a product
    pub bootstrap_history: bool,

    /// Timeout for remote calls; `None` means no timeout
    pub request_timeout: Option<Duration>,
}

/// TTS provider backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TtsProvider {
    #[default]
    OpenAi,
    ElevenLabs,
}

impl FromStr for TtsProvider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "elevenlabs" => Ok(Self::ElevenLabs),
            other => Err(Error::Config(format!("unknown TTS provider: {other}"))),
        }
    }
}

/// STT provider backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SttProvider {
    #[default]
    Whisper,
    Deepgram,
}

impl FromStr for SttProvider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "whisper" | "openai" => Ok(Self::Whisper),
            "deepgram" => Ok(Self::Deepgram),
            other => Err(Error::Config(format!("unknown STT provider: {other}"))),
        }
    }
}

/// Where user utterances come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaptureBackend {
    /// Typed at the terminal with `say ...`
    #[default]
    Typed,
    /// Microphone + remote transcription (`audio` feature)
    Microphone,
    /// No capture; the listening transition is disabled
    Disabled,
}

impl FromStr for CaptureBackend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "typed" | "terminal" => Ok(Self::Typed),
            "microphone" | "mic" => Ok(Self::Microphone),
            "none" | "disabled" => Ok(Self::Disabled),
            other => Err(Error::Config(format!("unknown capture backend: {other}"))),
        }
    }
}

/// Voice processing configuration
#[derive(Debug, Clone)]
pub struct VoiceConfig {
    pub tts_provider: TtsProvider,

    /// TTS model (e.g. "tts-1", "eleven_monolingual_v1")
    pub tts_model: String,

    /// TTS voice identifier
    pub tts_voice: String,

    /// TTS speed multiplier (0.25 to 4.0)
    pub tts_speed: f64,

    /// External player for synthesized audio; `None` picks the first one found on PATH
    pub player: Option<String>,

    pub capture: CaptureBackend,

    pub stt_provider: SttProvider,

    /// STT model (e.g. "whisper-1", "nova-2")
    pub stt_model: String,

    /// Give up on an utterance after this long with no speech
    pub max_listen: Duration,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            tts_provider: TtsProvider::OpenAi,
            tts_model: "tts-1".to_string(),
            tts_voice: "alloy".to_string(),
            tts_speed: 0.9,
            player: None,
            capture: CaptureBackend::Typed,
            stt_provider: SttProvider::Whisper,
            stt_model: "whisper-1".to_string(),
            max_listen: Duration::from_secs(8),
        }
    }
}

/// API keys for external speech services
#[derive(Debug, Clone, Default)]
pub struct ApiKeys {
    /// `OpenAI` API key (for Whisper and TTS)
    pub openai: Option<String>,

    /// `ElevenLabs` API key (optional TTS)
    pub elevenlabs: Option<String>,

    /// `Deepgram` API key (optional STT)
    pub deepgram: Option<String>,
}

/// Relay server configuration
///
/// Upstream credentials are only ever read by the relay; the conversation
/// side never sees them.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to listen on
    pub port: u16,

    /// Upstream chat API base URL
    pub upstream_url: String,

    /// Upstream organization secret
    pub api_key: Option<SecretString>,

    /// Upstream replica identifier
    pub replica_id: Option<String>,

    /// Upstream user identifier
    pub user_id: Option<String>,

    /// `X-API-Version` header value
    pub api_version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            upstream_url: DEFAULT_UPSTREAM_URL.to_string(),
            api_key: None,
            replica_id: None,
            user_id: None,
            api_version: DEFAULT_API_VERSION.to_string(),
        }
    }
}

impl Config {
    /// Load configuration from the config file and process environment
    ///
    /// # Errors
    ///
    /// Returns error if a configured value is invalid
    pub fn load() -> Result<Self> {
        let fc = file::load_config_file();
        Self::from_sources(fc, |key| std::env::var(key).ok())
    }

    /// Resolve configuration from a parsed file and an env lookup
    ///
    /// # Errors
    ///
    /// Returns error if a configured value is invalid
    pub fn from_sources<F>(fc: ConfigFile, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        let relay_url = env("ECOMVOICE_RELAY_URL")
            .or(fc.relay.url)
            .unwrap_or_else(|| DEFAULT_RELAY_URL.to_string());
        let content_url = env("ECOMVOICE_CONTENT_URL")
            .or(fc.content.url)
            .unwrap_or_else(|| DEFAULT_CONTENT_URL.to_string());

        let defaults = VoiceConfig::default();
        let tts_provider = env("ECOMVOICE_TTS_PROVIDER")
            .or(fc.voice.tts_provider)
            .map(|s| s.parse::<TtsProvider>())
            .transpose()?
            .unwrap_or_default();
        let tts_model = fc.voice.tts_model.unwrap_or_else(|| match tts_provider {
            TtsProvider::OpenAi => defaults.tts_model.clone(),
            TtsProvider::ElevenLabs => "eleven_monolingual_v1".to_string(),
        });
        let tts_voice = fc.voice.tts_voice.unwrap_or_else(|| match tts_provider {
            TtsProvider::OpenAi => defaults.tts_voice.clone(),
            TtsProvider::ElevenLabs => DEFAULT_ELEVENLABS_VOICE.to_string(),
        });
        let tts_speed = fc.voice.tts_speed.unwrap_or(defaults.tts_speed);
        if !(0.25..=4.0).contains(&tts_speed) {
            return Err(Error::Config(format!(
                "voice.tts_speed must be between 0.25 and 4.0, got {tts_speed}"
            )));
        }
        let capture = env("ECOMVOICE_CAPTURE")
            .or(fc.voice.capture)
            .map(|s| s.parse::<CaptureBackend>())
            .transpose()?
            .unwrap_or_default();
        let stt_provider = fc
            .voice
            .stt_provider
            .map(|s| s.parse::<SttProvider>())
            .transpose()?
            .unwrap_or_default();
        let stt_model = fc.voice.stt_model.unwrap_or_else(|| match stt_provider {
            SttProvider::Whisper => defaults.stt_model.clone(),
            SttProvider::Deepgram => "nova-2".to_string(),
        });

        let voice = VoiceConfig {
            tts_provider,
            tts_model,
            tts_voice,
            tts_speed,
            player: env("ECOMVOICE_PLAYER").or(fc.voice.player),
            capture,
            stt_provider,
            stt_model,
            max_listen: fc
                .voice
                .max_listen_secs
                .map_or(defaults.max_listen, Duration::from_secs),
        };

        let api_keys = ApiKeys {
            openai: env("OPENAI_API_KEY").or(fc.api_keys.openai),
            elevenlabs: env("ELEVENLABS_API_KEY").or(fc.api_keys.elevenlabs),
            deepgram: env("DEEPGRAM_API_KEY").or(fc.api_keys.deepgram),
        };

        let server_defaults = ServerConfig::default();
        let port = match env("ECOMVOICE_PORT") {
            Some(p) => p
                .parse()
                .map_err(|_| Error::Config(format!("invalid ECOMVOICE_PORT: {p}")))?,
            None => fc.server.port.unwrap_or(server_defaults.port),
        };
        let server = ServerConfig {
            port,
            upstream_url: env("ECOMVOICE_UPSTREAM_URL")
                .or(fc.server.upstream_url)
                .unwrap_or(server_defaults.upstream_url),
            api_key: env("ECOMVOICE_UPSTREAM_API_KEY")
                .or(fc.server.api_key)
                .map(SecretString::from),
            replica_id: env("ECOMVOICE_REPLICA_ID").or(fc.server.replica_id),
            user_id: env("ECOMVOICE_USER_ID").or(fc.server.user_id),
            api_version: fc
                .server
                .api_version
                .unwrap_or(server_defaults.api_version),
        };

        let request_timeout = match fc.session.request_timeout_secs {
            Some(0) => {
                return Err(Error::Config(
                    "session.request_timeout_secs must be positive; omit it for no timeout"
                        .to_string(),
                ));
            }
            secs => secs.map(Duration::from_secs),
        };

        let session = SessionConfig {
            skip_chat_history: fc.session.skip_chat_history.unwrap_or(false),
            bootstrap_history: fc.session.bootstrap_history.unwrap_or(true),
            request_timeout,
        };

        Ok(Self {
            relay_url,
            content_url,
            session,
            voice,
            api_keys,
            server,
        })
    }
}
