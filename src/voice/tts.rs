//! Text-to-speech (TTS) over remote providers

use async_trait::async_trait;

use super::synthesis::Synthesizer;
use crate::config::{ApiKeys, TtsProvider, VoiceConfig};
use crate::{Error, Result};

const OPENAI_BASE_URL: &str = "https://api.openai.com";
const ELEVENLABS_BASE_URL: &str = "https://api.elevenlabs.io";
const ELEVENLABS_DEFAULT_MODEL: &str = "eleven_monolingual_v1";

/// Synthesizes speech from text
pub struct TextToSpeech {
    client: reqwest::Client,
    api_key: String,
    voice: String,
    speed: f64,
    model: String,
    provider: TtsProvider,
    base_url: String,
}

impl TextToSpeech {
    /// Create a TTS instance using `OpenAI`
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new_openai(api_key: String, voice: String, speed: f64, model: String) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config("OpenAI API key required for TTS".to_string()));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            voice,
            speed,
            model,
            provider: TtsProvider::OpenAi,
            base_url: OPENAI_BASE_URL.to_string(),
        })
    }

    /// Create a TTS instance using ElevenLabs
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new_elevenlabs(api_key: String, voice_id: String, model: String) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config(
                "ElevenLabs API key required for TTS".to_string(),
            ));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            voice: voice_id,
            speed: 1.0,
            model,
            provider: TtsProvider::ElevenLabs,
            base_url: ELEVENLABS_BASE_URL.to_string(),
        })
    }

    /// Build from the voice section of the config
    ///
    /// # Errors
    ///
    /// Returns error if the selected provider has no API key
    pub fn from_config(voice: &VoiceConfig, keys: &ApiKeys) -> Result<Self> {
        match voice.tts_provider {
            TtsProvider::OpenAi => Self::new_openai(
                keys.openai.clone().unwrap_or_default(),
                voice.tts_voice.clone(),
                voice.tts_speed,
                voice.tts_model.clone(),
            ),
            TtsProvider::ElevenLabs => {
                // OpenAI model names mean nothing to ElevenLabs
                let model = if voice.tts_model.starts_with("tts-") {
                    ELEVENLABS_DEFAULT_MODEL.to_string()
                } else {
                    voice.tts_model.clone()
                };
                Self::new_elevenlabs(
                    keys.elevenlabs.clone().unwrap_or_default(),
                    voice.tts_voice.clone(),
                    model,
                )
            }
        }
    }

    /// Point at a different API host (proxies, tests)
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Synthesize using OpenAI TTS
    async fn synthesize_openai(&self, text: &str) -> Result<Vec<u8>> {
        #[derive(serde::Serialize)]
        struct TtsRequest<'a> {
            model: &'a str,
            input: &'a str,
            voice: &'a str,
            speed: f64,
        }

        let request = TtsRequest {
            model: &self.model,
            input: text,
            voice: &self.voice,
            speed: self.speed,
        };

        let response = self
            .client
            .post(format!("{}/v1/audio/speech", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Tts(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Tts(format!("OpenAI TTS error {status}: {body}")));
        }

        let audio = response
            .bytes()
            .await
            .map_err(|e| Error::Tts(e.to_string()))?;
        Ok(audio.to_vec())
    }

    /// Synthesize using ElevenLabs TTS
    async fn synthesize_elevenlabs(&self, text: &str) -> Result<Vec<u8>> {
        #[derive(serde::Serialize)]
        struct ElevenLabsRequest<'a> {
            text: &'a str,
            model_id: &'a str,
        }

        let url = format!("{}/v1/text-to-speech/{}", self.base_url, self.voice);

        let request = ElevenLabsRequest {
            text,
            model_id: &self.model,
        };

        let response = self
            .client
            .post(&url)
            .header("xi-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Tts(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Tts(format!("ElevenLabs TTS error {status}: {body}")));
        }

        let audio = response
            .bytes()
            .await
            .map_err(|e| Error::Tts(e.to_string()))?;
        Ok(audio.to_vec())
    }
}

#[async_trait]
impl Synthesizer for TextToSpeech {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        tracing::debug!(
            provider = ?self.provider,
            voice = %self.voice,
            chars = text.len(),
            "synthesizing speech"
        );

        match self.provider {
            TtsProvider::OpenAi => self.synthesize_openai(text).await,
            TtsProvider::ElevenLabs => self.synthesize_elevenlabs(text).await,
        }
    }
}
