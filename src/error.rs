//! Error types for EcomVoice

use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Result type alias for EcomVoice operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in EcomVoice
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Empty or malformed input, rejected before any network call
    #[error("invalid input: {0}")]
    Validation(String),

    /// Content-extraction relay call failed
    #[error("context fetch failed: {0}")]
    ContextFetch(String),

    /// Chat relay returned a non-success status or could not be reached
    #[error("chat request failed ({status}): {message}")]
    ChatTransport {
        /// HTTP status, `0` when no response was received
        status: u16,
        /// Error message reported by the relay
        message: String,
    },

    /// Chat relay answered but signaled no usable content
    #[error("chat returned no usable content: {0}")]
    ChatEmpty(String),

    /// Speech capture failed
    #[error("capture error: {0}")]
    Capture(String),

    /// Speech capture is not available on this platform
    #[error("speech capture is not supported on this platform")]
    CaptureUnsupported,

    /// Speech-to-text error
    #[error("STT error: {0}")]
    Stt(String),

    /// Text-to-speech error
    #[error("TTS error: {0}")]
    Tts(String),

    /// Playback error
    #[error("playback error: {0}")]
    Playback(String),

    /// Audio device error
    #[error("audio error: {0}")]
    Audio(String),

    /// Relay server error
    #[error("relay error: {0}")]
    Relay(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Error {
    /// Classify this error for the conversation session
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::ContextFetch(_) => ErrorKind::ContextFetch,
            Self::ChatTransport { .. } | Self::ChatEmpty(_) => ErrorKind::ChatCompletion,
            Self::Capture(_) | Self::CaptureUnsupported | Self::Stt(_) => ErrorKind::Capture,
            Self::Tts(_) | Self::Playback(_) | Self::Audio(_) => ErrorKind::Synthesis,
            Self::Config(_)
            | Self::Relay(_)
            | Self::Io(_)
            | Self::Http(_)
            | Self::Serialization(_)
            | Self::Toml(_) => ErrorKind::Internal,
        }
    }
}

/// Session-level error category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    ContextFetch,
    ChatCompletion,
    Capture,
    Synthesis,
    Internal,
}

impl ErrorKind {
    /// Message shown to the user next to a failed session
    #[must_use]
    pub const fn user_message(self) -> &'static str {
        match self {
            Self::Validation => "Please enter a valid product URL (e.g., https://example.com)",
            Self::ContextFetch => "Failed to load product information",
            Self::ChatCompletion => "Failed to get AI response",
            Self::Capture => "Speech recognition failed. Please try again.",
            Self::Synthesis => "Speech synthesis failed",
            Self::Internal => "Something went wrong. Please try again.",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Validation => "validation",
            Self::ContextFetch => "context_fetch",
            Self::ChatCompletion => "chat_completion",
            Self::Capture => "capture",
            Self::Synthesis => "synthesis",
            Self::Internal => "internal",
        };
        f.write_str(name)
    }
}

/// Error recorded on a conversation session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorInfo {
    pub kind: ErrorKind,
    /// Technical detail, for logs and the status view
    pub message: String,
}

impl ErrorInfo {
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Human-readable message for the presentation layer
    #[must_use]
    pub const fn user_message(&self) -> &'static str {
        self.kind.user_message()
    }
}

impl From<&Error> for ErrorInfo {
    fn from(err: &Error) -> Self {
        Self::new(err.kind(), err.to_string())
    }
}
