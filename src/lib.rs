//! EcomVoice - Voice assistant for product pages
//!
//! Point it at a product page and talk about it:
//! - Product context retrieval through a content-extraction relay
//! - Chat completion through a same-origin chat relay
//! - Speech synthesis (remote TTS + local playback) and speech capture
//! - A conversation orchestrator tying them into one resettable session
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │              Presentation (terminal)                │
//! └────────────────────┬────────────────────────────────┘
//!                      │ load_product / toggle / reset
//! ┌────────────────────▼────────────────────────────────┐
//! │              Conversation Orchestrator              │
//! │   Context  │  Chat  │  Capture  │  Synthesis        │
//! └──────┬───────────┬──────────────────────────────────┘
//!        │           │
//! ┌──────▼─────┐ ┌───▼──────────────┐
//! │  Content   │ │   Chat relay     │──▶ upstream replica API
//! │  relay     │ │  (`relay` module)│
//! └────────────┘ └──────────────────┘
//! ```

pub mod chat;
pub mod config;
pub mod context;
pub mod conversation;
pub mod error;
pub mod framing;
pub mod relay;
pub mod voice;

pub use chat::{ChatBackend, ChatCompletionClient, ChatHistory, ChatRequest, HistoryItem};
pub use config::Config;
pub use context::{ContextSource, ProductContext, ProductContextLoader};
pub use conversation::{
    ConversationSession, ConversationState, Event, Orchestrator, Role, SessionOptions, Snapshot,
    Turn,
};
pub use error::{Error, ErrorInfo, ErrorKind, Result};
pub use relay::RelayServer;
pub use voice::{SpeechCaptureAdapter, SpeechSynthesisAdapter};
