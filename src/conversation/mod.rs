//! Conversation orchestration
//!
//! Coordinates context retrieval, chat completion, speech capture and speech
//! synthesis into one interruptible, resettable session.

mod orchestrator;
mod state;

pub use orchestrator::{Event, Orchestrator, SessionOptions};
pub use state::{ConversationSession, ConversationState, Role, Snapshot, Turn};
