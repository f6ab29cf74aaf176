//! Remote chat completion
//!
//! The orchestrator only sees the `ChatBackend` trait; `ChatCompletionClient`
//! is the HTTP implementation that talks to the relay.

mod client;
pub mod types;

use async_trait::async_trait;

pub use client::ChatCompletionClient;
pub use types::{ChatHistory, ChatReply, ChatRequest, ErrorBody, HistoryItem};

use crate::Result;

/// A chat completion service
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Send one request and return the assistant reply text
    ///
    /// No retries. Errors are `Validation` (empty content), `ChatTransport`
    /// (no response or non-success status) or `ChatEmpty` (no usable content).
    async fn complete(&self, request: &ChatRequest) -> Result<String>;

    /// Read remote-stored history; advisory only
    async fn history(&self) -> Result<ChatHistory>;
}
