//! Chat relay wire types
//!
//! Shared by the client and the relay server.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Chat completion request body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub content: String,

    #[serde(default)]
    pub skip_chat_history: bool,

    #[serde(rename = "productUrl", default, skip_serializing_if = "Option::is_none")]
    pub product_url: Option<String>,
}

impl ChatRequest {
    /// Build a request, rejecting empty content
    ///
    /// # Errors
    ///
    /// Returns `Error::Validation` if `content` is empty or whitespace
    pub fn new(
        content: impl Into<String>,
        product_url: Option<&str>,
        skip_chat_history: bool,
    ) -> Result<Self> {
        let content = content.into();
        if content.trim().is_empty() {
            return Err(Error::Validation(
                "content is required for the chat call".to_string(),
            ));
        }

        Ok(Self {
            content,
            skip_chat_history,
            product_url: product_url.map(ToString::to_string),
        })
    }
}

/// Successful (2xx) chat completion body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatReply {
    pub success: bool,
    #[serde(default)]
    pub content: String,
}

/// Error body returned with non-2xx statuses
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Remote-stored chat history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatHistory {
    pub success: bool,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub items: Vec<HistoryItem>,
}

/// One remote-stored message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryItem {
    pub content: String,
    #[serde(default)]
    pub created_at: String,
    pub id: i64,
    #[serde(default)]
    pub is_private: bool,
    pub role: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub user_uuid: String,
    #[serde(default)]
    pub original_message_id: String,
}
