//! Conversation session data

use std::fmt;

use serde::Serialize;

use crate::chat::HistoryItem;
use crate::context::ProductContext;
use crate::error::ErrorInfo;

/// The single active conversation state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationState {
    #[default]
    Idle,
    LoadingContext,
    Thinking,
    Listening,
    Speaking,
    Failed,
}

impl ConversationState {
    /// Waiting on a remote call; toggles are ignored
    #[must_use]
    pub const fn is_busy(self) -> bool {
        matches!(self, Self::LoadingContext | Self::Thinking)
    }

    /// One of the mutually exclusive activity states
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(
            self,
            Self::LoadingContext | Self::Thinking | Self::Listening | Self::Speaking
        )
    }
}

impl fmt::Display for ConversationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::LoadingContext => "loading",
            Self::Thinking => "thinking",
            Self::Listening => "listening",
            Self::Speaking => "speaking",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => f.write_str("user"),
            Self::Assistant => f.write_str("assistant"),
        }
    }
}

/// One exchange in the conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Turn {
    pub role: Role,
    pub text: String,
    /// Starts at 1, gapless within a session
    pub sequence: u64,
}

/// The live conversation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversationSession {
    pub product_url: Option<String>,
    pub history: Vec<Turn>,
    pub product_context: Option<ProductContext>,
    pub state: ConversationState,
    pub last_error: Option<ErrorInfo>,
    /// Remote-stored history read when the session started; advisory only
    pub prior_history: Vec<HistoryItem>,
}

impl ConversationSession {
    /// Fresh session for a product page
    #[must_use]
    pub fn for_product(url: impl Into<String>) -> Self {
        Self {
            product_url: Some(url.into()),
            ..Self::default()
        }
    }

    /// Append a turn with the next sequence number
    pub fn append_turn(&mut self, role: Role, text: impl Into<String>) -> &Turn {
        let sequence = self.history.last().map_or(1, |turn| turn.sequence + 1);
        self.history.push(Turn {
            role,
            text: text.into(),
            sequence,
        });
        &self.history[self.history.len() - 1]
    }

    #[must_use]
    pub fn context_text(&self) -> Option<&str> {
        self.product_context.as_ref().map(|ctx| ctx.content.as_str())
    }
}

/// What the presentation layer sees after each transition
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub state: ConversationState,
    pub epoch: u64,
    pub last_error: Option<ErrorInfo>,
    pub turns: usize,
    pub product_url: Option<String>,
}
