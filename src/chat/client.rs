//! HTTP client for the chat relay

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};

use super::ChatBackend;
use super::types::{ChatHistory, ChatReply, ChatRequest, ErrorBody};
use crate::{Error, Result};

/// Talks to the chat relay (`POST /api/chat`, `GET /api/chat/history`)
pub struct ChatCompletionClient {
    client: Client,
    base_url: String,
}

impl ChatCompletionClient {
    /// Create a client for the given relay base URL
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(base_url: impl Into<String>, timeout: Option<Duration>) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            client: builder.build().map_err(Error::Http)?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

/// Turn a non-success relay response into `Error::ChatTransport`
async fn transport_error(response: Response) -> Error {
    let status = response.status();
    let reason = status.canonical_reason().unwrap_or("request failed");
    let body = response.text().await.unwrap_or_default();

    let message = match serde_json::from_str::<ErrorBody>(&body) {
        Ok(err) if !err.error.is_empty() => match err.details {
            Some(details) if !details.is_empty() => format!("{} - {details}", err.error),
            _ => err.error,
        },
        _ => reason.to_string(),
    };

    tracing::error!(status = %status, error = %message, "chat relay error");

    Error::ChatTransport {
        status: status.as_u16(),
        message,
    }
}

#[async_trait]
impl ChatBackend for ChatCompletionClient {
    async fn complete(&self, request: &ChatRequest) -> Result<String> {
        if request.content.trim().is_empty() {
            return Err(Error::Validation(
                "content is required for the chat call".to_string(),
            ));
        }

        tracing::debug!(
            has_product_url = request.product_url.is_some(),
            skip_chat_history = request.skip_chat_history,
            content_len = request.content.len(),
            "sending chat request"
        );

        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(request)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "chat relay request failed");
                Error::ChatTransport {
                    status: 0,
                    message: e.to_string(),
                }
            })?;

        if !response.status().is_success() {
            return Err(transport_error(response).await);
        }

        let reply: ChatReply = response.json().await.map_err(|e| Error::ChatTransport {
            status: 0,
            message: format!("malformed chat response: {e}"),
        })?;

        if !reply.success || reply.content.trim().is_empty() {
            let detail = if reply.content.is_empty() {
                "Unknown error".to_string()
            } else {
                reply.content
            };
            tracing::warn!(detail = %detail, "chat returned no usable content");
            return Err(Error::ChatEmpty(detail));
        }

        tracing::debug!(reply_len = reply.content.len(), "chat response received");
        Ok(reply.content)
    }

    async fn history(&self) -> Result<ChatHistory> {
        let response = self
            .client
            .get(format!("{}/api/chat/history", self.base_url))
            .send()
            .await
            .map_err(|e| Error::ChatTransport {
                status: 0,
                message: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(transport_error(response).await);
        }

        let history: ChatHistory = response.json().await.map_err(|e| Error::ChatTransport {
            status: 0,
            message: format!("malformed chat history: {e}"),
        })?;

        tracing::debug!(items = history.items.len(), "chat history received");
        Ok(history)
    }
}
