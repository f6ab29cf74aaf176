//! Client for the upstream replica chat API

use std::time::Duration;

use chrono::Utc;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::config::ServerConfig;
use crate::{Error, Result};

const CHANNEL_ID: &str = "voice-assistant";
const CHANNEL_NAME: &str = "Voice Assistant";
const SERVER_ID: &str = "storefront";
const SERVER_NAME: &str = "Storefront";

/// Credentials the upstream requires on every call
#[derive(Clone)]
pub struct Credentials {
    pub api_key: SecretString,
    pub replica_id: String,
    pub user_id: Option<String>,
}

/// Body of an upstream chat completion
#[derive(Debug, Serialize)]
pub struct UpstreamChatRequest {
    pub content: String,
    pub skip_chat_history: bool,
    pub source: &'static str,
    pub discord_data: ThreadMetadata,
}

/// Conversation thread the message is filed under upstream
#[derive(Debug, Serialize)]
pub struct ThreadMetadata {
    pub channel_id: &'static str,
    pub channel_name: &'static str,
    pub author_id: String,
    pub author_name: &'static str,
    pub message_id: String,
    pub created_at: String,
    pub server_id: &'static str,
    pub server_name: &'static str,
}

impl UpstreamChatRequest {
    /// Build the upstream body, prefixing the product URL when present
    #[must_use]
    pub fn new(
        content: &str,
        product_url: Option<&str>,
        skip_chat_history: bool,
        user_id: Option<&str>,
    ) -> Self {
        let content = match product_url.filter(|url| !url.is_empty()) {
            Some(url) => format!("Product URL: {url}\n\nUser Question: {content}"),
            None => content.to_string(),
        };

        Self {
            content,
            skip_chat_history,
            source: "discord",
            discord_data: ThreadMetadata {
                channel_id: CHANNEL_ID,
                channel_name: CHANNEL_NAME,
                author_id: user_id.unwrap_or("user").to_string(),
                author_name: "User",
                message_id: format!("msg-{}", uuid::Uuid::new_v4()),
                created_at: Utc::now().to_rfc3339(),
                server_id: SERVER_ID,
                server_name: SERVER_NAME,
            },
        }
    }
}

/// Upstream chat completion reply
#[derive(Debug, Deserialize)]
pub struct UpstreamChatResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub content: String,
}

/// Upstream answered with a non-success status
#[derive(Debug)]
pub struct UpstreamFailure {
    pub status: StatusCode,
    pub body: String,
}

/// Outcome of an upstream call that reached the server
pub type UpstreamResult<T> = std::result::Result<T, UpstreamFailure>;

/// Talks to `{upstream}/v1/replicas/{replica}/chat/...`
pub struct UpstreamClient {
    client: Client,
    base_url: String,
    api_version: String,
}

impl UpstreamClient {
    /// Create a client from the relay server config
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(config: &ServerConfig, timeout: Option<Duration>) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            client: builder.build().map_err(Error::Http)?,
            base_url: config.upstream_url.trim_end_matches('/').to_string(),
            api_version: config.api_version.clone(),
        })
    }

    fn replica_url(&self, credentials: &Credentials, path: &str) -> String {
        format!(
            "{}/v1/replicas/{}/chat/{path}",
            self.base_url, credentials.replica_id
        )
    }

    fn authorize(
        &self,
        request: reqwest::RequestBuilder,
        credentials: &Credentials,
    ) -> reqwest::RequestBuilder {
        request
            .header("X-ORGANIZATION-SECRET", credentials.api_key.expose_secret())
            .header("X-USER-ID", credentials.user_id.as_deref().unwrap_or_default())
            .header("X-API-Version", &self.api_version)
    }

    /// Forward one chat completion
    ///
    /// # Errors
    ///
    /// Returns `Error::Relay` if the upstream cannot be reached or answers
    /// with an unreadable body
    pub async fn complete(
        &self,
        credentials: &Credentials,
        request: &UpstreamChatRequest,
    ) -> Result<UpstreamResult<UpstreamChatResponse>> {
        let url = self.replica_url(credentials, "completions");
        tracing::debug!(
            url = %url,
            message_id = %request.discord_data.message_id,
            content_len = request.content.len(),
            "forwarding chat completion"
        );

        let response = self
            .authorize(self.client.post(&url), credentials)
            .json(request)
            .send()
            .await
            .map_err(|e| Error::Relay(format!("upstream request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "upstream chat error");
            return Ok(Err(UpstreamFailure { status, body }));
        }

        let reply = response
            .json()
            .await
            .map_err(|e| Error::Relay(format!("malformed upstream response: {e}")))?;

        Ok(Ok(reply))
    }

    /// Fetch stored chat history, passed through as-is
    ///
    /// # Errors
    ///
    /// Returns `Error::Relay` if the upstream cannot be reached or answers
    /// with an unreadable body
    pub async fn history(
        &self,
        credentials: &Credentials,
    ) -> Result<UpstreamResult<serde_json::Value>> {
        let url = self.replica_url(credentials, "history");
        tracing::debug!(url = %url, "fetching chat history");

        let response = self
            .authorize(self.client.get(&url), credentials)
            .send()
            .await
            .map_err(|e| Error::Relay(format!("upstream request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "upstream history error");
            return Ok(Err(UpstreamFailure { status, body }));
        }

        let history = response
            .json()
            .await
            .map_err(|e| Error::Relay(format!("malformed upstream history: {e}")))?;

        Ok(Ok(history))
    }
}
