//! Chat relay server
//!
//! Same-origin relay between the conversation client and the upstream
//! replica API. Upstream credentials live only here.
//!
//! - `POST /api/chat` - forward one chat completion
//! - `GET /api/chat/history` - pass stored history through
//! - `GET /health` - liveness

mod upstream;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

pub use upstream::{
    Credentials, ThreadMetadata, UpstreamChatRequest, UpstreamChatResponse, UpstreamClient,
    UpstreamFailure,
};

use crate::chat::{ChatReply, ErrorBody};
use crate::config::ServerConfig;
use crate::{Error, Result};

/// Shared state for relay handlers
pub struct RelayState {
    upstream: UpstreamClient,
    credentials: Option<Credentials>,
}

impl RelayState {
    /// Build from the server config
    ///
    /// Missing credentials are not an error here; every request is answered
    /// with a configuration error instead.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(config: &ServerConfig, timeout: Option<Duration>) -> Result<Self> {
        let credentials = match (&config.api_key, &config.replica_id) {
            (Some(api_key), Some(replica_id)) if !replica_id.is_empty() => Some(Credentials {
                api_key: api_key.clone(),
                replica_id: replica_id.clone(),
                user_id: config.user_id.clone(),
            }),
            _ => {
                tracing::warn!("upstream API key or replica id missing, relay will refuse requests");
                None
            }
        };

        Ok(Self {
            upstream: UpstreamClient::new(config, timeout)?,
            credentials,
        })
    }

    #[must_use]
    pub const fn is_configured(&self) -> bool {
        self.credentials.is_some()
    }
}

/// Chat request as received from clients
#[derive(Debug, Default)]
pub struct RelayChatRequest {
    pub content: Option<String>,
    pub skip_chat_history: bool,
    pub product_url: Option<String>,
}

impl RelayChatRequest {
    /// Read the fields leniently; a field of the wrong type counts as absent
    #[must_use]
    pub fn from_json(body: &serde_json::Value) -> Self {
        let text = |key: &str| {
            body.get(key)
                .and_then(serde_json::Value::as_str)
                .map(ToString::to_string)
        };

        Self {
            content: text("content"),
            skip_chat_history: body
                .get("skip_chat_history")
                .and_then(serde_json::Value::as_bool)
                .unwrap_or(false),
            product_url: text("productUrl"),
        }
    }
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// Relay errors, rendered as `{ error, details? }`
#[derive(Debug)]
pub enum RelayError {
    NotConfigured,
    BadRequest(&'static str),
    Upstream(UpstreamFailure),
    HistoryUpstream(UpstreamFailure),
    /// Upstream answered 2xx without usable content
    NoContent(String),
    Internal(Error),
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let (status, error, details) = match self {
            Self::NotConfigured => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Server configuration error. Please contact support.".to_string(),
                None,
            ),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.to_string(), None),
            Self::Upstream(failure) => (
                upstream_status(&failure),
                format!("API request failed: {}", reason(&failure)),
                Some(failure.body),
            ),
            Self::HistoryUpstream(failure) => (
                upstream_status(&failure),
                format!("Failed to fetch chat history: {}", reason(&failure)),
                None,
            ),
            Self::NoContent(error) => (StatusCode::BAD_REQUEST, error, None),
            Self::Internal(e) => {
                tracing::error!(error = %e, "relay request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error. Please try again later.".to_string(),
                    None,
                )
            }
        };

        (status, Json(ErrorBody { error, details })).into_response()
    }
}

fn upstream_status(failure: &UpstreamFailure) -> StatusCode {
    StatusCode::from_u16(failure.status.as_u16()).unwrap_or(StatusCode::BAD_GATEWAY)
}

fn reason(failure: &UpstreamFailure) -> &'static str {
    failure.status.canonical_reason().unwrap_or("Unknown")
}

/// Build the relay router
pub fn router(state: Arc<RelayState>) -> Router {
    Router::new()
        .route("/api/chat", post(chat))
        .route("/api/chat/history", get(history))
        .with_state(state)
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Forward one chat completion upstream
async fn chat(
    State(state): State<Arc<RelayState>>,
    body: std::result::Result<Json<serde_json::Value>, JsonRejection>,
) -> std::result::Result<Json<ChatReply>, RelayError> {
    let credentials = state.credentials.as_ref().ok_or(RelayError::NotConfigured)?;

    let request = match body {
        Ok(Json(body)) => RelayChatRequest::from_json(&body),
        Err(rejection) => {
            tracing::debug!(error = %rejection, "unreadable chat request body");
            RelayChatRequest::default()
        }
    };

    let content = request
        .content
        .as_deref()
        .filter(|c| !c.is_empty())
        .ok_or(RelayError::BadRequest("Content is required and must be a string"))?;

    tracing::info!(
        has_product_url = request.product_url.is_some(),
        skip_chat_history = request.skip_chat_history,
        "chat request"
    );

    let upstream_request = UpstreamChatRequest::new(
        content,
        request.product_url.as_deref(),
        request.skip_chat_history,
        credentials.user_id.as_deref(),
    );

    let reply = state
        .upstream
        .complete(credentials, &upstream_request)
        .await
        .map_err(RelayError::Internal)?
        .map_err(RelayError::Upstream)?;

    if !reply.success || reply.content.is_empty() {
        let error = if reply.content.is_empty() {
            "Unknown error from upstream API".to_string()
        } else {
            reply.content
        };
        tracing::warn!(error = %error, "upstream returned no content");
        return Err(RelayError::NoContent(error));
    }

    Ok(Json(ChatReply {
        success: true,
        content: reply.content,
    }))
}

/// Pass stored chat history through
async fn history(
    State(state): State<Arc<RelayState>>,
) -> std::result::Result<Json<serde_json::Value>, RelayError> {
    let credentials = state.credentials.as_ref().ok_or(RelayError::NotConfigured)?;

    let history = state
        .upstream
        .history(credentials)
        .await
        .map_err(RelayError::Internal)?
        .map_err(RelayError::HistoryUpstream)?;

    Ok(Json(history))
}

/// Chat relay HTTP server
pub struct RelayServer {
    state: Arc<RelayState>,
    port: u16,
}

impl RelayServer {
    /// Create a relay server from config
    ///
    /// # Errors
    ///
    /// Returns error if the upstream client cannot be built
    pub fn new(config: &ServerConfig, timeout: Option<Duration>) -> Result<Self> {
        Ok(Self {
            state: Arc::new(RelayState::new(config, timeout)?),
            port: config.port,
        })
    }

    /// Run the relay server
    ///
    /// # Errors
    ///
    /// Returns error if server fails to bind or run
    pub async fn run(self) -> Result<()> {
        let addr = format!("0.0.0.0:{}", self.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| Error::Relay(format!("failed to bind relay server: {e}")))?;

        tracing::info!(
            port = self.port,
            configured = self.state.is_configured(),
            "relay server listening"
        );

        axum::serve(listener, router(self.state))
            .await
            .map_err(|e| Error::Relay(format!("relay server error: {e}")))?;

        Ok(())
    }

    /// Run the relay server in a background task
    #[must_use]
    pub fn spawn(self) -> tokio::task::JoinHandle<Result<()>> {
        tokio::spawn(async move { self.run().await })
    }
}
