//! Chat relay endpoint tests
//!
//! The upstream replica API is an in-process axum server.

use std::sync::{Arc, Mutex};

use axum::{
    Json, Router,
    body::Body,
    extract::{Path, State},
    http::{HeaderMap, Request, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use ecomvoice::chat::{ChatBackend, ChatCompletionClient, ChatRequest};
use ecomvoice::config::ServerConfig;
use ecomvoice::relay::{RelayState, router};
use ecomvoice::{Error, RelayServer};
use secrecy::SecretString;
use serde_json::{Value, json};
use tower::ServiceExt;

mod common;
use common::{PRODUCT_URL, spawn_server};

/// One request seen by the fake upstream
#[derive(Clone)]
struct Seen {
    replica: String,
    headers: HeaderMap,
    body: Option<Value>,
}

/// Fake upstream answering every call with the same status and body
#[derive(Clone)]
struct Upstream {
    status: StatusCode,
    body: String,
    seen: Arc<Mutex<Vec<Seen>>>,
}

impl Upstream {
    fn answering(status: StatusCode, body: Value) -> Self {
        Self::raw(status, body.to_string())
    }

    fn raw(status: StatusCode, body: String) -> Self {
        Self {
            status,
            body,
            seen: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn seen(&self) -> Vec<Seen> {
        self.seen.lock().unwrap().clone()
    }

    fn respond(&self) -> Response {
        (
            self.status,
            [("content-type", "application/json")],
            self.body.clone(),
        )
            .into_response()
    }

    async fn serve(self) -> String {
        let app = Router::new()
            .route(
                "/v1/replicas/{replica}/chat/completions",
                post(upstream_completion),
            )
            .route("/v1/replicas/{replica}/chat/history", get(upstream_history))
            .with_state(self);
        spawn_server(app).await
    }
}

async fn upstream_completion(
    State(upstream): State<Upstream>,
    Path(replica): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    upstream.seen.lock().unwrap().push(Seen {
        replica,
        headers,
        body: Some(body),
    });
    upstream.respond()
}

async fn upstream_history(
    State(upstream): State<Upstream>,
    Path(replica): Path<String>,
    headers: HeaderMap,
) -> Response {
    upstream.seen.lock().unwrap().push(Seen {
        replica,
        headers,
        body: None,
    });
    upstream.respond()
}

fn server_config(upstream_url: &str) -> ServerConfig {
    ServerConfig {
        port: 0,
        upstream_url: upstream_url.to_string(),
        api_key: Some(SecretString::from("org-secret")),
        replica_id: Some("replica-1".to_string()),
        user_id: Some("user-7".to_string()),
        api_version: "2025-03-25".to_string(),
    }
}

fn relay(config: &ServerConfig) -> Router {
    router(Arc::new(RelayState::new(config, None).unwrap()))
}

fn post_chat(body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/chat")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn read_json(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_health_endpoint() {
    let app = relay(&ServerConfig::default());

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_json(response).await["status"], "ok");
}

#[tokio::test]
async fn test_missing_credentials_is_configuration_error() {
    let state = RelayState::new(&ServerConfig::default(), None).unwrap();
    assert!(!state.is_configured());
    let app = router(Arc::new(state));

    let response = app
        .oneshot(post_chat(&json!({ "content": "hello" })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        read_json(response).await["error"],
        "Server configuration error. Please contact support."
    );
}

#[tokio::test]
async fn test_empty_content_is_rejected_before_upstream() {
    let upstream = Upstream::answering(StatusCode::OK, json!({ "success": true, "content": "hi" }));
    let base = upstream.clone().serve().await;
    let app = relay(&server_config(&base));

    for body in [json!({ "content": "" }), json!({ "productUrl": PRODUCT_URL })] {
        let response = app.clone().oneshot(post_chat(&body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            read_json(response).await["error"],
            "Content is required and must be a string"
        );
    }

    assert!(upstream.seen().is_empty());
}

fn post_raw(body: &'static str, content_type: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("POST").uri("/api/chat");
    if let Some(content_type) = content_type {
        builder = builder.header("content-type", content_type);
    }
    builder.body(Body::from(body)).unwrap()
}

#[tokio::test]
async fn test_malformed_body_gets_json_bad_request() {
    let upstream = Upstream::answering(StatusCode::OK, json!({ "success": true, "content": "hi" }));
    let base = upstream.clone().serve().await;
    let app = relay(&server_config(&base));

    let requests = [
        post_raw(r#"{"content": 5}"#, Some("application/json")),
        post_raw("content=hello", Some("application/json")),
        post_raw(r#"{"content": "hello"}"#, None),
    ];

    for request in requests {
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            read_json(response).await["error"],
            "Content is required and must be a string"
        );
    }

    assert!(upstream.seen().is_empty());
}

#[tokio::test]
async fn test_credentials_checked_before_body() {
    let app = relay(&ServerConfig::default());

    let response = app
        .oneshot(post_raw("not json", Some("application/json")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        read_json(response).await["error"],
        "Server configuration error. Please contact support."
    );
}

#[tokio::test]
async fn test_chat_forwards_with_product_url_and_credentials() {
    let upstream = Upstream::answering(
        StatusCode::OK,
        json!({ "success": true, "content": "It is blue." }),
    );
    let base = upstream.clone().serve().await;
    let app = relay(&server_config(&base));

    let response = app
        .oneshot(post_chat(&json!({
            "content": "what color is it?",
            "skip_chat_history": true,
            "productUrl": PRODUCT_URL,
        })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let reply = read_json(response).await;
    assert_eq!(reply["success"], true);
    assert_eq!(reply["content"], "It is blue.");

    let seen = upstream.seen();
    assert_eq!(seen.len(), 1);
    let call = &seen[0];
    assert_eq!(call.replica, "replica-1");
    assert_eq!(call.headers["x-organization-secret"], "org-secret");
    assert_eq!(call.headers["x-user-id"], "user-7");
    assert_eq!(call.headers["x-api-version"], "2025-03-25");

    let body = call.body.as_ref().unwrap();
    assert_eq!(
        body["content"],
        format!("Product URL: {PRODUCT_URL}\n\nUser Question: what color is it?")
    );
    assert_eq!(body["skip_chat_history"], true);
    assert_eq!(body["source"], "discord");
    assert_eq!(body["discord_data"]["author_id"], "user-7");
}

#[tokio::test]
async fn test_upstream_failure_status_passes_through() {
    let upstream = Upstream::raw(
        StatusCode::SERVICE_UNAVAILABLE,
        r#"{"error":"replica offline"}"#.to_string(),
    );
    let base = upstream.clone().serve().await;
    let app = relay(&server_config(&base));

    let response = app
        .oneshot(post_chat(&json!({ "content": "hello" })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = read_json(response).await;
    assert_eq!(body["error"], "API request failed: Service Unavailable");
    assert_eq!(body["details"], r#"{"error":"replica offline"}"#);
}

#[tokio::test]
async fn test_unsuccessful_reply_is_bad_request() {
    let upstream = Upstream::answering(
        StatusCode::OK,
        json!({ "success": false, "content": "replica refused" }),
    );
    let base = upstream.clone().serve().await;
    let app = relay(&server_config(&base));

    let response = app
        .oneshot(post_chat(&json!({ "content": "hello" })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(read_json(response).await["error"], "replica refused");
}

#[tokio::test]
async fn test_history_passes_through() {
    let stored = json!({
        "success": true,
        "type": "chat_history",
        "items": [{
            "content": "Hi!",
            "created_at": "2025-05-01T10:00:00Z",
            "id": 3,
            "is_private": false,
            "role": "assistant",
            "source": "discord",
            "user_uuid": "u-1",
            "original_message_id": "m-1"
        }]
    });
    let upstream = Upstream::answering(StatusCode::OK, stored.clone());
    let base = upstream.clone().serve().await;
    let app = relay(&server_config(&base));

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/chat/history")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_json(response).await, stored);
    assert_eq!(upstream.seen()[0].headers["x-organization-secret"], "org-secret");
}

#[tokio::test]
async fn test_history_failure_reports_reason() {
    let upstream = Upstream::raw(StatusCode::NOT_FOUND, String::new());
    let base = upstream.clone().serve().await;
    let app = relay(&server_config(&base));

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/chat/history")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        read_json(response).await["error"],
        "Failed to fetch chat history: Not Found"
    );
}

#[tokio::test]
async fn test_client_through_relay_server() {
    let upstream = Upstream::answering(
        StatusCode::OK,
        json!({ "success": true, "content": "Happy to help!" }),
    );
    let upstream_base = upstream.clone().serve().await;

    let relay_base = spawn_server(relay(&server_config(&upstream_base))).await;
    let client = ChatCompletionClient::new(&relay_base, None).unwrap();

    let request = ChatRequest::new("hello", Some(PRODUCT_URL), false).unwrap();
    let reply = client.complete(&request).await.unwrap();
    assert_eq!(reply, "Happy to help!");

    let seen = upstream.seen();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].body.as_ref().unwrap()["skip_chat_history"], false);
}

#[tokio::test]
async fn test_client_surfaces_relay_error_details() {
    let upstream = Upstream::raw(StatusCode::BAD_GATEWAY, "upstream exploded".to_string());
    let upstream_base = upstream.clone().serve().await;

    let relay_base = spawn_server(relay(&server_config(&upstream_base))).await;
    let client = ChatCompletionClient::new(&relay_base, None).unwrap();

    let request = ChatRequest::new("hello", None, false).unwrap();
    let err = client.complete(&request).await.unwrap_err();

    match err {
        Error::ChatTransport { status, message } => {
            assert_eq!(status, 502);
            assert_eq!(message, "API request failed: Bad Gateway - upstream exploded");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_relay_server_spawn_serves_health() {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let config = ServerConfig {
        port,
        ..ServerConfig::default()
    };

    let server = RelayServer::new(&config, None).unwrap().spawn();
    let url = format!("http://127.0.0.1:{port}/health");

    let client = reqwest::Client::new();
    let mut healthy = false;
    for _ in 0..100 {
        if let Ok(response) = client.get(&url).send().await {
            healthy = response.status().is_success();
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    assert!(healthy);
    server.abort();
}
