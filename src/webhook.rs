//! GitHub webhook listener.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/github/webhook` | Receive a GitHub App / repository webhook |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! With a secret configured, `X-Hub-Signature-256` must carry
//! `sha256=<hex HMAC-SHA256(secret, body)>` or the request is rejected
//! with 401. Only `pull_request` events are forwarded; everything else is
//! acknowledged with 202 "Ignored".

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use hmac::{Hmac, Mac};
use serde::Serialize;
use serde_json::Value;
use sha2::Sha256;
use std::sync::Arc;
use tokio::sync::mpsc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

type HmacSha256 = Hmac<Sha256>;

const SIGNATURE_HEADER: &str = "X-Hub-Signature-256";
const EVENT_HEADER: &str = "X-GitHub-Event";

/// A pull-request webhook reduced to what a review needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestEvent {
    pub owner: String,
    pub repo: String,
    pub number: u64,
    pub action: String,
    /// Head branch, when present.
    pub head_ref: Option<String>,
}

impl PullRequestEvent {
    /// Whether the event belongs to `owner/repo` (case-insensitive).
    pub fn is_for(&self, owner: &str, repo: &str) -> bool {
        self.owner.eq_ignore_ascii_case(owner) && self.repo.eq_ignore_ascii_case(repo)
    }
}

#[derive(Clone)]
struct WebhookState {
    secret: Option<Arc<str>>,
    events: mpsc::Sender<PullRequestEvent>,
}

/// Check `header` against HMAC-SHA256(`secret`, `body`).
pub fn verify_signature(secret: &str, body: &[u8], header: Option<&str>) -> bool {
    let Some(hex_digest) = header.and_then(|h| h.strip_prefix("sha256=")) else {
        return false;
    };
    let Ok(expected) = hex::decode(hex_digest) else {
        return false;
    };
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

/// `sha256=<hex>` signature header value for `body`.
pub fn sign(secret: &str, body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(body);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

/// Extract a [`PullRequestEvent`]; `None` when owner, repo or number is
/// missing.
pub fn parse_pull_request_event(payload: &Value) -> Option<PullRequestEvent> {
    let repository = payload.get("repository")?;
    let pull = payload.get("pull_request")?;
    Some(PullRequestEvent {
        owner: repository.pointer("/owner/login")?.as_str()?.to_string(),
        repo: repository.get("name")?.as_str()?.to_string(),
        number: pull.get("number")?.as_u64()?,
        action: payload
            .get("action")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string(),
        head_ref: pull
            .pointer("/head/ref")
            .and_then(Value::as_str)
            .map(str::to_string),
    })
}

/// Router for the listener. Complete pull-request events are sent on
/// `events`.
pub fn router(secret: Option<String>, events: mpsc::Sender<PullRequestEvent>) -> Router {
    let state = WebhookState {
        secret: secret.filter(|s| !s.is_empty()).map(Arc::from),
        events,
    };
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/github/webhook", post(handle_webhook))
        .route("/health", get(handle_health))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind `0.0.0.0:<port>` and serve until the process exits.
pub async fn run_webhook_server(
    port: u16,
    secret: Option<String>,
    events: mpsc::Sender<PullRequestEvent>,
) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    tracing::info!(target: "assist::webhook", port, "listening for GitHub webhooks");
    axum::serve(listener, router(secret, events)).await?;
    Ok(())
}

async fn handle_webhook(
    State(state): State<WebhookState>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, &'static str) {
    let header_str = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());

    if let Some(secret) = &state.secret {
        if !verify_signature(secret, &body, header_str(SIGNATURE_HEADER)) {
            tracing::warn!(target: "assist::webhook", "rejected webhook with invalid signature");
            return (StatusCode::UNAUTHORIZED, "Invalid signature");
        }
    }

    if header_str(EVENT_HEADER) != Some("pull_request") {
        return (StatusCode::ACCEPTED, "Ignored");
    }

    let event = serde_json::from_slice::<Value>(&body)
        .ok()
        .and_then(|payload| parse_pull_request_event(&payload));
    match event {
        Some(event) => {
            tracing::info!(
                target: "assist::webhook",
                repo = %format!("{}/{}", event.owner, event.repo),
                number = event.number,
                action = %event.action,
                "pull request event received"
            );
            if state.events.send(event).await.is_err() {
                tracing::warn!(target: "assist::webhook", "no consumer for webhook events");
            }
        }
        None => tracing::debug!(target: "assist::webhook", "pull_request payload incomplete"),
    }
    (StatusCode::ACCEPTED, "Accepted")
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
