//! Chat and embedding backend.
//!
//! [`ChatBackend`] is the seam the orchestrator talks through; tests
//! substitute a scripted implementation. [`OllamaClient`] speaks the
//! Ollama REST API:
//!
//! | Call | Endpoint |
//! |---|---|
//! | chat | `POST /api/chat` with `stream: false` |
//! | embed | `POST /api/embeddings` |
//! | list models | `GET /api/tags` |
//!
//! Some proxies stream NDJSON even when `stream` is false, so chat
//! responses with an `application/x-ndjson` content type are aggregated
//! line by line. No retries are applied here.

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use project_assistant_core::models::ChatMessage;
use project_assistant_core::text::snippet;

/// Returned when the model answered but produced no text.
pub const EMPTY_PAYLOAD_REPLY: &str = "Model returned an empty payload.";

#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn chat(&self, base_url: &str, model: &str, messages: &[ChatMessage]) -> Result<String>;

    async fn embed(&self, base_url: &str, model: &str, text: &str) -> Result<Vec<f32>>;

    async fn list_models(&self, base_url: &str) -> Result<Vec<String>>;
}

#[derive(Debug, Clone)]
pub struct OllamaClient {
    client: reqwest::Client,
}

impl OllamaClient {
    pub fn new(timeout_secs: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self { client })
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
}

#[derive(Debug, Default, Deserialize)]
struct WireMessage {
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    content: String,
}

#[derive(Debug, Default, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    message: Option<WireMessage>,
    #[serde(default)]
    response: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    #[serde(default)]
    embedding: Option<Vec<f32>>,
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelTag>,
}

#[derive(Deserialize)]
struct ModelTag {
    #[serde(default)]
    name: Option<String>,
}

fn endpoint(base_url: &str, path: &str) -> String {
    format!("{}{}", base_url.trim_end_matches('/'), path)
}

/// Fold NDJSON chat chunks into one response: message contents are
/// concatenated, the last `response` and `error` win.
fn aggregate_ndjson(body: &str) -> ChatResponse {
    let lines: Vec<&str> = body
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    if lines.is_empty() {
        return ChatResponse {
            error: Some("Empty NDJSON response".to_string()),
            ..Default::default()
        };
    }

    let mut content = String::new();
    let mut role = None;
    let mut response = None;
    let mut error = None;
    for line in lines {
        let Ok(chunk) = serde_json::from_str::<ChatResponse>(line) else {
            continue;
        };
        if let Some(msg) = chunk.message {
            if msg.role.as_deref().is_some_and(|r| !r.trim().is_empty()) {
                role = msg.role;
            }
            content.push_str(&msg.content);
        }
        if chunk.response.as_deref().is_some_and(|r| !r.trim().is_empty()) {
            response = chunk.response;
        }
        if chunk.error.as_deref().is_some_and(|e| !e.trim().is_empty()) {
            error = chunk.error;
        }
    }

    ChatResponse {
        message: (!content.is_empty()).then(|| WireMessage { role, content }),
        response,
        error,
    }
}

/// Pick the reply text out of a decoded chat response.
fn reply_text(response: ChatResponse) -> Result<String> {
    if let Some(err) = response.error.filter(|e| !e.trim().is_empty()) {
        bail!("{}", err);
    }
    if let Some(msg) = response.message.filter(|m| !m.content.trim().is_empty()) {
        return Ok(msg.content);
    }
    if let Some(text) = response.response.filter(|r| !r.trim().is_empty()) {
        return Ok(text);
    }
    Ok(EMPTY_PAYLOAD_REPLY.to_string())
}

/// Decode a chat response body given its content type.
pub fn parse_chat_body(content_type: &str, body: &str) -> Result<String> {
    let decoded = if content_type.contains("application/x-ndjson") {
        aggregate_ndjson(body)
    } else {
        serde_json::from_str(body)
            .map_err(|e| anyhow::anyhow!("Invalid chat response: {} ({})", e, snippet(body, 120)))?
    };
    reply_text(decoded)
}

async fn ensure_success(response: reqwest::Response, what: &str) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body_text = response.text().await.unwrap_or_default();
    bail!("Ollama {} error {}: {}", what, status, body_text);
}

#[async_trait]
impl ChatBackend for OllamaClient {
    async fn chat(&self, base_url: &str, model: &str, messages: &[ChatMessage]) -> Result<String> {
        tracing::info!(
            target: "assist::ollama",
            model,
            messages = messages.len(),
            "chat request"
        );
        let response = self
            .client
            .post(endpoint(base_url, "/api/chat"))
            .json(&ChatRequest {
                model,
                messages,
                stream: false,
            })
            .send()
            .await
            .map_err(|e| {
                anyhow::anyhow!(
                    "Ollama connection error (is Ollama running at {}?): {}",
                    base_url,
                    e
                )
            })?;
        let response = ensure_success(response, "chat").await?;

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let body = response.text().await?;
        parse_chat_body(&content_type, &body)
    }

    async fn embed(&self, base_url: &str, model: &str, text: &str) -> Result<Vec<f32>> {
        tracing::debug!(
            target: "assist::ollama",
            model,
            prompt = %snippet(text, 80),
            "embedding request"
        );
        let response = self
            .client
            .post(endpoint(base_url, "/api/embeddings"))
            .json(&EmbeddingRequest {
                model,
                prompt: text,
            })
            .send()
            .await
            .map_err(|e| {
                anyhow::anyhow!(
                    "Ollama connection error (is Ollama running at {}?): {}",
                    base_url,
                    e
                )
            })?;
        let response = ensure_success(response, "embedding").await?;
        let parsed: EmbeddingResponse = response.json().await?;
        match parsed.embedding {
            Some(vector) => Ok(vector),
            None => bail!("Embedding response was empty"),
        }
    }

    async fn list_models(&self, base_url: &str) -> Result<Vec<String>> {
        let response = self
            .client
            .get(endpoint(base_url, "/api/tags"))
            .send()
            .await?;
        let response = ensure_success(response, "tags").await?;
        let tags: TagsResponse = response.json().await?;
        let mut names: Vec<String> = tags.models.into_iter().filter_map(|m| m.name).collect();
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_json_message() {
        let body = r#"{"message":{"role":"assistant","content":"Hi"},"done":true}"#;
        assert_eq!(parse_chat_body("application/json", body).unwrap(), "Hi");
    }

    #[test]
    fn test_error_wins() {
        let body = r#"{"message":{"role":"assistant","content":"Hi"},"error":"model not found"}"#;
        let err = parse_chat_body("application/json", body).unwrap_err();
        assert_eq!(err.to_string(), "model not found");
    }

    #[test]
    fn test_response_field_fallback() {
        let body = r#"{"message":{"role":"assistant","content":"  "},"response":"legacy"}"#;
        assert_eq!(parse_chat_body("application/json", body).unwrap(), "legacy");
    }

    #[test]
    fn test_empty_payload_placeholder() {
        assert_eq!(
            parse_chat_body("application/json", "{}").unwrap(),
            EMPTY_PAYLOAD_REPLY
        );
    }

    #[test]
    fn test_ndjson_aggregation() {
        let body = concat!(
            "{\"message\":{\"role\":\"assistant\",\"content\":\"Hel\"},\"done\":false}\n",
            "\n",
            "not json\n",
            "{\"message\":{\"role\":\"assistant\",\"content\":\"lo\"},\"done\":true}\n"
        );
        assert_eq!(
            parse_chat_body("application/x-ndjson", body).unwrap(),
            "Hello"
        );
    }

    #[test]
    fn test_ndjson_empty_body_is_error() {
        assert!(parse_chat_body("application/x-ndjson", "\n\n").is_err());
    }

    #[test]
    fn test_endpoint_trims_slash() {
        assert_eq!(
            endpoint("http://localhost:11434/", "/api/chat"),
            "http://localhost:11434/api/chat"
        );
    }
}
