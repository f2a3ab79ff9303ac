//! GitHub tool and review tests against a local mock of the REST API.
//!
//! The mock is an axum router bound to an ephemeral port; the tool hub
//! points at it through an explicit `api_url`, so nothing leaves the
//! machine.

use anyhow::Result;
use async_trait::async_trait;
use axum::extract::{Path as UrlPath, State};
use axum::http::{header, HeaderMap};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use project_assistant::assistant::Assistant;
use project_assistant::config::{GithubConfig, LoaderConfig, ReviewConfig};
use project_assistant::github::GithubClient;
use project_assistant::ollama::ChatBackend;
use project_assistant::review::{AutoReviewer, PollOutcome, ReviewTarget};
use project_assistant::settings::SettingsStore;
use project_assistant::tasks::TaskTracker;
use project_assistant::tools::ToolHub;
use project_assistant_core::knowledge::KnowledgeStore;
use project_assistant_core::models::ChatMessage;
use serde_json::json;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::{mpsc, Notify};

const DIFF: &str = "diff --git a/src/cache.rs b/src/cache.rs\n+pub fn get() {}\n";

// ─── Mock GitHub ────────────────────────────────────────────────────

async fn repository() -> Json<serde_json::Value> {
    Json(json!({
        "name": "widgets",
        "description": "Widget factory",
        "language": "Rust",
        "default_branch": "main",
        "stargazers_count": 12,
        "open_issues_count": 3,
        "html_url": "https://github.com/acme/widgets",
        "topics": ["ignored"]
    }))
}

async fn pulls() -> Json<serde_json::Value> {
    Json(json!([
        {"number": 42, "title": "Add cache", "user": {"login": "ann"}},
        {"title": "no number, dropped"}
    ]))
}

/// `updated_at` served for every pull request; tests change it to
/// simulate a push.
type UpdatedAt = Arc<Mutex<String>>;

async fn pull(
    State(updated_at): State<UpdatedAt>,
    UrlPath(number): UrlPath<u64>,
    headers: HeaderMap,
) -> Response {
    let wants_diff = headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("diff"));
    if wants_diff {
        return DIFF.into_response();
    }
    Json(json!({
        "number": number,
        "title": "Add cache",
        "user": {"login": "ann"},
        "body": "Adds an LRU cache.",
        "additions": 10,
        "deletions": 2,
        "changed_files": 1,
        "base": {"ref": "main"},
        "head": {"ref": "feature/cache"},
        "updated_at": updated_at.lock().unwrap().clone(),
        "html_url": format!("https://github.com/acme/widgets/pull/{}", number)
    }))
    .into_response()
}

async fn pull_files() -> Json<serde_json::Value> {
    Json(json!([
        {"filename": "src/cache.rs", "status": "added", "additions": 10, "deletions": 2, "changes": 12},
        {"status": "removed"}
    ]))
}

async fn start_mock_github() -> String {
    start_mock_github_with(Arc::new(Mutex::new("2024-05-01T00:00:00Z".to_string()))).await
}

async fn start_mock_github_with(updated_at: UpdatedAt) -> String {
    let app = Router::new()
        .route("/repos/acme/widgets", get(repository))
        .route("/repos/acme/widgets/pulls", get(pulls))
        .route("/repos/acme/widgets/pulls/{number}", get(pull))
        .route("/repos/acme/widgets/pulls/{number}/files", get(pull_files))
        .with_state(updated_at);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

// ─── Helpers ────────────────────────────────────────────────────────

fn hub(state: &TempDir, api_url: &str) -> ToolHub {
    ToolHub::new(
        Arc::new(SettingsStore::new(state.path().join("state.json"))),
        GithubConfig {
            token: Some("test-token".to_string()),
            owner: Some("acme".to_string()),
            repo: Some("widgets".to_string()),
            api_url: Some(api_url.to_string()),
        },
        GithubClient::new().unwrap(),
        Arc::new(TaskTracker::new()),
    )
}

/// Backend that records every chat transcript and answers "LGTM".
#[derive(Default)]
struct RecordingBackend {
    transcripts: Mutex<Vec<Vec<ChatMessage>>>,
}

#[async_trait]
impl ChatBackend for RecordingBackend {
    async fn chat(&self, _base_url: &str, _model: &str, messages: &[ChatMessage]) -> Result<String> {
        self.transcripts.lock().unwrap().push(messages.to_vec());
        Ok("LGTM".to_string())
    }

    async fn embed(&self, _base_url: &str, _model: &str, _text: &str) -> Result<Vec<f32>> {
        Ok(vec![1.0, 0.0])
    }

    async fn list_models(&self, _base_url: &str) -> Result<Vec<String>> {
        Ok(Vec::new())
    }
}

// ─── Tools ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_repo_overview_tool() {
    let api = start_mock_github().await;
    let state = TempDir::new().unwrap();
    let hub = hub(&state, &api);

    let text = hub
        .run_tool("github-repo-overview", None, None)
        .await
        .unwrap();
    assert_eq!(
        text,
        "Repository: acme/widgets\nDescription: Widget factory\nLanguage: Rust\nDefault branch: main\nStars: 12\nOpen issues: 3\nURL: https://github.com/acme/widgets"
    );
}

#[tokio::test]
async fn test_disabled_github_tool_is_refused() {
    let api = start_mock_github().await;
    let state = TempDir::new().unwrap();
    let hub = hub(&state, &api);

    let err = hub
        .run_tool("github-open-prs", None, None)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("disabled"));

    hub.set_tool_enabled("github-open-prs", true, None)
        .await
        .unwrap();
    let text = hub
        .run_tool("github-open-prs", None, None)
        .await
        .unwrap();
    assert!(text.contains("#42 Add cache (by ann)"));
}

#[tokio::test]
async fn test_list_pull_requests_uses_detail() {
    let api = start_mock_github().await;
    let state = TempDir::new().unwrap();
    let hub = hub(&state, &api);

    let pulls = hub.list_pull_requests(None, 5).await.unwrap();
    assert_eq!(pulls.len(), 1);
    assert_eq!(pulls[0].number, 42);
    assert_eq!(pulls[0].head_branch, "feature/cache");
    assert_eq!(pulls[0].updated_at, "2024-05-01T00:00:00Z");
}

#[tokio::test]
async fn test_review_bundle() {
    let api = start_mock_github().await;
    let state = TempDir::new().unwrap();
    let hub = hub(&state, &api);

    let bundle = hub.pull_request_review_bundle(None, 42).await.unwrap();
    assert_eq!(bundle.summary.title, "Add cache");
    assert_eq!(bundle.files.len(), 1);
    assert_eq!(bundle.files[0].filename, "src/cache.rs");
    assert_eq!(bundle.diff, DIFF);
}

#[tokio::test]
async fn test_unreachable_api_surfaces_error() {
    let state = TempDir::new().unwrap();
    let hub = hub(&state, "http://127.0.0.1:9");
    assert!(hub.pull_request_review_bundle(None, 1).await.is_err());
}

// ─── Review ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_review_pull_request_sends_diff() {
    let api = start_mock_github().await;
    let state = TempDir::new().unwrap();
    let backend = Arc::new(RecordingBackend::default());
    let assistant = Assistant::new(
        backend.clone(),
        Arc::new(KnowledgeStore::new()),
        hub(&state, &api),
        LoaderConfig::default(),
        ReviewConfig::default(),
    );

    let review = assistant
        .review_pull_request(42, "http://localhost:11434", "llama3.1", "nomic-embed-text", None)
        .await
        .unwrap();
    assert_eq!(review, "LGTM");

    let transcripts = backend.transcripts.lock().unwrap();
    assert_eq!(transcripts.len(), 1);
    let messages = &transcripts[0];
    assert_eq!(messages.len(), 2);
    assert!(messages[0]
        .content
        .ends_with("Project context snippets:\nNo relevant context found in the knowledge base."));
    assert!(messages[1]
        .content
        .starts_with("Review pull request #42: Add cache\nAuthor: ann (feature/cache -> main)"));
    assert!(messages[1].content.contains(&format!("```diff\n{}\n```", DIFF)));
}

// ─── Auto review ────────────────────────────────────────────────────

/// Backend whose chat fails while `failing` is set; counts chat calls.
#[derive(Default)]
struct FlakyBackend {
    failing: AtomicBool,
    chats: AtomicUsize,
}

#[async_trait]
impl ChatBackend for FlakyBackend {
    async fn chat(&self, _base_url: &str, _model: &str, _messages: &[ChatMessage]) -> Result<String> {
        self.chats.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            anyhow::bail!("model unavailable");
        }
        Ok("Looks fine.".to_string())
    }

    async fn embed(&self, _base_url: &str, _model: &str, _text: &str) -> Result<Vec<f32>> {
        Ok(vec![1.0])
    }

    async fn list_models(&self, _base_url: &str) -> Result<Vec<String>> {
        Ok(Vec::new())
    }
}

/// Backend whose chat blocks until `release` is notified.
#[derive(Default)]
struct GatedBackend {
    entered: Notify,
    release: Notify,
}

#[async_trait]
impl ChatBackend for GatedBackend {
    async fn chat(&self, _base_url: &str, _model: &str, _messages: &[ChatMessage]) -> Result<String> {
        self.entered.notify_one();
        self.release.notified().await;
        Ok("Reviewed after stop.".to_string())
    }

    async fn embed(&self, _base_url: &str, _model: &str, _text: &str) -> Result<Vec<f32>> {
        Ok(vec![1.0])
    }

    async fn list_models(&self, _base_url: &str) -> Result<Vec<String>> {
        Ok(Vec::new())
    }
}

fn reviewer(state: &TempDir, api: &str, backend: Arc<dyn ChatBackend>) -> Arc<AutoReviewer> {
    let assistant = Arc::new(Assistant::new(
        backend,
        Arc::new(KnowledgeStore::new()),
        hub(state, api),
        LoaderConfig::default(),
        ReviewConfig::default(),
    ));
    Arc::new(AutoReviewer::new(
        assistant,
        ReviewTarget {
            base_url: "http://localhost:11434".to_string(),
            chat_model: "llama3.1".to_string(),
            embedding_model: "nomic-embed-text".to_string(),
            project_root: None,
        },
    ))
}

#[tokio::test]
async fn test_poll_reviews_only_changed_pull_requests() {
    let updated_at: UpdatedAt = Arc::new(Mutex::new("2024-05-01T00:00:00Z".to_string()));
    let api = start_mock_github_with(updated_at.clone()).await;
    let state = TempDir::new().unwrap();
    let backend = Arc::new(FlakyBackend::default());
    let reviewer = reviewer(&state, &api, backend.clone());

    match reviewer.poll_once().await.unwrap() {
        PollOutcome::Reviewed(done) => {
            assert_eq!(done.pull_request.number, 42);
            assert_eq!(done.review, "Looks fine.");
        }
        PollOutcome::Idle => panic!("first poll should review PR #42"),
    }
    assert!(matches!(reviewer.poll_once().await.unwrap(), PollOutcome::Idle));
    assert_eq!(backend.chats.load(Ordering::SeqCst), 1);

    *updated_at.lock().unwrap() = "2024-05-02T09:30:00Z".to_string();
    assert!(matches!(
        reviewer.poll_once().await.unwrap(),
        PollOutcome::Reviewed(_)
    ));
    assert!(matches!(reviewer.poll_once().await.unwrap(), PollOutcome::Idle));
    assert_eq!(backend.chats.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_failed_review_leaves_pull_request_pending() {
    let api = start_mock_github().await;
    let state = TempDir::new().unwrap();
    let backend = Arc::new(FlakyBackend::default());
    backend.failing.store(true, Ordering::SeqCst);
    let reviewer = reviewer(&state, &api, backend.clone());

    assert!(reviewer.poll_once().await.is_err());

    backend.failing.store(false, Ordering::SeqCst);
    match reviewer.poll_once().await.unwrap() {
        PollOutcome::Reviewed(done) => assert_eq!(done.pull_request.number, 42),
        PollOutcome::Idle => panic!("failed review must not record the marker"),
    }
    assert!(matches!(reviewer.poll_once().await.unwrap(), PollOutcome::Idle));
}

#[tokio::test]
async fn test_stop_ends_idle_wait() {
    let api = start_mock_github().await;
    let state = TempDir::new().unwrap();
    let reviewer = reviewer(&state, &api, Arc::new(FlakyBackend::default()));
    let (tx, mut rx) = mpsc::channel(4);

    let handle = reviewer.spawn(Duration::from_secs(3600), tx);
    let first = tokio::time::timeout(Duration::from_secs(10), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first.pull_request.number, 42);
    assert!(handle.is_running());

    handle.stop();
    tokio::time::timeout(Duration::from_secs(5), handle.join())
        .await
        .expect("poller should exit without waiting for the interval");
}

#[tokio::test]
async fn test_stop_lets_in_flight_review_finish() {
    let api = start_mock_github().await;
    let state = TempDir::new().unwrap();
    let backend = Arc::new(GatedBackend::default());
    let reviewer = reviewer(&state, &api, backend.clone());
    let (tx, mut rx) = mpsc::channel(4);

    let handle = reviewer.spawn(Duration::from_secs(3600), tx);
    tokio::time::timeout(Duration::from_secs(10), backend.entered.notified())
        .await
        .unwrap();
    handle.stop();
    backend.release.notify_one();

    let done = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(done.review, "Reviewed after stop.");
    tokio::time::timeout(Duration::from_secs(5), handle.join())
        .await
        .unwrap();
}
