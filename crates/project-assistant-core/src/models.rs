//! Core data models shared by the knowledge store, the conversation
//! orchestrator, and the workspace repositories.
//!
//! JSON field names on persisted types (`UserIssue`, `ProjectTask`) match
//! the on-disk files other tools write, so they use explicit renames.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// A paragraph-bounded slice of one source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextFragment {
    /// Root-relative label of the file the text came from.
    pub source: String,
    pub content: String,
}

impl TextFragment {
    pub fn new(source: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            content: content.into(),
        }
    }
}

/// A [`TextFragment`] with its embedding vector attached.
///
/// Owned by the knowledge store; never mutated after construction.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddedFragment {
    pub id: String,
    pub source: String,
    pub content: String,
    pub embedding: Vec<f32>,
}

impl EmbeddedFragment {
    pub fn new(fragment: TextFragment, embedding: Vec<f32>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            source: fragment.source,
            content: fragment.content,
            embedding,
        }
    }
}

/// Speaker of a [`ChatMessage`], serialized the way chat backends expect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatRole::System => "system",
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        }
    }
}

/// One entry of a conversation transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(ChatRole::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(ChatRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(ChatRole::Assistant, content)
    }
}

/// A tool invocation directive parsed out of one assistant message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolRequest {
    pub tool_id: String,
    pub payload: Option<String>,
}

/// Task priority as stored in `task_tracker/tasks.json`.
///
/// Serialized upper-case; parsing is case-insensitive because models
/// rarely agree on casing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskPriority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl TaskPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskPriority::Low => "LOW",
            TaskPriority::Medium => "MEDIUM",
            TaskPriority::High => "HIGH",
            TaskPriority::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskPriority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "LOW" => Ok(TaskPriority::Low),
            "MEDIUM" => Ok(TaskPriority::Medium),
            "HIGH" => Ok(TaskPriority::High),
            "CRITICAL" => Ok(TaskPriority::Critical),
            other => Err(format!(
                "unknown priority '{}'; expected LOW, MEDIUM, HIGH, or CRITICAL",
                other
            )),
        }
    }
}

impl<'de> Deserialize<'de> for TaskPriority {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Unvalidated task fields supplied by the user or the model.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TaskDraft {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub priority: TaskPriority,
    #[serde(default)]
    pub requirements: Vec<String>,
}

/// A persisted task tracker entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectTask {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub priority: TaskPriority,
    #[serde(default)]
    pub requirements: Vec<String>,
}

/// One entry of `issues/user_issues.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIssue {
    #[serde(rename = "userName")]
    pub user_name: String,
    pub issue: IssueDetails,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueDetails {
    #[serde(rename = "issueId")]
    pub issue_id: String,
    #[serde(rename = "issueNumber")]
    pub issue_number: i64,
    pub subject: String,
    #[serde(rename = "issue")]
    pub description: String,
}

/// Normalized pull-request metadata used by reviews and the poller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PullRequestSummary {
    pub number: u64,
    pub title: String,
    pub author: String,
    pub url: String,
    /// Opaque `updated_at` string as returned by the API.
    pub updated_at: String,
    pub body: String,
    pub additions: u64,
    pub deletions: u64,
    pub changed_files: u64,
    pub base_branch: String,
    pub head_branch: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PullRequestFileDiff {
    pub filename: String,
    pub status: String,
    pub additions: u64,
    pub deletions: u64,
    pub changes: u64,
    pub patch: Option<String>,
}

/// Everything a single review request needs.
#[derive(Debug, Clone)]
pub struct PullRequestReviewBundle {
    pub summary: PullRequestSummary,
    pub files: Vec<PullRequestFileDiff>,
    /// Unified diff text.
    pub diff: String,
}

/// A repository location inferred from a git remote URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemoteRepo {
    pub host: String,
    pub owner: String,
    pub repo: String,
}
