//! Tool registry and executor.
//!
//! Tools are grouped into servers:
//!
//! ```text
//! ┌──────────────────────────────┐   ┌──────────────────────────────┐
//! │ workspace (local files)      │   │ github (REST API)            │
//! │  user issues, task tracker   │   │  overview, issues, PRs,      │
//! │  create task / task batch    │   │  commits, branches, people   │
//! └──────────────┬───────────────┘   └──────────────┬───────────────┘
//!                └──────────────┬───────────────────┘
//!                               ▼
//!                 ToolHub::run_tool(id, payload, project)
//! ```
//!
//! The catalog is rebuilt on every call: the workspace group is always
//! present, the github group only when a token is configured and a
//! repository can be resolved. A tool's effective enabled flag is the
//! persisted override, else its default.

pub mod github;
pub mod workspace;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

use project_assistant_core::error::ToolError;
use project_assistant_core::models::{PullRequestReviewBundle, PullRequestSummary};
use project_assistant_core::remote::{default_api_url, DEFAULT_GITHUB_API};
use project_assistant_core::text::snippet;

use crate::config::GithubConfig;
use crate::error::AssistError;
use crate::git::detect_remote_repo;
use crate::github::{GithubClient, GithubRepoConfig};
use crate::settings::SettingsStore;
use crate::tasks::TaskTracker;

/// Tools whose success satisfies a "create a task" request.
pub const TASK_CREATION_TOOL_IDS: &[&str] = &["workspace-create-task", "workspace-create-tasks-batch"];

pub fn is_task_creation_tool(tool_id: &str) -> bool {
    TASK_CREATION_TOOL_IDS
        .iter()
        .any(|id| id.eq_ignore_ascii_case(tool_id))
}

/// Per-call state handed to [`Tool::execute`].
pub struct ToolContext<'a> {
    pub project_root: Option<&'a Path>,
    pub tasks: &'a TaskTracker,
    pub github: &'a GithubClient,
}

/// A callable tool.
///
/// Successful output is compact prose, not raw JSON: it is fed back to
/// the model as a system message.
#[async_trait]
pub trait Tool: Send + Sync {
    fn id(&self) -> &str;

    fn label(&self) -> &str;

    fn description(&self) -> &str;

    fn enabled_by_default(&self) -> bool {
        true
    }

    async fn execute(&self, payload: Option<&str>, ctx: &ToolContext<'_>) -> Result<String>;
}

/// One group of tools before enabled flags are applied.
pub struct ServerDefinition {
    pub id: &'static str,
    pub name: &'static str,
    pub description: String,
    pub online: bool,
    pub tools: Vec<Box<dyn Tool>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolState {
    pub id: String,
    pub server_id: String,
    pub label: String,
    pub description: String,
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerState {
    pub id: String,
    pub name: String,
    pub description: String,
    pub online: bool,
    pub tools: Vec<ToolState>,
}

/// An enabled tool as listed in the system prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolSummary {
    pub id: String,
    pub server_name: String,
    pub description: String,
}

pub struct ToolHub {
    settings: Arc<SettingsStore>,
    github_config: GithubConfig,
    github: GithubClient,
    tasks: Arc<TaskTracker>,
}

impl ToolHub {
    pub fn new(
        settings: Arc<SettingsStore>,
        github_config: GithubConfig,
        github: GithubClient,
        tasks: Arc<TaskTracker>,
    ) -> Self {
        Self {
            settings,
            github_config,
            github,
            tasks,
        }
    }

    pub fn tasks(&self) -> &TaskTracker {
        &self.tasks
    }

    pub fn settings(&self) -> &SettingsStore {
        &self.settings
    }

    /// Resolve the repository the github tools and reviews talk to.
    ///
    /// Explicit owner/repo configuration wins; otherwise the project's
    /// `origin` remote is inspected.
    pub async fn resolve_github(&self, project: Option<&Path>) -> Result<GithubRepoConfig> {
        let token = self
            .github_config
            .token
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .ok_or(AssistError::GithubNotConfigured)?;

        if let (Some(owner), Some(repo)) = (&self.github_config.owner, &self.github_config.repo) {
            let api_url = self
                .github_config
                .api_url
                .clone()
                .unwrap_or_else(|| DEFAULT_GITHUB_API.to_string());
            tracing::debug!(target: "assist::mcp", %owner, %repo, %api_url, "using explicit GitHub settings");
            return Ok(GithubRepoConfig {
                token: token.to_string(),
                owner: owner.clone(),
                repo: repo.clone(),
                api_url,
            });
        }

        let Some(project) = project else {
            tracing::debug!(target: "assist::mcp", "cannot derive GitHub repo without a project");
            return Err(AssistError::RepositoryNotDetected.into());
        };
        let detected = match detect_remote_repo(project).await {
            Ok(found) => found,
            Err(e) => {
                tracing::debug!(target: "assist::mcp", error = %e, "failed to detect git remote");
                None
            }
        };
        let remote = detected.ok_or(AssistError::RepositoryNotDetected)?;
        tracing::debug!(
            target: "assist::mcp",
            host = %remote.host,
            owner = %remote.owner,
            repo = %remote.repo,
            "detected GitHub remote"
        );
        let api_url = self
            .github_config
            .api_url
            .clone()
            .unwrap_or_else(|| default_api_url(&remote.host));
        Ok(GithubRepoConfig {
            token: token.to_string(),
            owner: remote.owner,
            repo: remote.repo,
            api_url,
        })
    }

    async fn build_servers(&self, project: Option<&Path>) -> Vec<ServerDefinition> {
        let mut servers = vec![workspace::server(project.is_some())];
        match self.resolve_github(project).await {
            Ok(config) => servers.push(github::server(config)),
            Err(e) => tracing::debug!(target: "assist::mcp", reason = %e, "github tools unavailable"),
        }
        servers
    }

    fn is_enabled(&self, tool: &dyn Tool) -> bool {
        self.settings
            .tool_override(tool.id())
            .unwrap_or_else(|| tool.enabled_by_default())
    }

    /// The catalog with effective enabled flags.
    pub async fn servers(&self, project: Option<&Path>) -> Vec<ServerState> {
        self.build_servers(project)
            .await
            .into_iter()
            .map(|server| ServerState {
                id: server.id.to_string(),
                name: server.name.to_string(),
                description: server.description.clone(),
                online: server.online,
                tools: server
                    .tools
                    .iter()
                    .map(|tool| ToolState {
                        id: tool.id().to_string(),
                        server_id: server.id.to_string(),
                        label: tool.label().to_string(),
                        description: tool.description().to_string(),
                        enabled: self.is_enabled(tool.as_ref()),
                    })
                    .collect(),
            })
            .collect()
    }

    pub async fn enabled_tools(&self, project: Option<&Path>) -> Vec<ToolSummary> {
        self.servers(project)
            .await
            .into_iter()
            .flat_map(|server| {
                let name = server.name;
                server
                    .tools
                    .into_iter()
                    .filter(|t| t.enabled)
                    .map(move |t| ToolSummary {
                        id: t.id,
                        server_name: name.clone(),
                        description: t.description,
                    })
            })
            .collect()
    }

    /// Persist an override and return the refreshed catalog.
    ///
    /// `tool_id` is matched case-insensitively and stored under the
    /// catalog's own id, so later lookups agree with [`run_tool`](Self::run_tool).
    pub async fn set_tool_enabled(
        &self,
        tool_id: &str,
        enabled: bool,
        project: Option<&Path>,
    ) -> Result<Vec<ServerState>> {
        let servers = self.build_servers(project).await;
        let canonical = servers
            .iter()
            .flat_map(|s| s.tools.iter())
            .find(|t| t.id().eq_ignore_ascii_case(tool_id))
            .map(|t| t.id().to_string())
            .ok_or_else(|| ToolError::UnknownTool(tool_id.to_string()))?;
        self.settings.set_tool_enabled(&canonical, enabled)?;
        tracing::info!(target: "assist::mcp", tool = %canonical, enabled, "tool override saved");
        Ok(self.servers(project).await)
    }

    /// Execute one tool by id (case-insensitive).
    pub async fn run_tool(
        &self,
        tool_id: &str,
        payload: Option<&str>,
        project: Option<&Path>,
    ) -> Result<String> {
        tracing::info!(
            target: "assist::mcp",
            tool = tool_id,
            project = %project.map(|p| p.display().to_string()).unwrap_or_else(|| "none".into()),
            "executing tool request"
        );
        let servers = self.build_servers(project).await;
        let tool = servers
            .iter()
            .flat_map(|s| s.tools.iter())
            .find(|t| t.id().eq_ignore_ascii_case(tool_id))
            .ok_or_else(|| ToolError::UnknownTool(tool_id.to_string()))?;

        if !self.is_enabled(tool.as_ref()) {
            return Err(ToolError::ToolDisabled(tool_id.to_string()).into());
        }

        let ctx = ToolContext {
            project_root: project,
            tasks: &self.tasks,
            github: &self.github,
        };
        match tool.execute(payload, &ctx).await {
            Ok(text) => {
                tracing::info!(target: "assist::mcp", tool = tool_id, result = %snippet(&text, 120), "tool succeeded");
                Ok(text)
            }
            Err(e) => {
                tracing::warn!(target: "assist::mcp", tool = tool_id, error = %e, "tool failed");
                Err(e)
            }
        }
    }

    /// Open pull requests with full detail where available.
    ///
    /// A failed detail fetch falls back to the list entry; entries
    /// without a number are dropped.
    pub async fn list_pull_requests(
        &self,
        project: Option<&Path>,
        limit: usize,
    ) -> Result<Vec<PullRequestSummary>> {
        let config = self.resolve_github(project).await?;
        let listing = self.github.fetch_pull_requests(&config, "open", limit).await?;
        let mut summaries = Vec::with_capacity(listing.len());
        for pr in listing {
            let Some(number) = pr.number else { continue };
            let detailed = match self.github.fetch_pull_request(&config, number).await {
                Ok(detail) => detail,
                Err(e) => {
                    tracing::warn!(target: "assist::mcp", number, error = %e, "failed to fetch PR detail");
                    pr
                }
            };
            if let Some(summary) = detailed.to_summary() {
                summaries.push(summary);
            }
        }
        Ok(summaries)
    }

    /// Detail, changed files and unified diff for one pull request.
    pub async fn pull_request_review_bundle(
        &self,
        project: Option<&Path>,
        number: u64,
    ) -> Result<PullRequestReviewBundle> {
        let config = self.resolve_github(project).await?;
        let detail = self.github.fetch_pull_request(&config, number).await?;
        let summary = detail
            .to_summary()
            .ok_or(AssistError::PullRequestMetadataMissing(number))?;
        let files = self
            .github
            .fetch_pull_request_files(&config, number, github::PR_FILES_LIMIT)
            .await?
            .iter()
            .filter_map(|f| f.to_file_diff())
            .collect();
        let diff = self.github.fetch_pull_request_diff(&config, number).await?;
        Ok(PullRequestReviewBundle {
            summary,
            files,
            diff,
        })
    }
}
