//! Application-level failures callers branch on.
//!
//! Everything else travels as a plain `anyhow::Error` with context.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AssistError {
    #[error("Project path is not selected.")]
    ProjectNotSelected,
    #[error("GitHub MCP is not configured.")]
    GithubNotConfigured,
    #[error("Unable to detect GitHub repository for the selected project.")]
    RepositoryNotDetected,
    #[error("Exceeded MCP tool request limit ({attempts} attempts).")]
    ToolRoundTripLimit { attempts: usize },
    #[error("Pull request {0} is missing required metadata.")]
    PullRequestMetadataMissing(u64),
    #[error("Task list for batch creation is empty.")]
    EmptyTaskBatch,
    #[error("Task with id={0} was not found.")]
    TaskNotFound(String),
}
