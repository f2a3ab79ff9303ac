//! Typed failures callers need to tell apart.
//!
//! Both enums travel inside `anyhow::Error` at the application layer;
//! match on them with `downcast_ref`.

use thiserror::Error;

/// Tool catalog lookups that fail before any tool runs.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),
    #[error("Tool {0} is disabled")]
    ToolDisabled(String),
}

/// Task draft payloads that cannot become tasks.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DraftError {
    #[error("Task payload is missing. Provide JSON with title, description, priority, and requirements.")]
    MissingPayload,
    #[error("Task payload is empty after removing code fences.")]
    EmptyAfterStripping,
    #[error("Task payload is not valid JSON: {0}")]
    InvalidJson(String),
    #[error("Task payload has an unexpected shape: {0}")]
    UnexpectedShape(String),
}
