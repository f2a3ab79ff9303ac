//! # Project Assistant
//!
//! A project-aware engineering assistant for Ollama-compatible chat models.
//!
//! It indexes a project's documentation into an in-memory knowledge base,
//! answers questions with retrieved context, lets the model call local and
//! GitHub tools through an `MCP_REQUEST:` text protocol, and reviews pull
//! requests on demand, on a timer, or from webhooks.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌──────────────┐   ┌──────────────────┐
//! │  Loader   │──▶│ Embed+Ingest │──▶│  KnowledgeStore   │
//! │ README/src│   │  (Ollama)    │   │  (in memory)      │
//! └───────────┘   └──────────────┘   └────────┬─────────┘
//!                                             │ search + rerank
//!                 ┌──────────────┐   ┌────────▼─────────┐
//!                 │   ToolHub    │◀──│    Assistant     │──▶ answer
//!                 │ workspace/gh │──▶│ (bounded loop)   │
//!                 └──────────────┘   └────────┬─────────┘
//!                                             │
//!                      ┌──────────────────────┤
//!                      ▼                      ▼
//!                 ┌──────────┐          ┌───────────┐
//!                 │ PR review│◀─────────│  webhook  │
//!                 │ + poller │          │  (axum)   │
//!                 └──────────┘          └───────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration with env fallbacks |
//! | [`settings`] | Persisted user settings and tool overrides |
//! | [`ollama`] | Chat/embedding backend trait and Ollama client |
//! | [`github`] | GitHub REST client |
//! | [`git`] | Local git queries |
//! | [`loader`] | Project document discovery and chunking |
//! | [`ingest`] | Embedding pipeline into the knowledge store |
//! | [`issues`], [`tasks`] | Project-local issue list and task tracker |
//! | [`tools`] | Tool registry and executor |
//! | [`assistant`] | Conversation orchestrator |
//! | [`review`] | Pull-request review and auto-review poller |
//! | [`webhook`] | GitHub webhook listener |

pub mod assistant;
pub mod config;
pub mod error;
pub mod git;
pub mod github;
pub mod ingest;
pub mod issues;
pub mod loader;
pub mod ollama;
pub mod project;
pub mod review;
pub mod settings;
pub mod tasks;
pub mod tools;
pub mod webhook;
