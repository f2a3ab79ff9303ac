//! # Project Assistant Core
//!
//! Shared, I/O-free logic for Project Assistant: data models, the
//! paragraph chunker, the in-memory knowledge store, context reranking,
//! the tool-request wire convention, and task draft parsing.
//!
//! This crate contains no tokio, reqwest, filesystem, or process
//! dependencies. Everything here is deterministic given its inputs
//! (task identifiers aside, which embed a time-derived suffix).

pub mod chunk;
pub mod embedding;
pub mod error;
pub mod knowledge;
pub mod models;
pub mod protocol;
pub mod rank;
pub mod remote;
pub mod task;
pub mod text;
