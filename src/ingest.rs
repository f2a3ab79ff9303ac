//! Ingestion pipeline: loader → embedding → knowledge store.
//!
//! Embedding failures are non-fatal. A fragment that cannot be embedded
//! is reported as a warning and left out; the rest still replace the
//! store wholesale.

use serde::Serialize;
use std::path::Path;

use project_assistant_core::knowledge::KnowledgeStore;
use project_assistant_core::models::{EmbeddedFragment, TextFragment};

use crate::config::LoaderConfig;
use crate::loader::load_sources;
use crate::ollama::ChatBackend;

/// Summary of one ingestion run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestReport {
    /// Distinct source labels now in the store.
    pub sources: Vec<String>,
    pub chunk_count: usize,
    pub warnings: Vec<String>,
}

/// Text actually sent to the embedding model for one fragment.
pub fn embedding_input(fragment: &TextFragment) -> String {
    format!("Source: {}\n{}", fragment.source, fragment.content)
}

/// Embed `fragments` and swap them into `store`.
pub async fn ingest_fragments(
    backend: &dyn ChatBackend,
    store: &KnowledgeStore,
    fragments: Vec<TextFragment>,
    mut warnings: Vec<String>,
    base_url: &str,
    embedding_model: &str,
) -> IngestReport {
    let mut embedded = Vec::with_capacity(fragments.len());

    for fragment in fragments {
        match backend
            .embed(base_url, embedding_model, &embedding_input(&fragment))
            .await
        {
            Ok(vector) => {
                tracing::debug!(
                    target: "assist::ollama",
                    source = %fragment.source,
                    dims = vector.len(),
                    "fragment embedded"
                );
                embedded.push(EmbeddedFragment::new(fragment, vector));
            }
            Err(e) => {
                tracing::warn!(
                    target: "assist::ollama",
                    source = %fragment.source,
                    error = %e,
                    "fragment embedding failed"
                );
                warnings.push(format!("Embedding failed for {}: {}", fragment.source, e));
            }
        }
    }

    let chunk_count = embedded.len();
    store.replace_all(embedded);

    IngestReport {
        sources: store.sources(),
        chunk_count,
        warnings,
    }
}

/// Load `path` with the configured loader and ingest the result.
pub async fn ingest_path(
    backend: &dyn ChatBackend,
    store: &KnowledgeStore,
    loader: &LoaderConfig,
    path: &Path,
    base_url: &str,
    embedding_model: &str,
) -> IngestReport {
    let loaded = load_sources(path, loader);
    tracing::info!(
        target: "assist::rag",
        files = loaded.sources.len(),
        fragments = loaded.fragments.len(),
        skipped = loaded.skipped.len(),
        "sources loaded"
    );
    ingest_fragments(
        backend,
        store,
        loaded.fragments,
        loaded.skipped,
        base_url,
        embedding_model,
    )
    .await
}
