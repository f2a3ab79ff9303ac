//! In-memory store of embedded fragments.
//!
//! One [`Mutex`] guards both the whole-set swap and every read, so a
//! search always runs against either the previous or the new fragment
//! set and never a mix. Ingestion is rare and searches are short, so
//! serializing the two is acceptable.

use std::sync::{Mutex, MutexGuard};

use crate::embedding::cosine_similarity;
use crate::models::EmbeddedFragment;

/// Shared knowledge store. Cheap to wrap in an `Arc`.
#[derive(Debug, Default)]
pub struct KnowledgeStore {
    fragments: Mutex<Vec<EmbeddedFragment>>,
}

impl KnowledgeStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn guard(&self) -> MutexGuard<'_, Vec<EmbeddedFragment>> {
        // A panic while holding the lock cannot leave a half-swapped vector.
        self.fragments
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Replace the entire fragment set.
    pub fn replace_all(&self, fragments: Vec<EmbeddedFragment>) {
        *self.guard() = fragments;
    }

    pub fn clear(&self) {
        self.replace_all(Vec::new());
    }

    pub fn is_empty(&self) -> bool {
        self.guard().is_empty()
    }

    pub fn len(&self) -> usize {
        self.guard().len()
    }

    /// Distinct source labels in first-seen order.
    pub fn sources(&self) -> Vec<String> {
        let fragments = self.guard();
        let mut seen: Vec<String> = Vec::new();
        for fragment in fragments.iter() {
            if !seen.iter().any(|s| s == &fragment.source) {
                seen.push(fragment.source.clone());
            }
        }
        seen
    }

    /// Copy of the current fragment set.
    pub fn snapshot(&self) -> Vec<EmbeddedFragment> {
        self.guard().clone()
    }

    /// Up to `top_k` fragments with positive cosine similarity to `query`,
    /// best first.
    pub fn search(&self, query: &[f32], top_k: usize) -> Vec<EmbeddedFragment> {
        if query.is_empty() || top_k == 0 {
            return Vec::new();
        }
        let fragments = self.guard();
        if fragments.is_empty() {
            return Vec::new();
        }

        let mut scored: Vec<(f32, &EmbeddedFragment)> = fragments
            .iter()
            .map(|f| (cosine_similarity(query, &f.embedding), f))
            .filter(|(score, _)| *score > 0.0)
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        scored
            .into_iter()
            .take(top_k)
            .map(|(_, f)| f.clone())
            .collect()
    }
}
