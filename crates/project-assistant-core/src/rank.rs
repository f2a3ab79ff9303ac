//! Lexical rerank of dense-retrieval results.
//!
//! Embedding similarity alone often surfaces topically adjacent but
//! keyword-irrelevant fragments for short technical queries. The ranker
//! re-sorts the similarity candidates by how often the query's keywords
//! occur in each fragment, then renders the survivors as a context block
//! for the system prompt.

use std::collections::BTreeSet;
use std::sync::OnceLock;

use regex::Regex;

use crate::models::EmbeddedFragment;

/// Candidates requested from the knowledge store before reranking.
pub const RETRIEVAL_TOP_K: usize = 8;

/// Fragments kept after reranking.
pub const CONTEXT_TOP_N: usize = 4;

/// Separator line between rendered fragments.
pub const CONTEXT_SEPARATOR: &str = "\n---\n";

/// Context block used when retrieval produced nothing.
pub const EMPTY_CONTEXT_PLACEHOLDER: &str =
    "RAG context is empty. Answer using your general knowledge.";

fn word_regex() -> &'static Regex {
    static WORD: OnceLock<Regex> = OnceLock::new();
    WORD.get_or_init(|| Regex::new(r"[\p{L}\p{Nd}]+").expect("word regex is valid"))
}

/// Lowercased letter/digit runs longer than two characters, deduplicated.
pub fn extract_keywords(text: &str) -> BTreeSet<String> {
    let lowered = text.to_lowercase();
    word_regex()
        .find_iter(&lowered)
        .map(|m| m.as_str())
        .filter(|word| word.chars().count() > 2)
        .map(str::to_string)
        .collect()
}

/// Keyword overlap score for one fragment.
///
/// +1 per non-overlapping occurrence of each keyword in the content,
/// +2 when the keyword appears anywhere in the source label.
pub fn keyword_score(fragment: &EmbeddedFragment, keywords: &BTreeSet<String>) -> usize {
    if keywords.is_empty() {
        return 0;
    }
    let content = fragment.content.to_lowercase();
    let source = fragment.source.to_lowercase();

    keywords
        .iter()
        .map(|key| {
            let mut score = content.matches(key.as_str()).count();
            if source.contains(key.as_str()) {
                score += 2;
            }
            score
        })
        .sum()
}

/// Stable re-sort of `candidates` by keyword score, best first.
///
/// With no keywords the similarity order is returned unchanged.
pub fn rerank(query: &str, candidates: Vec<EmbeddedFragment>) -> Vec<EmbeddedFragment> {
    let keywords = extract_keywords(query);
    if keywords.is_empty() || candidates.is_empty() {
        return candidates;
    }
    let mut scored: Vec<(usize, EmbeddedFragment)> = candidates
        .into_iter()
        .map(|f| (keyword_score(&f, &keywords), f))
        .collect();
    // sort_by is stable, so ties keep their similarity order.
    scored.sort_by(|a, b| b.0.cmp(&a.0));
    scored.into_iter().map(|(_, f)| f).collect()
}

/// Render fragments as `[source]\ncontent` blocks joined by `---` lines.
pub fn render_fragments(fragments: &[EmbeddedFragment]) -> String {
    fragments
        .iter()
        .map(|f| format!("[{}]\n{}", f.source, f.content))
        .collect::<Vec<_>>()
        .join(CONTEXT_SEPARATOR)
}

/// Rerank, keep the top [`CONTEXT_TOP_N`], and render.
///
/// Returns [`EMPTY_CONTEXT_PLACEHOLDER`] when nothing survives.
pub fn build_context_block(query: &str, candidates: Vec<EmbeddedFragment>) -> String {
    let mut best = rerank(query, candidates);
    best.truncate(CONTEXT_TOP_N);
    if best.is_empty() {
        return EMPTY_CONTEXT_PLACEHOLDER.to_string();
    }
    render_fragments(&best)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TextFragment;

    fn fragment(source: &str, content: &str) -> EmbeddedFragment {
        EmbeddedFragment::new(TextFragment::new(source, content), vec![1.0])
    }

    #[test]
    fn test_keywords_lowercase_and_length_filtered() {
        let keywords = extract_keywords("How do I run the Auth tests? ok");
        let expected: BTreeSet<String> = ["how", "run", "the", "auth", "tests"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(keywords, expected);
    }

    #[test]
    fn test_keywords_unicode_letters() {
        let keywords = extract_keywords("Проект README_v2");
        assert!(keywords.contains("проект"));
        assert!(keywords.contains("readme"));
        assert!(!keywords.contains("v2"));
    }

    #[test]
    fn test_score_counts_content_and_source() {
        let keywords: BTreeSet<String> = ["auth".to_string()].into_iter().collect();
        assert_eq!(keyword_score(&fragment("b.md", "auth auth"), &keywords), 2);
        assert_eq!(keyword_score(&fragment("auth.md", "AUTH"), &keywords), 3);
        assert_eq!(keyword_score(&fragment("a.md", "no match"), &keywords), 0);
    }

    #[test]
    fn test_score_non_overlapping() {
        let keywords: BTreeSet<String> = ["aaa".to_string()].into_iter().collect();
        assert_eq!(keyword_score(&fragment("x", "aaaaaa"), &keywords), 2);
        assert_eq!(keyword_score(&fragment("x", "aaaaa"), &keywords), 1);
    }

    #[test]
    fn test_rerank_moves_keyword_match_first() {
        let candidates = vec![fragment("a.md", "no match"), fragment("b.md", "auth auth")];
        let ranked = rerank("auth", candidates);
        assert_eq!(ranked[0].source, "b.md");
        assert_eq!(ranked[1].source, "a.md");
    }

    #[test]
    fn test_rerank_without_keywords_keeps_order() {
        let candidates = vec![fragment("a.md", "x"), fragment("b.md", "y"), fragment("c.md", "z")];
        let ranked = rerank("a b ?", candidates.clone());
        assert_eq!(ranked, candidates);
    }

    #[test]
    fn test_rerank_ties_are_stable() {
        let candidates = vec![
            fragment("1.md", "none"),
            fragment("2.md", "cache"),
            fragment("3.md", "none"),
            fragment("4.md", "cache"),
        ];
        let ranked = rerank("cache", candidates);
        let order: Vec<&str> = ranked.iter().map(|f| f.source.as_str()).collect();
        assert_eq!(order, vec!["2.md", "4.md", "1.md", "3.md"]);
    }

    #[test]
    fn test_context_block_format_and_cap() {
        let candidates: Vec<EmbeddedFragment> = (0..6)
            .map(|i| fragment(&format!("{}.md", i), &format!("body {}", i)))
            .collect();
        let block = build_context_block("?", candidates);
        assert_eq!(block.matches("\n---\n").count(), 3);
        assert!(block.starts_with("[0.md]\nbody 0\n---\n[1.md]"));
        assert!(!block.contains("4.md"));
    }

    #[test]
    fn test_context_block_placeholder() {
        assert_eq!(build_context_block("anything", Vec::new()), EMPTY_CONTEXT_PLACEHOLDER);
    }
}
