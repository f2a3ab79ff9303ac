//! Small string helpers for logs and prompts.

/// Collapse whitespace and cap at `max` characters, appending `...` when
/// cut. Used to keep log lines readable.
pub fn snippet(text: &str, max: usize) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= max {
        collapsed
    } else {
        let mut cut: String = collapsed.chars().take(max).collect();
        cut.push_str("...");
        cut
    }
}

/// Marker appended by [`limit_text`] when text is cut.
pub const TRUNCATION_MARKER: &str = "\n... (diff truncated)";

/// Cap `text` at `max` characters, appending [`TRUNCATION_MARKER`] when cut.
pub fn limit_text(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max).collect();
    cut.push_str(TRUNCATION_MARKER);
    cut
}
