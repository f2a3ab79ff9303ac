//! Paragraph-boundary text chunker.
//!
//! Splits a file's text into [`TextFragment`]s of at most `max_chars`
//! characters (except for single paragraphs that are already larger).
//! Splitting happens on blank lines so each fragment keeps whole
//! paragraphs together.
//!
//! # Algorithm
//!
//! 1. Normalize `\r\n` to `\n`.
//! 2. Split on `\n\n`.
//! 3. Accumulate trimmed paragraphs into a buffer, joined by a blank line.
//! 4. When `buffer + paragraph + 2` would exceed `max_chars`, flush first.
//! 5. Blank paragraphs are skipped; blank input yields no fragments.
//!
//! # Example
//!
//! ```rust
//! use project_assistant_core::chunk::chunk_text;
//!
//! let fragments = chunk_text("README.md", "Hello world.\n\nSecond paragraph.", 900);
//! assert_eq!(fragments.len(), 1);
//! assert_eq!(fragments[0].content, "Hello world.\n\nSecond paragraph.");
//! ```

use crate::models::TextFragment;

/// Default fragment size cap in characters.
pub const DEFAULT_MAX_CHUNK_CHARS: usize = 900;

/// Split `text` into paragraph-bounded fragments labeled with `source`.
pub fn chunk_text(source: &str, text: &str, max_chars: usize) -> Vec<TextFragment> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    let cleaned = text.replace("\r\n", "\n");
    let mut fragments = Vec::new();
    let mut buffer = String::new();
    let mut buffer_chars = 0usize;

    for paragraph in cleaned.split("\n\n") {
        let trimmed = paragraph.trim();
        if trimmed.is_empty() {
            continue;
        }
        let para_chars = trimmed.chars().count();

        if buffer_chars + para_chars + 2 > max_chars {
            flush(source, &mut buffer, &mut fragments);
            buffer_chars = 0;
        }

        if !buffer.is_empty() {
            buffer.push_str("\n\n");
            buffer_chars += 2;
        }
        buffer.push_str(trimmed);
        buffer_chars += para_chars;
    }
    flush(source, &mut buffer, &mut fragments);

    fragments
}

fn flush(source: &str, buffer: &mut String, out: &mut Vec<TextFragment>) {
    let content = buffer.trim();
    if !content.is_empty() {
        out.push(TextFragment::new(source, content));
    }
    buffer.clear();
}
