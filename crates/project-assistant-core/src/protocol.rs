//! Tool-request wire convention.
//!
//! A model asks for a tool by writing the marker followed by a tool id:
//!
//! ```text
//! Let me look at the tracker first.
//! MCP_REQUEST:workspace-create-task {"title":"Fix login"}
//! ```
//!
//! Only the last marker in a message counts, so deliberation text that
//! mentions the marker earlier is never misparsed. Arguments are found in
//! this order: inline after the id, the block after the first newline,
//! then the most recent fenced code block before the marker (a block
//! tagged `json` beats a later untagged one).

use std::sync::OnceLock;

use regex::Regex;

use crate::models::ToolRequest;

/// Literal marker that introduces a tool request.
pub const TOOL_REQUEST_MARKER: &str = "MCP_REQUEST:";

fn fenced_block_regex() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    FENCE.get_or_init(|| {
        Regex::new(r"```(?:([a-zA-Z0-9_-]+))?\s*([\s\S]*?)```").expect("fence regex is valid")
    })
}

/// Parse the tool request in one assistant message, if any.
///
/// ```rust
/// use project_assistant_core::protocol::parse_tool_request;
///
/// let req = parse_tool_request("ok\nMCP_REQUEST:foo\n{\"x\":1}").unwrap();
/// assert_eq!(req.tool_id, "foo");
/// assert_eq!(req.payload.as_deref(), Some("{\"x\":1}"));
/// ```
pub fn parse_tool_request(response: &str) -> Option<ToolRequest> {
    let index = response.rfind(TOOL_REQUEST_MARKER)?;
    let remainder = response[index + TOOL_REQUEST_MARKER.len()..].trim_start();
    if remainder.is_empty() {
        return None;
    }

    let (first_line, rest) = match remainder.find('\n') {
        Some(nl) => (&remainder[..nl], Some(&remainder[nl + 1..])),
        None => (remainder, None),
    };
    if first_line.trim().is_empty() {
        return None;
    }

    let (tool_id, inline) = match first_line.split_once(' ') {
        Some((id, tail)) => (id.trim(), non_blank(tail)),
        None => (first_line.trim(), None),
    };
    if tool_id.is_empty() {
        return None;
    }

    let block = rest.and_then(non_blank);
    let payload = inline
        .or(block)
        .or_else(|| extract_last_code_block(&response[..index]));

    Some(ToolRequest {
        tool_id: tool_id.to_string(),
        payload,
    })
}

/// Body of the last fenced code block in `text`, preferring the last
/// block tagged `json` (any case) when one exists.
pub fn extract_last_code_block(text: &str) -> Option<String> {
    let captures: Vec<_> = fenced_block_regex().captures_iter(text).collect();
    let tagged = captures.iter().rev().find(|c| {
        c.get(1)
            .map(|tag| tag.as_str().eq_ignore_ascii_case("json"))
            .unwrap_or(false)
    });
    let target = tagged.or_else(|| captures.last())?;
    target.get(2).and_then(|body| non_blank(body.as_str()))
}

fn non_blank(text: &str) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_payload_after_newline() {
        let req = parse_tool_request("thinking...MCP_REQUEST:foo\n{\"x\":1}").unwrap();
        assert_eq!(req.tool_id, "foo");
        assert_eq!(req.payload.as_deref(), Some("{\"x\":1}"));
    }

    #[test]
    fn test_no_marker() {
        assert!(parse_tool_request("Here is the answer.").is_none());
    }

    #[test]
    fn test_blank_remainder() {
        assert!(parse_tool_request("MCP_REQUEST:").is_none());
        assert!(parse_tool_request("MCP_REQUEST:   \n  ").is_none());
    }

    #[test]
    fn test_bare_tool_id() {
        let req = parse_tool_request("MCP_REQUEST:workspace-tasks").unwrap();
        assert_eq!(req.tool_id, "workspace-tasks");
        assert!(req.payload.is_none());
    }

    #[test]
    fn test_inline_payload_wins() {
        let req =
            parse_tool_request("MCP_REQUEST:create {\"title\":\"a\"}\n{\"title\":\"b\"}").unwrap();
        assert_eq!(req.tool_id, "create");
        assert_eq!(req.payload.as_deref(), Some("{\"title\":\"a\"}"));
    }

    #[test]
    fn test_only_last_marker_counts() {
        let text = "I could use MCP_REQUEST:first here.\nMCP_REQUEST:second";
        let req = parse_tool_request(text).unwrap();
        assert_eq!(req.tool_id, "second");
        assert!(req.payload.is_none());
    }

    #[test]
    fn test_fenced_json_preferred_over_later_untagged() {
        let text = "Payload:\n```json\n{\"title\":\"A\"}\n```\nNotes:\n```\nplain\n```\nMCP_REQUEST:workspace-create-task";
        let req = parse_tool_request(text).unwrap();
        assert_eq!(req.tool_id, "workspace-create-task");
        assert_eq!(req.payload.as_deref(), Some("{\"title\":\"A\"}"));
    }

    #[test]
    fn test_last_untagged_block_used_without_json_tag() {
        let text = "```\none\n```\n```\ntwo\n```\nMCP_REQUEST:x";
        let req = parse_tool_request(text).unwrap();
        assert_eq!(req.payload.as_deref(), Some("two"));
    }

    #[test]
    fn test_json_tag_is_case_insensitive() {
        assert_eq!(
            extract_last_code_block("```JSON\n{}\n```\n```\nlater\n```").as_deref(),
            Some("{}")
        );
    }

    #[test]
    fn test_empty_fenced_block_is_none() {
        assert!(extract_last_code_block("```json\n```").is_none());
        assert!(extract_last_code_block("no fences").is_none());
    }
}
