//! Read-only access to `issues/user_issues.json`.

use anyhow::Result;
use std::path::{Path, PathBuf};

use project_assistant_core::models::UserIssue;

use crate::project::{read_json_text, resolve_root};

/// Location of the issues file relative to the project root.
pub const ISSUES_FILE: &str = "issues/user_issues.json";

pub fn issues_file(root: &Path) -> PathBuf {
    root.join("issues").join("user_issues.json")
}

pub fn load_issues(project: Option<&Path>) -> Result<Vec<UserIssue>> {
    let root = resolve_root(project)?;
    let text = read_json_text(&issues_file(&root), "Issues file")?;
    serde_json::from_str(&text)
        .map_err(|e| anyhow::anyhow!("Failed to parse user issues JSON: {}", e))
}

/// Find an issue by its `issueId` (case-insensitive) or by `#number`.
pub fn find_issue<'a>(issues: &'a [UserIssue], key: &str) -> Option<&'a UserIssue> {
    let key = key.trim();
    let number = key.trim_start_matches('#').parse::<i64>().ok();
    issues.iter().find(|i| {
        i.issue.issue_id.eq_ignore_ascii_case(key) || Some(i.issue.issue_number) == number
    })
}

/// Compact text listing handed to the model.
pub fn format_issues(issues: &[UserIssue]) -> String {
    if issues.is_empty() {
        return format!("No user issues recorded in {}.", ISSUES_FILE);
    }
    let mut out = String::from("User issues:\n");
    for (index, issue) in issues.iter().enumerate() {
        out.push_str(&format!(
            "{}. {} (ID={}, #{})\n",
            index + 1,
            issue.issue.subject,
            issue.issue.issue_id,
            issue.issue.issue_number
        ));
        out.push_str(&format!("   Reporter: {}\n", issue.user_name));
        out.push_str(&format!("   Details: {}\n", issue.issue.description.trim()));
    }
    out.trim().to_string()
}
