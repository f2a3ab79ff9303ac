//! Project-root helpers shared by the workspace repositories.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::error::AssistError;

/// Resolve the selected project to a directory. A file selection maps to
/// its parent; no selection is an error.
pub fn resolve_root(project: Option<&Path>) -> Result<PathBuf> {
    let project = project.ok_or(AssistError::ProjectNotSelected)?;
    if project.is_dir() {
        return Ok(project.to_path_buf());
    }
    Ok(project
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| project.to_path_buf()))
}

fn display_absolute(path: &Path) -> String {
    std::path::absolute(path)
        .unwrap_or_else(|_| path.to_path_buf())
        .display()
        .to_string()
}

/// Read a JSON document, dropping any leading BOM or NUL characters.
///
/// `label` names the file in "not found" errors (e.g. "Issues file").
pub fn read_json_text(path: &Path, label: &str) -> Result<String> {
    if !path.exists() {
        anyhow::bail!("{} not found at {}", label, display_absolute(path));
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", display_absolute(path)))?;
    Ok(content
        .trim_start_matches(['\u{feff}', '\u{0}'])
        .trim()
        .to_string())
}

/// Write `content` whole-file through a sibling temp file and a rename,
/// so readers never see a partially written document.
pub fn write_atomic(path: &Path, content: &str) -> Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent)
        .with_context(|| format!("Failed to create directory {}", parent.display()))?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "data".to_string());
    let tmp = parent.join(format!(".{}.{}.tmp", file_name, uuid::Uuid::new_v4()));

    std::fs::write(&tmp, content)
        .with_context(|| format!("Failed to write {}", tmp.display()))?;
    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(e).with_context(|| format!("Failed to replace {}", path.display()));
    }
    Ok(())
}
