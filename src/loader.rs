//! Project document discovery.
//!
//! Picks which files of a project feed the knowledge store and chunks
//! them into paragraph-bounded fragments.
//!
//! For a directory selection the targets are, in order and deduplicated:
//!
//! 1. `README.md` at the root;
//! 2. every allowed file under `project/docs/`;
//! 3. every allowed file under `src/`;
//! 4. every `.md` file at depth ≤ 2;
//! 5. if nothing matched so far, every allowed file at depth ≤ 2.
//!
//! A file selection loads just that file. "Allowed" means the extension
//! is listed in `loader.extensions` and the file is no larger than
//! `loader.max_file_bytes`.

use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

use project_assistant_core::chunk::chunk_text;
use project_assistant_core::models::TextFragment;

use crate::config::LoaderConfig;

/// Output of [`load_sources`].
#[derive(Debug, Default)]
pub struct LoadResult {
    pub fragments: Vec<TextFragment>,
    /// Files that were selected, in load order.
    pub sources: Vec<PathBuf>,
    /// One warning per file that could not be read.
    pub skipped: Vec<String>,
}

const EXCLUDED_DIRS: &[&str] = &[".git", "target", "node_modules", "build", ".gradle", ".idea"];

fn is_excluded(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .map(|name| EXCLUDED_DIRS.contains(&name))
            .unwrap_or(false)
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default()
}

fn is_allowed(path: &Path, config: &LoaderConfig) -> bool {
    let ext = extension_of(path);
    if !config.extensions.iter().any(|e| e.eq_ignore_ascii_case(&ext)) {
        return false;
    }
    std::fs::metadata(path)
        .map(|m| m.len() <= config.max_file_bytes)
        .unwrap_or(false)
}

fn walk_files(root: &Path, max_depth: Option<usize>) -> impl Iterator<Item = PathBuf> {
    let mut walker = WalkDir::new(root).sort_by_file_name();
    if let Some(depth) = max_depth {
        walker = walker.max_depth(depth);
    }
    walker
        .into_iter()
        .filter_entry(|e| !is_excluded(e))
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
}

fn push_unique(files: &mut Vec<PathBuf>, path: PathBuf) {
    if !files.contains(&path) {
        files.push(path);
    }
}

/// Files a selection resolves to, in load order.
pub fn collect_targets(selection: &Path, config: &LoaderConfig) -> Vec<PathBuf> {
    if selection.is_file() {
        return vec![selection.to_path_buf()];
    }
    if !selection.is_dir() {
        return Vec::new();
    }

    let mut files = Vec::new();

    let readme = selection.join("README.md");
    if readme.is_file() {
        push_unique(&mut files, readme);
    }

    for dir in [selection.join("project").join("docs"), selection.join("src")] {
        if dir.is_dir() {
            for path in walk_files(&dir, None).filter(|p| is_allowed(p, config)) {
                push_unique(&mut files, path);
            }
        }
    }

    for path in walk_files(selection, Some(2)).filter(|p| extension_of(p) == "md") {
        push_unique(&mut files, path);
    }

    if files.is_empty() {
        for path in walk_files(selection, Some(2)).filter(|p| is_allowed(p, config)) {
            push_unique(&mut files, path);
        }
    }

    files
}

/// Root-relative label with `/` separators, or the bare file name when
/// the file is outside `root`.
pub fn label_for(root: &Path, target: &Path) -> String {
    let file_name = || {
        target
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| target.display().to_string())
    };
    match target.strip_prefix(root) {
        Ok(relative) if !relative.as_os_str().is_empty() => relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/"),
        _ => file_name(),
    }
}

/// Load and chunk every target of `selection`.
pub fn load_sources(selection: &Path, config: &LoaderConfig) -> LoadResult {
    let normalized = std::path::absolute(selection).unwrap_or_else(|_| selection.to_path_buf());
    let root = if normalized.is_dir() {
        normalized.clone()
    } else {
        normalized
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| normalized.clone())
    };

    let sources = collect_targets(&normalized, config);
    let mut result = LoadResult::default();

    for file in &sources {
        match std::fs::read_to_string(file) {
            Ok(content) => {
                let label = label_for(&root, file);
                result
                    .fragments
                    .extend(chunk_text(&label, &content, config.max_chunk_chars));
            }
            Err(e) => {
                let name = file
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default();
                result.skipped.push(format!("Cannot read {}: {}", name, e));
            }
        }
    }

    result.sources = sources;
    result
}
