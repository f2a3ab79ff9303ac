//! Task draft parsing and normalization.
//!
//! Models hand task-creation tools a JSON payload, often wrapped in a
//! fenced code block. This module strips the fence, validates the JSON
//! shape, and turns each [`TaskDraft`] into a [`ProjectTask`] with a
//! generated id of the form `<slug>-<hex millis>`.

use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::Value;
use uuid::Uuid;

use crate::error::DraftError;
use crate::models::{ProjectTask, TaskDraft};

/// Maximum slug length before the time suffix.
pub const SLUG_MAX_LEN: usize = 24;

const FENCE: &str = "```";

/// Remove a surrounding fenced-code wrapper, if present.
///
/// The first line (the opening fence, with any language tag) is dropped
/// and the body is cut at the last closing fence.
pub fn strip_code_fence(raw: &str) -> String {
    let trimmed = raw.trim();
    if !trimmed.starts_with(FENCE) {
        return trimmed.to_string();
    }
    let Some(fence_end) = trimmed.find('\n') else {
        return trimmed.to_string();
    };
    let body = &trimmed[fence_end + 1..];
    match body.rfind(FENCE) {
        Some(closing) => body[..closing].trim().to_string(),
        None => body.trim().to_string(),
    }
}

fn normalized_payload(payload: Option<&str>) -> Result<String, DraftError> {
    let raw = match payload {
        Some(p) if !p.trim().is_empty() => p,
        _ => return Err(DraftError::MissingPayload),
    };
    let stripped = strip_code_fence(raw);
    if stripped.is_empty() {
        return Err(DraftError::EmptyAfterStripping);
    }
    Ok(stripped)
}

fn classify(err: serde_json::Error) -> DraftError {
    if err.is_data() {
        DraftError::UnexpectedShape(err.to_string())
    } else {
        DraftError::InvalidJson(err.to_string())
    }
}

/// Parse a single task draft object.
pub fn parse_draft_payload(payload: Option<&str>) -> Result<TaskDraft, DraftError> {
    let normalized = normalized_payload(payload)?;
    serde_json::from_str(&normalized).map_err(classify)
}

/// Parse a list of drafts: either a JSON array, or an object with a
/// `tasks` array.
pub fn parse_draft_list_payload(payload: Option<&str>) -> Result<Vec<TaskDraft>, DraftError> {
    let normalized = normalized_payload(payload)?;
    let value: Value = serde_json::from_str(&normalized).map_err(classify)?;
    let array = match value {
        Value::Array(_) => value,
        Value::Object(mut map) => match map.remove("tasks") {
            Some(tasks @ Value::Array(_)) => tasks,
            _ => {
                return Err(DraftError::UnexpectedShape(
                    "expected an array of tasks or an object with a 'tasks' array".to_string(),
                ))
            }
        },
        _ => {
            return Err(DraftError::UnexpectedShape(
                "expected an array of tasks or an object with a 'tasks' array".to_string(),
            ))
        }
    };
    serde_json::from_value(array).map_err(classify)
}

/// Lowercase, collapse non-`[a-z0-9]` runs into `-`, trim, and cap.
pub fn slugify(title: &str) -> String {
    let mut slug = String::new();
    let mut pending_dash = false;
    for ch in title.trim().to_lowercase().chars() {
        if ch.is_ascii_lowercase() || ch.is_ascii_digit() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(ch);
        } else {
            pending_dash = true;
        }
    }
    let capped: String = slug.chars().take(SLUG_MAX_LEN).collect();
    capped.trim_end_matches('-').to_string()
}

static LAST_SUFFIX: AtomicU64 = AtomicU64::new(0);

/// Strictly increasing millisecond stamp, so ids minted within the same
/// millisecond still differ.
fn next_time_suffix() -> u64 {
    let now = chrono::Utc::now().timestamp_millis().max(0) as u64;
    let mut last = LAST_SUFFIX.load(Ordering::Relaxed);
    loop {
        let next = now.max(last + 1);
        match LAST_SUFFIX.compare_exchange_weak(last, next, Ordering::SeqCst, Ordering::Relaxed) {
            Ok(_) => return next,
            Err(actual) => last = actual,
        }
    }
}

/// Generate a task id for `title` that does not collide with `existing`.
///
/// Blank titles get a random UUID.
pub fn generate_task_id(title: &str, existing: &[String]) -> String {
    if title.trim().is_empty() {
        return Uuid::new_v4().to_string();
    }
    let slug = slugify(title);
    loop {
        let suffix = format!("{:x}", next_time_suffix());
        let id = if slug.is_empty() {
            suffix
        } else {
            format!("{}-{}", slug, suffix)
        };
        if !existing.iter().any(|e| e.eq_ignore_ascii_case(&id)) {
            return id;
        }
    }
}

/// Normalize a draft into a task, avoiding ids already in `existing`.
pub fn into_task(draft: TaskDraft, existing: &[String]) -> ProjectTask {
    let id = generate_task_id(&draft.title, existing);
    ProjectTask {
        id,
        title: draft.title.trim().to_string(),
        description: draft.description.trim().to_string(),
        priority: draft.priority,
        requirements: draft
            .requirements
            .into_iter()
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .collect(),
    }
}

/// Normalize a batch. Each new id is also checked against ids minted
/// earlier in the same batch.
pub fn into_tasks(drafts: Vec<TaskDraft>, existing: &[String]) -> Vec<ProjectTask> {
    let mut taken: Vec<String> = existing.to_vec();
    let mut tasks = Vec::with_capacity(drafts.len());
    for draft in drafts {
        let task = into_task(draft, &taken);
        taken.push(task.id.clone());
        tasks.push(task);
    }
    tasks
}
