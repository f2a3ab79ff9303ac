//! Task tracker persisted at `task_tracker/tasks.json`.
//!
//! Writes rewrite the whole file through a temp file and a rename. Within
//! one process, every read-modify-write runs under the tracker's async
//! mutex, so concurrent task-creation tool calls append instead of
//! overwriting each other. Separate processes are not coordinated; the
//! last writer wins.

use anyhow::Result;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

use project_assistant_core::models::{ProjectTask, TaskDraft};
use project_assistant_core::task::into_tasks;

use crate::error::AssistError;
use crate::project::{read_json_text, resolve_root, write_atomic};

pub fn tasks_file(root: &Path) -> PathBuf {
    root.join("task_tracker").join("tasks.json")
}

fn read_tasks(file: &Path) -> Result<Vec<ProjectTask>> {
    let text = read_json_text(file, "Task tracker file")?;
    if text.is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(&text).map_err(|e| anyhow::anyhow!("Failed to parse task tracker JSON: {}", e))
}

fn write_tasks(file: &Path, tasks: &[ProjectTask]) -> Result<()> {
    let json = serde_json::to_string_pretty(tasks)?;
    write_atomic(file, &json)
}

#[derive(Debug, Default)]
pub struct TaskTracker {
    write_lock: Mutex<()>,
}

impl TaskTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tasks currently on disk. A missing file is an error; a blank file
    /// is an empty tracker.
    pub async fn load_tasks(&self, project: Option<&Path>) -> Result<Vec<ProjectTask>> {
        let root = resolve_root(project)?;
        read_tasks(&tasks_file(&root))
    }

    pub async fn create_task(&self, project: Option<&Path>, draft: TaskDraft) -> Result<ProjectTask> {
        let mut created = self.create_tasks(project, vec![draft]).await?;
        created
            .pop()
            .ok_or_else(|| anyhow::anyhow!("Task creation produced no task"))
    }

    /// Append one task per draft in a single write.
    pub async fn create_tasks(
        &self,
        project: Option<&Path>,
        drafts: Vec<TaskDraft>,
    ) -> Result<Vec<ProjectTask>> {
        if drafts.is_empty() {
            return Err(AssistError::EmptyTaskBatch.into());
        }
        let root = resolve_root(project)?;
        let file = tasks_file(&root);

        let _guard = self.write_lock.lock().await;
        let mut current = if file.exists() {
            read_tasks(&file)?
        } else {
            Vec::new()
        };
        let existing_ids: Vec<String> = current.iter().map(|t| t.id.clone()).collect();
        let new_tasks = into_tasks(drafts, &existing_ids);

        current.extend(new_tasks.iter().cloned());
        write_tasks(&file, &current)?;

        tracing::info!(
            target: "assist::mcp",
            created = new_tasks.len(),
            total = current.len(),
            "tasks appended"
        );
        Ok(new_tasks)
    }

    /// Remove the task with `task_id` (case-insensitive) and return it.
    pub async fn delete_task(&self, project: Option<&Path>, task_id: &str) -> Result<ProjectTask> {
        let root = resolve_root(project)?;
        let file = tasks_file(&root);

        let _guard = self.write_lock.lock().await;
        let mut current = read_tasks(&file)?;
        let index = current
            .iter()
            .position(|t| t.id.eq_ignore_ascii_case(task_id))
            .ok_or_else(|| AssistError::TaskNotFound(task_id.to_string()))?;
        let removed = current.remove(index);
        write_tasks(&file, &current)?;
        Ok(removed)
    }
}

/// Compact text listing handed to the model.
pub fn format_tasks(tasks: &[ProjectTask]) -> String {
    if tasks.is_empty() {
        return "Task tracker is empty.".to_string();
    }
    let mut out = format!("Project task tracker ({} tasks):\n", tasks.len());
    for (index, task) in tasks.iter().enumerate() {
        out.push_str(&format!(
            "{}. [{}] {} (ID={})\n",
            index + 1,
            task.priority,
            task.title,
            task.id
        ));
        if !task.description.trim().is_empty() {
            out.push_str(&format!("   Description: {}\n", task.description));
        }
        if !task.requirements.is_empty() {
            out.push_str("   Requirements:\n");
            for requirement in &task.requirements {
                out.push_str(&format!("     - {}\n", requirement.trim()));
            }
        }
    }
    out.trim().to_string()
}
