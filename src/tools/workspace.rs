//! Local tools over the selected project's issue list and task tracker.

use anyhow::Result;
use async_trait::async_trait;

use project_assistant_core::task::{parse_draft_list_payload, parse_draft_payload};

use super::{ServerDefinition, Tool, ToolContext};
use crate::issues::{format_issues, load_issues};
use crate::tasks::format_tasks;

pub const SERVER_ID: &str = "workspace";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkspaceAction {
    UserIssues,
    Tasks,
    CreateTask,
    CreateTasksBatch,
}

impl WorkspaceAction {
    pub const ALL: [WorkspaceAction; 4] = [
        WorkspaceAction::UserIssues,
        WorkspaceAction::Tasks,
        WorkspaceAction::CreateTask,
        WorkspaceAction::CreateTasksBatch,
    ];

    fn id(self) -> &'static str {
        match self {
            WorkspaceAction::UserIssues => "workspace-user-issues",
            WorkspaceAction::Tasks => "workspace-tasks",
            WorkspaceAction::CreateTask => "workspace-create-task",
            WorkspaceAction::CreateTasksBatch => "workspace-create-tasks-batch",
        }
    }

    fn label(self) -> &'static str {
        match self {
            WorkspaceAction::UserIssues => "User issues",
            WorkspaceAction::Tasks => "Task tracker",
            WorkspaceAction::CreateTask => "Create task",
            WorkspaceAction::CreateTasksBatch => "Create tasks (batch)",
        }
    }

    fn description(self) -> &'static str {
        match self {
            WorkspaceAction::UserIssues => {
                "Reads issues/user_issues.json from the selected project."
            }
            WorkspaceAction::Tasks => "Reads task_tracker/tasks.json from the selected project.",
            WorkspaceAction::CreateTask => {
                "Appends one task to task_tracker/tasks.json. Payload: JSON object with title, description, priority (LOW|MEDIUM|HIGH|CRITICAL), requirements."
            }
            WorkspaceAction::CreateTasksBatch => {
                "Appends several tasks to task_tracker/tasks.json. Payload: JSON array of task objects, or {\"tasks\": [...]}."
            }
        }
    }
}

pub struct WorkspaceTool {
    action: WorkspaceAction,
}

impl WorkspaceTool {
    pub fn new(action: WorkspaceAction) -> Self {
        Self { action }
    }
}

#[async_trait]
impl Tool for WorkspaceTool {
    fn id(&self) -> &str {
        self.action.id()
    }

    fn label(&self) -> &str {
        self.action.label()
    }

    fn description(&self) -> &str {
        self.action.description()
    }

    async fn execute(&self, payload: Option<&str>, ctx: &ToolContext<'_>) -> Result<String> {
        match self.action {
            WorkspaceAction::UserIssues => {
                let issues = load_issues(ctx.project_root)?;
                Ok(format_issues(&issues))
            }
            WorkspaceAction::Tasks => {
                let tasks = ctx.tasks.load_tasks(ctx.project_root).await?;
                Ok(format_tasks(&tasks))
            }
            WorkspaceAction::CreateTask => {
                let draft = parse_draft_payload(payload)?;
                let task = ctx.tasks.create_task(ctx.project_root, draft).await?;
                Ok(format!("Created task {}: {}", task.id, task.title))
            }
            WorkspaceAction::CreateTasksBatch => {
                let drafts = parse_draft_list_payload(payload)?;
                let tasks = ctx.tasks.create_tasks(ctx.project_root, drafts).await?;
                let mut out = format!("Created {} tasks:", tasks.len());
                for task in &tasks {
                    out.push_str(&format!("\n- {}: {}", task.id, task.title));
                }
                Ok(out)
            }
        }
    }
}

pub fn server(has_project: bool) -> ServerDefinition {
    ServerDefinition {
        id: SERVER_ID,
        name: "Workspace",
        description: "Local tools for the currently selected project.".to_string(),
        online: has_project,
        tools: WorkspaceAction::ALL
            .into_iter()
            .map(|action| Box::new(WorkspaceTool::new(action)) as Box<dyn Tool>)
            .collect(),
    }
}
