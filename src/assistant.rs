//! Conversation orchestrator.
//!
//! One [`Assistant::ask`] call runs a bounded loop:
//!
//! ```text
//! retrieve context ─► prompt ─► response has MCP_REQUEST? ──no──► answer
//!                       ▲                 │yes
//!                       └── tool result ◄─┘   (at most 6 prompts)
//! ```
//!
//! Context retrieval only happens for `/help` questions. Tool round-trips
//! are strictly sequential, and backend failures end the request without
//! a retry.

use anyhow::Result;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use project_assistant_core::knowledge::KnowledgeStore;
use project_assistant_core::models::{ChatMessage, UserIssue};
use project_assistant_core::protocol::{parse_tool_request, TOOL_REQUEST_MARKER};
use project_assistant_core::rank::{build_context_block, render_fragments, RETRIEVAL_TOP_K};
use project_assistant_core::text::snippet;

use crate::config::{LoaderConfig, ReviewConfig};
use crate::error::AssistError;
use crate::git;
use crate::ingest::{ingest_path, IngestReport};
use crate::ollama::ChatBackend;
use crate::project::resolve_root;
use crate::tools::{is_task_creation_tool, ToolHub, ToolSummary};

/// Backend calls allowed per question before giving up.
pub const MAX_TOOL_REQUEST_ATTEMPTS: usize = 6;
/// Prior messages forwarded with each question.
pub const MAX_HISTORY: usize = 10;

const HELP_PREFIX: &str = "/help";

pub const NO_CONTEXT_PLACEHOLDER: &str =
    "RAG context not provided (use /help to request project-specific information).";
pub const NO_MATCHES_CONTEXT: &str = "No relevant context found in the knowledge base.";

const TASK_CREATION_REMINDER: &str = "The user explicitly asked to create tasks. Call `workspace-create-task` with the JSON payload you prepared, wait for the tool result, and only then respond to the user.";
const MALFORMED_REQUEST_REMINDER: &str = "The previous tool request named no tool. Reply with `MCP_REQUEST:<tool id>` on its own line, or answer the user directly.";

/// Inputs of one [`Assistant::ask`] call.
#[derive(Debug, Clone, Default)]
pub struct AskRequest {
    pub question: String,
    pub chat_model: String,
    pub embedding_model: String,
    pub base_url: String,
    pub git_branch: Option<String>,
    pub project_root: Option<PathBuf>,
    /// Keep prompting until a task-creation tool has succeeded.
    pub require_task_creation: bool,
    pub history: Vec<ChatMessage>,
    pub extra_system_prompt: Option<String>,
}

impl AskRequest {
    pub fn new(
        question: impl Into<String>,
        chat_model: impl Into<String>,
        embedding_model: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            question: question.into(),
            chat_model: chat_model.into(),
            embedding_model: embedding_model.into(),
            base_url: base_url.into(),
            ..Default::default()
        }
    }
}

/// Remainder after a case-insensitive `/help` prefix.
pub fn help_payload(question: &str) -> Option<&str> {
    let head = question.get(..HELP_PREFIX.len())?;
    if head.eq_ignore_ascii_case(HELP_PREFIX) {
        Some(&question[HELP_PREFIX.len()..])
    } else {
        None
    }
}

/// System prompt for one question.
pub fn build_system_prompt(
    context: &str,
    git_branch: Option<&str>,
    extra_system_prompt: Option<&str>,
    tools: &[ToolSummary],
) -> String {
    let mut lines: Vec<String> =
        vec!["You are an engineering assistant. Help the user understand the project.".into()];
    if let Some(branch) = git_branch.filter(|b| !b.trim().is_empty()) {
        lines.push(format!("Current git branch: {}", branch));
    }
    if let Some(extra) = extra_system_prompt.filter(|p| !p.trim().is_empty()) {
        lines.push(extra.to_string());
    }
    lines.push("Context snippets:".into());
    lines.push(context.to_string());
    lines.push(String::new());

    if tools.is_empty() {
        lines.push("No MCP tools are currently approved by the user.".into());
        return lines.join("\n");
    }

    lines.extend(
        [
            "Available MCP tools (request them by responding with `MCP_REQUEST:tool_name` and, if arguments are necessary, add a newline followed by a JSON payload).",
            "Tool usage principles:",
            "1) Always gather required data via tools when it exists locally instead of asking the user to paste it (e.g., fetch user issues with `workspace-user-issues`).",
            "2) You may request multiple tools sequentially to complete a workflow (for example, read user issues and then create project tasks).",
            "3) When calling task-creation tools (`workspace-create-task` or `workspace-create-tasks-batch`), provide a full JSON payload such as {\"title\":\"...\",\"description\":\"...\",\"priority\":\"HIGH\",\"requirements\":[\"...\"]}. Use the batch tool when the user asks for multiple tasks in one message.",
            "4) If the user explicitly asks to add or update tasks, you MUST call one of the task-creation tools; do not respond with JSON only. Show the JSON, then immediately issue the MCP request so the task is persisted.",
            "5) Never claim a task exists unless the tool succeeded. If the tool fails, explain the failure and ask the user to correct the payload.",
            "After each tool result, continue reasoning; only send the final answer once you have satisfied the request without referencing MCP or intermediate steps.",
        ]
        .into_iter()
        .map(String::from),
    );
    for tool in tools {
        lines.push(format!(
            "- {} ({}): {}",
            tool.id, tool.server_name, tool.description
        ));
    }
    lines.push("Only request a tool when it helps fulfill the instruction; once the tool returns data, incorporate it naturally into your answer.".into());
    lines.join("\n")
}

fn user_message(question: &str) -> ChatMessage {
    let Some(payload) = help_payload(question) else {
        return ChatMessage::user(question);
    };
    let payload = payload.trim();
    let mut content = String::from(
        "PROJECT_CONTEXT_QUESTION: The user is asking specifically about the currently selected project. \
         Rely on the RAG context and MCP responses to reason about project structure, files, and conventions. ",
    );
    if payload.is_empty() {
        content.push_str("Provide a concise overview and structure summary of the project.");
    } else {
        content.push_str(&format!("User request: {}", payload));
    }
    ChatMessage::user(content)
}

/// Last [`MAX_HISTORY`] messages, blank ones dropped.
pub fn trim_history(history: &[ChatMessage]) -> Vec<ChatMessage> {
    let start = history.len().saturating_sub(MAX_HISTORY);
    history[start..]
        .iter()
        .filter(|m| !m.content.trim().is_empty())
        .cloned()
        .collect()
}

pub fn tool_result_message(tool_id: &str, text: &str) -> ChatMessage {
    ChatMessage::system(format!(
        "Tool '{}' returned:\n{}\nUse this information to answer the user naturally without referencing tool invocations.",
        tool_id, text
    ))
}

pub struct Assistant {
    backend: Arc<dyn ChatBackend>,
    knowledge: Arc<KnowledgeStore>,
    tools: ToolHub,
    loader: LoaderConfig,
    review: ReviewConfig,
}

impl Assistant {
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        knowledge: Arc<KnowledgeStore>,
        tools: ToolHub,
        loader: LoaderConfig,
        review: ReviewConfig,
    ) -> Self {
        Self {
            backend,
            knowledge,
            tools,
            loader,
            review,
        }
    }

    pub fn knowledge(&self) -> &KnowledgeStore {
        &self.knowledge
    }

    pub fn tools(&self) -> &ToolHub {
        &self.tools
    }

    pub fn backend(&self) -> &dyn ChatBackend {
        self.backend.as_ref()
    }

    pub fn review_config(&self) -> &ReviewConfig {
        &self.review
    }

    /// Load, embed and index `path`, replacing the current knowledge.
    pub async fn ingest(&self, path: &Path, base_url: &str, embedding_model: &str) -> IngestReport {
        let report = ingest_path(
            self.backend.as_ref(),
            &self.knowledge,
            &self.loader,
            path,
            base_url,
            embedding_model,
        )
        .await;
        tracing::info!(
            target: "assist::rag",
            chunks = report.chunk_count,
            sources = report.sources.len(),
            warnings = report.warnings.len(),
            "knowledge base replaced"
        );
        report
    }

    pub async fn list_models(&self, base_url: &str) -> Result<Vec<String>> {
        self.backend.list_models(base_url).await
    }

    pub async fn current_branch(&self, project: Option<&Path>) -> Result<String> {
        let root = resolve_root(project)?;
        git::current_branch(&root).await
    }

    async fn help_context(&self, req: &AskRequest) -> Result<String> {
        let Some(payload) = help_payload(&req.question) else {
            return Ok(NO_CONTEXT_PLACEHOLDER.to_string());
        };
        let retrieval_query = match payload.trim() {
            "" => req.question.as_str(),
            trimmed => trimmed,
        };
        tracing::debug!(
            target: "assist::ollama",
            model = %req.embedding_model,
            prompt = %snippet(retrieval_query, 160),
            "embedding request"
        );
        let query_vector = self
            .backend
            .embed(&req.base_url, &req.embedding_model, retrieval_query)
            .await
            .inspect_err(|e| tracing::warn!(target: "assist::ollama", error = %e, "query embedding failed"))?;

        let candidates = self.knowledge.search(&query_vector, RETRIEVAL_TOP_K);
        let block = build_context_block(retrieval_query, candidates);
        tracing::debug!(target: "assist::rag", query = %snippet(&req.question, 160), context = %snippet(&block, 400), "context built");
        Ok(block)
    }

    /// Answer one question, running requested tools along the way.
    pub async fn ask(&self, req: AskRequest) -> Result<String> {
        tracing::info!(
            target: "assist::ask",
            help = help_payload(&req.question).is_some(),
            question = %snippet(&req.question, 160),
            "incoming question"
        );
        let context = self.help_context(&req).await?;
        let project = req.project_root.as_deref();
        let tools = self.tools.enabled_tools(project).await;
        let system = build_system_prompt(
            &context,
            req.git_branch.as_deref(),
            req.extra_system_prompt.as_deref(),
            &tools,
        );

        let mut conversation = vec![ChatMessage::system(system)];
        conversation.extend(trim_history(&req.history));
        conversation.push(user_message(&req.question));

        let mut pending_task_creation = req.require_task_creation;
        for attempt in 1..=MAX_TOOL_REQUEST_ATTEMPTS {
            tracing::debug!(
                target: "assist::ollama",
                attempt,
                model = %req.chat_model,
                messages = conversation.len(),
                "chat request"
            );
            let content = self
                .backend
                .chat(&req.base_url, &req.chat_model, &conversation)
                .await
                .inspect_err(|e| tracing::warn!(target: "assist::ollama", attempt, error = %e, "chat failed"))?;
            tracing::debug!(target: "assist::ollama", attempt, response = %snippet(&content, 160), "chat response");

            let Some(request) = parse_tool_request(&content) else {
                if content.contains(TOOL_REQUEST_MARKER) {
                    conversation.push(ChatMessage::assistant(content));
                    conversation.push(ChatMessage::system(MALFORMED_REQUEST_REMINDER));
                    continue;
                }
                if pending_task_creation {
                    conversation.push(ChatMessage::system(TASK_CREATION_REMINDER));
                    continue;
                }
                return Ok(content);
            };

            tracing::info!(target: "assist::mcp", tool = %request.tool_id, attempt, "model requested tool");
            conversation.push(ChatMessage::assistant(content));
            let outcome = self
                .tools
                .run_tool(&request.tool_id, request.payload.as_deref(), project)
                .await;
            let text = match &outcome {
                Ok(text) => text.clone(),
                Err(e) => format!("{:#}", e),
            };
            conversation.push(tool_result_message(&request.tool_id, &text));
            if outcome.is_ok() && is_task_creation_tool(&request.tool_id) {
                pending_task_creation = false;
            }
        }

        tracing::warn!(target: "assist::ask", attempts = MAX_TOOL_REQUEST_ATTEMPTS, "tool round-trip limit reached");
        Err(AssistError::ToolRoundTripLimit {
            attempts: MAX_TOOL_REQUEST_ATTEMPTS,
        }
        .into())
    }

    /// Similarity-only context for reviews and issue proposals.
    pub async fn rag_context_from_query(
        &self,
        base_url: &str,
        embedding_model: &str,
        query: &str,
    ) -> Result<String> {
        tracing::debug!(target: "assist::rag", query = %snippet(query, 160), "generating context");
        let vector = self
            .backend
            .embed(base_url, embedding_model, query)
            .await
            .inspect_err(|e| tracing::warn!(target: "assist::rag", error = %e, "context embedding failed"))?;
        let matches = self.knowledge.search(&vector, RETRIEVAL_TOP_K);
        if matches.is_empty() {
            return Ok(NO_MATCHES_CONTEXT.to_string());
        }
        Ok(render_fragments(&matches))
    }

    /// Ask the model for a user-facing answer to a reported issue.
    pub async fn propose_issue_solution(
        &self,
        issue: &UserIssue,
        base_url: &str,
        chat_model: &str,
        embedding_model: &str,
    ) -> Result<String> {
        let query = format!("{}\n{}", issue.issue.subject, issue.issue.description);
        let context = match self
            .rag_context_from_query(base_url, embedding_model, query.trim())
            .await
        {
            Ok(context) => context,
            Err(e) => format!("RAG context unavailable: {}", e),
        };

        let system = format!(
            "You are a support engineer for this project.\n\
             Explain the behavior and suggest resolution steps as if replying to the user, without deep implementation details.\n\
             Rely on the FAQ, README, docs and sources, but restate conclusions in plain words.\n\
             Knowledge base context for the request:\n{}",
            context
        );
        let user = format!(
            "User {} submitted a request.\n\
             ID: {}, number: {}\n\
             Subject: {}\n\
             Description: {}\n\n\
             Propose a solution or explain the current product behavior in plain words. Suggest diagnostic steps or a workaround if needed.\n\
             Do not go into code implementation details; focus on what the user should do and the expected effect.",
            issue.user_name,
            issue.issue.issue_id,
            issue.issue.issue_number,
            issue.issue.subject,
            issue.issue.description
        );
        self.backend
            .chat(
                base_url,
                chat_model,
                &[ChatMessage::system(system), ChatMessage::user(user)],
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GithubConfig;
    use crate::github::GithubClient;
    use crate::settings::SettingsStore;
    use crate::tasks::TaskTracker;
    use async_trait::async_trait;
    use project_assistant_core::models::ChatRole;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Replays canned chat replies and records every transcript sent.
    #[derive(Default)]
    struct ScriptedBackend {
        replies: Mutex<VecDeque<String>>,
        seen: Mutex<Vec<Vec<ChatMessage>>>,
    }

    impl ScriptedBackend {
        fn new(replies: &[&str]) -> Self {
            Self {
                replies: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
                seen: Mutex::default(),
            }
        }
    }

    #[async_trait]
    impl ChatBackend for ScriptedBackend {
        async fn chat(&self, _: &str, _: &str, messages: &[ChatMessage]) -> Result<String> {
            self.seen.lock().unwrap().push(messages.to_vec());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| anyhow::anyhow!("no scripted reply left"))
        }

        async fn embed(&self, _: &str, _: &str, _: &str) -> Result<Vec<f32>> {
            Ok(vec![1.0, 0.0])
        }

        async fn list_models(&self, _: &str) -> Result<Vec<String>> {
            Ok(vec!["llama3.1".into()])
        }
    }

    fn assistant(dir: &TempDir, backend: Arc<ScriptedBackend>) -> Assistant {
        let hub = ToolHub::new(
            Arc::new(SettingsStore::new(dir.path().join("state.json"))),
            GithubConfig::default(),
            GithubClient::new().unwrap(),
            Arc::new(TaskTracker::new()),
        );
        Assistant::new(
            backend,
            Arc::new(KnowledgeStore::new()),
            hub,
            LoaderConfig::default(),
            ReviewConfig::default(),
        )
    }

    fn request(question: &str, project: &Path) -> AskRequest {
        let mut req = AskRequest::new(question, "chat", "embed", "http://localhost:11434");
        req.project_root = Some(project.to_path_buf());
        req
    }

    #[test]
    fn test_help_payload() {
        assert_eq!(help_payload("/HELP files"), Some(" files"));
        assert_eq!(help_payload("/help"), Some(""));
        assert_eq!(help_payload("help"), None);
        assert_eq!(help_payload("/hé"), None);
    }

    #[test]
    fn test_system_prompt_without_tools() {
        let prompt = build_system_prompt("ctx", Some("main"), None, &[]);
        assert_eq!(
            prompt,
            "You are an engineering assistant. Help the user understand the project.\n\
             Current git branch: main\nContext snippets:\nctx\n\n\
             No MCP tools are currently approved by the user."
        );
    }

    #[test]
    fn test_system_prompt_lists_tools() {
        let tools = vec![ToolSummary {
            id: "workspace-tasks".into(),
            server_name: "Workspace".into(),
            description: "Reads tasks.".into(),
        }];
        let prompt = build_system_prompt("ctx", None, Some("Be brief."), &tools);
        assert!(prompt.contains("\nBe brief.\n"));
        assert!(prompt.contains("- workspace-tasks (Workspace): Reads tasks."));
        assert!(prompt.contains("5) Never claim a task exists"));
    }

    #[test]
    fn test_history_keeps_last_ten_non_blank() {
        let mut history: Vec<ChatMessage> = (0..12).map(|i| ChatMessage::user(format!("m{}", i))).collect();
        history[11].content = "  ".into();
        let trimmed = trim_history(&history);
        assert_eq!(trimmed.len(), 9);
        assert_eq!(trimmed[0].content, "m2");
    }

    #[tokio::test]
    async fn test_plain_answer_returned_verbatim() {
        let tmp = TempDir::new().unwrap();
        let backend = Arc::new(ScriptedBackend::new(&["Hello there."]));
        let assistant = assistant(&tmp, backend.clone());

        let answer = assistant.ask(request("hi", tmp.path())).await.unwrap();
        assert_eq!(answer, "Hello there.");

        let seen = backend.seen.lock().unwrap();
        let first = &seen[0];
        assert!(first[0].content.contains(NO_CONTEXT_PLACEHOLDER));
        assert_eq!(first.last().unwrap(), &ChatMessage::user("hi"));
    }

    #[tokio::test]
    async fn test_tool_round_trip_feeds_result_back() {
        let tmp = TempDir::new().unwrap();
        let backend = Arc::new(ScriptedBackend::new(&[
            "Let me check.\nMCP_REQUEST:workspace-tasks",
            "There are no tasks yet.",
        ]));
        let assistant = assistant(&tmp, backend.clone());
        std::fs::create_dir_all(tmp.path().join("task_tracker")).unwrap();
        std::fs::write(tmp.path().join("task_tracker/tasks.json"), "[]").unwrap();

        let answer = assistant.ask(request("list tasks", tmp.path())).await.unwrap();
        assert_eq!(answer, "There are no tasks yet.");

        let seen = backend.seen.lock().unwrap();
        let second = &seen[1];
        let n = second.len();
        assert_eq!(second[n - 2].role, ChatRole::Assistant);
        assert!(second[n - 2].content.contains("MCP_REQUEST:workspace-tasks"));
        assert_eq!(
            second[n - 1],
            tool_result_message("workspace-tasks", "Task tracker is empty.")
        );
    }

    #[tokio::test]
    async fn test_tool_failure_is_reported_to_model() {
        let tmp = TempDir::new().unwrap();
        let backend = Arc::new(ScriptedBackend::new(&["MCP_REQUEST:no-such-tool", "Sorry."]));
        let assistant = assistant(&tmp, backend.clone());

        assert_eq!(assistant.ask(request("x", tmp.path())).await.unwrap(), "Sorry.");
        let seen = backend.seen.lock().unwrap();
        let last = seen[1].last().unwrap();
        assert!(last.content.starts_with("Tool 'no-such-tool' returned:\nUnknown tool: no-such-tool\n"));
    }

    #[tokio::test]
    async fn test_required_task_creation_reminds_until_created() {
        let tmp = TempDir::new().unwrap();
        let backend = Arc::new(ScriptedBackend::new(&[
            "Here is the JSON {\"title\":\"Fix login\"}",
            "MCP_REQUEST:workspace-create-task {\"title\":\"Fix login\"}",
            "Done, the task is tracked.",
        ]));
        let assistant = assistant(&tmp, backend.clone());
        let mut req = request("create a task", tmp.path());
        req.require_task_creation = true;

        let answer = assistant.ask(req).await.unwrap();
        assert_eq!(answer, "Done, the task is tracked.");

        let seen = backend.seen.lock().unwrap();
        assert_eq!(seen[1].last().unwrap(), &ChatMessage::system(TASK_CREATION_REMINDER));
        let tasks = assistant.tools().tasks().load_tasks(Some(tmp.path())).await.unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].title, "Fix login");
    }

    #[tokio::test]
    async fn test_marker_without_tool_never_returned() {
        let tmp = TempDir::new().unwrap();
        let backend = Arc::new(ScriptedBackend::new(&["MCP_REQUEST:   ", "Plain answer."]));
        let assistant = assistant(&tmp, backend);
        let answer = assistant.ask(request("x", tmp.path())).await.unwrap();
        assert_eq!(answer, "Plain answer.");
    }

    #[tokio::test]
    async fn test_backend_failure_propagates() {
        let tmp = TempDir::new().unwrap();
        let assistant = assistant(&tmp, Arc::new(ScriptedBackend::new(&[])));
        let err = assistant.ask(request("x", tmp.path())).await.unwrap_err();
        assert!(err.to_string().contains("no scripted reply left"));
    }

    #[tokio::test]
    async fn test_current_branch_requires_project() {
        let tmp = TempDir::new().unwrap();
        let assistant = assistant(&tmp, Arc::new(ScriptedBackend::new(&[])));
        let err = assistant.current_branch(None).await.unwrap_err();
        assert_eq!(err.downcast_ref::<AssistError>(), Some(&AssistError::ProjectNotSelected));
    }

    #[tokio::test]
    async fn test_rag_context_empty_store() {
        let tmp = TempDir::new().unwrap();
        let assistant = assistant(&tmp, Arc::new(ScriptedBackend::new(&[])));
        let context = assistant
            .rag_context_from_query("http://x", "embed", "anything")
            .await
            .unwrap();
        assert_eq!(context, NO_MATCHES_CONTEXT);
    }
}
