//! # Project Assistant CLI (`assist`)
//!
//! ## Usage
//!
//! ```bash
//! assist [--config assist.toml] [--project ./repo] <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `assist models` | List models served by the Ollama endpoint |
//! | `assist ingest <path>` | Index a project and report sources and chunks |
//! | `assist ask "<question>"` | Ask one question (`/help ...` pulls project context) |
//! | `assist chat` | Interactive session keeping recent history |
//! | `assist branch` | Print the project's current git branch |
//! | `assist prs` | List open pull requests |
//! | `assist review <number>` | Review one pull request |
//! | `assist auto-review` | Review changed pull requests on a timer |
//! | `assist serve webhook` | Review pull requests on GitHub webhook events |
//! | `assist tools list\|enable\|disable\|run` | Inspect and toggle tools |
//! | `assist tasks list\|delete` | Manage `task_tracker/tasks.json` |
//! | `assist issues list\|solve` | Read `issues/user_issues.json` and propose fixes |
//!
//! ## Examples
//!
//! ```bash
//! assist --project . ask "/help how is configuration loaded?"
//! assist --project . ask --require-task "Create a task to fix the login spinner"
//! PR_NUMBER=42 assist review --ci
//! ```

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use project_assistant::assistant::{help_payload, AskRequest, Assistant, MAX_HISTORY};
use project_assistant::config::{load_config, Config};
use project_assistant::github::GithubClient;
use project_assistant::issues::{find_issue, format_issues, load_issues};
use project_assistant::ollama::OllamaClient;
use project_assistant::review::{AutoReviewer, ReviewTarget};
use project_assistant::settings::{SettingsStore, SettingsUpdate};
use project_assistant::tasks::{format_tasks, TaskTracker};
use project_assistant::tools::ToolHub;
use project_assistant::webhook::run_webhook_server;
use project_assistant_core::knowledge::KnowledgeStore;
use project_assistant_core::models::ChatMessage;

/// Project Assistant: RAG answers, tool calls and pull-request reviews
/// over Ollama-compatible models.
#[derive(Parser)]
#[command(name = "assist", version, about)]
struct Cli {
    /// Path to configuration file (TOML). Defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Project directory. Falls back to the last project used.
    #[arg(long, global = true, env = "PROJECT_ROOT")]
    project: Option<PathBuf>,

    /// Ollama base URL (overrides config).
    #[arg(long, global = true)]
    base_url: Option<String>,

    #[arg(long, global = true)]
    chat_model: Option<String>,

    #[arg(long, global = true)]
    embedding_model: Option<String>,

    /// Log progress at info level.
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List available models.
    Models,

    /// Index a file or directory into the knowledge base.
    Ingest { path: PathBuf },

    /// Ask one question.
    Ask {
        question: String,

        /// Keep prompting until a task-creation tool succeeds.
        #[arg(long)]
        require_task: bool,

        /// Extra instructions appended to the system prompt.
        #[arg(long)]
        system: Option<String>,
    },

    /// Interactive chat. Type `exit` to quit.
    Chat,

    /// Print the current git branch of the project.
    Branch,

    /// List open pull requests.
    Prs,

    /// Review a pull request.
    Review {
        #[arg(env = "PR_NUMBER")]
        number: u64,

        /// Ingest the project first and wrap output in GitHub Actions groups.
        #[arg(long)]
        ci: bool,
    },

    /// Poll for changed pull requests and review them.
    AutoReview,

    Serve {
        #[command(subcommand)]
        service: ServeService,
    },

    Tools {
        #[command(subcommand)]
        action: ToolsAction,
    },

    Tasks {
        #[command(subcommand)]
        action: TasksAction,
    },

    Issues {
        #[command(subcommand)]
        action: IssuesAction,
    },
}

#[derive(Subcommand)]
enum ServeService {
    /// Listen for GitHub pull_request webhooks.
    Webhook,
}

#[derive(Subcommand)]
enum ToolsAction {
    /// Show every tool group and its enabled tools.
    List,
    Enable { id: String },
    Disable { id: String },
    /// Run one tool directly.
    Run {
        id: String,
        #[arg(long)]
        payload: Option<String>,
    },
}

#[derive(Subcommand)]
enum TasksAction {
    List,
    Delete { id: String },
}

#[derive(Subcommand)]
enum IssuesAction {
    List,
    /// Propose a solution for an issue (by id or `#number`).
    Solve { id: String },
}

/// Values resolved once from flags, config and saved settings.
struct Session {
    assistant: Arc<Assistant>,
    settings: Arc<SettingsStore>,
    config: Config,
    project: Option<PathBuf>,
    base_url: String,
    chat_model: String,
    embedding_model: String,
}

impl Session {
    fn new(cli: &Cli) -> Result<Self> {
        let config = load_config(cli.config.as_deref())?;
        let settings = Arc::new(SettingsStore::new(config.settings.resolved_path()));
        let saved = settings.load();

        let backend = Arc::new(OllamaClient::new(config.ollama.timeout_secs)?);
        let tools = ToolHub::new(
            settings.clone(),
            config.github.clone(),
            GithubClient::new()?,
            Arc::new(TaskTracker::new()),
        );
        let assistant = Arc::new(Assistant::new(
            backend,
            Arc::new(KnowledgeStore::new()),
            tools,
            config.loader.clone(),
            config.review.clone(),
        ));

        let project = cli
            .project
            .clone()
            .or_else(|| saved.last_project.map(PathBuf::from));
        let base_url = cli
            .base_url
            .clone()
            .unwrap_or_else(|| config.ollama.base_url.clone());
        let chat_model = cli
            .chat_model
            .clone()
            .or_else(|| config.ollama.chat_model.clone())
            .unwrap_or(saved.last_chat_model);
        let embedding_model = cli
            .embedding_model
            .clone()
            .or_else(|| config.ollama.embedding_model.clone())
            .unwrap_or(saved.last_embedding_model);

        Ok(Self {
            assistant,
            settings,
            config,
            project,
            base_url,
            chat_model,
            embedding_model,
        })
    }

    fn project(&self) -> Option<&Path> {
        self.project.as_deref()
    }

    fn review_target(&self) -> ReviewTarget {
        ReviewTarget {
            base_url: self.base_url.clone(),
            chat_model: self.chat_model.clone(),
            embedding_model: self.embedding_model.clone(),
            project_root: self.project.clone(),
        }
    }

    async fn ingest_project(&self) -> Result<()> {
        let Some(project) = self.project() else {
            bail!("No project selected. Pass --project <dir>.");
        };
        let report = self
            .assistant
            .ingest(project, &self.base_url, &self.embedding_model)
            .await;
        eprintln!(
            "Indexed {} chunks from {} sources.",
            report.chunk_count,
            report.sources.len()
        );
        for warning in &report.warnings {
            eprintln!("  warning: {}", warning);
        }
        Ok(())
    }

    fn ask_request(&self, question: &str, history: Vec<ChatMessage>) -> AskRequest {
        let mut req = AskRequest::new(
            question,
            &self.chat_model,
            &self.embedding_model,
            &self.base_url,
        );
        req.project_root = self.project.clone();
        req.history = history;
        req
    }

    async fn ask(&self, mut req: AskRequest) -> Result<String> {
        if req.git_branch.is_none() && self.project.is_some() {
            req.git_branch = self.assistant.current_branch(self.project()).await.ok();
        }
        let answer = self.assistant.ask(req).await?;
        self.settings.update(SettingsUpdate {
            project_path: self.project.clone(),
            chat_model: Some(self.chat_model.clone()),
            embedding_model: Some(self.embedding_model.clone()),
        })?;
        Ok(answer)
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let session = Session::new(&cli)?;

    match cli.command {
        Commands::Models => {
            for model in session.assistant.list_models(&session.base_url).await? {
                println!("{}", model);
            }
        }
        Commands::Ingest { path } => {
            let report = session
                .assistant
                .ingest(&path, &session.base_url, &session.embedding_model)
                .await;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Ask {
            question,
            require_task,
            system,
        } => {
            if help_payload(&question).is_some() {
                session.ingest_project().await?;
            }
            let mut req = session.ask_request(&question, Vec::new());
            req.require_task_creation = require_task;
            req.extra_system_prompt = system;
            println!("{}", session.ask(req).await?);
        }
        Commands::Chat => run_chat(&session).await?,
        Commands::Branch => {
            println!("{}", session.assistant.current_branch(session.project()).await?);
        }
        Commands::Prs => {
            let pulls = session
                .assistant
                .tools()
                .list_pull_requests(session.project(), session.config.review.pull_request_limit)
                .await?;
            if pulls.is_empty() {
                println!("No open pull requests.");
            }
            for pr in pulls {
                println!(
                    "#{:<5} {} ({} -> {}, by {}, updated {})",
                    pr.number, pr.title, pr.head_branch, pr.base_branch, pr.author, pr.updated_at
                );
            }
        }
        Commands::Review { number, ci } => run_review(&session, number, ci).await?,
        Commands::AutoReview => run_auto_review(&session).await?,
        Commands::Serve { service } => match service {
            ServeService::Webhook => run_webhook(&session).await?,
        },
        Commands::Tools { action } => run_tools(&session, action).await?,
        Commands::Tasks { action } => {
            let tasks = session.assistant.tools().tasks();
            match action {
                TasksAction::List => {
                    println!("{}", format_tasks(&tasks.load_tasks(session.project()).await?));
                }
                TasksAction::Delete { id } => {
                    let removed = tasks.delete_task(session.project(), &id).await?;
                    println!("Deleted task {}: {}", removed.id, removed.title);
                }
            }
        }
        Commands::Issues { action } => {
            let issues = load_issues(session.project())?;
            match action {
                IssuesAction::List => println!("{}", format_issues(&issues)),
                IssuesAction::Solve { id } => {
                    let issue = find_issue(&issues, &id)
                        .with_context(|| format!("Issue {} was not found", id))?;
                    session.ingest_project().await?;
                    let answer = session
                        .assistant
                        .propose_issue_solution(
                            issue,
                            &session.base_url,
                            &session.chat_model,
                            &session.embedding_model,
                        )
                        .await?;
                    println!("{}", answer);
                }
            }
        }
    }

    Ok(())
}

async fn run_chat(session: &Session) -> Result<()> {
    if session.project.is_some() {
        session.ingest_project().await?;
    }
    let mut history: Vec<ChatMessage> = Vec::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if question.eq_ignore_ascii_case("exit") || question.eq_ignore_ascii_case("quit") {
            break;
        }

        match session.ask(session.ask_request(question, history.clone())).await {
            Ok(answer) => {
                println!("{}\n", answer);
                history.push(ChatMessage::user(question));
                history.push(ChatMessage::assistant(answer));
                if history.len() > MAX_HISTORY {
                    history.drain(..history.len() - MAX_HISTORY);
                }
            }
            Err(e) => eprintln!("Error: {:#}\n", e),
        }
    }
    Ok(())
}

async fn run_review(session: &Session, number: u64, ci: bool) -> Result<()> {
    if ci {
        println!("::group::Index project");
        session.ingest_project().await?;
        println!("::endgroup::");
        println!("::group::Review PR #{}", number);
    }
    let review = session
        .assistant
        .review_pull_request(
            number,
            &session.base_url,
            &session.chat_model,
            &session.embedding_model,
            session.project(),
        )
        .await?;
    println!("{}", review);
    if ci {
        println!("::endgroup::");
    }
    Ok(())
}

async fn run_auto_review(session: &Session) -> Result<()> {
    if session.project.is_none() {
        bail!("Select a project to enable auto review.");
    }
    session.ingest_project().await?;

    let interval = Duration::from_secs(session.config.review.poll_interval_secs);
    let reviewer = Arc::new(AutoReviewer::new(
        session.assistant.clone(),
        session.review_target(),
    ));
    let (tx, mut rx) = mpsc::channel(8);
    let handle = reviewer.spawn(interval, tx);
    eprintln!("Auto review is active (every {}s). Press Ctrl-C to stop.", interval.as_secs());

    loop {
        tokio::select! {
            done = rx.recv() => match done {
                Some(done) => {
                    println!("=== Auto-reviewed PR #{}: {} ===", done.pull_request.number, done.pull_request.title);
                    println!("{}\n", done.review);
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                handle.stop();
                break;
            }
        }
    }
    handle.join().await;
    eprintln!("Auto review is disabled.");
    Ok(())
}

async fn run_webhook(session: &Session) -> Result<()> {
    let Some(port) = session.config.webhook.port else {
        bail!("Webhook settings are missing. Set webhook.port or GITHUB_WEBHOOK_PORT.");
    };
    if session.project.is_none() {
        bail!("Webhook needs a project. Pass --project <dir>.");
    }
    let repo = session
        .assistant
        .tools()
        .resolve_github(session.project())
        .await?;
    session.ingest_project().await?;

    let (tx, mut rx) = mpsc::channel(32);
    let server = tokio::spawn(run_webhook_server(
        port,
        session.config.webhook.secret.clone(),
        tx,
    ));
    eprintln!("Listening for GitHub webhooks on port {}.", port);

    while let Some(event) = rx.recv().await {
        if !event.is_for(&repo.owner, &repo.repo) {
            eprintln!("Webhook ignored: event for {}/{}.", event.owner, event.repo);
            continue;
        }
        eprintln!("Webhook: reviewing PR #{} ({})", event.number, event.action);
        let pulls = match session
            .assistant
            .tools()
            .list_pull_requests(session.project(), session.config.review.pull_request_limit)
            .await
        {
            Ok(pulls) => pulls,
            Err(e) => {
                eprintln!("Webhook: failed to refresh pull requests - {:#}", e);
                continue;
            }
        };
        if !pulls.iter().any(|pr| pr.number == event.number) {
            eprintln!("Webhook: PR #{} not found after refresh.", event.number);
            continue;
        }
        match session
            .assistant
            .review_pull_request(
                event.number,
                &session.base_url,
                &session.chat_model,
                &session.embedding_model,
                session.project(),
            )
            .await
        {
            Ok(review) => println!("=== Review for PR #{} ===\n{}\n", event.number, review),
            Err(e) => eprintln!("Webhook: review failed - {:#}", e),
        }
    }

    server.await??;
    Ok(())
}

async fn run_tools(session: &Session, action: ToolsAction) -> Result<()> {
    let tools = session.assistant.tools();
    let project = session.project();
    let servers = match action {
        ToolsAction::List => tools.servers(project).await,
        ToolsAction::Enable { id } => tools.set_tool_enabled(&id, true, project).await?,
        ToolsAction::Disable { id } => tools.set_tool_enabled(&id, false, project).await?,
        ToolsAction::Run { id, payload } => {
            println!("{}", tools.run_tool(&id, payload.as_deref(), project).await?);
            return Ok(());
        }
    };
    for server in servers {
        let status = if server.online { "online" } else { "offline" };
        println!("{} [{}] {}", server.name, status, server.description);
        for tool in server.tools {
            let mark = if tool.enabled { "x" } else { " " };
            println!("  [{}] {:<30} {}", mark, tool.id, tool.description);
        }
    }
    Ok(())
}
