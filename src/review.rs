//! Pull-request review: a single two-message chat built from the PR's
//! metadata, changed files and diff, plus a background poller that
//! reviews PRs whose `updated_at` marker changed.

use anyhow::Result;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use project_assistant_core::models::{ChatMessage, PullRequestReviewBundle, PullRequestSummary};
use project_assistant_core::text::limit_text;

use crate::assistant::Assistant;

/// Query used to pull project context for a review.
pub fn review_context_query(bundle: &PullRequestReviewBundle) -> String {
    let summary = &bundle.summary;
    let body = if summary.body.trim().is_empty() {
        "No description"
    } else {
        summary.body.as_str()
    };
    let files: Vec<&str> = bundle.files.iter().map(|f| f.filename.as_str()).collect();
    format!(
        "Pull request #{}: {}\nBase branch: {}, head: {}\nSummary: {}\nChanged files: {}",
        summary.number,
        summary.title,
        summary.base_branch,
        summary.head_branch,
        body,
        files.join(", ")
    )
}

pub fn review_system_prompt(context: &str) -> String {
    format!(
        "You are a senior software engineer performing an in-depth pull request review.\n\
         Identify correctness issues, security concerns, style problems, missing tests, and offer actionable suggestions.\n\
         Project context snippets:\n{}",
        context
    )
}

/// User prompt with metadata, per-file stats and the diff cut to
/// `diff_char_limit` characters.
pub fn review_user_prompt(bundle: &PullRequestReviewBundle, diff_char_limit: usize) -> String {
    let summary = &bundle.summary;
    let description = if summary.body.trim().is_empty() {
        "No description provided."
    } else {
        summary.body.as_str()
    };
    let files = if bundle.files.is_empty() {
        "No file data.".to_string()
    } else {
        bundle
            .files
            .iter()
            .map(|f| {
                format!(
                    "- {} ({}, +{} -{}, Δ{})",
                    f.filename, f.status, f.additions, f.deletions, f.changes
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    };
    let diff = limit_text(&bundle.diff, diff_char_limit);

    format!(
        "Review pull request #{number}: {title}\n\
         Author: {author} ({head} -> {base})\n\
         Pull request URL: {url}\n\n\
         Pull request description:\n{description}\n\n\
         Changed files:\n{files}\n\n\
         Unified diff (truncated if necessary):\n```diff\n{diff}\n```\n\n\
         Return a structured review with headings for Findings, Potential Bugs, and Recommendations.",
        number = summary.number,
        title = summary.title,
        author = summary.author,
        head = summary.head_branch,
        base = summary.base_branch,
        url = summary.url,
    )
}

impl Assistant {
    /// Review pull request `number` in one chat call.
    pub async fn review_pull_request(
        &self,
        number: u64,
        base_url: &str,
        chat_model: &str,
        embedding_model: &str,
        project: Option<&std::path::Path>,
    ) -> Result<String> {
        tracing::info!(target: "assist::review", number, "preparing review");
        let bundle = self.tools().pull_request_review_bundle(project, number).await?;

        let context = match self
            .rag_context_from_query(base_url, embedding_model, &review_context_query(&bundle))
            .await
        {
            Ok(context) => context,
            Err(e) => format!("RAG context unavailable ({})", e),
        };
        let messages = [
            ChatMessage::system(review_system_prompt(&context)),
            ChatMessage::user(review_user_prompt(
                &bundle,
                self.review_config().diff_char_limit,
            )),
        ];
        tracing::info!(
            target: "assist::review",
            number,
            diff_chars = bundle.diff.chars().count(),
            "sending review request"
        );
        match self.backend().chat(base_url, chat_model, &messages).await {
            Ok(review) => {
                tracing::info!(target: "assist::review", number, "review completed");
                Ok(review)
            }
            Err(e) => {
                tracing::warn!(target: "assist::review", number, error = %e, "review failed");
                Err(e)
            }
        }
    }
}

/// Models and endpoint a poller reviews with.
#[derive(Debug, Clone)]
pub struct ReviewTarget {
    pub base_url: String,
    pub chat_model: String,
    pub embedding_model: String,
    pub project_root: Option<PathBuf>,
}

/// One finished automatic review.
#[derive(Debug, Clone)]
pub struct AutoReview {
    pub pull_request: PullRequestSummary,
    pub review: String,
}

#[derive(Debug, Clone)]
pub enum PollOutcome {
    /// Every listed PR already has an up-to-date marker.
    Idle,
    Reviewed(AutoReview),
}

/// Reviews changed pull requests, one per poll.
pub struct AutoReviewer {
    assistant: Arc<Assistant>,
    target: ReviewTarget,
    /// PR number → `updated_at` at the last successful review.
    marks: Mutex<HashMap<u64, String>>,
}

impl AutoReviewer {
    pub fn new(assistant: Arc<Assistant>, target: ReviewTarget) -> Self {
        Self {
            assistant,
            target,
            marks: Mutex::new(HashMap::new()),
        }
    }

    fn needs_review(&self, pr: &PullRequestSummary) -> bool {
        let marks = self.marks.lock().unwrap_or_else(|p| p.into_inner());
        marks.get(&pr.number) != Some(&pr.updated_at)
    }

    fn mark_reviewed(&self, pr: &PullRequestSummary) {
        let mut marks = self.marks.lock().unwrap_or_else(|p| p.into_inner());
        marks.insert(pr.number, pr.updated_at.clone());
    }

    /// List PRs and review the first whose marker is missing or differs.
    /// The marker is only recorded when the review succeeds.
    pub async fn poll_once(&self) -> Result<PollOutcome> {
        let project = self.target.project_root.as_deref();
        let limit = self.assistant.review_config().pull_request_limit;
        let pulls = self.assistant.tools().list_pull_requests(project, limit).await?;

        let Some(next) = pulls.into_iter().find(|pr| self.needs_review(pr)) else {
            tracing::debug!(target: "assist::review", "auto review idle (no changes)");
            return Ok(PollOutcome::Idle);
        };

        tracing::info!(target: "assist::review", number = next.number, "auto-reviewing pull request");
        let review = self
            .assistant
            .review_pull_request(
                next.number,
                &self.target.base_url,
                &self.target.chat_model,
                &self.target.embedding_model,
                project,
            )
            .await?;
        self.mark_reviewed(&next);
        Ok(PollOutcome::Reviewed(AutoReview {
            pull_request: next,
            review,
        }))
    }

    /// Poll every `interval` while `enabled` holds `true`.
    ///
    /// Flipping the flag to `false` (or dropping its sender) ends the
    /// idle wait at once; a review already in flight runs to completion
    /// first.
    pub async fn run(
        &self,
        interval: Duration,
        mut enabled: watch::Receiver<bool>,
        reviews: mpsc::Sender<AutoReview>,
    ) {
        while *enabled.borrow() {
            match self.poll_once().await {
                Ok(PollOutcome::Reviewed(done)) => {
                    if reviews.send(done).await.is_err() {
                        break;
                    }
                }
                Ok(PollOutcome::Idle) => {}
                Err(e) => tracing::warn!(target: "assist::review", error = %e, "auto review failed"),
            }

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                changed = enabled.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        tracing::info!(target: "assist::review", "auto review stopped");
    }

    /// Start [`run`](Self::run) on the runtime.
    pub fn spawn(self: Arc<Self>, interval: Duration, reviews: mpsc::Sender<AutoReview>) -> AutoReviewHandle {
        let (flag, enabled) = watch::channel(true);
        let task = tokio::spawn(async move { self.run(interval, enabled, reviews).await });
        AutoReviewHandle { flag, task }
    }
}

pub struct AutoReviewHandle {
    flag: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl AutoReviewHandle {
    /// Stop scheduling further polls.
    pub fn stop(&self) {
        let _ = self.flag.send(false);
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Wait for the poller to exit.
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            tracing::warn!(target: "assist::review", error = %e, "auto review task ended abnormally");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use project_assistant_core::models::PullRequestFileDiff;

    fn bundle(body: &str, diff: &str) -> PullRequestReviewBundle {
        PullRequestReviewBundle {
            summary: PullRequestSummary {
                number: 42,
                title: "Add cache".into(),
                author: "ann".into(),
                url: "https://github.com/acme/widgets/pull/42".into(),
                updated_at: "2024-05-01T00:00:00Z".into(),
                body: body.into(),
                additions: 10,
                deletions: 2,
                changed_files: 1,
                base_branch: "main".into(),
                head_branch: "feature/cache".into(),
            },
            files: vec![PullRequestFileDiff {
                filename: "src/cache.rs".into(),
                status: "added".into(),
                additions: 10,
                deletions: 2,
                changes: 12,
                patch: None,
            }],
            diff: diff.into(),
        }
    }

    #[test]
    fn test_context_query() {
        assert_eq!(
            review_context_query(&bundle("", "")),
            "Pull request #42: Add cache\nBase branch: main, head: feature/cache\nSummary: No description\nChanged files: src/cache.rs"
        );
    }

    #[test]
    fn test_user_prompt_layout() {
        let prompt = review_user_prompt(&bundle("Adds an LRU.", "+fn get()"), 1000);
        assert!(prompt.starts_with(
            "Review pull request #42: Add cache\nAuthor: ann (feature/cache -> main)\n"
        ));
        assert!(prompt.contains("Pull request description:\nAdds an LRU.\n"));
        assert!(prompt.contains("- src/cache.rs (added, +10 -2, Δ12)"));
        assert!(prompt.contains("```diff\n+fn get()\n```"));
        assert!(prompt.ends_with("Findings, Potential Bugs, and Recommendations."));
    }

    #[test]
    fn test_user_prompt_truncates_diff() {
        let prompt = review_user_prompt(&bundle("", &"x".repeat(50)), 10);
        assert!(prompt.contains(&format!("```diff\n{}\n... (diff truncated)\n```", "x".repeat(10))));
        assert!(prompt.contains("No description provided."));
    }

    #[test]
    fn test_empty_file_list() {
        let mut b = bundle("", "");
        b.files.clear();
        assert!(review_user_prompt(&b, 10).contains("Changed files:\nNo file data.\n"));
    }
}
