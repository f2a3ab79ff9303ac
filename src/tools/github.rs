//! Remote repository tools backed by the GitHub REST API.
//!
//! Each tool formats one short summary with a line per item. A failing
//! tool only fails its own call.

use anyhow::Result;
use async_trait::async_trait;

use super::{ServerDefinition, Tool, ToolContext};
use crate::github::{
    GithubBranch, GithubCommit, GithubContributor, GithubIssue, GithubPullRequest,
    GithubRepoConfig, GithubRepository,
};

pub const SERVER_ID: &str = "github";

const LIST_LIMIT: usize = 5;
/// Page size for the changed-files listing of a review.
pub const PR_FILES_LIMIT: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GithubAction {
    RepoOverview,
    OpenIssues,
    OpenPullRequests,
    LatestCommits,
    Branches,
    TopContributors,
}

impl GithubAction {
    pub const ALL: [GithubAction; 6] = [
        GithubAction::RepoOverview,
        GithubAction::OpenIssues,
        GithubAction::OpenPullRequests,
        GithubAction::LatestCommits,
        GithubAction::Branches,
        GithubAction::TopContributors,
    ];

    fn id(self) -> &'static str {
        match self {
            GithubAction::RepoOverview => "github-repo-overview",
            GithubAction::OpenIssues => "github-open-issues",
            GithubAction::OpenPullRequests => "github-open-prs",
            GithubAction::LatestCommits => "github-latest-commits",
            GithubAction::Branches => "github-branches",
            GithubAction::TopContributors => "github-top-contributors",
        }
    }

    fn label(self) -> &'static str {
        match self {
            GithubAction::RepoOverview => "Repository overview",
            GithubAction::OpenIssues => "Open issues",
            GithubAction::OpenPullRequests => "Open pull requests",
            GithubAction::LatestCommits => "Recent commits",
            GithubAction::Branches => "Latest branches",
            GithubAction::TopContributors => "Top contributors",
        }
    }

    fn describe(self, repo: &str) -> String {
        match self {
            GithubAction::RepoOverview => format!(
                "Summarizes description, language, branch, and counters for {}.",
                repo
            ),
            GithubAction::OpenIssues => format!("Lists the latest open GitHub issues for {}.", repo),
            GithubAction::OpenPullRequests => {
                format!("Lists the latest open pull requests for {}.", repo)
            }
            GithubAction::LatestCommits => format!("Shows the latest commits merged into {}.", repo),
            GithubAction::Branches => {
                format!("Lists the most recently updated branches for {}.", repo)
            }
            GithubAction::TopContributors => {
                format!("Lists the most active contributors for {}.", repo)
            }
        }
    }
}

pub struct GithubTool {
    action: GithubAction,
    config: GithubRepoConfig,
    description: String,
}

impl GithubTool {
    pub fn new(action: GithubAction, config: GithubRepoConfig) -> Self {
        let description = action.describe(&config.label());
        Self {
            action,
            config,
            description,
        }
    }
}

#[async_trait]
impl Tool for GithubTool {
    fn id(&self) -> &str {
        self.action.id()
    }

    fn label(&self) -> &str {
        self.action.label()
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn enabled_by_default(&self) -> bool {
        self.action == GithubAction::RepoOverview
    }

    async fn execute(&self, _payload: Option<&str>, ctx: &ToolContext<'_>) -> Result<String> {
        let client = ctx.github;
        let config = &self.config;
        let repo = config.label();
        let text = match self.action {
            GithubAction::RepoOverview => {
                format_overview(&repo, &client.fetch_repository(config).await?)
            }
            GithubAction::OpenIssues => {
                format_issues(&repo, &client.fetch_open_issues(config, LIST_LIMIT).await?)
            }
            GithubAction::OpenPullRequests => format_pull_requests(
                &repo,
                &client.fetch_pull_requests(config, "open", LIST_LIMIT).await?,
            ),
            GithubAction::LatestCommits => {
                format_commits(&repo, &client.fetch_latest_commits(config, LIST_LIMIT).await?)
            }
            GithubAction::Branches => {
                format_branches(&repo, &client.fetch_branches(config, LIST_LIMIT).await?)
            }
            GithubAction::TopContributors => {
                format_contributors(&repo, &client.fetch_contributors(config, LIST_LIMIT).await?)
            }
        };
        Ok(text)
    }
}

pub fn server(config: GithubRepoConfig) -> ServerDefinition {
    let repo = config.label();
    ServerDefinition {
        id: SERVER_ID,
        name: "GitHub",
        description: format!(
            "Model Context Protocol bridge for {} via the GitHub API.",
            repo
        ),
        online: true,
        tools: GithubAction::ALL
            .into_iter()
            .map(|action| Box::new(GithubTool::new(action, config.clone())) as Box<dyn Tool>)
            .collect(),
    }
}

fn short_sha(sha: Option<&str>) -> String {
    match sha {
        Some(sha) => sha.chars().take(7).collect(),
        None => "???????".to_string(),
    }
}

fn number_or_unknown(number: Option<u64>) -> String {
    number
        .map(|n| n.to_string())
        .unwrap_or_else(|| "?".to_string())
}

fn login_of(user: Option<&crate::github::GithubUser>) -> &str {
    user.and_then(|u| u.login.as_deref()).unwrap_or("unknown")
}

pub fn format_overview(repo: &str, meta: &GithubRepository) -> String {
    let fields: [(&str, Option<String>); 6] = [
        ("Description", meta.description.clone()),
        ("Language", meta.language.clone()),
        ("Default branch", meta.default_branch.clone()),
        ("Stars", meta.stars.map(|n| n.to_string())),
        ("Open issues", meta.open_issues.map(|n| n.to_string())),
        ("URL", meta.html_url.clone()),
    ];
    if fields.iter().all(|(_, v)| v.is_none()) {
        return format!("No metadata available for {}.", repo);
    }
    let mut out = format!("Repository: {}", repo);
    for (name, value) in fields {
        if let Some(value) = value {
            out.push_str(&format!("\n{}: {}", name, value));
        }
    }
    out
}

pub fn format_issues(repo: &str, issues: &[GithubIssue]) -> String {
    if issues.is_empty() {
        return format!("No open issues found for {}.", repo);
    }
    let lines: Vec<String> = issues
        .iter()
        .map(|issue| {
            format!(
                "#{} {} (by {}) {}",
                number_or_unknown(issue.number),
                issue.title.as_deref().unwrap_or_default(),
                login_of(issue.user.as_ref()),
                issue.html_url.as_deref().unwrap_or_default()
            )
        })
        .collect();
    format!("Open issues for {}:\n{}", repo, lines.join("\n"))
}

pub fn format_pull_requests(repo: &str, pulls: &[GithubPullRequest]) -> String {
    if pulls.is_empty() {
        return format!("No open pull requests found for {}.", repo);
    }
    let lines: Vec<String> = pulls
        .iter()
        .map(|pr| {
            format!(
                "PR #{} {} (by {}) {}",
                number_or_unknown(pr.number),
                pr.title.as_deref().unwrap_or_default(),
                login_of(pr.user.as_ref()),
                pr.html_url.as_deref().unwrap_or_default()
            )
        })
        .collect();
    format!("Open pull requests for {}:\n{}", repo, lines.join("\n"))
}

pub fn format_commits(repo: &str, commits: &[GithubCommit]) -> String {
    if commits.is_empty() {
        return format!("GitHub returned no recent commits for {}.", repo);
    }
    let lines: Vec<String> = commits
        .iter()
        .map(|commit| {
            let detail = commit.commit.as_ref();
            let title = detail
                .and_then(|d| d.message.as_deref())
                .and_then(|m| m.lines().next())
                .filter(|t| !t.trim().is_empty())
                .unwrap_or("(no message)");
            let author = detail
                .and_then(|d| d.author.as_ref())
                .and_then(|a| a.name.as_deref())
                .unwrap_or("unknown");
            format!(
                "{} {} by {} {}",
                short_sha(commit.sha.as_deref()),
                title,
                author,
                commit.html_url.as_deref().unwrap_or_default()
            )
        })
        .collect();
    format!("Latest commits for {}:\n{}", repo, lines.join("\n"))
}

pub fn format_branches(repo: &str, branches: &[GithubBranch]) -> String {
    if branches.is_empty() {
        return format!("No branches returned for {}.", repo);
    }
    let lines: Vec<String> = branches
        .iter()
        .map(|branch| {
            format!(
                "{} @ {}",
                branch.name.as_deref().unwrap_or("unknown"),
                short_sha(branch.commit.as_ref().and_then(|c| c.sha.as_deref()))
            )
        })
        .collect();
    format!("Branches for {}:\n{}", repo, lines.join("\n"))
}

pub fn format_contributors(repo: &str, contributors: &[GithubContributor]) -> String {
    if contributors.is_empty() {
        return format!("GitHub returned no contributors for {}.", repo);
    }
    let lines: Vec<String> = contributors
        .iter()
        .map(|c| {
            format!(
                "{} ({} commits) {}",
                c.login.as_deref().unwrap_or("unknown"),
                c.contributions.unwrap_or(0),
                c.html_url.as_deref().unwrap_or_default()
            )
        })
        .collect();
    format!("Top contributors for {}:\n{}", repo, lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::github::{GithubBranchCommit, GithubCommitAuthor, GithubCommitDetail, GithubUser};

    #[test]
    fn test_overview_lines_and_empty() {
        let meta = GithubRepository {
            description: Some("Widgets".into()),
            stars: Some(3),
            ..Default::default()
        };
        assert_eq!(
            format_overview("acme/widgets", &meta),
            "Repository: acme/widgets\nDescription: Widgets\nStars: 3"
        );
        assert_eq!(
            format_overview("acme/widgets", &GithubRepository::default()),
            "No metadata available for acme/widgets."
        );
    }

    #[test]
    fn test_issue_and_pr_lines() {
        let issue = GithubIssue {
            number: Some(7),
            title: Some("Crash".into()),
            user: Some(GithubUser {
                login: Some("ann".into()),
            }),
            html_url: Some("https://x/7".into()),
            ..Default::default()
        };
        assert_eq!(
            format_issues("a/b", &[issue]),
            "Open issues for a/b:\n#7 Crash (by ann) https://x/7"
        );
        assert_eq!(
            format_pull_requests("a/b", &[GithubPullRequest::default()]),
            "Open pull requests for a/b:\nPR #?  (by unknown) "
        );
        assert_eq!(format_issues("a/b", &[]), "No open issues found for a/b.");
    }

    #[test]
    fn test_commit_and_branch_lines() {
        let commit = GithubCommit {
            sha: Some("0123456789abcdef".into()),
            html_url: Some("u".into()),
            commit: Some(GithubCommitDetail {
                message: Some("Fix bug\n\nLonger body".into()),
                author: Some(GithubCommitAuthor {
                    name: Some("Bo".into()),
                }),
            }),
        };
        assert_eq!(
            format_commits("a/b", &[commit, GithubCommit::default()]),
            "Latest commits for a/b:\n0123456 Fix bug by Bo u\n??????? (no message) by unknown "
        );

        let branch = GithubBranch {
            name: Some("main".into()),
            commit: Some(GithubBranchCommit {
                sha: Some("abcdef123".into()),
            }),
        };
        assert_eq!(format_branches("a/b", &[branch]), "Branches for a/b:\nmain @ abcdef1");
        assert_eq!(
            format_contributors("a/b", &[]),
            "GitHub returned no contributors for a/b."
        );
    }

    #[test]
    fn test_only_overview_on_by_default() {
        let config = GithubRepoConfig {
            token: "t".into(),
            owner: "acme".into(),
            repo: "widgets".into(),
            api_url: "http://localhost".into(),
        };
        let server = server(config);
        let enabled: Vec<&str> = server
            .tools
            .iter()
            .filter(|t| t.enabled_by_default())
            .map(|t| t.id())
            .collect();
        assert_eq!(enabled, vec!["github-repo-overview"]);
        assert_eq!(
            server.tools[0].description(),
            "Summarizes description, language, branch, and counters for acme/widgets."
        );
    }
}
