//! GitHub REST client.
//!
//! Thin typed wrappers over the endpoints the tools and the review
//! assembler need. Every response type is lenient: fields are optional
//! and unknown fields are ignored, so API additions never break parsing.

use anyhow::{bail, Context, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

use project_assistant_core::models::{PullRequestFileDiff, PullRequestSummary};

const API_VERSION: &str = "2022-11-28";
const USER_AGENT: &str = "project-assistant";
const JSON_MEDIA_TYPE: &str = "application/vnd.github+json";
const DIFF_MEDIA_TYPE: &str = "application/vnd.github.v3.diff";

/// A resolved repository plus the credentials to reach it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GithubRepoConfig {
    pub token: String,
    pub owner: String,
    pub repo: String,
    pub api_url: String,
}

impl GithubRepoConfig {
    pub fn label(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }

    fn repo_url(&self, path: &str) -> String {
        format!(
            "{}/repos/{}/{}{}",
            self.api_url.trim_end_matches('/'),
            self.owner,
            self.repo,
            path
        )
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GithubUser {
    pub login: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GithubRepository {
    pub name: Option<String>,
    pub description: Option<String>,
    pub language: Option<String>,
    pub default_branch: Option<String>,
    #[serde(rename = "open_issues_count")]
    pub open_issues: Option<u64>,
    #[serde(rename = "stargazers_count")]
    pub stars: Option<u64>,
    pub html_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GithubIssue {
    pub number: Option<u64>,
    pub title: Option<String>,
    pub state: Option<String>,
    pub user: Option<GithubUser>,
    pub html_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GithubBranchRef {
    pub label: Option<String>,
    #[serde(rename = "ref")]
    pub ref_name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GithubPullRequest {
    pub number: Option<u64>,
    pub title: Option<String>,
    pub state: Option<String>,
    pub user: Option<GithubUser>,
    pub body: Option<String>,
    pub draft: Option<bool>,
    pub additions: Option<u64>,
    pub deletions: Option<u64>,
    pub changed_files: Option<u64>,
    pub base: Option<GithubBranchRef>,
    pub head: Option<GithubBranchRef>,
    pub updated_at: Option<String>,
    pub html_url: Option<String>,
}

fn branch_name(branch: &Option<GithubBranchRef>) -> String {
    branch
        .as_ref()
        .and_then(|b| b.ref_name.clone().or_else(|| b.label.clone()))
        .unwrap_or_else(|| "unknown".to_string())
}

impl GithubPullRequest {
    /// Normalize into a [`PullRequestSummary`]; `None` without a number.
    pub fn to_summary(&self) -> Option<PullRequestSummary> {
        let number = self.number?;
        Some(PullRequestSummary {
            number,
            title: self.title.clone().unwrap_or_default(),
            author: self
                .user
                .as_ref()
                .and_then(|u| u.login.clone())
                .unwrap_or_else(|| "unknown".to_string()),
            url: self.html_url.clone().unwrap_or_default(),
            updated_at: self.updated_at.clone().unwrap_or_default(),
            body: self.body.clone().unwrap_or_default(),
            additions: self.additions.unwrap_or(0),
            deletions: self.deletions.unwrap_or(0),
            changed_files: self.changed_files.unwrap_or(0),
            base_branch: branch_name(&self.base),
            head_branch: branch_name(&self.head),
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GithubPullRequestFile {
    pub filename: Option<String>,
    pub status: Option<String>,
    pub additions: Option<u64>,
    pub deletions: Option<u64>,
    pub changes: Option<u64>,
    pub patch: Option<String>,
}

impl GithubPullRequestFile {
    pub fn to_file_diff(&self) -> Option<PullRequestFileDiff> {
        Some(PullRequestFileDiff {
            filename: self.filename.clone()?,
            status: self.status.clone().unwrap_or_default(),
            additions: self.additions.unwrap_or(0),
            deletions: self.deletions.unwrap_or(0),
            changes: self.changes.unwrap_or(0),
            patch: self.patch.clone(),
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GithubCommitAuthor {
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GithubCommitDetail {
    pub message: Option<String>,
    pub author: Option<GithubCommitAuthor>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GithubCommit {
    pub sha: Option<String>,
    pub html_url: Option<String>,
    pub commit: Option<GithubCommitDetail>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GithubBranchCommit {
    pub sha: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GithubBranch {
    pub name: Option<String>,
    pub commit: Option<GithubBranchCommit>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GithubContributor {
    pub login: Option<String>,
    pub contributions: Option<u64>,
    pub html_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GithubClient {
    client: reqwest::Client,
}

impl GithubClient {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self { client })
    }

    fn request(
        &self,
        config: &GithubRepoConfig,
        path: &str,
        accept: &str,
    ) -> reqwest::RequestBuilder {
        self.client
            .get(config.repo_url(path))
            .bearer_auth(&config.token)
            .header(reqwest::header::ACCEPT, accept)
            .header("X-GitHub-Api-Version", API_VERSION)
    }

    async fn send(&self, builder: reqwest::RequestBuilder, what: &str) -> Result<reqwest::Response> {
        let response = builder
            .send()
            .await
            .with_context(|| format!("GitHub request failed: {}", what))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("GitHub API error {} for {}: {}", status, what, body);
        }
        Ok(response)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        config: &GithubRepoConfig,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let builder = self.request(config, path, JSON_MEDIA_TYPE).query(query);
        let response = self.send(builder, path).await?;
        response
            .json::<T>()
            .await
            .with_context(|| format!("Failed to decode GitHub response for {}", path))
    }

    pub async fn fetch_repository(&self, config: &GithubRepoConfig) -> Result<GithubRepository> {
        self.get_json(config, "", &[]).await
    }

    pub async fn fetch_open_issues(
        &self,
        config: &GithubRepoConfig,
        limit: usize,
    ) -> Result<Vec<GithubIssue>> {
        self.get_json(
            config,
            "/issues",
            &[("state", "open".to_string()), ("per_page", limit.to_string())],
        )
        .await
    }

    pub async fn fetch_pull_requests(
        &self,
        config: &GithubRepoConfig,
        state: &str,
        limit: usize,
    ) -> Result<Vec<GithubPullRequest>> {
        self.get_json(
            config,
            "/pulls",
            &[("state", state.to_string()), ("per_page", limit.to_string())],
        )
        .await
    }

    pub async fn fetch_pull_request(
        &self,
        config: &GithubRepoConfig,
        number: u64,
    ) -> Result<GithubPullRequest> {
        self.get_json(config, &format!("/pulls/{}", number), &[]).await
    }

    /// Unified diff for a pull request, as raw text.
    pub async fn fetch_pull_request_diff(
        &self,
        config: &GithubRepoConfig,
        number: u64,
    ) -> Result<String> {
        let path = format!("/pulls/{}", number);
        let builder = self.request(config, &path, DIFF_MEDIA_TYPE);
        let response = self.send(builder, &path).await?;
        Ok(response.text().await?)
    }

    pub async fn fetch_pull_request_files(
        &self,
        config: &GithubRepoConfig,
        number: u64,
        limit: usize,
    ) -> Result<Vec<GithubPullRequestFile>> {
        self.get_json(
            config,
            &format!("/pulls/{}/files", number),
            &[("per_page", limit.to_string())],
        )
        .await
    }

    pub async fn fetch_latest_commits(
        &self,
        config: &GithubRepoConfig,
        limit: usize,
    ) -> Result<Vec<GithubCommit>> {
        self.get_json(config, "/commits", &[("per_page", limit.to_string())])
            .await
    }

    pub async fn fetch_branches(
        &self,
        config: &GithubRepoConfig,
        limit: usize,
    ) -> Result<Vec<GithubBranch>> {
        self.get_json(config, "/branches", &[("per_page", limit.to_string())])
            .await
    }

    pub async fn fetch_contributors(
        &self,
        config: &GithubRepoConfig,
        limit: usize,
    ) -> Result<Vec<GithubContributor>> {
        self.get_json(config, "/contributors", &[("per_page", limit.to_string())])
            .await
    }
}
