//! Local git invocations.

use anyhow::{Context, Result};
use std::path::Path;
use thiserror::Error;
use tokio::process::Command;

use project_assistant_core::models::RemoteRepo;
use project_assistant_core::remote::detect_github_repo;

/// A `git` invocation that ran but did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}", describe(*code, stderr))]
pub struct GitCommandError {
    /// Exit code; `None` when git was killed by a signal.
    pub code: Option<i32>,
    pub stderr: String,
}

fn describe(code: Option<i32>, stderr: &str) -> String {
    if !stderr.is_empty() {
        return stderr.to_string();
    }
    match code {
        Some(code) => format!("git exited with code {}", code),
        None => "git was terminated by a signal".to_string(),
    }
}

async fn run_git(repo: &Path, args: &[&str]) -> Result<String> {
    let output = Command::new("git")
        .args(args)
        .current_dir(repo)
        .output()
        .await
        .with_context(|| format!("Failed to execute 'git {}'. Is git installed?", args.join(" ")))?;

    if !output.status.success() {
        return Err(GitCommandError {
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        }
        .into());
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Name of the checked-out branch (`HEAD` when detached).
pub async fn current_branch(repo: &Path) -> Result<String> {
    run_git(repo, &["rev-parse", "--abbrev-ref", "HEAD"]).await
}

/// URL of the `origin` remote, if one is configured.
pub async fn remote_url(repo: &Path) -> Result<Option<String>> {
    match run_git(repo, &["config", "--get", "remote.origin.url"]).await {
        Ok(url) if !url.is_empty() => Ok(Some(url)),
        Ok(_) => Ok(None),
        // `git config --get` exits 1 when the key is unset.
        Err(e) if is_unset_key(&e) => Ok(None),
        Err(e) => Err(e),
    }
}

fn is_unset_key(err: &anyhow::Error) -> bool {
    err.downcast_ref::<GitCommandError>()
        .is_some_and(|e| e.code == Some(1))
}

/// GitHub repository behind `origin`, or `None` when there is no remote
/// or it is not hosted on a GitHub host.
pub async fn detect_remote_repo(repo: &Path) -> Result<Option<RemoteRepo>> {
    let Some(url) = remote_url(repo).await? else {
        return Ok(None);
    };
    Ok(detect_github_repo(&url))
}
