//! Git remote URL inference.
//!
//! Recognized shapes:
//!
//! - `https://host/owner/repo(.git)` (also `http://`)
//! - `ssh://[user@]host[:port]/owner/repo`
//! - `git://host/owner/repo`
//! - SCP-style `user@host:owner/repo`

use crate::models::RemoteRepo;

/// Public GitHub REST endpoint.
pub const DEFAULT_GITHUB_API: &str = "https://api.github.com";

const SCHEMES: &[&str] = &["https://", "http://", "ssh://", "git+ssh://", "git://"];

/// Parse a remote URL into host, owner, and repository name.
pub fn parse_remote_url(url: &str) -> Option<RemoteRepo> {
    let cleaned = url.trim().trim_end_matches('/');
    let cleaned = cleaned.strip_suffix(".git").unwrap_or(cleaned);
    if cleaned.is_empty() {
        return None;
    }

    let lower = cleaned.to_ascii_lowercase();
    if let Some(scheme) = SCHEMES.iter().find(|s| lower.starts_with(**s)) {
        let rest = &cleaned[scheme.len()..];
        let (authority, path) = rest.split_once('/')?;
        let host_port = authority.rsplit_once('@').map_or(authority, |(_, h)| h);
        let host = host_port.split(':').next().unwrap_or(host_port);
        return build(host, path);
    }

    if cleaned.contains("://") {
        return None;
    }

    // SCP-style: [user@]host:owner/repo
    let (authority, path) = cleaned.split_once(':')?;
    let host = authority.rsplit_once('@').map_or(authority, |(_, h)| h);
    build(host, path)
}

fn build(host: &str, path: &str) -> Option<RemoteRepo> {
    let host = host.trim();
    if host.is_empty() || host.contains('/') {
        return None;
    }
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    if segments.len() < 2 {
        return None;
    }
    let owner = segments[segments.len() - 2];
    let repo = segments[segments.len() - 1];
    Some(RemoteRepo {
        host: host.to_string(),
        owner: owner.to_string(),
        repo: repo.to_string(),
    })
}

/// Like [`parse_remote_url`], but only for hosts whose name contains
/// `github` (github.com and GitHub Enterprise installs).
pub fn detect_github_repo(url: &str) -> Option<RemoteRepo> {
    parse_remote_url(url).filter(|r| r.host.to_ascii_lowercase().contains("github"))
}

/// REST base URL for a host: the public API for github.com, the
/// Enterprise `/api/v3` path otherwise.
pub fn default_api_url(host: &str) -> String {
    let host = host.trim().trim_end_matches('/');
    if host.eq_ignore_ascii_case("github.com") {
        DEFAULT_GITHUB_API.to_string()
    } else {
        format!("https://{}/api/v3", host)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo(host: &str, owner: &str, name: &str) -> RemoteRepo {
        RemoteRepo {
            host: host.into(),
            owner: owner.into(),
            repo: name.into(),
        }
    }

    #[test]
    fn test_scp_style() {
        assert_eq!(
            parse_remote_url("git@github.com:acme/widgets.git"),
            Some(repo("github.com", "acme", "widgets"))
        );
    }

    #[test]
    fn test_https_with_and_without_suffix() {
        assert_eq!(
            parse_remote_url("https://github.com/acme/widgets"),
            Some(repo("github.com", "acme", "widgets"))
        );
        assert_eq!(
            parse_remote_url("https://token@github.com/acme/widgets.git/"),
            Some(repo("github.com", "acme", "widgets"))
        );
    }

    #[test]
    fn test_ssh_and_git_schemes() {
        assert_eq!(
            parse_remote_url("ssh://git@github.example.com:2222/acme/widgets.git"),
            Some(repo("github.example.com", "acme", "widgets"))
        );
        assert_eq!(
            parse_remote_url("git://github.com/acme/widgets"),
            Some(repo("github.com", "acme", "widgets"))
        );
    }

    #[test]
    fn test_unparseable() {
        assert_eq!(parse_remote_url(""), None);
        assert_eq!(parse_remote_url("not a url"), None);
        assert_eq!(parse_remote_url("https://github.com/acme"), None);
        assert_eq!(parse_remote_url("ftp://github.com/acme/widgets"), None);
    }

    #[test]
    fn test_github_filter() {
        assert_eq!(
            detect_github_repo("git@github.com:acme/widgets.git"),
            Some(repo("github.com", "acme", "widgets"))
        );
        assert_eq!(detect_github_repo("https://gitlab.example.com/acme/widgets.git"), None);
    }

    #[test]
    fn test_default_api_url() {
        assert_eq!(default_api_url("GitHub.com"), "https://api.github.com");
        assert_eq!(
            default_api_url("github.example.com"),
            "https://github.example.com/api/v3"
        );
    }
}
