//! Configuration parsing and validation.
//!
//! Configuration lives in an optional TOML file. Every section has
//! defaults, so an empty file (or no file) is valid. Values the file
//! leaves unset are then filled from environment variables:
//!
//! | Key | Environment |
//! |---|---|
//! | `ollama.base_url` | `OLLAMA_BASE_URL` |
//! | `ollama.chat_model` | `OLLAMA_CHAT_MODEL` |
//! | `ollama.embedding_model` | `OLLAMA_EMBED_MODEL` |
//! | `github.token` | `MCP_GITHUB_TOKEN` |
//! | `github.owner` / `github.repo` | `MCP_GITHUB_OWNER` / `MCP_GITHUB_REPO` |
//! | `github.api_url` | `MCP_GITHUB_API_URL` |
//! | `webhook.port` | `GITHUB_WEBHOOK_PORT` |
//! | `webhook.secret` | `GITHUB_WEBHOOK_SECRET` |
//!
//! # Example
//!
//! ```toml
//! [ollama]
//! base_url = "http://localhost:11434"
//! chat_model = "llama3.1"
//!
//! [github]
//! token = "ghp_..."
//!
//! [review]
//! poll_interval_secs = 120
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub ollama: OllamaConfig,
    #[serde(default)]
    pub github: GithubConfig,
    #[serde(default)]
    pub webhook: WebhookConfig,
    #[serde(default)]
    pub review: ReviewConfig,
    #[serde(default)]
    pub loader: LoaderConfig,
    #[serde(default)]
    pub settings: SettingsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OllamaConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub chat_model: Option<String>,
    #[serde(default)]
    pub embedding_model: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            chat_model: None,
            embedding_model: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Base URL used when neither the file nor the environment sets one.
pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}
fn default_timeout_secs() -> u64 {
    120
}

/// Code-hosting credentials. `token` gates the whole GitHub tool group.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct GithubConfig {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub repo: Option<String>,
    #[serde(default)]
    pub api_url: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct WebhookConfig {
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub secret: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ReviewConfig {
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_diff_limit")]
    pub diff_char_limit: usize,
    #[serde(default = "default_pr_limit")]
    pub pull_request_limit: usize,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            diff_char_limit: default_diff_limit(),
            pull_request_limit: default_pr_limit(),
        }
    }
}

fn default_poll_interval() -> u64 {
    60
}
fn default_diff_limit() -> usize {
    120_000
}
fn default_pr_limit() -> usize {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoaderConfig {
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,
    #[serde(default = "default_max_chunk_chars")]
    pub max_chunk_chars: usize,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            extensions: default_extensions(),
            max_file_bytes: default_max_file_bytes(),
            max_chunk_chars: default_max_chunk_chars(),
        }
    }
}

fn default_extensions() -> Vec<String> {
    ["md", "txt", "json", "kt", "kts", "java", "js", "ts", "rs", "toml"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_max_file_bytes() -> u64 {
    512 * 1024
}
fn default_max_chunk_chars() -> usize {
    project_assistant_core::chunk::DEFAULT_MAX_CHUNK_CHARS
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct SettingsConfig {
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl SettingsConfig {
    /// Settings file location, defaulting to `~/.project-assistant/state.json`.
    pub fn resolved_path(&self) -> PathBuf {
        if let Some(path) = &self.path {
            return path.clone();
        }
        let home = std::env::var_os("HOME")
            .or_else(|| std::env::var_os("USERPROFILE"))
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));
        home.join(".project-assistant").join("state.json")
    }
}

impl Config {
    /// Fill unset values from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    /// Fill unset values from `lookup`. Blank values count as unset.
    pub fn apply_env_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if self.ollama.base_url == DEFAULT_BASE_URL {
            if let Some(url) = get("OLLAMA_BASE_URL") {
                self.ollama.base_url = url;
            }
        }
        fill(&mut self.ollama.chat_model, get("OLLAMA_CHAT_MODEL"));
        fill(&mut self.ollama.embedding_model, get("OLLAMA_EMBED_MODEL"));
        fill(&mut self.github.token, get("MCP_GITHUB_TOKEN"));
        fill(&mut self.github.owner, get("MCP_GITHUB_OWNER"));
        fill(&mut self.github.repo, get("MCP_GITHUB_REPO"));
        fill(&mut self.github.api_url, get("MCP_GITHUB_API_URL"));
        fill(&mut self.webhook.secret, get("GITHUB_WEBHOOK_SECRET"));
        if self.webhook.port.is_none() {
            self.webhook.port = get("GITHUB_WEBHOOK_PORT").and_then(|p| p.parse().ok());
        }
    }
}

fn fill(slot: &mut Option<String>, value: Option<String>) {
    let unset = slot.as_deref().map(|s| s.trim().is_empty()).unwrap_or(true);
    if unset {
        *slot = value;
    }
}

/// Parse a TOML config string and validate it.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

/// Load a config file, apply environment fallbacks, and validate.
///
/// With `path = None` the defaults are used.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let mut config = match path {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            toml::from_str::<Config>(&content).with_context(|| "Failed to parse config file")?
        }
        None => Config::default(),
    };
    config.apply_env();
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    let base_url = config.ollama.base_url.trim();
    if base_url.is_empty() {
        anyhow::bail!("ollama.base_url must not be empty");
    }
    if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
        anyhow::bail!(
            "ollama.base_url must start with http:// or https:// (got '{}')",
            base_url
        );
    }

    if config.review.diff_char_limit == 0 {
        anyhow::bail!("review.diff_char_limit must be > 0");
    }
    if config.review.poll_interval_secs == 0 {
        anyhow::bail!("review.poll_interval_secs must be > 0");
    }

    if config.loader.max_chunk_chars == 0 {
        anyhow::bail!("loader.max_chunk_chars must be > 0");
    }

    Ok(())
}
