//! Persisted user settings.
//!
//! A small JSON file remembering the last project, the last models, and
//! per-tool enable overrides. The store is bound to one path so tests can
//! point it at a temp dir.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::project::write_atomic;

/// Model name used before the user ever picks one.
pub const DEFAULT_MODEL: &str = "llama3.1";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSettings {
    #[serde(default, rename = "lastProject")]
    pub last_project: Option<String>,
    #[serde(default = "default_model", rename = "lastChatModel")]
    pub last_chat_model: String,
    #[serde(default = "default_model", rename = "lastEmbeddingModel")]
    pub last_embedding_model: String,
    /// Tool id → enabled override.
    #[serde(default, rename = "mcpTools")]
    pub tool_overrides: BTreeMap<String, bool>,
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            last_project: None,
            last_chat_model: default_model(),
            last_embedding_model: default_model(),
            tool_overrides: BTreeMap::new(),
        }
    }
}

/// Fields to merge in [`SettingsStore::update`]. `None` keeps the
/// current value.
#[derive(Debug, Clone, Default)]
pub struct SettingsUpdate {
    pub project_path: Option<PathBuf>,
    pub chat_model: Option<String>,
    pub embedding_model: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current settings. A missing or corrupt file yields defaults.
    pub fn load(&self) -> UserSettings {
        std::fs::read_to_string(&self.path)
            .ok()
            .and_then(|content| serde_json::from_str(&content).ok())
            .unwrap_or_default()
    }

    pub fn update(&self, update: SettingsUpdate) -> Result<UserSettings> {
        let mut settings = self.load();
        if let Some(project) = update.project_path {
            let absolute = std::path::absolute(&project).unwrap_or(project);
            settings.last_project = Some(absolute.display().to_string());
        }
        if let Some(model) = update.chat_model {
            settings.last_chat_model = model;
        }
        if let Some(model) = update.embedding_model {
            settings.last_embedding_model = model;
        }
        self.save(&settings)?;
        Ok(settings)
    }

    pub fn set_tool_enabled(&self, tool_id: &str, enabled: bool) -> Result<()> {
        let mut settings = self.load();
        settings.tool_overrides.insert(tool_id.to_string(), enabled);
        self.save(&settings)
    }

    /// Persisted override for `tool_id`, if any.
    pub fn tool_override(&self, tool_id: &str) -> Option<bool> {
        self.load().tool_overrides.get(tool_id).copied()
    }

    fn save(&self, settings: &UserSettings) -> Result<()> {
        let json = serde_json::to_string_pretty(settings)?;
        write_atomic(&self.path, &json)
            .with_context(|| format!("Failed to write settings file: {}", self.path.display()))
    }
}
