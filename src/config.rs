//! Configuration management with YAML support

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub policy: PolicyConfig,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_path")]
    pub path: String,
}

/// Write-policy configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PolicyConfig {
    #[serde(default)]
    pub writes: WritePolicy,
}

/// Who may extend a conversation's branches. The two options are mutually
/// exclusive; deleting a conversation is owner-only under either.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum WritePolicy {
    /// Only the conversation owner may post or branch (default).
    #[default]
    #[serde(rename = "owner_only_writes")]
    OwnerOnly,

    /// Any authenticated author may post or branch.
    #[serde(rename = "collaborative_writes")]
    Collaborative,
}

// Default value functions
fn default_database_path() -> String {
    "~/.local/share/arbor/arbor.db".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

impl Config {
    /// Load configuration from a YAML file
    /// Searches in order:
    /// 1. Provided path
    /// 2. ./arbor.yaml (current directory)
    /// 3. ~/.config/arbor/arbor.yaml
    pub fn load(path: &str) -> Result<Self> {
        let search_paths = vec![
            shellexpand::tilde(path).to_string(),
            "arbor.yaml".to_string(),
            shellexpand::tilde("~/.config/arbor/arbor.yaml").to_string(),
        ];

        for search_path in &search_paths {
            if std::path::Path::new(search_path).exists() {
                let content = std::fs::read_to_string(search_path)?;
                let config: Config = serde_yaml::from_str(&content)?;
                return Ok(config);
            }
        }

        // No config file found, use defaults
        Ok(Config::default())
    }

    /// Get the database path, expanding ~ to home directory
    pub fn database_path(&self) -> PathBuf {
        let expanded = shellexpand::tilde(&self.database.path).to_string();
        PathBuf::from(expanded)
    }

    pub fn write_policy(&self) -> WritePolicy {
        self.policy.writes
    }
}
