//! Configuration handling for slated
//!
//! Configuration is stored in `.slated/config.toml` (vault) and
//! `~/.config/slated/config.toml` (global). Both files are merged key by key,
//! with vault values taking precedence.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::Settings;

/// Name of the per-vault configuration directory
pub const CONFIG_DIR: &str = ".slated";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to parse configuration: {0}")]
    Parse(String),
}

/// Where dated notes live and how they are named
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NotesConfig {
    /// Folder holding dated notes, relative to the vault root
    pub folder: Option<String>,

    /// chrono format string for note names
    pub date_format: String,

    /// File extension without the dot
    pub extension: String,

    /// Template used for new dated notes, relative to the vault root
    pub template: Option<PathBuf>,
}

impl Default for NotesConfig {
    fn default() -> Self {
        Self {
            folder: None,
            date_format: "%Y-%m-%d".to_string(),
            extension: "md".to_string(),
            template: None,
        }
    }
}

/// Settings for `slated watch`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WatchConfig {
    /// Debounce delay in milliseconds
    pub debounce_ms: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self { debounce_ms: 500 }
    }
}

/// Full configuration as read from disk
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct VaultConfig {
    pub tasks: Settings,
    pub notes: NotesConfig,
    pub watch: WatchConfig,
}

impl VaultConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.tasks
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;

        if self.notes.date_format.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "notes.date_format must not be empty".to_string(),
            ));
        }
        if self.notes.extension.is_empty() || self.notes.extension.starts_with('.') {
            return Err(ConfigError::Invalid(format!(
                "notes.extension must be given without a dot, got '{}'",
                self.notes.extension
            )));
        }

        Ok(())
    }
}

/// Combined configuration (global + vault)
#[derive(Debug, Clone)]
pub struct Config {
    pub vault: VaultConfig,
    pub vault_root: Option<PathBuf>,
}

impl Config {
    /// Loads configuration for the vault containing the current directory
    pub fn load() -> Result<Self> {
        match Self::find_vault_root() {
            Some(root) => Self::for_vault(&root),
            None => Ok(Self {
                vault: Self::merged(Self::global_table()?, None)?,
                vault_root: None,
            }),
        }
    }

    /// Loads configuration for a specific vault
    pub fn for_vault(vault_root: &Path) -> Result<Self> {
        let project = Self::read_table(&Self::config_path(vault_root))
            .context("Failed to load vault config")?;
        let vault = Self::merged(Self::global_table()?, project)?;

        Ok(Self {
            vault,
            vault_root: Some(vault_root.to_path_buf()),
        })
    }

    /// Returns the global config directory
    pub fn global_config_dir() -> Option<PathBuf> {
        ProjectDirs::from("dev", "slated", "slated").map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Path of the vault configuration file
    pub fn config_path(vault_root: &Path) -> PathBuf {
        vault_root.join(CONFIG_DIR).join("config.toml")
    }

    fn global_table() -> Result<Option<toml::Table>> {
        match Self::global_config_dir() {
            Some(dir) => {
                Self::read_table(&dir.join("config.toml")).context("Failed to load global config")
            }
            None => Ok(None),
        }
    }

    fn read_table(path: &Path) -> Result<Option<toml::Table>> {
        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;

        let table = content
            .parse::<toml::Table>()
            .map_err(|e| ConfigError::Parse(e.to_string()))
            .with_context(|| format!("Failed to parse config: {}", path.display()))?;

        Ok(Some(table))
    }

    /// Merges the global and vault tables and validates the result
    fn merged(global: Option<toml::Table>, project: Option<toml::Table>) -> Result<VaultConfig> {
        let mut table = global.unwrap_or_default();
        if let Some(project) = project {
            merge_tables(&mut table, project);
        }

        let config: VaultConfig = toml::Value::Table(table)
            .try_into()
            .map_err(|e: toml::de::Error| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Finds the vault root by looking for a `.slated/` directory
    pub fn find_vault_root() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;
        Self::find_vault_root_from(&current)
    }

    pub fn find_vault_root_from(start: &Path) -> Option<PathBuf> {
        let mut current = start.to_path_buf();

        loop {
            if current.join(CONFIG_DIR).is_dir() {
                return Some(current);
            }

            if !current.pop() {
                return None;
            }
        }
    }

    /// Returns the vault root, or an error if not in a vault
    pub fn require_vault_root(&self) -> Result<&Path> {
        self.vault_root
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("Not in a slated vault. Run 'slated init' first."))
    }

    /// Creates `.slated/config.toml` with defaults unless it already exists.
    /// Returns true when a new file was written.
    pub fn init(vault_root: &Path) -> Result<bool> {
        let path = Self::config_path(vault_root);
        if path.exists() {
            return Ok(false);
        }

        Self {
            vault: VaultConfig::default(),
            vault_root: Some(vault_root.to_path_buf()),
        }
        .save()?;
        Ok(true)
    }

    /// Saves the vault configuration
    pub fn save(&self) -> Result<()> {
        let root = self.require_vault_root()?;
        let dir = root.join(CONFIG_DIR);
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;

        let config_path = Self::config_path(root);
        let content =
            toml::to_string_pretty(&self.vault).context("Failed to serialize vault config")?;

        fs::write(&config_path, content)
            .with_context(|| format!("Failed to write vault config: {}", config_path.display()))
    }
}

/// Overlays `overlay` onto `base`, descending into nested tables
fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(nested)) => {
                merge_tables(existing, nested);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}
