//! Workspace management
//!
//! Handles vault initialization and ties configuration to the note store.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use thiserror::Error;

use super::config::{Config, CONFIG_DIR};
use super::vault::Vault;
use crate::domain::Settings;

#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("Not in a slated vault. Run 'slated init' first.")]
    NotInVault,
}

/// An opened vault together with its configuration
pub struct Workspace {
    root: PathBuf,
    config: Config,
    vault: Vault,
}

impl Workspace {
    /// Opens an existing vault at the given path
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();

        if !root.join(CONFIG_DIR).is_dir() {
            return Err(WorkspaceError::NotInVault.into());
        }

        let config = Config::for_vault(&root)?;
        let vault = Vault::open(&root, config.vault.notes.clone())?;

        Ok(Self {
            root,
            config,
            vault,
        })
    }

    /// Opens the vault at the current directory or a parent
    pub fn open_current() -> Result<Self> {
        let root = Config::find_vault_root().ok_or(WorkspaceError::NotInVault)?;

        Self::open(root)
    }

    /// Initializes a vault at the given path
    pub fn init(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let config_dir = root.join(CONFIG_DIR);

        fs::create_dir_all(&config_dir).with_context(|| {
            format!(
                "Failed to create {} directory: {}",
                CONFIG_DIR,
                config_dir.display()
            )
        })?;

        Config::init(&root)?;

        Self::open(root)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn settings(&self) -> &Settings {
        &self.config.vault.tasks
    }

    pub fn vault(&self) -> &Vault {
        &self.vault
    }

    /// Consumes the workspace, returning its store and configuration
    pub fn into_parts(self) -> (Vault, Config) {
        (self.vault, self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn init_creates_config() {
        let dir = TempDir::new().unwrap();
        let workspace = Workspace::init(dir.path()).unwrap();

        assert!(dir.path().join(CONFIG_DIR).is_dir());
        assert!(Config::config_path(dir.path()).exists());
        assert_eq!(workspace.settings().tasks_header, "## Tasks");
    }

    #[test]
    fn init_is_idempotent() {
        let dir = TempDir::new().unwrap();
        Workspace::init(dir.path()).unwrap();
        fs::write(
            Config::config_path(dir.path()),
            "[tasks]\ntasks_header = \"# Todo\"\n",
        )
        .unwrap();

        let workspace = Workspace::init(dir.path()).unwrap();
        assert_eq!(workspace.settings().tasks_header, "# Todo");
    }

    #[test]
    fn open_requires_config_dir() {
        let dir = TempDir::new().unwrap();
        let err = Workspace::open(dir.path()).err().unwrap();
        assert!(err.to_string().contains("slated init"));
    }
}
