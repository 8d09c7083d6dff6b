//! # Storage Layer
//!
//! Persistence for slated: plain markdown notes plus a small TOML config.
//!
//! ## Storage Formats
//!
//! | Data | Format | Location |
//! |------|--------|----------|
//! | Dated notes | Markdown | `{vault}/{notes.folder}/{date}.md` |
//! | Config | TOML | `{vault}/.slated/config.toml` |
//! | Global config | TOML | `~/.config/slated/config.toml` |
//!
//! ## Concurrency Safety
//!
//! - [`Vault`] writes through a locked temp file (`fs2`) and renames it into place
//! - Reads may be served from an in-memory cache when the caller allows it
//!
//! ## Vault Structure
//!
//! ```text
//! vault/
//! ├── .slated/
//! │   └── config.toml       # Vault configuration
//! ├── 2020-12-31.md         # Dated notes
//! └── 2021-01-03.md
//! ```
//!
//! ## Key Types
//!
//! - [`Workspace`] - Entry point for opening a vault with its configuration
//! - [`DocumentStore`] - Note access used by the task engine
//! - [`Vault`] - Filesystem implementation of [`DocumentStore`]
//! - [`Config`] - Vault and global configuration

mod config;
mod vault;
mod workspace;

pub use config::{Config, ConfigError, NotesConfig, VaultConfig, WatchConfig, CONFIG_DIR};
pub use vault::{DocumentStore, Vault, VaultError};
pub use workspace::{Workspace, WorkspaceError};
