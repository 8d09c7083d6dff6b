//! Filesystem document store
//!
//! A vault is a directory of markdown notes. Dated notes live in the notes
//! folder and are named by a chrono date format (`2020-12-31.md` by default).
//! Writes go to a locked temp file which is then renamed over the note.

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use fs2::FileExt;
use thiserror::Error;
use tracing::debug;

use super::config::NotesConfig;
use crate::domain::DocumentId;

#[derive(Debug, Error)]
pub enum VaultError {
    #[error("Note not found: {0}")]
    NotFound(String),

    #[error("Vault directory does not exist: {0}")]
    MissingRoot(PathBuf),
}

/// Access to notes by name and by date
pub trait DocumentStore {
    /// Reads a note. With `use_cache`, a previously read or written copy may be returned.
    fn read_document(&self, id: &DocumentId, use_cache: bool) -> Result<String>;

    /// Replaces the full text of a note
    fn write_document(&self, id: &DocumentId, text: &str) -> Result<()>;

    /// Returns the dated note for `date`, creating it when absent
    fn resolve_or_create_for_date(&self, date: NaiveDate) -> Result<DocumentId>;

    /// Returns the date of a dated note, `None` for any other note
    fn date_for_document(&self, id: &DocumentId) -> Option<NaiveDate>;

    /// Note name for a date, as used in links
    fn filename_for_date(&self, date: NaiveDate) -> String;
}

impl<T: DocumentStore + ?Sized> DocumentStore for &T {
    fn read_document(&self, id: &DocumentId, use_cache: bool) -> Result<String> {
        (**self).read_document(id, use_cache)
    }

    fn write_document(&self, id: &DocumentId, text: &str) -> Result<()> {
        (**self).write_document(id, text)
    }

    fn resolve_or_create_for_date(&self, date: NaiveDate) -> Result<DocumentId> {
        (**self).resolve_or_create_for_date(date)
    }

    fn date_for_document(&self, id: &DocumentId) -> Option<NaiveDate> {
        (**self).date_for_document(id)
    }

    fn filename_for_date(&self, date: NaiveDate) -> String {
        (**self).filename_for_date(date)
    }
}

/// A directory of markdown notes
pub struct Vault {
    root: PathBuf,
    notes: NotesConfig,
    cache: Mutex<HashMap<DocumentId, String>>,
}

impl Vault {
    /// Opens an existing vault directory
    pub fn open(root: impl Into<PathBuf>, notes: NotesConfig) -> Result<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(VaultError::MissingRoot(root).into());
        }

        Ok(Self {
            root,
            notes,
            cache: Mutex::new(HashMap::new()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn notes(&self) -> &NotesConfig {
        &self.notes
    }

    /// Directory holding dated notes
    pub fn notes_dir(&self) -> PathBuf {
        match self.notes.folder.as_deref() {
            Some(folder) if !folder.is_empty() => self.root.join(folder),
            _ => self.root.clone(),
        }
    }

    /// Path of the file backing a note
    pub fn path_for(&self, id: &DocumentId) -> PathBuf {
        self.notes_dir()
            .join(format!("{}.{}", id.name(), self.notes.extension))
    }

    /// Maps a file path back to a note, if it is a note of this vault
    pub fn document_for_path(&self, path: &Path) -> Option<DocumentId> {
        if path.extension().and_then(|e| e.to_str()) != Some(self.notes.extension.as_str()) {
            return None;
        }
        let parent = path.parent()?;
        let notes_dir = self.notes_dir();
        let same_dir = parent == notes_dir
            || matches!(
                (parent.canonicalize(), notes_dir.canonicalize()),
                (Ok(a), Ok(b)) if a == b
            );
        if !same_dir {
            return None;
        }

        path.file_stem()
            .and_then(|s| s.to_str())
            .map(DocumentId::new)
    }

    /// Lists the dated notes, oldest first
    pub fn dated_documents(&self) -> Result<Vec<(NaiveDate, DocumentId)>> {
        let dir = self.notes_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut notes = Vec::new();
        for entry in fs::read_dir(&dir)
            .with_context(|| format!("Failed to read notes directory: {}", dir.display()))?
        {
            let entry = entry?;
            if let Some(id) = self.document_for_path(&entry.path()) {
                if let Some(date) = self.date_for_document(&id) {
                    notes.push((date, id));
                }
            }
        }

        notes.sort();
        Ok(notes)
    }

    fn initial_text(&self) -> Result<String> {
        match &self.notes.template {
            Some(template) => {
                let path = self.root.join(template);
                fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read note template: {}", path.display()))
            }
            None => Ok(String::new()),
        }
    }

    fn cached(&self, id: &DocumentId) -> Option<String> {
        self.cache.lock().ok()?.get(id).cloned()
    }

    fn remember(&self, id: &DocumentId, text: &str) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(id.clone(), text.to_string());
        }
    }
}

impl DocumentStore for Vault {
    fn read_document(&self, id: &DocumentId, use_cache: bool) -> Result<String> {
        if use_cache {
            if let Some(text) = self.cached(id) {
                return Ok(text);
            }
        }

        let path = self.path_for(id);
        if !path.exists() {
            return Err(VaultError::NotFound(id.to_string()).into());
        }

        let text = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read note: {}", path.display()))?;
        self.remember(id, &text);
        Ok(text)
    }

    fn write_document(&self, id: &DocumentId, text: &str) -> Result<()> {
        let path = self.path_for(id);

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        let temp_path = path.with_extension(format!("{}.tmp", self.notes.extension));

        {
            let file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&temp_path)
                .with_context(|| format!("Failed to create temp file: {}", temp_path.display()))?;

            file.lock_exclusive()
                .with_context(|| format!("Failed to acquire write lock on {}", id))?;

            let mut writer = BufWriter::new(&file);
            writer
                .write_all(text.as_bytes())
                .with_context(|| format!("Failed to write note: {}", id))?;
            writer.flush().context("Failed to flush note")?;
        }

        fs::rename(&temp_path, &path).with_context(|| {
            format!(
                "Failed to rename {} to {}",
                temp_path.display(),
                path.display()
            )
        })?;

        debug!(doc = %id, bytes = text.len(), "wrote note");
        self.remember(id, text);
        Ok(())
    }

    fn resolve_or_create_for_date(&self, date: NaiveDate) -> Result<DocumentId> {
        let id = DocumentId::new(self.filename_for_date(date));
        let path = self.path_for(&id);

        if !path.exists() {
            let text = self.initial_text()?;
            self.write_document(&id, &text)
                .with_context(|| format!("Failed to create note for {}", date))?;
            debug!(doc = %id, %date, "created dated note");
        }

        Ok(id)
    }

    fn date_for_document(&self, id: &DocumentId) -> Option<NaiveDate> {
        let date = NaiveDate::parse_from_str(id.name(), &self.notes.date_format).ok()?;
        // Strict: the name must be exactly what the format produces
        (self.filename_for_date(date) == id.name()).then_some(date)
    }

    fn filename_for_date(&self, date: NaiveDate) -> String {
        date.format(&self.notes.date_format).to_string()
    }
}
