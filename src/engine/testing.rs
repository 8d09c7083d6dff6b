//! In-memory note store for unit tests

use std::cell::RefCell;
use std::collections::BTreeMap;

use anyhow::{anyhow, Result};
use chrono::NaiveDate;

use crate::domain::DocumentId;
use crate::storage::DocumentStore;

const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Default)]
pub struct MemoryStore {
    notes: RefCell<BTreeMap<String, String>>,
    writes: RefCell<usize>,
}

impl MemoryStore {
    pub fn with(notes: &[(&str, &str)]) -> Self {
        let store = Self::default();
        for (name, text) in notes {
            store.set(name, text);
        }
        store
    }

    pub fn set(&self, name: &str, text: &str) {
        self.notes
            .borrow_mut()
            .insert(name.to_string(), text.to_string());
    }

    /// Text of a note; panics when it does not exist
    pub fn text(&self, name: &str) -> String {
        self.notes
            .borrow()
            .get(name)
            .cloned()
            .unwrap_or_else(|| panic!("no note named {}", name))
    }

    pub fn exists(&self, name: &str) -> bool {
        self.notes.borrow().contains_key(name)
    }

    pub fn writes(&self) -> usize {
        *self.writes.borrow()
    }
}

impl DocumentStore for MemoryStore {
    fn read_document(&self, id: &DocumentId, _use_cache: bool) -> Result<String> {
        self.notes
            .borrow()
            .get(id.name())
            .cloned()
            .ok_or_else(|| anyhow!("Note not found: {}", id))
    }

    fn write_document(&self, id: &DocumentId, text: &str) -> Result<()> {
        *self.writes.borrow_mut() += 1;
        self.set(id.name(), text);
        Ok(())
    }

    fn resolve_or_create_for_date(&self, date: NaiveDate) -> Result<DocumentId> {
        let name = self.filename_for_date(date);
        if !self.exists(&name) {
            self.set(&name, "");
        }
        Ok(DocumentId::new(name))
    }

    fn date_for_document(&self, id: &DocumentId) -> Option<NaiveDate> {
        NaiveDate::parse_from_str(id.name(), DATE_FORMAT).ok()
    }

    fn filename_for_date(&self, date: NaiveDate) -> String {
        date.format(DATE_FORMAT).to_string()
    }
}
