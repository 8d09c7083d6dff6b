//! Store-backed actions on a single task
//!
//! Every action is a read-modify-write of whole notes. Positions found before
//! a write are never reused after it: each note is re-read and the task is
//! re-located through [`TaskLine::locate`].

use anyhow::{Context, Result};
use chrono::NaiveDate;
use tracing::{debug, info};

use crate::domain::section::{
    index_of_anchor, insert_lines, last_content_line_of, line_has_anchor,
    locate_or_create_heading_path, remove_lines,
};
use crate::domain::{
    is_task_line, join_lines, split_lines, sub_content_len, Anchor, DocumentId, Settings,
    TaskError, TaskLine, TaskState,
};
use crate::storage::DocumentStore;

fn read_lines<S: DocumentStore + ?Sized>(store: &S, id: &DocumentId) -> Result<Vec<String>> {
    let text = store
        .read_document(id, false)
        .with_context(|| format!("Failed to read {}", id))?;
    Ok(split_lines(&text))
}

fn write_lines<S: DocumentStore + ?Sized>(
    store: &S,
    id: &DocumentId,
    lines: &[String],
) -> Result<()> {
    store
        .write_document(id, &join_lines(lines))
        .with_context(|| format!("Failed to write {}", id))
}

/// Appends `block` at the end of the heading path's section
fn insert_under_heading_path(
    lines: &mut Vec<String>,
    heading_path: &[String],
    block: &[String],
    settings: &Settings,
) -> usize {
    let header = locate_or_create_heading_path(lines, heading_path, settings);
    let at = last_content_line_of(lines, header) + 1;
    insert_lines(lines, block, at, settings)
}

impl TaskLine {
    /// Writes the current line back into its note
    pub fn persist<S: DocumentStore + ?Sized>(&mut self, store: &S) -> Result<()> {
        let mut lines = read_lines(store, self.document())?;
        let index = self.locate(&lines)?;

        lines[index] = self.text().to_string();
        write_lines(store, self.document(), &lines)?;
        self.mark_persisted(index);
        Ok(())
    }

    /// Gives a recurring task an anchor unless it already has one.
    /// Returns true when the note was changed.
    pub fn add_block_id_if_missing<S: DocumentStore + ?Sized>(&mut self, store: &S) -> Result<bool> {
        if !self.needs_anchor() {
            return Ok(false);
        }

        let lines = read_lines(store, self.document())?;
        self.assign_anchor(&lines)?;
        self.persist(store)?;
        Ok(true)
    }

    fn assign_anchor(&mut self, lines: &[String]) -> Result<Anchor, TaskError> {
        if let Some(anchor) = self.anchor() {
            return Ok(anchor.clone());
        }

        let anchor = Anchor::generate(self.text(), |candidate| {
            index_of_anchor(lines, candidate).is_some()
        })?;
        debug!(doc = %self.document(), anchor = %anchor, "assigned anchor");
        self.set_anchor(anchor.clone());
        Ok(anchor)
    }

    /// Moves the task to the note for `date`.
    ///
    /// Returns the note the task now lives in, or `None` when it already lives
    /// in that note. Moving a moved copy back to the note it came from restores
    /// the original line instead of adding another copy; `self` then describes
    /// the restored line.
    pub fn move_to<S: DocumentStore + ?Sized>(
        &mut self,
        store: &S,
        settings: &Settings,
        date: NaiveDate,
    ) -> Result<Option<DocumentId>> {
        let target_name = store.filename_for_date(date);
        if target_name == self.document().name() {
            debug!(doc = %self.document(), %date, "move target is the current note");
            return Ok(None);
        }

        if self
            .moved_from()
            .is_some_and(|link| link.document == target_name)
        {
            let origin = store.resolve_or_create_for_date(date)?;
            return self.return_to_origin(store, settings, origin).map(Some);
        }

        let target = store.resolve_or_create_for_date(date)?;

        let mut lines = read_lines(store, self.document())?;
        let index = self.locate(&lines)?;
        let anchor = self.assign_anchor(&lines)?;
        let sub_len = sub_content_len(&lines, index);
        let sub_content = lines[index + 1..index + 1 + sub_len].to_vec();

        // Target first: a failure past this point duplicates, never loses
        let mut target_lines = read_lines(store, &target)?;
        let already_there = target_lines
            .iter()
            .any(|line| is_task_line(line) && line_has_anchor(line, &anchor));
        if already_there {
            debug!(doc = %target, anchor = %anchor, "target already holds the task");
        } else {
            let mut block = vec![self.line_as_moved_from(settings)?];
            block.extend(sub_content);
            insert_under_heading_path(&mut target_lines, self.heading_path(), &block, settings);
            write_lines(store, &target, &target_lines)?;
        }

        if settings.keep_moved_links {
            self.mark_moved_to(&target_name);
            lines[index] = self.text().to_string();
            remove_lines(&mut lines, index + 1, sub_len);
        } else {
            remove_lines(&mut lines, index, sub_len + 1);
        }
        write_lines(store, self.document(), &lines)?;
        self.mark_persisted(index);

        info!(from = %self.document(), to = %target, anchor = %anchor, "moved task");
        Ok(Some(target))
    }

    fn return_to_origin<S: DocumentStore + ?Sized>(
        &mut self,
        store: &S,
        settings: &Settings,
        origin: DocumentId,
    ) -> Result<DocumentId> {
        let anchor = self.anchor().cloned().ok_or(TaskError::MissingAnchor)?;

        let mut origin_lines = read_lines(store, &origin)?;
        let origin_index = origin_lines
            .iter()
            .enumerate()
            .filter(|(_, line)| is_task_line(line) && line_has_anchor(line, &anchor))
            .map(|(i, _)| i)
            .find(|i| {
                TaskLine::parse(origin.clone(), &origin_lines, *i, settings)
                    .is_ok_and(|task| task.is_original_instance())
            })
            .ok_or_else(|| TaskError::OriginMissing(origin.to_string()))?;

        let mut restored = TaskLine::parse(origin.clone(), &origin_lines, origin_index, settings)?;
        restored.restore();

        let mut lines = read_lines(store, self.document())?;
        let index = self.locate(&lines)?;
        let sub_len = sub_content_len(&lines, index);
        let sub_content = lines[index + 1..index + 1 + sub_len].to_vec();

        origin_lines[origin_index] = restored.text().to_string();
        let at = origin_index + 1 + sub_content_len(&origin_lines, origin_index);
        origin_lines.splice(at..at, sub_content);
        write_lines(store, &origin, &origin_lines)?;

        remove_lines(&mut lines, index, sub_len + 1);
        write_lines(store, self.document(), &lines)?;

        info!(from = %self.document(), to = %origin, anchor = %anchor, "returned task to its origin");
        *self = TaskLine::parse(origin.clone(), &origin_lines, origin_index, settings)?;
        Ok(origin)
    }

    /// Writes the next occurrence after this note's date into the future note.
    /// Returns the note written to, or `None` when nothing was added.
    pub fn create_next_repetition<S: DocumentStore + ?Sized>(
        &mut self,
        store: &S,
        settings: &Settings,
    ) -> Result<Option<DocumentId>> {
        let date = store
            .date_for_document(self.document())
            .ok_or_else(|| TaskError::UndatedDocument(self.document().to_string()))?;
        let repeater = self.repeater().ok_or(TaskError::NoRecurrence)?;

        let Some(next) = repeater.next_after(date, 1).into_iter().next() else {
            debug!(doc = %self.document(), "recurrence has no further occurrences");
            return Ok(None);
        };

        self.add_block_id_if_missing(store)?;
        self.ensure_repetition_on(store, settings, next)
    }

    /// Writes a repeated copy into the note for `date` unless that note
    /// already contains this task's anchor
    pub fn ensure_repetition_on<S: DocumentStore + ?Sized>(
        &self,
        store: &S,
        settings: &Settings,
        date: NaiveDate,
    ) -> Result<Option<DocumentId>> {
        let anchor = self.anchor().ok_or(TaskError::MissingAnchor)?;
        if store.filename_for_date(date) == self.document().name() {
            return Ok(None);
        }

        let target = store.resolve_or_create_for_date(date)?;
        let mut lines = read_lines(store, &target)?;
        if index_of_anchor(&lines, anchor).is_some() {
            debug!(doc = %target, anchor = %anchor, "repetition already present");
            return Ok(None);
        }

        let mut block = vec![self.line_as_repeated(settings)?];
        block.extend(self.sub_content().iter().cloned());
        insert_under_heading_path(&mut lines, self.heading_path(), &block, settings);
        write_lines(store, &target, &lines)?;

        info!(doc = %target, anchor = %anchor, %date, "created repetition");
        Ok(Some(target))
    }

    /// Skips this occurrence of a recurring task: the next one is created and
    /// the line is marked `[-]`
    pub fn skip_occurrence<S: DocumentStore + ?Sized>(
        &mut self,
        store: &S,
        settings: &Settings,
    ) -> Result<Option<DocumentId>> {
        if self.state() != TaskState::Incomplete {
            return Err(TaskError::CannotSkip("only incomplete tasks can be skipped").into());
        }
        if !self.has_valid_recurrence() {
            return Err(TaskError::CannotSkip("task does not repeat").into());
        }

        let created = self.create_next_repetition(store, settings)?;
        self.set_state(TaskState::Skipped);
        self.persist(store)?;
        Ok(created)
    }
}
