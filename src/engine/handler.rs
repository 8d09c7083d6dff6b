//! Propagation across notes
//!
//! [`TaskHandler`] keeps the last seen tasks of every processed note. Each
//! time a note is processed the fresh scan is diffed against that snapshot:
//! recurring tasks that became complete get their next occurrence written,
//! and original recurring tasks keep their upcoming occurrences materialized.

use std::collections::{HashMap, HashSet};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::domain::section::index_of_anchor;
use crate::domain::{
    join_lines, split_lines, Anchor, DocumentId, Recurrence, Settings, TaskError, TaskLine,
    TaskState,
};
use crate::storage::DocumentStore;

/// What processing one note did
#[derive(Debug, Clone, Serialize)]
pub struct ProcessReport {
    pub document: DocumentId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    /// True when the note is not a dated note and was left alone
    pub skipped: bool,
    pub anchors_added: Vec<Anchor>,
    pub newly_completed: Vec<Anchor>,
    /// Notes that received a new task line
    pub created: Vec<DocumentId>,
    pub notices: Vec<String>,
    pub errors: Vec<String>,
}

impl ProcessReport {
    fn new(document: &DocumentId) -> Self {
        Self {
            document: document.clone(),
            date: None,
            skipped: false,
            anchors_added: Vec::new(),
            newly_completed: Vec::new(),
            created: Vec::new(),
            notices: Vec::new(),
            errors: Vec::new(),
        }
    }

    fn record_created(&mut self, id: Option<DocumentId>) {
        if let Some(id) = id {
            if !self.created.contains(&id) {
                self.created.push(id);
            }
        }
    }

    fn record_error(&mut self, task: &TaskLine, error: anyhow::Error) {
        warn!(doc = %task.document(), line = task.line_index() + 1, "{:#}", error);
        self.errors.push(format!(
            "line {} ({}): {:#}",
            task.line_index() + 1,
            task.title(),
            error
        ));
    }

    /// True when the note was changed or notes were written
    pub fn has_changes(&self) -> bool {
        !self.anchors_added.is_empty() || !self.created.is_empty()
    }
}

/// Drives task propagation for a note store
pub struct TaskHandler<S: DocumentStore> {
    store: S,
    settings: Settings,
    cache: HashMap<DocumentId, Vec<TaskLine>>,
}

impl<S: DocumentStore> TaskHandler<S> {
    pub fn new(store: S, settings: Settings) -> Self {
        Self {
            store,
            settings,
            cache: HashMap::new(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Tasks seen the last time `document` was processed
    pub fn cached_tasks(&self, document: &DocumentId) -> Option<&[TaskLine]> {
        self.cache.get(document).map(Vec::as_slice)
    }

    /// Parses the task on the 0-based `line` of `document` as it is now
    pub fn task_at(&self, document: &DocumentId, line: usize) -> Result<TaskLine> {
        let text = self
            .store
            .read_document(document, false)
            .with_context(|| format!("Failed to read {}", document))?;
        let lines = split_lines(&text);
        Ok(TaskLine::parse(
            document.clone(),
            &lines,
            line,
            &self.settings,
        )?)
    }

    /// Scans a dated note and propagates its recurring tasks
    pub fn process_document(&mut self, document: &DocumentId) -> Result<ProcessReport> {
        let mut report = ProcessReport::new(document);

        let Some(date) = self.store.date_for_document(document) else {
            debug!(doc = %document, "not a dated note, skipping");
            report.skipped = true;
            return Ok(report);
        };
        report.date = Some(date);

        let text = self
            .store
            .read_document(document, false)
            .with_context(|| format!("Failed to read {}", document))?;
        let mut lines = split_lines(&text);
        let mut tasks = TaskLine::scan(document, &lines, &self.settings);

        self.normalize_anchors(document, &mut lines, &mut tasks, &mut report)?;

        for task in &tasks {
            if let Recurrence::Invalid { phrase, error } = task.recurrence() {
                report.notices.push(format!(
                    "line {}: invalid recurrence '{}': {}",
                    task.line_index() + 1,
                    phrase,
                    error
                ));
            }
        }

        let newly_completed = self.newly_completed(document, &tasks);
        self.cache.insert(document.clone(), tasks.clone());

        for task in tasks.iter().filter(|t| {
            t.is_original_instance() && t.has_valid_recurrence() && t.state() != TaskState::MovedOut
        }) {
            let upcoming = task
                .repeater()
                .map(|r| r.next_after(date, self.settings.future_repetitions_count))
                .unwrap_or_default();

            for next in upcoming {
                match task.ensure_repetition_on(&self.store, &self.settings, next) {
                    Ok(created) => report.record_created(created),
                    Err(e) => report.record_error(task, e),
                }
            }
        }

        for index in newly_completed {
            let task = &mut tasks[index];
            if let Some(anchor) = task.anchor() {
                report.newly_completed.push(anchor.clone());
            }
            if !task.has_valid_recurrence() {
                continue;
            }

            match task.create_next_repetition(&self.store, &self.settings) {
                Ok(created) => report.record_created(created),
                Err(e) => report.record_error(task, e),
            }
        }

        if report.has_changes() || !report.errors.is_empty() {
            info!(
                doc = %document,
                anchors = report.anchors_added.len(),
                created = report.created.len(),
                errors = report.errors.len(),
                "processed note"
            );
        }
        Ok(report)
    }

    /// Gives every recurring task an anchor, writing the note once if any was added
    fn normalize_anchors(
        &self,
        document: &DocumentId,
        lines: &mut [String],
        tasks: &mut [TaskLine],
        report: &mut ProcessReport,
    ) -> Result<()> {
        for task in tasks.iter_mut().filter(|t| t.needs_anchor()) {
            let current: &[String] = lines;
            let generated = Anchor::generate(task.text(), |candidate| {
                index_of_anchor(current, candidate).is_some()
            });

            match generated {
                Ok(anchor) => {
                    task.set_anchor(anchor.clone());
                    lines[task.line_index()] = task.text().to_string();
                    report.anchors_added.push(anchor);
                }
                Err(e) => report.record_error(task, TaskError::from(e).into()),
            }
        }

        if report.anchors_added.is_empty() {
            return Ok(());
        }

        self.store
            .write_document(document, &join_lines(lines))
            .with_context(|| format!("Failed to write {}", document))?;
        for task in tasks.iter_mut().filter(|t| t.is_modified()) {
            let index = task.line_index();
            task.mark_persisted(index);
        }
        debug!(doc = %document, count = report.anchors_added.len(), "added anchors");
        Ok(())
    }

    /// Indices of complete tasks that were not complete in the previous snapshot.
    /// Without a snapshot every complete task counts.
    fn newly_completed(&self, document: &DocumentId, tasks: &[TaskLine]) -> Vec<usize> {
        let previously_complete: Option<HashSet<&Anchor>> = self.cache.get(document).map(|old| {
            old.iter()
                .filter(|t| t.state() == TaskState::Complete)
                .filter_map(|t| t.anchor())
                .collect()
        });

        tasks
            .iter()
            .enumerate()
            .filter(|(_, t)| t.state() == TaskState::Complete)
            .filter(|(_, t)| match (&previously_complete, t.anchor()) {
                (None, _) => true,
                (Some(done), Some(anchor)) => !done.contains(anchor),
                (Some(_), None) => false,
            })
            .map(|(i, _)| i)
            .collect()
    }

    /// Moves every incomplete task of `document` to the note for `date`.
    /// Returns how many tasks were moved; tasks that fail to move are logged
    /// and left in place.
    pub fn move_incompleted(&mut self, document: &DocumentId, date: NaiveDate) -> Result<usize> {
        if self.store.filename_for_date(date) == document.name() {
            return Ok(0);
        }

        let incomplete = |lines: &[String], settings: &Settings| -> Vec<TaskLine> {
            TaskLine::scan(document, lines, settings)
                .into_iter()
                .filter(|t| t.state() == TaskState::Incomplete)
                .collect()
        };

        let text = self
            .store
            .read_document(document, false)
            .with_context(|| format!("Failed to read {}", document))?;
        let initial = incomplete(&split_lines(&text), &self.settings).len();

        let mut moved = 0;
        let mut failed: Vec<String> = Vec::new();

        // Each move shifts lines, so rescan after every one
        for _ in 0..initial {
            let text = self.store.read_document(document, false)?;
            let lines = split_lines(&text);
            let Some(mut task) = incomplete(&lines, &self.settings)
                .into_iter()
                .find(|t| !failed.iter().any(|f| f == t.text()))
            else {
                break;
            };

            match task.move_to(&self.store, &self.settings, date) {
                Ok(_) => moved += 1,
                Err(e) => {
                    warn!(doc = %document, line = task.line_index() + 1, "{:#}", e);
                    failed.push(task.text().to_string());
                }
            }
        }

        info!(doc = %document, %date, moved, failed = failed.len(), "moved incomplete tasks");
        Ok(moved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::MemoryStore;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn handler(notes: &[(&str, &str)]) -> TaskHandler<MemoryStore> {
        TaskHandler::new(MemoryStore::with(notes), Settings::default())
    }

    fn doc(name: &str) -> DocumentId {
        DocumentId::new(name)
    }

    // =========================================================================
    // Processing
    // =========================================================================

    #[test]
    fn undated_note_is_skipped() {
        let mut h = handler(&[("Inbox", "- [x] a ; every day\n")]);
        let report = h.process_document(&doc("Inbox")).unwrap();

        assert!(report.skipped);
        assert_eq!(h.store().text("Inbox"), "- [x] a ; every day\n");
        assert!(h.cached_tasks(&doc("Inbox")).is_none());
    }

    #[test]
    fn plain_tasks_are_left_alone() {
        let mut h = handler(&[("2020-12-31", "## Tasks\n\n- [ ] one\n- [x] two\n")]);
        let report = h.process_document(&doc("2020-12-31")).unwrap();

        assert!(!report.has_changes());
        assert_eq!(h.store().writes(), 0);
        assert_eq!(h.cached_tasks(&doc("2020-12-31")).unwrap().len(), 2);
    }

    #[test]
    fn recurring_task_gets_anchor_and_next_occurrence() {
        let mut h = handler(&[("2020-12-31", "## Tasks\n\n- [ ] a test task ; Every Sunday\n")]);
        let report = h.process_document(&doc("2020-12-31")).unwrap();

        assert_eq!(report.anchors_added.len(), 1);
        let anchor = &report.anchors_added[0];
        assert_eq!(
            h.store().text("2020-12-31"),
            format!("## Tasks\n\n- [ ] a test task ; Every Sunday ^{}\n", anchor)
        );
        assert_eq!(report.created, vec![doc("2021-01-03")]);
        assert_eq!(
            h.store().text("2021-01-03"),
            format!(
                "## Tasks\n\n- [ ] a test task ; Every Sunday [[2020-12-31#^{}|<< Origin]]\n",
                anchor
            )
        );
    }

    #[test]
    fn processing_twice_changes_nothing() {
        let mut h = handler(&[("2020-12-31", "## Tasks\n\n- [ ] a test task ; Every Sunday\n")]);
        h.process_document(&doc("2020-12-31")).unwrap();
        let writes = h.store().writes();
        let note = h.store().text("2020-12-31");

        let report = h.process_document(&doc("2020-12-31")).unwrap();
        assert!(!report.has_changes());
        assert_eq!(h.store().writes(), writes);
        assert_eq!(h.store().text("2020-12-31"), note);
    }

    #[test]
    fn future_repetitions_count_materializes_more() {
        let mut h = TaskHandler::new(
            MemoryStore::with(&[("2020-12-31", "- [ ] standup ; every day ^task-abcd\n")]),
            Settings {
                future_repetitions_count: 3,
                ..Settings::default()
            },
        );
        let report = h.process_document(&doc("2020-12-31")).unwrap();

        assert_eq!(
            report.created,
            vec![doc("2021-01-01"), doc("2021-01-02"), doc("2021-01-03")]
        );
    }

    #[test]
    fn completing_a_copy_creates_exactly_one_occurrence() {
        let copy = "## Tasks\n\n- [ ] a test task ; Every Sunday [[2020-12-31#^task-abcd|<< Origin]]\n";
        let mut h = handler(&[
            ("2020-12-31", "## Tasks\n\n- [x] a test task ; Every Sunday ^task-abcd\n"),
            ("2021-01-03", copy),
        ]);
        h.process_document(&doc("2021-01-03")).unwrap();
        assert!(!h.store().exists("2021-01-10"));

        h.store().set(
            "2021-01-03",
            &copy.replace("- [ ]", "- [x]"),
        );
        let report = h.process_document(&doc("2021-01-03")).unwrap();
        assert_eq!(report.newly_completed, vec!["task-abcd".parse::<Anchor>().unwrap()]);
        assert_eq!(report.created, vec![doc("2021-01-10")]);
        assert_eq!(
            h.store().text("2021-01-10"),
            "## Tasks\n\n- [ ] a test task ; Every Sunday [[2020-12-31#^task-abcd|<< Origin]]\n"
        );

        let again = h.process_document(&doc("2021-01-03")).unwrap();
        assert!(again.newly_completed.is_empty());
        assert!(again.created.is_empty());
    }

    #[test]
    fn invalid_recurrence_is_a_notice() {
        let mut h = handler(&[("2020-12-31", "- [x] pay rent ; whenever\n")]);
        let report = h.process_document(&doc("2020-12-31")).unwrap();

        assert_eq!(report.notices.len(), 1);
        assert!(report.notices[0].contains("whenever"));
        assert!(report.created.is_empty());
        assert_eq!(h.store().text("2020-12-31"), "- [x] pay rent ; whenever\n");
    }

    #[test]
    fn errors_are_isolated_per_task() {
        // The first task claims to be a copy but its origin note name is empty
        let mut h = handler(&[(
            "2020-12-31",
            "- [x] broken ; every day <<[[#^task-aaaa]]\n- [ ] fine ; every day ^task-bbbb\n",
        )]);
        let report = h.process_document(&doc("2020-12-31")).unwrap();

        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].contains("broken"));
        assert_eq!(report.created, vec![doc("2021-01-01")]);
        assert!(h.store().text("2021-01-01").contains("^task-bbbb"));
    }

    #[test]
    fn report_for_untouched_note() {
        let mut h = handler(&[("2020-12-31", "- [ ] plain\n")]);
        let report = h.process_document(&doc("2020-12-31")).unwrap();
        assert!(!report.has_changes());

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["document"], "2020-12-31");
        assert_eq!(json["date"], "2020-12-31");
        assert_eq!(json["skipped"], false);
        assert_eq!(json["created"], serde_json::json!([]));
    }

    #[test]
    fn malformed_rule_does_not_stop_siblings() {
        let mut h = handler(&[(
            "2020-12-31",
            "- [x] pay ; FREQ=é\n- [x] stretch ; every day ^task-bbbb\n",
        )]);
        let report = h.process_document(&doc("2020-12-31")).unwrap();

        assert_eq!(report.notices.len(), 1);
        assert!(report.errors.is_empty());
        assert_eq!(report.created, vec![doc("2021-01-01")]);
        assert!(h.store().text("2021-01-01").contains("^task-bbbb"));
    }

    // =========================================================================
    // Moving incomplete tasks
    // =========================================================================

    #[test]
    fn move_incompleted_moves_every_open_task() {
        let mut h = handler(&[(
            "2020-12-31",
            "## Tasks\n\n- [ ] one ^task-aaaa\n  - detail\n- [x] done\n- [ ] two ^task-bbbb\n",
        )]);

        let moved = h
            .move_incompleted(&doc("2020-12-31"), date("2021-01-01"))
            .unwrap();
        assert_eq!(moved, 2);
        assert_eq!(
            h.store().text("2020-12-31"),
            "## Tasks\n\n- [>] one >[[2021-01-01]] ^task-aaaa\n- [x] done\n- [>] two >[[2021-01-01]] ^task-bbbb\n"
        );
        assert_eq!(
            h.store().text("2021-01-01"),
            "## Tasks\n\n- [ ] one [[2020-12-31#^task-aaaa|< Origin]]\n  - detail\n- [ ] two [[2020-12-31#^task-bbbb|< Origin]]\n"
        );
    }

    #[test]
    fn move_incompleted_to_same_note_is_noop() {
        let mut h = handler(&[("2020-12-31", "- [ ] one\n")]);
        assert_eq!(
            h.move_incompleted(&doc("2020-12-31"), date("2020-12-31"))
                .unwrap(),
            0
        );
        assert_eq!(h.store().writes(), 0);
    }

    #[test]
    fn task_at_reads_current_line() {
        let h = handler(&[("2020-12-31", "# Day\n- [ ] one\n")]);
        let task = h.task_at(&doc("2020-12-31"), 1).unwrap();
        assert_eq!(task.body(), "one");
        assert!(h.task_at(&doc("2020-12-31"), 0).is_err());
    }
}
