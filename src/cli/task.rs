//! Task CLI commands

use std::fs;
use std::path::Path;

use anyhow::{bail, Result};
use chrono::{NaiveDate, Weekday};
use clap::Args;
use serde::Serialize;

use super::app::parse_date;
use super::output::Output;
use crate::domain::{
    split_lines, Anchor, DocumentId, Frequency, MonthDay, Recurrence, RecurrenceError,
    RepeatAdapter, TaskError, TaskLine, TaskState,
};
use crate::engine::TaskHandler;
use crate::storage::{DocumentStore, Vault, Workspace};

/// Number of upcoming dates shown by `slated repeat`
const PREVIEW_COUNT: usize = 5;

/// Recurrence facets settable from the command line
#[derive(Args, Debug, Default)]
pub struct RepeatEdit {
    /// Replace the whole rule with a phrase or RRULE (e.g. "every 2 weeks on Monday")
    #[arg(long, value_name = "PHRASE")]
    pub every: Option<String>,

    /// Frequency: daily, weekly, monthly or yearly
    #[arg(long, value_parser = parse_frequency)]
    pub frequency: Option<Frequency>,

    /// Repeat every N periods
    #[arg(long)]
    pub interval: Option<u32>,

    /// Days of the week (e.g. mon,wed,fri)
    #[arg(long, value_delimiter = ',', value_parser = parse_weekday)]
    pub days: Vec<Weekday>,

    /// Day of the month (1-31)
    #[arg(long, conflicts_with = "last_day")]
    pub day_of_month: Option<u8>,

    /// Last day of the month
    #[arg(long)]
    pub last_day: bool,

    /// Months of the year (1-12, e.g. 1,7)
    #[arg(long, value_delimiter = ',')]
    pub months: Vec<u8>,

    /// Stop after N occurrences
    #[arg(long, conflicts_with = "forever")]
    pub count: Option<u32>,

    /// Last possible date (YYYY-MM-DD)
    #[arg(long, value_parser = parse_date, conflicts_with = "forever")]
    pub until: Option<NaiveDate>,

    /// Remove any count or end date
    #[arg(long)]
    pub forever: bool,
}

impl RepeatEdit {
    /// True when a facet flag (anything but `--every`) was given
    fn has_facets(&self) -> bool {
        self.frequency.is_some()
            || self.interval.is_some()
            || !self.days.is_empty()
            || self.day_of_month.is_some()
            || self.last_day
            || !self.months.is_empty()
            || self.count.is_some()
            || self.until.is_some()
            || self.forever
    }

    fn apply(&self, repeater: &mut RepeatAdapter) -> Result<(), RecurrenceError> {
        // Frequency first: it clears the other facets
        if let Some(frequency) = self.frequency {
            repeater.set_frequency(frequency);
        }
        if let Some(interval) = self.interval {
            repeater.set_interval(interval);
        }
        if !self.days.is_empty() {
            repeater.set_days_of_week(&self.days);
        }
        if let Some(day) = self.day_of_month {
            repeater.set_day_of_month(MonthDay::Day(day))?;
        }
        if self.last_day {
            repeater.set_day_of_month(MonthDay::Last)?;
        }
        if !self.months.is_empty() {
            repeater.set_months_of_year(&self.months)?;
        }
        if self.forever {
            repeater.set_count(None);
            repeater.set_until(None);
        }
        if let Some(count) = self.count {
            repeater.set_count(Some(count));
        }
        if let Some(until) = self.until {
            repeater.set_until(Some(until));
        }
        Ok(())
    }
}

fn parse_frequency(input: &str) -> Result<Frequency, String> {
    let frequency: Frequency = input.parse().map_err(|e: RecurrenceError| e.to_string())?;
    if !frequency.is_date_based() {
        return Err(format!("{} is not supported for dated notes", frequency));
    }
    Ok(frequency)
}

fn parse_weekday(input: &str) -> Result<Weekday, String> {
    input
        .trim()
        .parse::<Weekday>()
        .map_err(|_| format!("invalid weekday '{}'", input))
}

/// A task as shown by `slated tasks`
#[derive(Debug, Serialize)]
struct TaskView {
    line: usize,
    state: TaskState,
    title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    anchor: Option<Anchor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    recurrence: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    recurrence_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    next: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    moved_to: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    origin: Option<String>,
}

impl TaskView {
    fn new(task: &TaskLine, date: Option<NaiveDate>) -> Self {
        let (recurrence, recurrence_error) = match task.recurrence() {
            Recurrence::None => (None, None),
            Recurrence::Invalid { phrase, error } => (Some(phrase.clone()), Some(error.to_string())),
            Recurrence::Valid(repeater) => (Some(repeater.to_text()), None),
        };
        let next = match (task.repeater(), date) {
            (Some(repeater), Some(date)) => repeater.next_after(date, 1).into_iter().next(),
            _ => None,
        };

        Self {
            line: task.line_index() + 1,
            state: task.state(),
            title: task.title().to_string(),
            anchor: task.anchor().cloned(),
            recurrence,
            recurrence_error,
            next,
            moved_to: task.moved_to().map(|l| l.document.clone()),
            origin: task.original_file_name().ok().filter(|_| !task.is_original_instance()),
        }
    }
}

/// Resolves a note argument: a path to a note file, a date, or a note name
pub(super) fn resolve_note(vault: &Vault, arg: &str) -> Result<DocumentId> {
    let extension = format!(".{}", vault.notes().extension);

    let id = if arg.ends_with(&extension) && Path::new(arg).exists() {
        let path = fs::canonicalize(arg)?;
        match vault.document_for_path(&path) {
            Some(id) => id,
            None => bail!("{} is not a note of the vault at {}", arg, vault.root().display()),
        }
    } else if let Ok(date) = parse_date(arg) {
        DocumentId::new(vault.filename_for_date(date))
    } else {
        DocumentId::new(arg.strip_suffix(extension.as_str()).unwrap_or(arg))
    };

    if !vault.path_for(&id).exists() {
        bail!("Note not found: {}", id);
    }
    Ok(id)
}

fn handler(workspace: &Workspace) -> TaskHandler<&Vault> {
    TaskHandler::new(workspace.vault(), workspace.settings().clone())
}

/// Converts a 1-based line number from the command line
fn line_index(line: usize) -> Result<usize> {
    if line == 0 {
        bail!("Line numbers start at 1");
    }
    Ok(line - 1)
}

pub fn list(output: &Output, workspace: &Workspace, note: &str) -> Result<()> {
    let vault = workspace.vault();
    let id = resolve_note(vault, note)?;
    let date = vault.date_for_document(&id);

    let text = vault.read_document(&id, false)?;
    let tasks = TaskLine::scan(&id, &split_lines(&text), workspace.settings());
    output.verbose_ctx("tasks", &format!("Found {} task(s) in {}", tasks.len(), id));

    let views: Vec<TaskView> = tasks.iter().map(|t| TaskView::new(t, date)).collect();

    if output.is_json() {
        output.data(&views);
        return Ok(());
    }

    if views.is_empty() {
        println!("No tasks in {}", id);
        return Ok(());
    }

    println!("{:<6} {:<11} {:<32} RECURRENCE", "LINE", "STATE", "TITLE");
    println!("{}", "-".repeat(70));
    for view in &views {
        let recurrence = match (&view.recurrence, &view.recurrence_error, view.next) {
            (Some(r), Some(_), _) => format!("{} (invalid)", r),
            (Some(r), None, Some(next)) => format!("{} (next {})", r, next),
            (Some(r), None, None) => r.clone(),
            (None, _, _) => String::new(),
        };
        let title = match &view.moved_to {
            Some(to) => format!("{} -> {}", view.title, to),
            None => view.title.clone(),
        };
        println!(
            "{:<6} {:<11} {:<32} {}",
            view.line,
            view.state.as_str(),
            title,
            recurrence
        );
    }

    Ok(())
}

pub fn move_task(
    output: &Output,
    workspace: &Workspace,
    note: &str,
    line: usize,
    to: NaiveDate,
) -> Result<()> {
    let id = resolve_note(workspace.vault(), note)?;
    let handler = handler(workspace);
    let mut task = handler.task_at(&id, line_index(line)?)?;

    let target = task.move_to(handler.store(), handler.settings(), to)?;

    if output.is_json() {
        output.data(&serde_json::json!({
            "moved": target.is_some(),
            "from": id,
            "to": target,
            "anchor": task.anchor(),
        }));
    } else {
        match target {
            Some(target) => output.success(&format!("Moved '{}' to {}", task.title(), target)),
            None => output.success(&format!("'{}' is already in {}", task.title(), id)),
        }
    }

    Ok(())
}

pub fn skip(output: &Output, workspace: &Workspace, note: &str, line: usize) -> Result<()> {
    let id = resolve_note(workspace.vault(), note)?;
    let handler = handler(workspace);
    let mut task = handler.task_at(&id, line_index(line)?)?;

    let created = match task.skip_occurrence(handler.store(), handler.settings()) {
        Ok(created) => created,
        Err(e) => match e.downcast_ref::<TaskError>() {
            Some(TaskError::CannotSkip(reason)) => {
                output.notice(&format!("Cannot skip line {}: {}", line, reason));
                if output.is_json() {
                    output.data(&serde_json::json!({ "skipped": false, "reason": reason }));
                }
                return Ok(());
            }
            _ => return Err(e),
        },
    };

    if output.is_json() {
        output.data(&serde_json::json!({
            "skipped": true,
            "anchor": task.anchor(),
            "next": created,
        }));
    } else {
        match created {
            Some(next) => output.success(&format!("Skipped '{}', next in {}", task.title(), next)),
            None => output.success(&format!("Skipped '{}'", task.title())),
        }
    }

    Ok(())
}

#[derive(Debug, Serialize)]
struct RepeatView {
    line: usize,
    text: String,
    rrule: String,
    upcoming: Vec<NaiveDate>,
    changed: bool,
}

pub fn repeat(
    output: &Output,
    workspace: &Workspace,
    note: &str,
    line: usize,
    edit: &RepeatEdit,
) -> Result<()> {
    let id = resolve_note(workspace.vault(), note)?;
    let handler = handler(workspace);
    let mut task = handler.task_at(&id, line_index(line)?)?;

    let mut changed = false;
    if let Some(phrase) = &edit.every {
        let repeater = RepeatAdapter::parse(phrase)?;
        repeater.frequency()?;
        task.set_recurrence(repeater);
        changed = true;
    }
    if edit.has_facets() {
        changed |= task.edit_repeater(|repeater| edit.apply(repeater))?;
    }

    if changed {
        task.persist(handler.store())?;
        output.verbose_ctx("repeat", &format!("Rewrote line {}: {}", line, task.text()));
    }

    let Some(repeater) = task.repeater() else {
        match task.recurrence() {
            Recurrence::Invalid { phrase, error } => {
                bail!("Line {} has an invalid recurrence '{}': {}", line, phrase, error)
            }
            _ => bail!("Line {} does not repeat", line),
        }
    };

    let from = handler
        .store()
        .date_for_document(&id)
        .unwrap_or_else(|| chrono::Local::now().date_naive());
    let view = RepeatView {
        line,
        text: repeater.to_text(),
        rrule: repeater.to_rrule(),
        upcoming: repeater.next_after(from, PREVIEW_COUNT),
        changed,
    };

    if output.is_json() {
        output.data(&view);
    } else {
        if changed {
            output.success(&format!("Updated line {}", line));
        }
        println!("Repeats: {}", view.text);
        println!("Rule:    {}", view.rrule);
        let upcoming: Vec<String> = view.upcoming.iter().map(|d| d.to_string()).collect();
        println!("Next:    {}", upcoming.join(", "));
    }

    Ok(())
}
