//! Propagation CLI commands

use anyhow::Result;
use chrono::NaiveDate;

use super::output::Output;
use super::task::resolve_note;
use crate::domain::DocumentId;
use crate::engine::{ProcessReport, TaskHandler};
use crate::storage::{Vault, Workspace};

/// Opens a handler that owns the vault
pub(super) fn open_handler(workspace: Workspace) -> TaskHandler<Vault> {
    let (vault, config) = workspace.into_parts();
    TaskHandler::new(vault, config.vault.tasks)
}

pub(super) fn print_report(output: &Output, report: &ProcessReport) {
    for notice in &report.notices {
        output.notice(&format!("{}: {}", report.document, notice));
    }
    for error in &report.errors {
        output.notice(&format!("{}: {}", report.document, error));
    }

    if output.is_json() || report.skipped {
        return;
    }

    let mut parts = Vec::new();
    if !report.anchors_added.is_empty() {
        parts.push(format!("{} anchor(s) added", report.anchors_added.len()));
    }
    if !report.created.is_empty() {
        let created: Vec<String> = report.created.iter().map(|d| d.to_string()).collect();
        parts.push(format!("wrote to {}", created.join(", ")));
    }
    if !parts.is_empty() {
        output.success(&format!("{}: {}", report.document, parts.join("; ")));
    }
}

pub fn process(output: &Output, workspace: Workspace, notes: &[String]) -> Result<()> {
    let ids: Vec<DocumentId> = if notes.is_empty() {
        workspace
            .vault()
            .dated_documents()?
            .into_iter()
            .map(|(_, id)| id)
            .collect()
    } else {
        notes
            .iter()
            .map(|note| resolve_note(workspace.vault(), note))
            .collect::<Result<_>>()?
    };
    output.verbose_ctx("process", &format!("Processing {} note(s)", ids.len()));

    let mut handler = open_handler(workspace);
    let mut reports = Vec::with_capacity(ids.len());
    for id in &ids {
        let report = handler.process_document(id)?;
        print_report(output, &report);
        reports.push(report);
    }

    if output.is_json() {
        output.data(&reports);
    } else if reports.iter().all(|r| !r.has_changes()) {
        output.success("Nothing to do");
    }

    Ok(())
}

pub fn move_incomplete(
    output: &Output,
    workspace: Workspace,
    note: &str,
    to: NaiveDate,
) -> Result<()> {
    let id = resolve_note(workspace.vault(), note)?;
    let mut handler = open_handler(workspace);

    let moved = handler.move_incompleted(&id, to)?;

    if output.is_json() {
        output.data(&serde_json::json!({
            "from": id,
            "to": to,
            "moved": moved,
        }));
    } else {
        output.success(&format!("Moved {} task(s) from {} to {}", moved, id, to));
    }

    Ok(())
}
