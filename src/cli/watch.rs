//! Foreground watcher that processes notes as they change
//!
//! Each debounced change to a note processes that note and, when it differs,
//! the note changed before it: that is the note the user just left.

use std::path::Path;
use std::sync::mpsc;
use std::time::Duration;

use anyhow::{Context, Result};
use notify::RecursiveMode;
use notify_debouncer_mini::new_debouncer;
use tracing::{debug, info, warn};

use super::output::Output;
use super::process::{open_handler, print_report};
use crate::domain::DocumentId;
use crate::engine::TaskHandler;
use crate::storage::{Vault, Workspace, CONFIG_DIR};

/// Checks if a path should be ignored by the watcher
fn should_ignore_path(path: &Path) -> bool {
    if path.components().any(|c| c.as_os_str() == CONFIG_DIR) {
        return true;
    }

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy())
        .unwrap_or_default();

    // Our own temp files, editor swap files and hidden files
    name.ends_with(".tmp") || name.ends_with('~') || name.starts_with('.')
}

pub fn run(output: &Output, workspace: Workspace, debounce_ms: Option<u64>) -> Result<()> {
    let debounce_ms = debounce_ms.unwrap_or(workspace.config().vault.watch.debounce_ms);
    let watch_dir = workspace.vault().notes_dir();

    let mut handler = open_handler(workspace);

    let (tx, rx) = mpsc::channel();
    let mut debouncer = new_debouncer(Duration::from_millis(debounce_ms), tx)?;

    debouncer
        .watcher()
        .watch(&watch_dir, RecursiveMode::NonRecursive)
        .with_context(|| format!("Failed to watch {}", watch_dir.display()))?;

    output.success(&format!(
        "Watching {} (debounce: {}ms, Ctrl-C to stop)",
        watch_dir.display(),
        debounce_ms
    ));
    info!(dir = %watch_dir.display(), debounce_ms, "watcher ready");

    let mut previous: Option<DocumentId> = None;

    loop {
        match rx.recv() {
            Ok(Ok(events)) => {
                let mut changed: Vec<DocumentId> = Vec::new();
                for event in events.iter().filter(|e| !should_ignore_path(&e.path)) {
                    if let Some(id) = handler.store().document_for_path(&event.path) {
                        if !changed.contains(&id) {
                            changed.push(id);
                        }
                    }
                }

                for id in changed {
                    if let Some(left) = previous.take().filter(|p| *p != id) {
                        process_quietly(output, &mut handler, &left);
                    }
                    process_quietly(output, &mut handler, &id);
                    previous = Some(id);
                }
            }
            Ok(Err(error)) => {
                warn!("watch error: {:?}", error);
            }
            Err(e) => {
                warn!("channel error: {}", e);
                break;
            }
        }
    }

    Ok(())
}

/// Processes a note, reporting failures without stopping the watcher
fn process_quietly(output: &Output, handler: &mut TaskHandler<Vault>, id: &DocumentId) {
    if !handler.store().path_for(id).exists() {
        debug!(doc = %id, "note no longer exists");
        return;
    }

    match handler.process_document(id) {
        Ok(report) => {
            if output.is_json() && (report.has_changes() || !report.errors.is_empty()) {
                output.data(&report);
            } else {
                print_report(output, &report);
            }
        }
        Err(e) => warn!(doc = %id, "{:#}", e),
    }
}
