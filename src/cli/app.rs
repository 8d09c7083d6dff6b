//! Main CLI application structure

use std::path::PathBuf;

use anyhow::Result;
use chrono::{Duration, Local, NaiveDate};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use super::output::{Output, OutputFormat};
use super::{process, task, watch};
use crate::storage::Workspace;

#[derive(Parser)]
#[command(name = "slated")]
#[command(author, version, about = "Recurring and movable tasks in dated markdown notes")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output format
    #[arg(long, short = 'f', global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Enable verbose output for debugging
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    /// Vault directory (defaults to the nearest parent containing .slated/)
    #[arg(long, global = true, env = "SLATED_VAULT")]
    pub vault: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a vault
    Init {
        /// Path to initialize (defaults to current directory)
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Propagate recurring tasks of dated notes
    Process {
        /// Notes to process (name, path, or date); all dated notes when omitted
        notes: Vec<String>,
    },

    /// List the tasks of a note
    Tasks {
        /// Note name, path, or date
        note: String,
    },

    /// Move a task to the note of another date
    Move {
        /// Note name, path, or date
        note: String,

        /// Line number of the task (1-based)
        line: usize,

        /// Target date (YYYY-MM-DD, today, tomorrow, yesterday)
        #[arg(long, value_parser = parse_date)]
        to: NaiveDate,
    },

    /// Skip this occurrence of a recurring task
    Skip {
        /// Note name, path, or date
        note: String,

        /// Line number of the task (1-based)
        line: usize,
    },

    /// Show or edit the recurrence of a task
    Repeat {
        /// Note name, path, or date
        note: String,

        /// Line number of the task (1-based)
        line: usize,

        #[command(flatten)]
        edit: task::RepeatEdit,
    },

    /// Move every incomplete task of a note to another date
    MoveIncomplete {
        /// Note name, path, or date
        note: String,

        /// Target date (defaults to tomorrow)
        #[arg(long, value_parser = parse_date)]
        to: Option<NaiveDate>,
    },

    /// Watch the vault and process notes as they change
    Watch {
        /// Debounce delay in milliseconds (defaults to watch.debounce_ms)
        #[arg(long)]
        debounce_ms: Option<u64>,
    },
}

/// Parses `YYYY-MM-DD` or one of `today`, `tomorrow`, `yesterday`
pub fn parse_date(input: &str) -> Result<NaiveDate, String> {
    let today = Local::now().date_naive();

    match input.trim().to_lowercase().as_str() {
        "today" => Ok(today),
        "tomorrow" => Ok(today + Duration::days(1)),
        "yesterday" => Ok(today - Duration::days(1)),
        other => NaiveDate::parse_from_str(other, "%Y-%m-%d").map_err(|_| {
            format!(
                "invalid date '{}': expected YYYY-MM-DD, today, tomorrow or yesterday",
                input
            )
        }),
    }
}

fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("slated=debug")
        } else {
            EnvFilter::new("slated=warn")
        }
    });

    // A subscriber may already be installed when run() is called twice in one process
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

fn open_workspace(vault: Option<PathBuf>) -> Result<Workspace> {
    match vault {
        Some(root) => Workspace::open(root),
        None => Workspace::open_current(),
    }
}

/// Main entry point for the CLI
pub fn run() -> Result<()> {
    let cli = Cli::parse();
    let output = Output::new(cli.format, cli.verbose);
    init_logging(cli.verbose);

    output.verbose("slated starting");

    match cli.command {
        Commands::Init { path } => {
            output.verbose_ctx("init", &format!("Initializing vault at: {}", path.display()));
            let workspace = Workspace::init(&path)?;
            output.success(&format!(
                "Initialized slated vault at {}",
                workspace.root().display()
            ));
        }

        Commands::Process { notes } => {
            let workspace = open_workspace(cli.vault)?;
            process::process(&output, workspace, &notes)?
        }

        Commands::Tasks { note } => {
            let workspace = open_workspace(cli.vault)?;
            task::list(&output, &workspace, &note)?
        }

        Commands::Move { note, line, to } => {
            let workspace = open_workspace(cli.vault)?;
            task::move_task(&output, &workspace, &note, line, to)?
        }

        Commands::Skip { note, line } => {
            let workspace = open_workspace(cli.vault)?;
            task::skip(&output, &workspace, &note, line)?
        }

        Commands::Repeat { note, line, edit } => {
            let workspace = open_workspace(cli.vault)?;
            task::repeat(&output, &workspace, &note, line, &edit)?
        }

        Commands::MoveIncomplete { note, to } => {
            let workspace = open_workspace(cli.vault)?;
            let to = to.unwrap_or_else(|| Local::now().date_naive() + Duration::days(1));
            process::move_incomplete(&output, workspace, &note, to)?
        }

        Commands::Watch { debounce_ms } => {
            let workspace = open_workspace(cli.vault)?;
            watch::run(&output, workspace, debounce_ms)?
        }
    }

    output.verbose("Command completed successfully");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_iso_dates() {
        assert_eq!(
            parse_date("2021-01-03"),
            Ok(NaiveDate::from_ymd_opt(2021, 1, 3).unwrap())
        );
    }

    #[test]
    fn parses_relative_dates() {
        let today = Local::now().date_naive();
        assert_eq!(parse_date("today"), Ok(today));
        assert_eq!(parse_date("Tomorrow"), Ok(today + Duration::days(1)));
        assert_eq!(parse_date("yesterday"), Ok(today - Duration::days(1)));
    }

    #[test]
    fn rejects_other_dates() {
        assert!(parse_date("next week").is_err());
        assert!(parse_date("2021-13-01").is_err());
    }

    #[test]
    fn cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
