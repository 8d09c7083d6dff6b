//! # Command-Line Interface
//!
//! User-facing CLI commands and output formatting.
//!
//! ## Commands
//!
//! | Command | Purpose |
//! |---------|---------|
//! | `init` | Create `.slated/config.toml` in a vault |
//! | `process` | Add anchors and write upcoming occurrences of recurring tasks |
//! | `tasks` | List the tasks of a note |
//! | `move`, `move-incomplete` | Move tasks to the note of another date |
//! | `skip` | Skip one occurrence of a recurring task |
//! | `repeat` | Show or edit a task's recurrence |
//! | `watch` | Process notes as they are edited |
//!
//! Notes are given by name (`2020-12-31`), by path (`notes/2020-12-31.md`)
//! or by date (`today`, `tomorrow`, `yesterday`, `YYYY-MM-DD`). Lines are 1-based.
//!
//! ## Output Formats
//!
//! All commands support `--format` flag:
//! - `text` (default) - Human-readable output
//! - `json` - Machine-parseable JSON
//!
//! ## Verbose Mode
//!
//! Use `--verbose` (or `-v`) for debug output; `RUST_LOG` overrides the filter:
//! ```bash
//! slated --verbose process today
//! ```
//!
//! ## Entry Point
//!
//! Call [`run()`] to parse arguments and execute the appropriate command.

mod app;
mod output;
mod process;
mod task;
mod watch;

pub use app::{parse_date, run, Cli, Commands};
pub use output::{Output, OutputFormat};
