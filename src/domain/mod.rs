//! Domain models for slated
//!
//! Task lines, recurrence rules and section editing, without any I/O concerns.

mod anchor;
mod document;
mod recurrence;
mod repeat;
pub mod section;
mod settings;
mod task_line;

pub use anchor::{Anchor, AnchorError, ANCHOR_PREFIX};
pub use document::{join_lines, split_lines, DocumentId};
pub use recurrence::{
    month_name, weekday_from_index, weekday_name, Frequency, NthWeekday, RecurrenceError,
    RecurrenceRule,
};
pub use repeat::{MonthDay, RepeatAdapter};
pub use settings::{Settings, SettingsError};
pub use task_line::{
    checkbox_state, is_task_line, sub_content_len, ProvenanceLink, Recurrence, TaskError,
    TaskLine, TaskState,
};
