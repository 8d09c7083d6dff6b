//! slated - recurring and movable tasks in dated markdown notes
//!
//! Tasks are checkbox lines in daily notes. A task can carry a recurrence
//! (`- [ ] water plants ; every week on Sunday`); completing it writes the next
//! occurrence into the note of the next date. Tasks can also be moved to other
//! dates, leaving a link behind, and moved back again.

pub mod cli;
pub mod domain;
pub mod engine;
pub mod storage;

pub use domain::{Anchor, DocumentId, RecurrenceRule, RepeatAdapter, Settings, TaskLine, TaskState};
pub use engine::{ProcessReport, TaskHandler};
pub use storage::{DocumentStore, Vault, Workspace};
