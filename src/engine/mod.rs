//! Task engine
//!
//! Store-backed actions on single tasks and the handler that propagates
//! recurring tasks across dated notes.

mod actions;
mod handler;

#[cfg(test)]
pub(crate) mod testing;

pub use handler::{ProcessReport, TaskHandler};
