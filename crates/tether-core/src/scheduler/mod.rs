//! Cancelable task scheduling
//!
//! Tasks are units of work queued on a session's worker that report back
//! through exactly one of two callbacks. See [`CancelableTaskRunner`].

mod runner;
mod task;

pub use runner::CancelableTaskRunner;
pub use task::{TaskId, TaskState};
