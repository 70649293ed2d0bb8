//! Worker thread management
//!
//! - `WorkerManager`: owns the dedicated thread, FIFO dispatch, shutdown
//! - `WorkerPoster`: cloneable non-blocking submitter
//! - `WorkerRefCollector`: releases engine references on the worker

mod collector;
mod manager;

pub use collector::WorkerRefCollector;
pub use manager::{Job, WorkerManager, WorkerPoster};

pub(crate) use manager::panic_message;
