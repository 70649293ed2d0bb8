//! Tether core runtime
//!
//! Drives a single-threaded embedded engine from any number of caller threads:
//!
//! - [`worker`]: the dedicated engine thread and its FIFO job queue
//! - [`scheduler`]: cancelable tasks with exactly-once completion
//! - [`registry`]: handle-to-value table and eager handle conversion
//! - [`context`]: worker-side engine state and the context lifecycle
//! - [`session`]: the caller-facing façade tying it all together
//!
//! Engines plug in through the traits in [`tether_sdk`].

#![warn(missing_docs)]

pub mod context;
pub mod logging;
pub mod options;
pub mod registry;
pub mod scheduler;
pub mod session;
pub mod worker;

pub use context::{ContextHolder, EngineHost};
pub use options::SessionOptions;
pub use registry::{HandleConverter, ValueRegistry};
pub use scheduler::{CancelableTaskRunner, TaskId, TaskState};
pub use session::Session;
pub use worker::{WorkerManager, WorkerPoster, WorkerRefCollector};

pub use tether_sdk;

/// Failure to dispatch work to a worker thread
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorkerError {
    /// The worker has shut down (or died) and accepts no more work
    #[error("Worker unavailable")]
    Unavailable,

    /// Blocking dispatch attempted from the worker thread itself
    #[error("Reentrant dispatch from the worker thread")]
    Reentrant,

    /// The dispatched closure panicked
    #[error("Worker job panicked: {0}")]
    Panicked(String),

    /// The worker thread or its state could not be created
    #[error("Failed to start worker: {0}")]
    Spawn(String),
}

/// Session-level failure
///
/// Bad handles and engine errors are values, not `SessionError`s.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// The session was closed
    #[error("Session closed")]
    Closed,

    /// The worker could not run the operation
    #[error(transparent)]
    Worker(#[from] WorkerError),
}

/// Result type for session operations
pub type SessionResult<T> = Result<T, SessionError>;
