//! Session configuration

use std::time::Duration;

/// Default worker thread name
pub const DEFAULT_WORKER_NAME: &str = "tether-worker";

/// Options for creating a [`crate::Session`]
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Name given to the worker thread
    pub worker_name: String,

    /// Worker thread stack size in bytes (None = platform default)
    pub worker_stack_size: Option<usize>,

    /// Log a warning for tasks running longer than this (None = never)
    pub slow_task_threshold: Option<Duration>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            worker_name: DEFAULT_WORKER_NAME.to_string(),
            worker_stack_size: None,
            slow_task_threshold: None,
        }
    }
}

impl SessionOptions {
    /// Set the worker thread name
    pub fn with_worker_name(mut self, name: impl Into<String>) -> Self {
        self.worker_name = name.into();
        self
    }

    /// Set the worker thread stack size
    pub fn with_worker_stack_size(mut self, bytes: usize) -> Self {
        self.worker_stack_size = Some(bytes);
        self
    }

    /// Warn about tasks slower than `threshold`
    pub fn with_slow_task_threshold(mut self, threshold: Duration) -> Self {
        self.slow_task_threshold = Some(threshold);
        self
    }
}
