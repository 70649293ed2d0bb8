//! Cooperative interruption of running work
//!
//! A canceled task that is already executing cannot be pulled off the worker
//! thread. Instead the runner raises its [`Interrupt`], and the engine polls
//! [`Interrupt::check`] at safe points (loop back-edges, call boundaries).
//! `check` records that the engine acted on the request, which is how the
//! runner tells "interrupted" apart from "finished anyway".

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
struct InterruptState {
    requested: AtomicBool,
    observed: AtomicBool,
}

/// Per-task interruption token, shared between the canceling thread and the
/// worker
#[derive(Debug, Clone, Default)]
pub struct Interrupt {
    state: Arc<InterruptState>,
}

impl Interrupt {
    /// Create a token with no pending request
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the running work to stop at its next safe point
    pub fn request(&self) {
        self.state.requested.store(true, Ordering::Release);
    }

    /// Whether an interrupt has been requested (does not acknowledge it)
    pub fn is_requested(&self) -> bool {
        self.state.requested.load(Ordering::Acquire)
    }

    /// Safe-point poll for engines
    ///
    /// Returns `true` if the work must stop now. A `true` result is recorded:
    /// the task will be reported as canceled rather than completed.
    pub fn check(&self) -> bool {
        if self.is_requested() {
            self.state.observed.store(true, Ordering::Release);
            true
        } else {
            false
        }
    }

    /// Whether the engine acknowledged a request through [`Interrupt::check`]
    pub fn was_observed(&self) -> bool {
        self.state.observed.load(Ordering::Acquire)
    }
}
