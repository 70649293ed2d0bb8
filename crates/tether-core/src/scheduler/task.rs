//! Task identity, lifecycle state and the shared per-task entry

use crate::worker::panic_message;
use parking_lot::Mutex;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU8, Ordering};
use tether_sdk::Interrupt;

/// Identifier of a scheduled task
///
/// Issued by a task runner from its own counter; only meaningful to the
/// runner (and session) that issued it.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

impl TaskId {
    /// Get the numeric ID value
    pub fn as_u64(self) -> u64 {
        self.0
    }

    /// Create a TaskId from a u64 value
    pub fn from_u64(id: u64) -> Self {
        TaskId(id)
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// State of a Task
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum TaskState {
    /// Queued on the worker, not yet started
    Pending = 0,
    /// Currently executing on the worker
    Running = 1,
    /// Executing, with an interrupt requested
    Canceling = 2,
    /// Finished; `on_completed` fired
    Completed = 3,
    /// Canceled; `on_canceled` fired
    Canceled = 4,
}

impl TaskState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => TaskState::Pending,
            1 => TaskState::Running,
            2 => TaskState::Canceling,
            3 => TaskState::Completed,
            _ => TaskState::Canceled,
        }
    }

    /// Whether a callback has already been delivered
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Completed | TaskState::Canceled)
    }
}

type CompletedFn<R> = Box<dyn FnOnce(R) + Send>;
type CanceledFn<R> = Box<dyn FnOnce(Option<R>) + Send>;

struct Callbacks<R> {
    on_completed: CompletedFn<R>,
    on_canceled: CanceledFn<R>,
}

/// Shared record of one task
///
/// The state word is the single arbiter of delivery: whichever thread moves
/// it into a terminal state takes the callbacks. All other transitions are
/// compare-and-swap, so a racing cancel and completion resolve to exactly one
/// callback.
pub(crate) struct TaskEntry<R> {
    id: TaskId,
    state: AtomicU8,
    interrupt: Interrupt,
    callbacks: Mutex<Option<Callbacks<R>>>,
}

impl<R> TaskEntry<R> {
    pub(crate) fn new<C, X>(id: TaskId, on_completed: C, on_canceled: X) -> Self
    where
        C: FnOnce(R) + Send + 'static,
        X: FnOnce(Option<R>) + Send + 'static,
    {
        Self {
            id,
            state: AtomicU8::new(TaskState::Pending as u8),
            interrupt: Interrupt::new(),
            callbacks: Mutex::new(Some(Callbacks {
                on_completed: Box::new(on_completed),
                on_canceled: Box::new(on_canceled),
            })),
        }
    }

    pub(crate) fn id(&self) -> TaskId {
        self.id
    }

    pub(crate) fn state(&self) -> TaskState {
        TaskState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn interrupt(&self) -> &Interrupt {
        &self.interrupt
    }

    fn transition(&self, from: TaskState, to: TaskState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Pending -> Running; false if the task was canceled while queued
    pub(crate) fn try_start(&self) -> bool {
        self.transition(TaskState::Pending, TaskState::Running)
    }

    /// Pending -> Canceled
    pub(crate) fn try_cancel_pending(&self) -> bool {
        self.transition(TaskState::Pending, TaskState::Canceled)
    }

    /// Running -> Canceling, raising the interrupt
    pub(crate) fn try_interrupt(&self) -> bool {
        if self.transition(TaskState::Running, TaskState::Canceling) {
            self.interrupt.request();
            true
        } else {
            false
        }
    }

    /// Move into `terminal` from any live state
    ///
    /// Returns false if another thread already settled the task.
    fn settle(&self, terminal: TaskState) -> bool {
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            if TaskState::from_u8(current).is_terminal() {
                return false;
            }
            match self.state.compare_exchange_weak(
                current,
                terminal as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    fn take_callbacks(&self) -> Option<Callbacks<R>> {
        self.callbacks.lock().take()
    }

    /// Deliver `on_completed`, unless the task was already settled
    pub(crate) fn complete(&self, result: R) -> bool {
        if !self.settle(TaskState::Completed) {
            return false;
        }
        match self.take_callbacks() {
            Some(callbacks) => {
                self.deliver(move || (callbacks.on_completed)(result));
                true
            }
            None => false,
        }
    }

    /// Fire `on_canceled` after the task already reached `Canceled`
    pub(crate) fn deliver_canceled(&self, partial: Option<R>) -> bool {
        debug_assert_eq!(self.state(), TaskState::Canceled);
        match self.take_callbacks() {
            Some(callbacks) => {
                self.deliver(move || (callbacks.on_canceled)(partial));
                true
            }
            None => false,
        }
    }

    /// Settle as canceled without firing any callback
    ///
    /// Returns false if a callback was already delivered.
    pub(crate) fn discard(&self) -> bool {
        if !self.settle(TaskState::Canceled) {
            return false;
        }
        drop(self.take_callbacks());
        true
    }

    /// Run a host callback; a panic is logged and stops there
    fn deliver(&self, callback: impl FnOnce()) {
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(callback)) {
            tracing::error!(
                task = %self.id,
                panic = %panic_message(payload.as_ref()),
                "task callback panicked"
            );
        }
    }

    /// Deliver `on_canceled`, unless the task was already settled
    pub(crate) fn cancel(&self, partial: Option<R>) -> bool {
        if !self.settle(TaskState::Canceled) {
            return false;
        }
        self.deliver_canceled(partial)
    }
}
