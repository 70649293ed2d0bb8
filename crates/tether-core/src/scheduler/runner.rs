//! Cancelable task runner on top of the worker queue

use crate::scheduler::task::{TaskEntry, TaskId, TaskState};
use crate::worker::{panic_message, WorkerManager};
use crate::WorkerError;
use dashmap::DashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tether_sdk::Interrupt;

type TaskTable<R> = Arc<DashMap<TaskId, Arc<TaskEntry<R>>>>;

/// Runs cancelable units of work on a worker
///
/// Each task ends in exactly one of `on_completed(result)` or
/// `on_canceled(partial)`:
///
/// - canceled while queued: `on_canceled(None)`, fired by the canceling
///   thread; the queued job becomes a no-op
/// - canceled while running: the task's [`Interrupt`] is raised; if the
///   runnable acknowledged it (see [`Interrupt::check`]) the result is passed
///   to `on_canceled(Some(result))`, otherwise the task completes normally
/// - runnable panicked: `on_canceled(None)`
///
/// Callbacks for tasks that reach the worker run on the worker thread.
pub struct CancelableTaskRunner<S: 'static, R: Send + 'static> {
    /// Worker executing the tasks
    worker: Arc<WorkerManager<S>>,

    /// Live (non-terminal) tasks by id
    tasks: TaskTable<R>,

    /// Next task id
    next_id: AtomicU64,

    /// Cleared by [`CancelableTaskRunner::shutdown`]
    accepting: AtomicBool,

    /// Warn about tasks that run longer than this
    slow_task_threshold: Option<Duration>,
}

impl<S: 'static, R: Send + 'static> CancelableTaskRunner<S, R> {
    /// Create a runner dispatching to `worker`
    pub fn new(worker: Arc<WorkerManager<S>>) -> Self {
        Self {
            worker,
            tasks: Arc::new(DashMap::new()),
            next_id: AtomicU64::new(1),
            accepting: AtomicBool::new(true),
            slow_task_threshold: None,
        }
    }

    /// Warn (via `tracing`) about tasks running longer than `threshold`
    pub fn with_slow_task_threshold(mut self, threshold: Option<Duration>) -> Self {
        self.slow_task_threshold = threshold;
        self
    }

    /// Enqueue `runnable` and return its id immediately
    ///
    /// If the worker is gone the error is the only outcome: no callback
    /// fires for a task whose id was never handed out.
    pub fn schedule<F, C, X>(
        &self,
        runnable: F,
        on_completed: C,
        on_canceled: X,
    ) -> Result<TaskId, WorkerError>
    where
        F: FnOnce(&mut S, &Interrupt) -> R + Send + 'static,
        C: FnOnce(R) + Send + 'static,
        X: FnOnce(Option<R>) + Send + 'static,
    {
        if !self.accepting.load(Ordering::Acquire) {
            return Err(WorkerError::Unavailable);
        }

        let id = TaskId::from_u64(self.next_id.fetch_add(1, Ordering::Relaxed));
        let entry = Arc::new(TaskEntry::new(id, on_completed, on_canceled));
        self.tasks.insert(id, entry.clone());

        let submission = Arc::new(AtomicU8::new(SUBMITTING));
        let mut guard = AbandonGuard {
            entry: Some(entry.clone()),
            tasks: self.tasks.clone(),
            submission: submission.clone(),
        };
        let slow_task_threshold = self.slow_task_threshold;

        let submitted = self.worker.schedule(move |state: &mut S| {
            if let Some(entry) = guard.disarm() {
                run_entry(&entry, &guard.tasks, state, runnable, slow_task_threshold);
            }
        });
        let dropped_unrun = submission
            .compare_exchange(SUBMITTING, QUEUED, Ordering::AcqRel, Ordering::Acquire)
            .is_err();

        match submitted {
            Ok(_) => {
                if dropped_unrun {
                    abandon(&self.tasks, &entry);
                }
                tracing::trace!(task = %id, "task scheduled");
                Ok(id)
            }
            Err(e) => {
                self.tasks.remove(&id);
                if entry.discard() {
                    Err(e)
                } else {
                    // A racing shutdown already reported it as canceled
                    Ok(id)
                }
            }
        }
    }

    /// Cancel a task
    ///
    /// Unknown or already-finished ids are ignored.
    pub fn cancel(&self, id: TaskId) {
        // Clone out so no map guard is held while callbacks run
        let Some(entry) = self.tasks.get(&id).map(|e| e.value().clone()) else {
            return;
        };

        if entry.try_cancel_pending() {
            self.tasks.remove(&id);
            tracing::debug!(task = %id, "task canceled before start");
            entry.deliver_canceled(None);
        } else if entry.try_interrupt() {
            tracing::debug!(task = %id, "interrupt requested for running task");
        }
    }

    /// Stop accepting tasks and cancel everything outstanding
    ///
    /// Queued tasks are settled immediately; a running task is interrupted
    /// and settles when the worker gets back to it.
    pub fn shutdown(&self) {
        if !self.accepting.swap(false, Ordering::AcqRel) {
            return;
        }

        let ids: Vec<TaskId> = self.tasks.iter().map(|e| *e.key()).collect();
        if !ids.is_empty() {
            tracing::debug!(count = ids.len(), "canceling outstanding tasks");
        }
        for id in ids {
            self.cancel(id);
        }
    }

    /// Number of tasks that have not settled yet
    pub fn outstanding(&self) -> usize {
        self.tasks.len()
    }

    /// Current state of a live task; `None` once it has settled
    pub fn state(&self, id: TaskId) -> Option<TaskState> {
        self.tasks.get(&id).map(|e| e.state())
    }
}

/// Execute one task on the worker thread
///
/// The entry leaves `tasks` before any callback runs.
fn run_entry<S, R, F>(
    entry: &TaskEntry<R>,
    tasks: &TaskTable<R>,
    state: &mut S,
    runnable: F,
    slow_task_threshold: Option<Duration>,
) where
    F: FnOnce(&mut S, &Interrupt) -> R,
{
    if !entry.try_start() {
        // Canceled while queued; on_canceled already fired
        return;
    }

    let started = Instant::now();
    let interrupt = entry.interrupt().clone();
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| runnable(state, &interrupt)));
    let elapsed = started.elapsed();

    if let Some(threshold) = slow_task_threshold {
        if elapsed > threshold {
            tracing::warn!(
                task = %entry.id(),
                elapsed_ms = elapsed.as_millis() as u64,
                "slow task"
            );
        }
    }

    tasks.remove(&entry.id());
    match outcome {
        Ok(result) if interrupt.was_observed() => {
            tracing::debug!(task = %entry.id(), "task interrupted");
            entry.cancel(Some(result));
        }
        Ok(result) => {
            entry.complete(result);
        }
        Err(payload) => {
            tracing::error!(
                task = %entry.id(),
                panic = %panic_message(payload.as_ref()),
                "task panicked"
            );
            entry.cancel(None);
        }
    }
}

/// Settle a task whose job will never run
fn abandon<R>(tasks: &TaskTable<R>, entry: &TaskEntry<R>) {
    tasks.remove(&entry.id());
    if entry.cancel(None) {
        tracing::debug!(task = %entry.id(), "task dropped by stopped worker");
    }
}

const SUBMITTING: u8 = 0;
const QUEUED: u8 = 1;
const DROPPED: u8 = 2;

/// Settles a task whose job is dropped without ever running
///
/// That only happens when the worker stops underneath a queued job. A job
/// dropped while `schedule` is still submitting it is left to `schedule`.
struct AbandonGuard<R> {
    entry: Option<Arc<TaskEntry<R>>>,
    tasks: TaskTable<R>,
    submission: Arc<AtomicU8>,
}

impl<R> AbandonGuard<R> {
    fn disarm(&mut self) -> Option<Arc<TaskEntry<R>>> {
        self.entry.take()
    }
}

impl<R> Drop for AbandonGuard<R> {
    fn drop(&mut self) {
        let Some(entry) = self.entry.take() else {
            return;
        };
        let still_submitting = self
            .submission
            .compare_exchange(SUBMITTING, DROPPED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if !still_submitting {
            abandon(&self.tasks, &entry);
        }
    }
}
