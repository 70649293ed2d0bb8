//! Dedicated worker thread owning engine state
//!
//! The worker thread is the only thread that ever touches the state `S` (for
//! a session, the engine plus its context). Callers hand it closures over a
//! FIFO channel; closures run strictly one at a time, in enqueue order.

use crate::WorkerError;
use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};

/// Closure executed on the worker with exclusive access to its state
pub type Job<S> = Box<dyn FnOnce(&mut S) + Send>;

/// Message sent to the worker thread
enum Message<S> {
    /// Run a closure
    Run { job_id: u64, job: Job<S> },
    /// Stop after everything queued before this marker
    Shutdown,
}

/// Cloneable, non-blocking submitter for worker jobs
///
/// Used where holding the whole manager would create an ownership cycle
/// (e.g. release hooks stored inside values).
pub struct WorkerPoster<S: 'static> {
    tx: Sender<Message<S>>,
    running: Arc<AtomicBool>,
    next_job: Arc<AtomicU64>,
}

impl<S: 'static> Clone for WorkerPoster<S> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            running: self.running.clone(),
            next_job: self.next_job.clone(),
        }
    }
}

impl<S: 'static> WorkerPoster<S> {
    /// Enqueue `job` without waiting; returns its job id
    pub fn schedule<F>(&self, job: F) -> Result<u64, WorkerError>
    where
        F: FnOnce(&mut S) + Send + 'static,
    {
        if !self.running.load(Ordering::Acquire) {
            return Err(WorkerError::Unavailable);
        }

        let job_id = self.next_job.fetch_add(1, Ordering::Relaxed);
        self.tx
            .send(Message::Run {
                job_id,
                job: Box::new(job),
            })
            .map_err(|_| WorkerError::Unavailable)?;

        tracing::trace!(job_id, "job enqueued");
        Ok(job_id)
    }

    /// Fire-and-forget variant of [`WorkerPoster::schedule`]
    ///
    /// Failures are logged and dropped; use only for work that is moot once
    /// the worker has stopped.
    pub fn post<F>(&self, job: F)
    where
        F: FnOnce(&mut S) + Send + 'static,
    {
        if let Err(e) = self.schedule(job) {
            tracing::debug!(error = %e, "dropping posted job");
        }
    }
}

/// Owner of the dedicated worker thread
pub struct WorkerManager<S: 'static> {
    /// Worker thread name
    name: String,

    /// Submission side of the job queue
    poster: WorkerPoster<S>,

    /// Identity of the worker thread (for reentrancy detection)
    thread_id: ThreadId,

    /// Worker thread handle, taken on shutdown
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl<S: 'static> WorkerManager<S> {
    /// Start a worker thread whose state is built *on* that thread by `init`
    ///
    /// `S` itself never crosses threads, so it does not need to be `Send`.
    pub fn spawn<F>(
        name: impl Into<String>,
        stack_size: Option<usize>,
        init: F,
    ) -> Result<Self, WorkerError>
    where
        F: FnOnce() -> S + Send + 'static,
    {
        let name = name.into();
        let (tx, rx) = channel::unbounded::<Message<S>>();
        let (ready_tx, ready_rx) = channel::bounded::<Result<(), String>>(1);

        let mut builder = thread::Builder::new().name(name.clone());
        if let Some(size) = stack_size {
            builder = builder.stack_size(size);
        }

        let thread_name = name.clone();
        let handle = builder
            .spawn(move || {
                let state = match panic::catch_unwind(AssertUnwindSafe(init)) {
                    Ok(state) => state,
                    Err(payload) => {
                        let _ = ready_tx.send(Err(panic_message(payload.as_ref())));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));
                Self::run_loop(&thread_name, state, rx);
            })
            .map_err(|e| WorkerError::Spawn(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(msg)) => {
                let _ = handle.join();
                return Err(WorkerError::Spawn(msg));
            }
            Err(_) => {
                let _ = handle.join();
                return Err(WorkerError::Spawn("worker exited during startup".to_string()));
            }
        }

        tracing::debug!(worker = %name, "worker started");

        Ok(Self {
            name,
            poster: WorkerPoster {
                tx,
                running: Arc::new(AtomicBool::new(true)),
                next_job: Arc::new(AtomicU64::new(1)),
            },
            thread_id: handle.thread().id(),
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Worker thread main loop
    fn run_loop(name: &str, mut state: S, rx: Receiver<Message<S>>) {
        while let Ok(message) = rx.recv() {
            match message {
                Message::Run { job_id, job } => {
                    tracing::trace!(job_id, "job started");
                    let outcome = panic::catch_unwind(AssertUnwindSafe(|| job(&mut state)));
                    if let Err(payload) = outcome {
                        tracing::error!(
                            worker = %name,
                            job_id,
                            panic = %panic_message(payload.as_ref()),
                            "job panicked"
                        );
                    }
                }
                Message::Shutdown => break,
            }
        }

        drop(state);
        tracing::debug!(worker = %name, "worker shutting down");
    }

    /// Run `f` on the worker and block until it returns its result
    pub fn run_and_await<R, F>(&self, f: F) -> Result<R, WorkerError>
    where
        R: Send + 'static,
        F: FnOnce(&mut S) -> R + Send + 'static,
    {
        if self.is_worker_thread() {
            return Err(WorkerError::Reentrant);
        }

        let (reply_tx, reply_rx) = channel::bounded::<Result<R, String>>(1);
        self.poster.schedule(move |state: &mut S| {
            let result = panic::catch_unwind(AssertUnwindSafe(|| f(state)))
                .map_err(|payload| panic_message(payload.as_ref()));
            let _ = reply_tx.send(result);
        })?;

        match reply_rx.recv() {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(msg)) => Err(WorkerError::Panicked(msg)),
            // Job dropped unrun: the worker stopped underneath us
            Err(_) => Err(WorkerError::Unavailable),
        }
    }

    /// Enqueue `f` without blocking; returns the job id
    pub fn schedule<F>(&self, f: F) -> Result<u64, WorkerError>
    where
        F: FnOnce(&mut S) + Send + 'static,
    {
        self.poster.schedule(f)
    }

    /// Enqueue `f`, ignoring an unavailable worker
    pub fn post<F>(&self, f: F)
    where
        F: FnOnce(&mut S) + Send + 'static,
    {
        self.poster.post(f)
    }

    /// Cloneable submitter that does not own the thread
    pub fn poster(&self) -> WorkerPoster<S> {
        self.poster.clone()
    }

    /// Whether the calling thread is this manager's worker
    pub fn is_worker_thread(&self) -> bool {
        thread::current().id() == self.thread_id
    }

    /// Whether the worker still accepts work
    pub fn is_running(&self) -> bool {
        self.poster.running.load(Ordering::Acquire)
    }

    /// Total number of jobs accepted so far
    pub fn jobs_dispatched(&self) -> u64 {
        self.poster.next_job.load(Ordering::Relaxed) - 1
    }

    /// Worker thread name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stop accepting work, let queued jobs finish, and join the thread
    ///
    /// Idempotent. Must not be called from the worker thread itself.
    pub fn shutdown(&self) {
        if !self.poster.running.swap(false, Ordering::AcqRel) {
            return;
        }

        let _ = self.poster.tx.send(Message::Shutdown);

        if self.is_worker_thread() {
            tracing::warn!(
                worker = %self.name,
                "shutdown requested from the worker thread; not joining"
            );
            return;
        }

        if let Some(handle) = self.handle.lock().take() {
            if handle.join().is_err() {
                tracing::warn!(worker = %self.name, "worker thread panicked during shutdown");
            }
        }
    }
}

impl<S: 'static> Drop for WorkerManager<S> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Best-effort text of a panic payload
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
