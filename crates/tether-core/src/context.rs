//! Worker-side engine state and the context lifecycle

use crate::worker::WorkerManager;
use crate::WorkerError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tether_sdk::{EngineCore, ValueFactory, ValueKind, ValuePtr};

/// Everything the worker thread owns for one session
///
/// Built on the worker and never moved off it, so neither the engine nor its
/// context needs to be `Send`.
pub struct EngineHost<E: EngineCore> {
    engine: E,
    context: Option<E::Context>,
}

impl<E: EngineCore> EngineHost<E> {
    /// Wrap a freshly built engine; the context comes later
    pub fn new(engine: E) -> Self {
        Self { engine, context: None }
    }

    /// The engine
    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    /// Whether a context is currently installed
    pub fn has_context(&self) -> bool {
        self.context.is_some()
    }

    /// Borrow the engine mutably and the context shared, at the same time
    pub fn split(&mut self) -> (&mut E, Option<&E::Context>) {
        (&mut self.engine, self.context.as_ref())
    }

    /// Run `f` against the live context
    ///
    /// Without a context (it was released, or never created) the result is a
    /// `ValueError` rather than a call into the engine.
    pub fn with_context<F>(&mut self, factory: &ValueFactory, f: F) -> ValuePtr
    where
        F: FnOnce(&mut E, &E::Context) -> ValuePtr,
    {
        match self.split() {
            (engine, Some(context)) => f(engine, context),
            (_, None) => factory.error("context released", ValueKind::ValueError),
        }
    }
}

/// Owns the session's execution context
///
/// Creation and release are both marshaled onto the worker thread and
/// awaited, so the context exists exactly between [`ContextHolder::new`] and
/// [`ContextHolder::release`].
pub struct ContextHolder<E: EngineCore> {
    worker: Arc<WorkerManager<EngineHost<E>>>,
    released: AtomicBool,
}

impl<E: EngineCore> ContextHolder<E> {
    /// Create the context on the worker and wait for it
    pub fn new(
        worker: Arc<WorkerManager<EngineHost<E>>>,
        factory: Arc<ValueFactory>,
    ) -> Result<Self, WorkerError> {
        worker.run_and_await(move |host: &mut EngineHost<E>| {
            let context = host.engine.create_context(&factory);
            if let Some(previous) = host.context.replace(context) {
                host.engine.release_context(previous);
            }
        })?;

        tracing::debug!(worker = %worker.name(), "context created");
        Ok(Self {
            worker,
            released: AtomicBool::new(false),
        })
    }

    /// Whether [`ContextHolder::release`] already ran
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    /// Tear the context down on the worker and wait for it
    ///
    /// Idempotent. Work queued earlier still sees the context; work queued
    /// later gets a "context released" error value.
    pub fn release(&self) {
        if self.released.swap(true, Ordering::AcqRel) {
            return;
        }

        let result = self.worker.run_and_await(|host: &mut EngineHost<E>| {
            if let Some(context) = host.context.take() {
                host.engine.release_context(context);
            }
        });

        match result {
            Ok(()) => tracing::debug!(worker = %self.worker.name(), "context released"),
            // The context dies with the engine when the worker is gone
            Err(e) => tracing::warn!(error = %e, "could not release context on worker"),
        }
    }
}

impl<E: EngineCore> Drop for ContextHolder<E> {
    fn drop(&mut self) {
        self.release();
    }
}
