//! Session: the caller-facing façade over one engine instance
//!
//! A session owns one worker thread (and through it one engine and one
//! execution context), one value registry and one task runner. Callers talk
//! to it purely in [`ValueHandle`]s: every operation resolves its handles up
//! front, marshals the work onto the worker, and registers whatever value
//! comes back.
//!
//! Two shapes of operation exist:
//!
//! - synchronous (`get_object_item`, `make_js_callback`, ...) block until the
//!   worker answers and return the result handle
//! - cancelable (`eval`, `call_function`, `heap_snapshot`, `heap_stats`)
//!   return a [`TaskId`] at once and later invoke the session callback with
//!   `(callback_id, handle)`, exactly once
//!
//! Bad handles and engine failures are not Rust errors; they come back as
//! error-kind values through the normal channel. `Err` is reserved for a
//! closed session or a dead worker.

use crate::context::{ContextHolder, EngineHost};
use crate::options::SessionOptions;
use crate::registry::{HandleConverter, ValueRegistry};
use crate::scheduler::{CancelableTaskRunner, TaskId};
use crate::worker::{WorkerManager, WorkerRefCollector};
use crate::{SessionError, SessionResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tether_sdk::{
    CallbackSink, Engine, Interrupt, ValueData, ValueFactory, ValueHandle, ValueKind, ValuePtr,
};

/// Resolve a handle, or hand its error value to `$bail` and return
macro_rules! resolve {
    ($session:expr, $handle:expr, $msg:literal, $bail:expr) => {
        match $session.convert($handle, $msg) {
            Ok(value) => value,
            Err(err) => return $bail(err),
        }
    };
}

/// Caller-facing façade; see the module docs
pub struct Session<E: Engine> {
    /// Worker owning the engine and context
    worker: Arc<WorkerManager<EngineHost<E>>>,

    /// Handle table for values visible to the caller
    registry: Arc<ValueRegistry>,

    /// Builds every value the session and engine produce
    factory: Arc<ValueFactory>,

    /// Cancelable operations
    tasks: CancelableTaskRunner<EngineHost<E>, ValuePtr>,

    /// Execution context lifecycle
    context: ContextHolder<E>,

    /// Registers a value and forwards its handle to the caller's callback
    sink: CallbackSink,

    /// Set once teardown started
    closed: AtomicBool,
}

impl<E: Engine> Session<E> {
    /// Start a session with default options
    ///
    /// `engine_factory` runs on the new worker thread. `callback` receives
    /// `(callback_id, handle)` for every cancelable operation and every
    /// engine-side invocation of a function built by
    /// [`Session::make_js_callback`]; it runs on the worker thread (or on a
    /// thread calling [`Session::cancel_task`]) and must not call back into
    /// the session synchronously.
    pub fn new<F, C>(engine_factory: F, callback: C) -> SessionResult<Self>
    where
        F: FnOnce() -> E + Send + 'static,
        C: Fn(u64, ValueHandle) + Send + Sync + 'static,
    {
        Self::with_options(engine_factory, callback, SessionOptions::default())
    }

    /// Start a session with custom options
    pub fn with_options<F, C>(
        engine_factory: F,
        callback: C,
        options: SessionOptions,
    ) -> SessionResult<Self>
    where
        F: FnOnce() -> E + Send + 'static,
        C: Fn(u64, ValueHandle) + Send + Sync + 'static,
    {
        let worker = Arc::new(WorkerManager::spawn(
            options.worker_name.clone(),
            options.worker_stack_size,
            move || EngineHost::new(engine_factory()),
        )?);

        let collector = Arc::new(WorkerRefCollector::new(worker.poster()));
        let factory = Arc::new(ValueFactory::with_collector(collector));
        let registry = Arc::new(ValueRegistry::new());

        let sink: CallbackSink = {
            let registry = registry.clone();
            Arc::new(move |callback_id: u64, value: ValuePtr| {
                let handle = registry.remember(value);
                callback(callback_id, handle);
            })
        };

        let context = ContextHolder::new(worker.clone(), factory.clone())?;
        let tasks = CancelableTaskRunner::new(worker.clone())
            .with_slow_task_threshold(options.slow_task_threshold);

        tracing::debug!(worker = %options.worker_name, "session started");

        Ok(Self {
            worker,
            registry,
            factory,
            tasks,
            context,
            sink,
            closed: AtomicBool::new(false),
        })
    }

    fn ensure_open(&self) -> SessionResult<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(SessionError::Closed)
        } else {
            Ok(())
        }
    }

    fn convert(&self, handle: ValueHandle, err_msg: &str) -> Result<ValuePtr, ValuePtr> {
        HandleConverter::new(&self.factory, &self.registry, handle, err_msg).into_result()
    }

    /// Synchronous bad-handle answer
    fn bad_handle(&self, err: ValuePtr) -> SessionResult<ValueHandle> {
        self.ensure_open()?;
        Ok(self.registry.remember(err))
    }

    /// Cancelable bad-handle answer: a task that resolves to `err` at once
    fn bad_handle_task(&self, callback_id: u64, err: ValuePtr) -> SessionResult<TaskId> {
        self.submit(callback_id, move |_, _| err)
    }

    /// Run `f` against the context on the worker and register its result
    fn run_sync<F>(&self, f: F) -> SessionResult<ValueHandle>
    where
        F: FnOnce(&mut E, &E::Context, &ValueFactory) -> ValuePtr + Send + 'static,
    {
        self.ensure_open()?;
        let factory = self.factory.clone();
        let value = self
            .worker
            .run_and_await(move |host: &mut EngineHost<E>| {
                host.with_context(&factory, |engine, context| f(engine, context, &factory))
            })?;
        Ok(self.registry.remember(value))
    }

    /// Schedule `f` against the context as a cancelable task
    fn run_task<F>(&self, callback_id: u64, f: F) -> SessionResult<TaskId>
    where
        F: FnOnce(&mut E, &E::Context, &ValueFactory, &Interrupt) -> ValuePtr + Send + 'static,
    {
        let factory = self.factory.clone();
        self.submit(callback_id, move |host, interrupt| {
            host.with_context(&factory, |engine, context| f(engine, context, &factory, interrupt))
        })
    }

    /// Schedule a runnable whose outcome is reported through the sink
    fn submit<F>(&self, callback_id: u64, runnable: F) -> SessionResult<TaskId>
    where
        F: FnOnce(&mut EngineHost<E>, &Interrupt) -> ValuePtr + Send + 'static,
    {
        self.ensure_open()?;

        let on_completed = {
            let sink = self.sink.clone();
            move |value: ValuePtr| sink(callback_id, value)
        };
        let on_canceled = {
            let sink = self.sink.clone();
            let factory = self.factory.clone();
            move |_partial: Option<ValuePtr>| {
                sink(callback_id, factory.error("execution terminated", ValueKind::Terminated));
            }
        };

        Ok(self.tasks.schedule(runnable, on_completed, on_canceled)?)
    }

    /// Build an engine function that reports its argument to the session
    /// callback as `(callback_id, handle)`
    pub fn make_js_callback(&self, callback_id: u64) -> SessionResult<ValueHandle> {
        let sink = self.sink.clone();
        self.run_sync(move |engine, context, factory| {
            engine.make_callback(context, callback_id, sink, factory)
        })
    }

    /// Evaluate the string named by `code`
    pub fn eval(&self, code: ValueHandle, callback_id: u64) -> SessionResult<TaskId> {
        let code = resolve!(self, code, "Bad handle: code", |err| {
            self.bad_handle_task(callback_id, err)
        });
        self.run_task(callback_id, move |engine, context, factory, interrupt| {
            engine.eval(context, &code, factory, interrupt)
        })
    }

    /// Cancel a cancelable operation; unknown or finished ids are ignored
    pub fn cancel_task(&self, task_id: TaskId) {
        self.tasks.cancel(task_id);
    }

    /// Capture a heap snapshot
    pub fn heap_snapshot(&self, callback_id: u64) -> SessionResult<TaskId> {
        self.run_task(callback_id, |engine, context, factory, interrupt| {
            engine.heap_snapshot(context, factory, interrupt)
        })
    }

    /// Collect heap statistics
    pub fn heap_stats(&self, callback_id: u64) -> SessionResult<TaskId> {
        self.run_task(callback_id, |engine, context, factory, interrupt| {
            engine.heap_stats(context, factory, interrupt)
        })
    }

    /// Identity hash of an object
    pub fn get_identity_hash(&self, obj: ValueHandle) -> SessionResult<ValueHandle> {
        let obj = resolve!(self, obj, "Bad handle: obj", |err| self.bad_handle(err));
        self.run_sync(move |engine, context, factory| engine.identity_hash(context, &obj, factory))
    }

    /// Array of an object's own property names
    pub fn get_own_property_names(&self, obj: ValueHandle) -> SessionResult<ValueHandle> {
        let obj = resolve!(self, obj, "Bad handle: obj", |err| self.bad_handle(err));
        self.run_sync(move |engine, context, factory| {
            engine.own_property_names(context, &obj, factory)
        })
    }

    /// `obj[key]`
    pub fn get_object_item(
        &self,
        obj: ValueHandle,
        key: ValueHandle,
    ) -> SessionResult<ValueHandle> {
        let obj = resolve!(self, obj, "Bad handle: obj", |err| self.bad_handle(err));
        let key = resolve!(self, key, "Bad handle: key", |err| self.bad_handle(err));
        self.run_sync(move |engine, context, factory| engine.get(context, &obj, &key, factory))
    }

    /// `obj[key] = val`
    pub fn set_object_item(
        &self,
        obj: ValueHandle,
        key: ValueHandle,
        val: ValueHandle,
    ) -> SessionResult<ValueHandle> {
        let obj = resolve!(self, obj, "Bad handle: obj", |err| self.bad_handle(err));
        let key = resolve!(self, key, "Bad handle: key", |err| self.bad_handle(err));
        let val = resolve!(self, val, "Bad handle: val", |err| self.bad_handle(err));
        self.run_sync(move |engine, context, factory| {
            engine.set(context, &obj, &key, &val, factory)
        })
    }

    /// `delete obj[key]`
    pub fn del_object_item(
        &self,
        obj: ValueHandle,
        key: ValueHandle,
    ) -> SessionResult<ValueHandle> {
        let obj = resolve!(self, obj, "Bad handle: obj", |err| self.bad_handle(err));
        let key = resolve!(self, key, "Bad handle: key", |err| self.bad_handle(err));
        self.run_sync(move |engine, context, factory| engine.del(context, &obj, &key, factory))
    }

    /// `obj.splice(start, delete_count, new_val?)`
    pub fn splice_array(
        &self,
        obj: ValueHandle,
        start: i32,
        delete_count: i32,
        new_val: Option<ValueHandle>,
    ) -> SessionResult<ValueHandle> {
        let obj = resolve!(self, obj, "Bad handle: obj", |err| self.bad_handle(err));
        let new_val = match new_val {
            Some(handle) => Some(resolve!(self, handle, "Bad handle: new_val", |err| {
                self.bad_handle(err)
            })),
            None => None,
        };
        self.run_sync(move |engine, context, factory| {
            engine.splice(context, &obj, start, delete_count, new_val.as_deref(), factory)
        })
    }

    /// `func.apply(this, argv)`
    pub fn call_function(
        &self,
        func: ValueHandle,
        this: ValueHandle,
        argv: ValueHandle,
        callback_id: u64,
    ) -> SessionResult<TaskId> {
        let bail = |err| self.bad_handle_task(callback_id, err);
        let func = resolve!(self, func, "Bad handle: func", bail);
        let this = resolve!(self, this, "Bad handle: this", bail);
        let argv = resolve!(self, argv, "Bad handle: argv", bail);
        self.run_task(callback_id, move |engine, context, factory, interrupt| {
            engine.call(context, &func, &this, &argv, factory, interrupt)
        })
    }

    /// Register a caller-built value (code strings, keys, arguments)
    ///
    /// Only plain data can be built this way; asking for a reference kind
    /// yields a `ValueError` value instead.
    pub fn alloc_value(&self, data: ValueData, kind: ValueKind) -> SessionResult<ValueHandle> {
        self.ensure_open()?;
        let value = if kind.is_reference() {
            self.factory.error(format!("Bad kind: {}", kind), ValueKind::ValueError)
        } else {
            self.factory.new_value(data, kind)
        };
        Ok(self.registry.remember(value))
    }

    /// Read the value named by a handle
    pub fn value(&self, handle: ValueHandle) -> Option<ValuePtr> {
        self.registry.from_handle(handle)
    }

    /// Drop the caller's reference to a value; unknown handles are ignored
    pub fn free_value(&self, handle: ValueHandle) {
        self.registry.forget(handle);
    }

    /// Number of values the caller can currently name
    pub fn value_count(&self) -> usize {
        self.registry.count()
    }

    /// Number of values alive anywhere (registry, in-flight work, engine
    /// callbacks)
    pub fn live_value_count(&self) -> usize {
        self.factory.live_count()
    }

    /// Number of cancelable operations that have not reported yet
    pub fn pending_task_count(&self) -> usize {
        self.tasks.outstanding()
    }

    /// Whether [`Session::close`] has run
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Tear the session down
    ///
    /// Outstanding tasks are canceled (their callbacks fire with
    /// "execution terminated"), registered values are dropped, the context
    /// is released on the worker, and the worker thread is joined. Later
    /// operations fail with [`SessionError::Closed`]. Idempotent.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        tracing::debug!(
            worker = %self.worker.name(),
            pending = self.tasks.outstanding(),
            values = self.registry.count(),
            "closing session"
        );

        self.tasks.shutdown();
        self.registry.clear();
        self.context.release();
        self.worker.shutdown();

        // Results delivered by a task that was still running above
        self.registry.clear();
    }
}

impl<E: Engine> Drop for Session<E> {
    fn drop(&mut self) {
        self.close();
    }
}
