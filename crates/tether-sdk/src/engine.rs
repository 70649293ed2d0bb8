//! Engine collaborator traits
//!
//! These traits are the whole contract between the core runtime and an
//! embedded engine. The core never evaluates code or touches objects itself;
//! it moves [`Value`]s to the worker thread and calls into these traits there.
//!
//! Every method runs on the session's worker thread with exclusive access to
//! the engine (`&mut self`), so implementations need no locking. Results are
//! always values: engine failures are reported as error-kind values built
//! through the supplied [`ValueFactory`], never as panics.

use crate::factory::ValueFactory;
use crate::interrupt::Interrupt;
use crate::value::{Value, ValuePtr};
use std::sync::Arc;

/// Channel through which engine-side callback functions reach the host
///
/// Arguments: the caller's callback id and the value the script passed.
pub type CallbackSink = Arc<dyn Fn(u64, ValuePtr) + Send + Sync>;

/// Context lifecycle and reference release
pub trait EngineCore: 'static {
    /// Persistent execution context (global scope and friends)
    type Context;

    /// Create the session's execution context
    fn create_context(&mut self, factory: &ValueFactory) -> Self::Context;

    /// Tear down a context created by [`EngineCore::create_context`]
    fn release_context(&mut self, context: Self::Context);

    /// Release an engine-side reference whose last [`Value`] was dropped
    fn release_ref(&mut self, engine_ref: u64);
}

/// Evaluates source code
pub trait Evaluator: EngineCore {
    /// Evaluate `code` (a string value) in `context`
    ///
    /// Long evaluations must poll `interrupt` and return a
    /// [`crate::ValueKind::Terminated`] value once it fires.
    fn eval(
        &mut self,
        context: &Self::Context,
        code: &Value,
        factory: &ValueFactory,
        interrupt: &Interrupt,
    ) -> ValuePtr;
}

/// Object and function manipulation
pub trait ObjectManipulator: EngineCore {
    /// Stable identity hash of an object reference
    fn identity_hash(
        &mut self,
        context: &Self::Context,
        obj: &Value,
        factory: &ValueFactory,
    ) -> ValuePtr;

    /// Array of the object's own property names
    fn own_property_names(
        &mut self,
        context: &Self::Context,
        obj: &Value,
        factory: &ValueFactory,
    ) -> ValuePtr;

    /// `obj[key]`
    fn get(
        &mut self,
        context: &Self::Context,
        obj: &Value,
        key: &Value,
        factory: &ValueFactory,
    ) -> ValuePtr;

    /// `obj[key] = val`
    fn set(
        &mut self,
        context: &Self::Context,
        obj: &Value,
        key: &Value,
        val: &Value,
        factory: &ValueFactory,
    ) -> ValuePtr;

    /// `delete obj[key]`
    fn del(
        &mut self,
        context: &Self::Context,
        obj: &Value,
        key: &Value,
        factory: &ValueFactory,
    ) -> ValuePtr;

    /// `obj.splice(start, delete_count, new_val?)`
    fn splice(
        &mut self,
        context: &Self::Context,
        obj: &Value,
        start: i32,
        delete_count: i32,
        new_val: Option<&Value>,
        factory: &ValueFactory,
    ) -> ValuePtr;

    /// `func.apply(this, argv)`; may run long and must honor `interrupt`
    fn call(
        &mut self,
        context: &Self::Context,
        func: &Value,
        this: &Value,
        argv: &Value,
        factory: &ValueFactory,
        interrupt: &Interrupt,
    ) -> ValuePtr;
}

/// Heap introspection
pub trait HeapReporter: EngineCore {
    /// Serialized heap snapshot
    fn heap_snapshot(
        &mut self,
        context: &Self::Context,
        factory: &ValueFactory,
        interrupt: &Interrupt,
    ) -> ValuePtr;

    /// Heap statistics summary
    fn heap_stats(
        &mut self,
        context: &Self::Context,
        factory: &ValueFactory,
        interrupt: &Interrupt,
    ) -> ValuePtr;
}

/// Builds engine functions that call back into the host
pub trait CallbackMaker: EngineCore {
    /// Create a function value that forwards `(callback_id, argument)` to
    /// `sink` whenever script code invokes it
    fn make_callback(
        &mut self,
        context: &Self::Context,
        callback_id: u64,
        sink: CallbackSink,
        factory: &ValueFactory,
    ) -> ValuePtr;
}

/// An engine that provides every collaborator a session needs
pub trait Engine: Evaluator + ObjectManipulator + HeapReporter + CallbackMaker {}

impl<T> Engine for T where T: Evaluator + ObjectManipulator + HeapReporter + CallbackMaker {}
