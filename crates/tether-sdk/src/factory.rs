//! Value construction with live-instance accounting

use crate::value::{RefCollector, Value, ValueData, ValueKind, ValuePtr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Builds [`Value`]s and tracks how many are alive
///
/// The factory is shared between the session (which synthesizes error values)
/// and the engine collaborators running on the worker thread. Construction
/// never touches the registry.
pub struct ValueFactory {
    /// Number of values created by this factory and not yet dropped
    live: Arc<AtomicUsize>,

    /// Release hook attached to reference values
    collector: Option<Arc<dyn RefCollector>>,
}

impl ValueFactory {
    /// Create a factory whose reference values are never collected
    pub fn new() -> Self {
        Self {
            live: Arc::new(AtomicUsize::new(0)),
            collector: None,
        }
    }

    /// Create a factory that hands dropped engine references to `collector`
    pub fn with_collector(collector: Arc<dyn RefCollector>) -> Self {
        Self {
            live: Arc::new(AtomicUsize::new(0)),
            collector: Some(collector),
        }
    }

    /// Build a value of `kind` carrying `data`
    pub fn new_value(&self, data: ValueData, kind: ValueKind) -> ValuePtr {
        Arc::new(Value::new(kind, data, None, None, self.live.clone()))
    }

    /// Build a value that points into the engine heap
    ///
    /// When the last share is dropped, `engine_ref` is handed to the
    /// factory's collector.
    pub fn new_ref(&self, kind: ValueKind, data: ValueData, engine_ref: u64) -> ValuePtr {
        Arc::new(Value::new(
            kind,
            data,
            Some(engine_ref),
            self.collector.clone(),
            self.live.clone(),
        ))
    }

    /// String value
    pub fn string(&self, s: impl Into<String>) -> ValuePtr {
        self.new_value(ValueData::Text(s.into()), ValueKind::String)
    }

    /// Integer value
    pub fn integer(&self, i: i64) -> ValuePtr {
        self.new_value(ValueData::Integer(i), ValueKind::Integer)
    }

    /// Double value
    pub fn double(&self, d: f64) -> ValuePtr {
        self.new_value(ValueData::Double(d), ValueKind::Double)
    }

    /// Boolean value
    pub fn boolean(&self, b: bool) -> ValuePtr {
        self.new_value(ValueData::Bool(b), ValueKind::Bool)
    }

    /// `null`
    pub fn null(&self) -> ValuePtr {
        self.new_value(ValueData::Empty, ValueKind::Null)
    }

    /// `undefined`
    pub fn undefined(&self) -> ValuePtr {
        self.new_value(ValueData::Empty, ValueKind::Undefined)
    }

    /// Date from epoch milliseconds
    pub fn date(&self, epoch_ms: f64) -> ValuePtr {
        self.new_value(ValueData::Double(epoch_ms), ValueKind::Date)
    }

    /// Error value of an error `kind` with a message
    pub fn error(&self, message: impl Into<String>, kind: ValueKind) -> ValuePtr {
        debug_assert!(kind.is_error(), "{} is not an error kind", kind);
        self.new_value(ValueData::Text(message.into()), kind)
    }

    /// Number of values built by this factory that are still alive
    pub fn live_count(&self) -> usize {
        self.live.load(Ordering::Relaxed)
    }
}

impl Default for ValueFactory {
    fn default() -> Self {
        Self::new()
    }
}
