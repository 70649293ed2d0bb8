//! Value: tagged, reference-counted result unit
//!
//! Every result an engine produces for the caller is a [`Value`]. Values are
//! shared through [`ValuePtr`] (`Arc<Value>`): the registry holds one share,
//! every in-flight closure or converter that captured the value holds another,
//! and the value is destroyed when the last share is dropped.
//!
//! Reference kinds (arrays, objects, functions, ...) additionally carry an
//! engine-side reference id. Dropping the last share hands that id to the
//! [`RefCollector`] installed by the factory, which routes the release onto
//! the engine's worker thread.
//!
//! # Kind codes
//!
//! ```text
//! 1   null          8   date           102 array_buffer   200 execute_error
//! 2   bool          9   symbol         103 promise        201 parse_error
//! 3   integer       10  object                            202 oom_error
//! 4   double        11  undefined                         204 terminated
//! 5   string        100 function                          205 value_error
//! 6   array                                               206 key_error
//! ```

use crate::error::{SdkError, SdkResult};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Shared pointer to a [`Value`]
pub type ValuePtr = Arc<Value>;

/// Kind tag of a [`Value`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ValueKind {
    /// `null`
    Null = 1,
    /// Boolean scalar
    Bool = 2,
    /// 64-bit integer scalar
    Integer = 3,
    /// IEEE 754 double scalar
    Double = 4,
    /// UTF-8 string
    String = 5,
    /// Reference to an engine array
    Array = 6,
    /// Date, stored as epoch milliseconds
    Date = 8,
    /// Reference to an engine symbol
    Symbol = 9,
    /// Reference to a plain engine object
    Object = 10,
    /// `undefined`
    Undefined = 11,
    /// Reference to an engine function
    Function = 100,
    /// Reference to an engine array buffer
    ArrayBuffer = 102,
    /// Reference to an engine promise
    Promise = 103,
    /// Structured error raised while executing code
    ExecuteError = 200,
    /// Code failed to parse
    ParseError = 201,
    /// Engine ran out of memory
    OomError = 202,
    /// Execution was terminated (task canceled)
    Terminated = 204,
    /// A handle passed by the caller did not name a live value
    ValueError = 205,
    /// Property key was not found
    KeyError = 206,
}

impl ValueKind {
    /// Numeric code used by flat boundary encodings
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Decode a numeric kind code
    pub fn from_u8(code: u8) -> Option<Self> {
        let kind = match code {
            1 => ValueKind::Null,
            2 => ValueKind::Bool,
            3 => ValueKind::Integer,
            4 => ValueKind::Double,
            5 => ValueKind::String,
            6 => ValueKind::Array,
            8 => ValueKind::Date,
            9 => ValueKind::Symbol,
            10 => ValueKind::Object,
            11 => ValueKind::Undefined,
            100 => ValueKind::Function,
            102 => ValueKind::ArrayBuffer,
            103 => ValueKind::Promise,
            200 => ValueKind::ExecuteError,
            201 => ValueKind::ParseError,
            202 => ValueKind::OomError,
            204 => ValueKind::Terminated,
            205 => ValueKind::ValueError,
            206 => ValueKind::KeyError,
            _ => return None,
        };
        Some(kind)
    }

    /// Whether this kind describes a failure
    pub const fn is_error(self) -> bool {
        matches!(
            self,
            ValueKind::ExecuteError
                | ValueKind::ParseError
                | ValueKind::OomError
                | ValueKind::Terminated
                | ValueKind::ValueError
                | ValueKind::KeyError
        )
    }

    /// Whether values of this kind point into the engine heap
    pub const fn is_reference(self) -> bool {
        matches!(
            self,
            ValueKind::Array
                | ValueKind::Symbol
                | ValueKind::Object
                | ValueKind::Function
                | ValueKind::ArrayBuffer
                | ValueKind::Promise
        )
    }

    /// Kind name for diagnostics
    pub const fn name(self) -> &'static str {
        match self {
            ValueKind::Null => "null",
            ValueKind::Bool => "bool",
            ValueKind::Integer => "integer",
            ValueKind::Double => "double",
            ValueKind::String => "string",
            ValueKind::Array => "array",
            ValueKind::Date => "date",
            ValueKind::Symbol => "symbol",
            ValueKind::Object => "object",
            ValueKind::Undefined => "undefined",
            ValueKind::Function => "function",
            ValueKind::ArrayBuffer => "array_buffer",
            ValueKind::Promise => "promise",
            ValueKind::ExecuteError => "execute_error",
            ValueKind::ParseError => "parse_error",
            ValueKind::OomError => "oom_error",
            ValueKind::Terminated => "terminated",
            ValueKind::ValueError => "value_error",
            ValueKind::KeyError => "key_error",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Kind-specific payload of a [`Value`]
#[derive(Debug, Clone, PartialEq)]
pub enum ValueData {
    /// No payload (null, undefined, bare references)
    Empty,
    /// Boolean payload
    Bool(bool),
    /// Integer payload
    Integer(i64),
    /// Double payload; dates use epoch milliseconds
    Double(f64),
    /// String contents, or error message text
    Text(String),
    /// Element/byte length of an array or buffer reference
    Length(usize),
}

/// Release hook for engine-side references
///
/// Implemented by the core runtime. `collect` is called from whichever thread
/// drops the last share of a reference value and must not touch engine state
/// directly.
pub trait RefCollector: Send + Sync {
    /// Schedule release of the engine-side reference `engine_ref`
    fn collect(&self, engine_ref: u64);
}

/// Tagged result unit
///
/// Construct values through [`crate::ValueFactory`] so the live count stays
/// accurate.
pub struct Value {
    kind: ValueKind,
    data: ValueData,
    engine_ref: Option<u64>,
    collector: Option<Arc<dyn RefCollector>>,
    live: Arc<AtomicUsize>,
}

impl Value {
    pub(crate) fn new(
        kind: ValueKind,
        data: ValueData,
        engine_ref: Option<u64>,
        collector: Option<Arc<dyn RefCollector>>,
        live: Arc<AtomicUsize>,
    ) -> Self {
        live.fetch_add(1, Ordering::Relaxed);
        Self {
            kind,
            data,
            engine_ref,
            collector,
            live,
        }
    }

    /// Kind tag
    pub fn kind(&self) -> ValueKind {
        self.kind
    }

    /// Payload
    pub fn data(&self) -> &ValueData {
        &self.data
    }

    /// Engine-side reference id, for reference kinds
    pub fn engine_ref(&self) -> Option<u64> {
        self.engine_ref
    }

    /// Whether this value describes a failure
    pub fn is_error(&self) -> bool {
        self.kind.is_error()
    }

    /// Text payload (string contents or error message)
    pub fn as_str(&self) -> Option<&str> {
        match &self.data {
            ValueData::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Integer payload
    pub fn as_i64(&self) -> Option<i64> {
        match self.data {
            ValueData::Integer(i) => Some(i),
            _ => None,
        }
    }

    /// Double payload (also dates)
    pub fn as_f64(&self) -> Option<f64> {
        match self.data {
            ValueData::Double(d) => Some(d),
            _ => None,
        }
    }

    /// Boolean payload
    pub fn as_bool(&self) -> Option<bool> {
        match self.data {
            ValueData::Bool(b) => Some(b),
            _ => None,
        }
    }

    /// Length payload of an array or buffer reference
    pub fn length(&self) -> Option<usize> {
        match self.data {
            ValueData::Length(n) => Some(n),
            _ => None,
        }
    }

    /// Read a string value, failing on any other kind
    pub fn to_text(&self) -> SdkResult<&str> {
        match (self.kind, &self.data) {
            (ValueKind::String, ValueData::Text(s)) => Ok(s),
            _ => Err(self.mismatch("string")),
        }
    }

    /// Read an integer value, failing on any other kind
    pub fn to_i64(&self) -> SdkResult<i64> {
        match (self.kind, &self.data) {
            (ValueKind::Integer, ValueData::Integer(i)) => Ok(*i),
            _ => Err(self.mismatch("integer")),
        }
    }

    /// Read a numeric value as a double (integers widen)
    pub fn to_f64(&self) -> SdkResult<f64> {
        match (self.kind, &self.data) {
            (ValueKind::Double, ValueData::Double(d)) => Ok(*d),
            (ValueKind::Integer, ValueData::Integer(i)) => Ok(*i as f64),
            _ => Err(self.mismatch("double")),
        }
    }

    /// Read a boolean value, failing on any other kind
    pub fn to_bool(&self) -> SdkResult<bool> {
        match (self.kind, &self.data) {
            (ValueKind::Bool, ValueData::Bool(b)) => Ok(*b),
            _ => Err(self.mismatch("bool")),
        }
    }

    fn mismatch(&self, expected: &str) -> SdkError {
        SdkError::TypeMismatch {
            expected: expected.to_string(),
            got: self.kind.name().to_string(),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.data == other.data && self.engine_ref == other.engine_ref
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Value");
        s.field("kind", &self.kind).field("data", &self.data);
        if let Some(r) = self.engine_ref {
            s.field("engine_ref", &r);
        }
        s.finish()
    }
}

impl Drop for Value {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::Relaxed);
        if let (Some(engine_ref), Some(collector)) = (self.engine_ref, self.collector.as_ref()) {
            collector.collect(engine_ref);
        }
    }
}
