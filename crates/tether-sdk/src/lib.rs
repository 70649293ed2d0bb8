//! Tether SDK - value model and engine collaborator traits
//!
//! This crate holds everything an engine integration compiles against without
//! depending on the core runtime: the tagged [`Value`] model, the
//! [`ValueFactory`] that builds values, the opaque [`ValueHandle`] token, the
//! cooperative [`Interrupt`] and the collaborator traits bundled by
//! [`Engine`].
//!
//! # Example
//!
//! ```ignore
//! use tether_sdk::{EngineCore, Evaluator, Interrupt, Value, ValueFactory, ValueKind, ValuePtr};
//!
//! struct Echo;
//!
//! impl EngineCore for Echo {
//!     type Context = ();
//!     fn create_context(&mut self, _factory: &ValueFactory) {}
//!     fn release_context(&mut self, _context: ()) {}
//!     fn release_ref(&mut self, _engine_ref: u64) {}
//! }
//!
//! impl Evaluator for Echo {
//!     fn eval(&mut self, _: &(), code: &Value, f: &ValueFactory, i: &Interrupt) -> ValuePtr {
//!         if i.check() {
//!             return f.error("execution terminated", ValueKind::Terminated);
//!         }
//!         f.string(code.as_str().unwrap_or_default())
//!     }
//! }
//! ```

#![warn(missing_docs)]

pub mod engine;
pub mod error;
pub mod factory;
pub mod handle;
pub mod interrupt;
pub mod value;

pub use engine::{
    CallbackMaker, CallbackSink, Engine, EngineCore, Evaluator, HeapReporter, ObjectManipulator,
};
pub use error::{SdkError, SdkResult};
pub use factory::ValueFactory;
pub use handle::ValueHandle;
pub use interrupt::Interrupt;
pub use value::{RefCollector, Value, ValueData, ValueKind, ValuePtr};
