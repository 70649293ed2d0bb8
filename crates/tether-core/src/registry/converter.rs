//! Eager handle-to-value conversion with error fallback

use crate::registry::ValueRegistry;
use tether_sdk::{ValueFactory, ValueHandle, ValueKind, ValuePtr};

/// Result of resolving one caller-supplied handle
///
/// Resolution happens at construction, on the calling thread, so the
/// converter owns the value for as long as the operation needs it. An
/// unknown handle yields a `ValueError` carrying the supplied message, e.g.
/// `"Bad handle: obj"`.
pub struct HandleConverter<'r> {
    registry: &'r ValueRegistry,
    resolved: Result<ValuePtr, ValuePtr>,
}

impl<'r> HandleConverter<'r> {
    /// Resolve `handle`, preparing `err_msg` as the failure value
    pub fn new(
        factory: &ValueFactory,
        registry: &'r ValueRegistry,
        handle: ValueHandle,
        err_msg: &str,
    ) -> Self {
        let resolved = match registry.from_handle(handle) {
            Some(value) => Ok(value),
            None => {
                tracing::debug!(%handle, "{}", err_msg);
                Err(factory.error(err_msg, ValueKind::ValueError))
            }
        };
        Self { registry, resolved }
    }

    /// Whether the handle named a live value
    pub fn is_valid(&self) -> bool {
        self.resolved.is_ok()
    }

    /// The resolved value, if valid
    pub fn value(&self) -> Option<&ValuePtr> {
        self.resolved.as_ref().ok()
    }

    /// The prepared error value, if invalid
    pub fn error_value(&self) -> Option<&ValuePtr> {
        self.resolved.as_ref().err()
    }

    /// Register the error value and return its handle
    pub fn error_handle(&self) -> Option<ValueHandle> {
        self.error_value().map(|err| self.registry.remember(err.clone()))
    }

    /// Split into the value or its error
    pub fn into_result(self) -> Result<ValuePtr, ValuePtr> {
        self.resolved
    }
}
