//! Registry of values exposed to callers by handle

use dashmap::DashMap;
use tether_sdk::{ValueHandle, ValuePtr};

/// Thread-safe map from [`ValueHandle`] to the value it names
///
/// The registry keeps every value a caller can still name alive. Lookups hand
/// out a new shared reference, so a value captured by an in-flight operation
/// survives a concurrent [`ValueRegistry::forget`].
pub struct ValueRegistry {
    /// Map of handle to value
    values: DashMap<ValueHandle, ValuePtr>,
}

impl ValueRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            values: DashMap::new(),
        }
    }

    /// Register a value and return a fresh handle for it
    pub fn remember(&self, value: ValuePtr) -> ValueHandle {
        let handle = ValueHandle::next();
        self.values.insert(handle, value);
        handle
    }

    /// Look up the value named by `handle`
    pub fn from_handle(&self, handle: ValueHandle) -> Option<ValuePtr> {
        self.values.get(&handle).map(|entry| entry.value().clone())
    }

    /// Drop the registry's reference; returns whether the handle was known
    pub fn forget(&self, handle: ValueHandle) -> bool {
        // Bind first so the value drops after the shard lock is released
        let removed = self.values.remove(&handle);
        removed.is_some()
    }

    /// Get the number of registered values
    pub fn count(&self) -> usize {
        self.values.len()
    }

    /// Forget everything (for teardown)
    pub fn clear(&self) {
        let handles: Vec<ValueHandle> = self.values.iter().map(|entry| *entry.key()).collect();
        for handle in handles {
            self.forget(handle);
        }
    }
}

impl Default for ValueRegistry {
    fn default() -> Self {
        Self::new()
    }
}
