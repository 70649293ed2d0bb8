//! Opaque handle naming a registered value

use std::sync::atomic::{AtomicU64, Ordering};

/// Opaque identity of a registry entry
///
/// Handles are what cross the caller boundary instead of values. They are
/// drawn from a process-wide counter, so an identity is never handed out
/// twice, not even by different sessions.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct ValueHandle(u64);

static NEXT_VALUE_HANDLE: AtomicU64 = AtomicU64::new(1);

impl ValueHandle {
    /// Allocate a fresh, never-used handle
    pub fn next() -> Self {
        ValueHandle(NEXT_VALUE_HANDLE.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw token for the boundary encoding
    pub fn as_raw(self) -> u64 {
        self.0
    }

    /// Rebuild a handle from a raw boundary token
    ///
    /// The result is not validated; look it up in the registry that issued it.
    pub fn from_raw(raw: u64) -> Self {
        ValueHandle(raw)
    }
}

impl std::fmt::Display for ValueHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}
