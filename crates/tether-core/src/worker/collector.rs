//! Routes engine reference release back to the worker thread

use crate::context::EngineHost;
use crate::worker::WorkerPoster;
use tether_sdk::{EngineCore, RefCollector};

/// [`RefCollector`] that releases engine references on the worker
///
/// Values may be dropped on any thread, but only the worker may touch the
/// engine. Dropping the last reference to an engine-backed value therefore
/// posts a release job. Once the worker is gone the engine (and every
/// reference it held) is gone too, so the post is simply dropped.
pub struct WorkerRefCollector<E: EngineCore> {
    poster: WorkerPoster<EngineHost<E>>,
}

impl<E: EngineCore> WorkerRefCollector<E> {
    /// Create a collector posting to the given worker
    pub fn new(poster: WorkerPoster<EngineHost<E>>) -> Self {
        Self { poster }
    }
}

impl<E: EngineCore> RefCollector for WorkerRefCollector<E> {
    fn collect(&self, engine_ref: u64) {
        self.poster.post(move |host: &mut EngineHost<E>| {
            tracing::trace!(engine_ref, "releasing engine reference");
            host.engine_mut().release_ref(engine_ref);
        });
    }
}
