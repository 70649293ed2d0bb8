//! Logging setup
//!
//! The library only emits `tracing` events; installing a subscriber is up to
//! the embedding application. These helpers install a plain, compact one for
//! hosts (and tests) that don't bring their own.
//!
//! ```ignore
//! tether_core::logging::init_with_level(tether_core::logging::LogLevel::Debug);
//! tracing::debug!("worker traffic is now visible");
//! ```

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer, Registry};

/// Log level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    /// Per-job and per-reference traffic
    Trace,
    /// Lifecycle events (worker, context, cancellation)
    Debug,
    /// Default
    #[default]
    Info,
    /// Slow tasks and degraded teardown
    Warn,
    /// Panics caught on the worker
    Error,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

/// Initialize logging at INFO level
pub fn init() {
    init_with_level(LogLevel::Info);
}

/// Initialize logging with a custom level
///
/// Returns false if a global subscriber was already installed, in which case
/// nothing changes.
pub fn init_with_level(level: LogLevel) -> bool {
    let filter = tracing_subscriber::filter::LevelFilter::from_level(level.into());

    let layer = tracing_subscriber::fmt::layer()
        .without_time()
        .with_target(false)
        .with_thread_names(true)
        .with_level(true)
        .with_ansi(false)
        .compact()
        .with_filter(filter);

    Registry::default().with(layer).try_init().is_ok()
}
