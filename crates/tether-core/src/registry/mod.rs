//! Caller-facing value registry and handle conversion

#[allow(clippy::module_inception)]
mod registry;
mod converter;

pub use converter::HandleConverter;
pub use registry::ValueRegistry;
