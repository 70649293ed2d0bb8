//! Error types for the tether SDK

/// Result type for SDK conversions
pub type SdkResult<T> = Result<T, SdkError>;

/// SDK error types
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SdkError {
    /// Value kind or payload did not match the requested conversion
    #[error("Type mismatch: expected {expected}, got {got}")]
    TypeMismatch {
        /// Expected kind name
        expected: String,
        /// Actual kind name
        got: String,
    },
}
