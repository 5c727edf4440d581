//! Error types for the dispatch core.
//!
//! Delivery-level failures (refused connections, timeouts, unexpected status
//! codes) are not errors here; they are encoded in `ExecutionOutcome` and
//! drive the retry state machine. Only storage failures and executor
//! misconfiguration surface as `DispatchError`.

use hookpost_core::CoreError;
use thiserror::Error;

/// Result type alias for dispatch operations.
pub type Result<T> = std::result::Result<T, DispatchError>;

/// Errors surfaced by the dispatch transaction and worker.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Storage operation failed; the transaction was rolled back.
    #[error("storage error: {0}")]
    Storage(#[from] CoreError),

    /// The delivery executor could not be constructed.
    #[error("invalid executor configuration: {message}")]
    Configuration {
        /// Configuration error message.
        message: String,
    },
}

impl DispatchError {
    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration { message: message.into() }
    }
}
