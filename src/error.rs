//! Error types for camwire.

use std::time::Duration;

use thiserror::Error;

/// Main error type for all camwire operations.
#[derive(Debug, Error)]
pub enum CamwireError {
    /// I/O error during socket or pipe operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error (control plane only).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Port outside the allowed `1024..=65535` range.
    #[error("Invalid port {0}: must be between 1024 and 65535")]
    InvalidPort(u16),

    /// TCP connect did not complete in time.
    #[error("Connect timed out after {0:?}")]
    ConnectTimeout(Duration),

    /// Envelope did not start with the expected magic value.
    #[error("Protocol mismatch: bad magic 0x{0:04X}")]
    BadMagic(u16),

    /// Declared envelope length is larger than the configured limit.
    #[error("Payload size {length} exceeds maximum {max}")]
    PayloadTooLarge {
        /// Length announced by the envelope header.
        length: u32,
        /// Configured limit.
        max: u32,
    },

    /// Other protocol error.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The encoder subprocess could not be started.
    #[error("Failed to spawn subprocess: {0}")]
    Spawn(#[source] std::io::Error),

    /// Operation needs a running subprocess but none is attached.
    #[error("Subprocess not running")]
    NotRunning,
}

impl CamwireError {
    /// Whether this error means the peer spoke something other than our protocol.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            CamwireError::BadMagic(_)
                | CamwireError::PayloadTooLarge { .. }
                | CamwireError::Protocol(_)
        )
    }
}

/// Result type alias using CamwireError.
pub type Result<T> = std::result::Result<T, CamwireError>;
