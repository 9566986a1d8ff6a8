//! Error types for a3s-firewall

use thiserror::Error;

/// Errors that can occur in the firewall pipeline
#[derive(Debug, Error)]
pub enum FirewallError {
    /// The ML entity-extraction capability could not be reached
    #[error("Entity extraction unavailable: {0}")]
    ExtractionUnavailable(String),

    /// The ML entity-extraction capability did not answer in time
    #[error("Entity extraction timed out after {0}ms")]
    ExtractionTimeout(u64),

    /// Malformed or out-of-bounds span from a detector
    #[error("Invalid span [{start}, {end}) for text of length {len}: {reason}")]
    InvalidSpan {
        start: usize,
        end: usize,
        len: usize,
        reason: String,
    },

    /// Log delivery failure (network or endpoint error)
    #[error("Log sync failed: {0}")]
    SyncFailure(String),

    /// A buffered log entry exhausted its delivery attempts
    #[error("Log entry '{log_id}' dropped after {retries} failed deliveries")]
    RetryCeilingExceeded {
        log_id: String,
        retries: u32,
    },

    /// Durable storage failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization/deserialization failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// A regex pattern failed to compile
    #[error("Invalid pattern '{name}': {reason}")]
    InvalidPattern {
        name: String,
        reason: String,
    },
}

/// Result type alias for firewall operations
pub type Result<T> = std::result::Result<T, FirewallError>;
