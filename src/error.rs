//! Error types for StrataKV
//!
//! Provides a unified error type for all operations, plus the slot in which
//! background workers park failures nobody is waiting on.

use parking_lot::Mutex;
use thiserror::Error;

/// Result type alias using StrataError
pub type Result<T> = std::result::Result<T, StrataError>;

/// Unified error type for StrataKV operations
#[derive(Debug, Error)]
pub enum StrataError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage fault: {0}")]
    StorageFault(String),

    // -------------------------------------------------------------------------
    // Persisted Data Errors
    // -------------------------------------------------------------------------
    #[error("Corruption detected: {0}")]
    Corruption(String),

    // -------------------------------------------------------------------------
    // Programmer Errors
    // -------------------------------------------------------------------------
    #[error("Invariant violated: {0}")]
    InvariantViolation(String),

    // -------------------------------------------------------------------------
    // Lifecycle Errors
    // -------------------------------------------------------------------------
    #[error("Background worker failed: {0}")]
    Background(String),

    #[error("Engine is closed")]
    Closed,

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

/// First failure reported by a background worker.
///
/// Later failures are logged but do not overwrite the first one, which is
/// usually the root cause.
#[derive(Debug, Default)]
pub(crate) struct ErrorSlot {
    first: Mutex<Option<String>>,
}

impl ErrorSlot {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Record a failure from `source`
    pub(crate) fn record(&self, source: &str, err: &StrataError) {
        tracing::error!(source, error = %err, "background failure");
        let mut first = self.first.lock();
        if first.is_none() {
            *first = Some(format!("{}: {}", source, err));
        }
    }

    pub(crate) fn get(&self) -> Option<String> {
        self.first.lock().clone()
    }
}
