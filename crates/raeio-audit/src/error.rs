// error.rs — Error types for the audit subsystem.
//
// These only surface from the file-level API (`AuditLog`). Sinks swallow
// them after reporting through tracing, because audit logging must never
// abort the caller.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during audit log operations.
#[derive(Debug, Error)]
pub enum AuditError {
    /// Failed to open or create the audit log file.
    #[error("failed to open audit log at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to write an event to the log.
    #[error("failed to append event: {0}")]
    WriteFailed(#[from] std::io::Error),

    /// Failed to serialize or deserialize an event (malformed JSON).
    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// The hash chain is broken: an event does not link to its predecessor.
    #[error("integrity check failed at line {line}: expected hash {expected}, got {actual}")]
    IntegrityViolation {
        line: usize,
        expected: String,
        actual: String,
    },
}
