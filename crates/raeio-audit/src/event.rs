// event.rs — Audit event data model.
//
// An AuditEvent is an immutable, timestamped record of one security
// decision or task outcome. Events are append-only: once handed to a sink
// they are never edited or deleted by the policy core. Retention and
// rotation belong to whoever owns the log file.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What kind of decision or outcome an event records.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// Free-form entry written through `audit_log`.
    Note,
    /// An action was refused by the whitelist.
    ActionDenied,
    /// A memory or CPU limit was exceeded.
    ResourceViolation,
    /// The emergency stop was tripped.
    EmergencyStop,
    /// A task ran and its (scrubbed) output was returned.
    TaskSucceeded,
    /// A task ran and failed, or was halted after running.
    TaskFailed,
    /// A task was refused before running because the engine is stopped.
    TaskRejected,
}

impl AuditAction {
    /// True for events recording a refused or halted operation.
    pub fn is_violation(self) -> bool {
        matches!(
            self,
            AuditAction::ActionDenied
                | AuditAction::ResourceViolation
                | AuditAction::EmergencyStop
                | AuditAction::TaskRejected
        )
    }

    /// True for the two events that close out a task that actually ran.
    pub fn is_task_outcome(self) -> bool {
        matches!(self, AuditAction::TaskSucceeded | AuditAction::TaskFailed)
    }
}

/// A single audit event — one line in the JSONL audit log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Unique identifier for this event.
    pub event_id: Uuid,

    /// When this event occurred (UTC).
    pub timestamp: DateTime<Utc>,

    /// What kind of event this is.
    pub action: AuditAction,

    /// Human-readable description of the decision or outcome.
    pub message: String,

    /// The task action name this event concerns (e.g. "read"), if any.
    pub subject: Option<String>,

    /// SHA-256 of the task input, for outcome events.
    pub input_hash: Option<String>,

    /// SHA-256 of the scrubbed task output, for successful outcomes.
    pub output_hash: Option<String>,

    /// Hash of the previous line in a file-backed log. Set by `AuditLog`.
    pub previous_hash: Option<String>,

    /// Structured details (task outcome, measured values, error kind).
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl AuditEvent {
    /// Create a new event with the current timestamp and a random UUID.
    pub fn new(action: AuditAction, message: impl Into<String>) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            action,
            message: message.into(),
            subject: None,
            input_hash: None,
            output_hash: None,
            previous_hash: None,
            metadata: serde_json::Value::Null,
        }
    }

    /// Set the action name this event concerns.
    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn with_input_hash(mut self, hash: impl Into<String>) -> Self {
        self.input_hash = Some(hash.into());
        self
    }

    pub fn with_output_hash(mut self, hash: impl Into<String>) -> Self {
        self.output_hash = Some(hash.into());
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}
