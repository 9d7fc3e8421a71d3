// error.rs — Error types for the policy subsystem.
//
// `PolicyError` is what `TaskExecutor::execute` hands back to callers. The
// whitelist and resource variants are per-call and recoverable; the
// emergency stop is terminal for the rest of the process; task failures
// wrap whatever the task itself returned.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Opaque error returned by a task body.
pub type TaskError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors raised by policy checks and by supervised task execution.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// The action is not on a non-empty whitelist.
    #[error("action '{action}' is not allowed by policy")]
    ActionNotAllowed { action: String },

    /// Sampled memory usage is above the configured limit.
    #[error("memory usage exceeded: {used_mb}MB > {limit_mb}MB")]
    MemoryLimitExceeded { used_mb: f64, limit_mb: f64 },

    /// Sampled CPU usage is above the configured limit.
    #[error("CPU usage exceeded: {used_percent}% > {limit_percent}%")]
    CpuLimitExceeded { used_percent: f64, limit_percent: f64 },

    /// The emergency stop has been tripped; no further tasks may run.
    #[error("emergency stop activated")]
    EmergencyStop,

    /// The task body failed. The task's own error is the source.
    #[error("task '{action}' failed: {source}")]
    TaskFailed {
        action: String,
        #[source]
        source: TaskError,
    },
}

/// Serializable tag for a [`PolicyError`], recorded in task outcomes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ActionNotAllowed,
    MemoryLimitExceeded,
    CpuLimitExceeded,
    EmergencyStop,
    TaskFailure,
}

impl PolicyError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PolicyError::ActionNotAllowed { .. } => ErrorKind::ActionNotAllowed,
            PolicyError::MemoryLimitExceeded { .. } => ErrorKind::MemoryLimitExceeded,
            PolicyError::CpuLimitExceeded { .. } => ErrorKind::CpuLimitExceeded,
            PolicyError::EmergencyStop => ErrorKind::EmergencyStop,
            PolicyError::TaskFailed { .. } => ErrorKind::TaskFailure,
        }
    }

    /// Whitelist and resource violations: the caller may retry later or
    /// with a different action.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            PolicyError::ActionNotAllowed { .. }
                | PolicyError::MemoryLimitExceeded { .. }
                | PolicyError::CpuLimitExceeded { .. }
        )
    }

    /// The caller must stop issuing tasks for the rest of the process.
    pub fn is_terminal(&self) -> bool {
        matches!(self, PolicyError::EmergencyStop)
    }

    /// True when a task failed because it ran past its supervisor's deadline.
    pub fn is_timeout(&self) -> bool {
        match self {
            PolicyError::TaskFailed { source, .. } => {
                source.downcast_ref::<crate::timeout::TaskTimedOut>().is_some()
            }
            _ => false,
        }
    }
}

/// Errors from loading or validating a policy configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read policy config at {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid YAML policy config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid JSON policy config: {0}")]
    Json(#[from] serde_json::Error),

    /// The document parsed but violates a constraint.
    #[error("invalid policy config: {0}")]
    Invalid(String),
}

/// Errors from sampling resource usage.
#[derive(Debug, Error)]
pub enum MonitorError {
    /// The platform facility used for sampling does not exist here.
    #[error("resource monitoring unavailable: {0}")]
    Unavailable(String),

    /// The facility exists but returned something unparseable.
    #[error("failed to sample {resource}: {reason}")]
    Sample { resource: &'static str, reason: String },
}
