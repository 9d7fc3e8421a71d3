//! # raeio-policy
//!
//! Policy enforcement core for the RAEIO agent shell.
//!
//! Every task the agent runs passes through a [`TaskExecutor`], which asks
//! the [`PolicyEngine`] whether the action is whitelisted and whether
//! resource usage is within limits, runs the task, scrubs PII from its
//! output, and records exactly one audit event for the invocation.
//!
//! ## Key invariants
//!
//! - **Checks precede execution**: a task body never runs when the stop
//!   flag is set, its action is not whitelisted, or a limit is exceeded.
//! - **Empty whitelist means no restriction**.
//! - **Strict limits**: usage equal to a limit passes.
//! - **Fail-open monitoring**: if usage cannot be sampled, limits are
//!   skipped with a single warning.
//! - **Terminal stop**: once [`PolicyEngine::emergency_stop`] runs, every
//!   later `execute` returns [`PolicyError::EmergencyStop`]. Whitelist and
//!   resource violations never trip the stop.
//!
//! ```rust
//! use std::sync::Arc;
//! use raeio_audit::MemorySink;
//! use raeio_policy::{PolicyConfig, PolicyEngine, TaskError, TaskExecutor};
//! use serde_json::json;
//!
//! let config = PolicyConfig::default().with_whitelist(["read"]).with_redaction(true);
//! let engine = Arc::new(PolicyEngine::new(config, Arc::new(MemorySink::new())));
//! let executor = TaskExecutor::new(engine);
//!
//! let out = executor
//!     .execute("read", json!("email me at a@b.com"), |d| Ok::<_, TaskError>(d))
//!     .unwrap();
//! assert_eq!(out, json!("email me at [REDACTED]"));
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod executor;
pub mod monitor;
pub mod scrub;
pub mod timeout;

pub use config::{PolicyConfig, PrivacySettings, ResourceLimits, SecuritySettings};
pub use engine::{PolicyEngine, StopFlag};
pub use error::{ConfigError, ErrorKind, MonitorError, PolicyError, TaskError};
pub use executor::{TaskExecutor, TaskOutcome};
pub use monitor::{ResourceMonitor, ResourceUsageSnapshot, StaticMonitor, SystemMonitor};
pub use scrub::{PiiScrubber, REDACTION_MARKER};
pub use timeout::{TaskTimedOut, TimeoutSupervisor};
