//! # raeio-audit
//!
//! Append-only audit trail for the RAEIO policy core.
//!
//! Every security-relevant decision (denied action, resource violation,
//! emergency stop) and every task outcome is recorded as an [`AuditEvent`].
//! Events are delivered through the [`AuditSink`] trait, whose contract is
//! that logging never fails. The file-backed sink writes a JSONL log in
//! which each event carries the SHA-256 hash of the previous line, so
//! tampering can be detected with [`AuditLog::verify_chain`].
//!
//! ## Modules
//!
//! - [`event`]: the event record and the closed set of audited actions
//! - [`log`]: the hash-chained JSONL file
//! - [`sink`]: where the policy engine sends events (memory, file, tracing,
//!   or several at once)
//! - [`hasher`]: SHA-256 helpers for chain links and task input/output hashes
//! - [`summary`]: success rate and mean duration over recent task outcomes
//!
//! Task inputs and outputs appear in the log only as hashes, never as
//! payloads.
//!
//! ## Quick Example
//!
//! ```rust,no_run
//! use raeio_audit::{AuditAction, AuditEvent, AuditSink, JsonlSink};
//!
//! let sink = JsonlSink::open("/tmp/audit.jsonl").unwrap();
//! sink.log(AuditEvent::new(AuditAction::Note, "agent started").with_subject("boot"));
//! ```

// One module per concern; the public API is re-exported below.
pub mod error;
pub mod event;
pub mod hasher;
pub mod log;
pub mod sink;
pub mod summary;

// Re-export the main types so callers can write `raeio_audit::AuditLog`.
pub use error::AuditError;
pub use event::{AuditAction, AuditEvent};
pub use log::AuditLog;
pub use sink::{AuditSink, FanoutSink, JsonlSink, MemorySink, TracingSink};
pub use summary::OutcomeSummary;
