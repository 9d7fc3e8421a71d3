// sink.rs — Audit sinks.
//
// The policy core only needs one thing from its audit collaborator:
// `log(event)`, which must not fail. Sinks that can hit I/O errors report
// them through tracing and drop the event rather than propagating.
//
// Sinks are shared across worker threads, so every implementation is
// `Send + Sync` and serializes its own appends.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::AuditError;
use crate::event::{AuditAction, AuditEvent};
use crate::log::AuditLog;

/// Destination for audit events. Implementations must never panic or fail.
pub trait AuditSink: Send + Sync {
    /// Append one event.
    fn log(&self, event: AuditEvent);
}

// A poisoned lock only means another writer panicked mid-append; the
// underlying data is still usable for an append-only log.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Keeps events in memory, in arrival order.
#[derive(Default)]
pub struct MemorySink {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all events logged so far.
    pub fn events(&self) -> Vec<AuditEvent> {
        lock(&self.events).clone()
    }

    pub fn len(&self) -> usize {
        lock(&self.events).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.events).is_empty()
    }

    /// Events of one kind, in arrival order.
    pub fn of_action(&self, action: AuditAction) -> Vec<AuditEvent> {
        lock(&self.events)
            .iter()
            .filter(|e| e.action == action)
            .cloned()
            .collect()
    }
}

impl AuditSink for MemorySink {
    fn log(&self, event: AuditEvent) {
        lock(&self.events).push(event);
    }
}

/// Appends events to a hash-chained JSONL file.
///
/// A single mutex guards the log so concurrent writers never interleave
/// partial lines or race on the chain's last hash.
pub struct JsonlSink {
    log: Mutex<AuditLog>,
}

impl JsonlSink {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, AuditError> {
        Ok(Self {
            log: Mutex::new(AuditLog::open(path)?),
        })
    }
}

impl AuditSink for JsonlSink {
    fn log(&self, mut event: AuditEvent) {
        let mut log = lock(&self.log);
        if let Err(e) = log.append(&mut event) {
            tracing::error!(
                path = %log.path().display(),
                event_id = %event.event_id,
                "failed to append audit event: {}",
                e
            );
        }
    }
}

/// Emits each event as a tracing record under the `raeio::audit` target.
///
/// Violations are logged at warn (emergency stop at error), everything
/// else at info.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl AuditSink for TracingSink {
    fn log(&self, event: AuditEvent) {
        let subject = event.subject.as_deref().unwrap_or("-");
        match event.action {
            AuditAction::EmergencyStop => tracing::error!(
                target: "raeio::audit",
                action = ?event.action,
                subject,
                "Audit: {}",
                event.message
            ),
            action if action.is_violation() => tracing::warn!(
                target: "raeio::audit",
                action = ?event.action,
                subject,
                "Audit: {}",
                event.message
            ),
            _ => tracing::info!(
                target: "raeio::audit",
                action = ?event.action,
                subject,
                "Audit: {}",
                event.message
            ),
        }
    }
}

/// Delivers every event to each of several sinks, in order.
#[derive(Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn AuditSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a sink (builder style).
    pub fn with_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl AuditSink for FanoutSink {
    fn log(&self, event: AuditEvent) {
        if let Some((last, rest)) = self.sinks.split_last() {
            for sink in rest {
                sink.log(event.clone());
            }
            last.log(event);
        }
    }
}
