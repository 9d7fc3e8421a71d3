// engine.rs — The policy engine.
//
// Single authority for "is this allowed right now". It combines:
//
// 1. Whitelist checks (`check_action`)
// 2. Soft resource limits (`enforce_resource_limits`)
// 3. PII scrubbing of task output (`scrub`)
// 4. Audit logging (`audit_log`, `record`)
// 5. The emergency stop (`emergency_stop`), the only way to reach the
//    terminal Stopped state.
//
// Whitelist and resource violations are per-call: they are audited and
// returned, and the next call is evaluated afresh. The emergency stop is
// process-wide: once tripped, the flag stays set until the process exits.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use raeio_audit::{AuditAction, AuditEvent, AuditSink};
use serde_json::{json, Value};

use crate::config::PolicyConfig;
use crate::error::{MonitorError, PolicyError};
use crate::monitor::{ResourceMonitor, SystemMonitor};
use crate::scrub::PiiScrubber;

/// Shared emergency-stop flag.
///
/// Clones observe the same state. The flag only ever goes from false to
/// true; there is no way to clear it.
#[derive(Debug, Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Set the flag. Returns true if this call tripped it.
    fn trip(&self) -> bool {
        !self.0.swap(true, Ordering::SeqCst)
    }
}

/// Evaluates tasks against the run's [`PolicyConfig`].
///
/// `PolicyEngine` is `Send + Sync`; share it behind an `Arc` between the
/// task executor, background workers and the signal watcher.
pub struct PolicyEngine {
    config: PolicyConfig,
    monitor: Box<dyn ResourceMonitor>,
    scrubber: PiiScrubber,
    audit: Arc<dyn AuditSink>,
    stop: StopFlag,
    /// Set after the first "monitor unavailable" warning.
    monitor_warned: AtomicBool,
}

impl PolicyEngine {
    /// Create an engine that samples the host with [`SystemMonitor`].
    pub fn new(config: PolicyConfig, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            config,
            monitor: Box::new(SystemMonitor::new()),
            scrubber: PiiScrubber::new(),
            audit,
            stop: StopFlag::new(),
            monitor_warned: AtomicBool::new(false),
        }
    }

    /// Replace the resource monitor (builder style).
    pub fn with_monitor(mut self, monitor: impl ResourceMonitor + 'static) -> Self {
        self.monitor = Box::new(monitor);
        self
    }

    pub fn config(&self) -> &PolicyConfig {
        &self.config
    }

    /// Proxy that outbound traffic must use, if anonymity is enabled.
    pub fn proxy_url(&self) -> Option<&str> {
        self.config.proxy_url()
    }

    /// Reject `action` if a non-empty whitelist does not contain it.
    ///
    /// Denials are audited; allowed actions are not, to keep the log
    /// readable.
    pub fn check_action(&self, action: &str) -> Result<(), PolicyError> {
        let whitelist = &self.config.security.action_whitelist;
        if whitelist.is_empty() || whitelist.contains(action) {
            tracing::debug!(action, "action permitted");
            return Ok(());
        }

        tracing::warn!(action, "action '{}' not permitted", action);
        self.record(
            AuditEvent::new(
                AuditAction::ActionDenied,
                format!("action '{}' denied: not in whitelist", action),
            )
            .with_subject(action),
        );
        Err(PolicyError::ActionNotAllowed {
            action: action.to_string(),
        })
    }

    /// Compare live usage against the configured limits.
    ///
    /// Only configured resources are sampled (memory first, then CPU).
    /// Usage equal to a limit passes; strictly greater fails. A resource
    /// the monitor cannot sample is skipped (with a single warning per
    /// engine) while the others are still enforced.
    pub fn enforce_resource_limits(&self) -> Result<(), PolicyError> {
        let limits = &self.config.resource_limits;
        if limits.is_empty() {
            return Ok(());
        }

        if let Some(limit_mb) = limits.memory_mb {
            let used = self.sample(|m| m.memory_mb());
            if let Some(used_mb) = used.filter(|used_mb| *used_mb > limit_mb) {
                let err = PolicyError::MemoryLimitExceeded { used_mb, limit_mb };
                self.report_violation(&err, json!({ "used_mb": used_mb, "limit_mb": limit_mb }));
                return Err(err);
            }
        }

        if let Some(limit_percent) = limits.cpu_percent {
            let used = self.sample(|m| m.cpu_percent());
            if let Some(used_percent) = used.filter(|used_percent| *used_percent > limit_percent) {
                let err = PolicyError::CpuLimitExceeded {
                    used_percent,
                    limit_percent,
                };
                self.report_violation(
                    &err,
                    json!({ "used_percent": used_percent, "limit_percent": limit_percent }),
                );
                return Err(err);
            }
        }

        Ok(())
    }

    /// Redact PII from `data` if `redact_pii` is enabled; otherwise return
    /// it untouched.
    pub fn scrub(&self, data: Value) -> Value {
        if !self.config.privacy_settings.redact_pii {
            return data;
        }
        self.scrubber.scrub_value(data)
    }

    /// String form of [`scrub`](Self::scrub).
    pub fn scrub_str(&self, text: &str) -> String {
        if !self.config.privacy_settings.redact_pii {
            return text.to_string();
        }
        self.scrubber.scrub_str(text).into_owned()
    }

    /// Append a free-form note to the audit trail. Never fails.
    pub fn audit_log(&self, event: impl Into<String>) {
        self.record(AuditEvent::new(AuditAction::Note, event));
    }

    /// Append a prepared event to the audit trail. Never fails.
    pub fn record(&self, event: AuditEvent) {
        self.audit.log(event);
    }

    /// Trip the emergency stop.
    ///
    /// Sets the shared flag, logs and audits the halt, and returns
    /// [`PolicyError::EmergencyStop`] for the caller to propagate. This is
    /// also the body the host runs when SIGINT/SIGTERM arrives. Calling it
    /// again is harmless: the flag stays set and each call is audited.
    #[must_use = "propagate the returned EmergencyStop error"]
    pub fn emergency_stop(&self) -> PolicyError {
        let first = self.stop.trip();
        tracing::error!(first, "Emergency stop triggered! Halting all processes.");
        self.record(
            AuditEvent::new(AuditAction::EmergencyStop, "emergency stop activated")
                .with_metadata(json!({ "first_trip": first })),
        );
        PolicyError::EmergencyStop
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.is_set()
    }

    /// Handle to the stop flag, for code that only needs to observe it.
    pub fn stop_flag(&self) -> StopFlag {
        self.stop.clone()
    }

    // None means "could not sample, skip this resource".
    fn sample(
        &self,
        probe: impl FnOnce(&dyn ResourceMonitor) -> Result<f64, MonitorError>,
    ) -> Option<f64> {
        match probe(self.monitor.as_ref()) {
            Ok(value) => Some(value),
            Err(e) => {
                if !self.monitor_warned.swap(true, Ordering::SeqCst) {
                    tracing::warn!("resource limits not enforced: {}", e);
                }
                None
            }
        }
    }

    fn report_violation(&self, err: &PolicyError, measured: Value) {
        tracing::error!("{}", err);
        self.record(
            AuditEvent::new(AuditAction::ResourceViolation, err.to_string())
                .with_metadata(json!({ "kind": err.kind(), "measured": measured })),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::StaticMonitor;
    use raeio_audit::MemorySink;

    struct UnavailableMonitor;

    impl ResourceMonitor for UnavailableMonitor {
        fn memory_mb(&self) -> Result<f64, MonitorError> {
            Err(MonitorError::Unavailable("no procfs".into()))
        }
        fn cpu_percent(&self) -> Result<f64, MonitorError> {
            Err(MonitorError::Unavailable("no procfs".into()))
        }
    }

    /// Panics if sampled: proves a code path does no monitor I/O.
    struct PanickingMonitor;

    impl ResourceMonitor for PanickingMonitor {
        fn memory_mb(&self) -> Result<f64, MonitorError> {
            panic!("memory sampled")
        }
        fn cpu_percent(&self) -> Result<f64, MonitorError> {
            panic!("cpu sampled")
        }
    }

    fn engine(config: PolicyConfig) -> (PolicyEngine, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        (PolicyEngine::new(config, sink.clone()), sink)
    }

    #[test]
    fn whitelisted_action_passes_without_audit() {
        let (engine, sink) = engine(PolicyConfig::default().with_whitelist(["read", "generate"]));
        engine.check_action("read").unwrap();
        engine.check_action("generate").unwrap();
        assert!(sink.is_empty());
    }

    #[test]
    fn unlisted_action_is_denied_and_audited() {
        let (engine, sink) = engine(PolicyConfig::default().with_whitelist(["read"]));

        let err = engine.check_action("write").unwrap_err();
        assert!(matches!(err, PolicyError::ActionNotAllowed { ref action } if action == "write"));

        let denials = sink.of_action(AuditAction::ActionDenied);
        assert_eq!(denials.len(), 1);
        assert_eq!(denials[0].subject.as_deref(), Some("write"));
    }

    #[test]
    fn empty_whitelist_allows_everything() {
        let (engine, sink) = engine(PolicyConfig::default());
        for action in ["read", "write", "delete", "anything"] {
            engine.check_action(action).unwrap();
        }
        assert!(sink.is_empty());
    }

    #[test]
    fn usage_equal_to_limit_passes() {
        let (engine, _) = engine(PolicyConfig::default().with_memory_limit(100.0).with_cpu_limit(50.0));
        let engine = engine.with_monitor(StaticMonitor::new(100.0, 50.0));
        engine.enforce_resource_limits().unwrap();
    }

    #[test]
    fn memory_one_over_limit_fails() {
        let (engine, sink) = engine(PolicyConfig::default().with_memory_limit(100.0));
        let engine = engine.with_monitor(StaticMonitor::new(101.0, 0.0));

        match engine.enforce_resource_limits() {
            Err(PolicyError::MemoryLimitExceeded { used_mb, limit_mb }) => {
                assert_eq!(used_mb, 101.0);
                assert_eq!(limit_mb, 100.0);
            }
            other => panic!("expected MemoryLimitExceeded, got {:?}", other),
        }
        assert_eq!(sink.of_action(AuditAction::ResourceViolation).len(), 1);
    }

    #[test]
    fn cpu_over_limit_fails_with_cpu_kind() {
        let (engine, sink) = engine(PolicyConfig::default().with_memory_limit(1000.0).with_cpu_limit(90.0));
        let engine = engine.with_monitor(StaticMonitor::new(10.0, 95.5));

        let err = engine.enforce_resource_limits().unwrap_err();
        assert!(matches!(err, PolicyError::CpuLimitExceeded { .. }));
        assert!(err.to_string().contains("95.5% > 90%"));

        let events = sink.of_action(AuditAction::ResourceViolation);
        assert_eq!(events[0].metadata["kind"], "cpu_limit_exceeded");
    }

    #[test]
    fn memory_is_checked_before_cpu() {
        let (engine, _) = engine(PolicyConfig::default().with_memory_limit(1.0).with_cpu_limit(1.0));
        let engine = engine.with_monitor(StaticMonitor::new(50.0, 50.0));
        assert!(matches!(
            engine.enforce_resource_limits(),
            Err(PolicyError::MemoryLimitExceeded { .. })
        ));
    }

    #[test]
    fn no_limits_means_no_sampling() {
        let (engine, _) = engine(PolicyConfig::default());
        let engine = engine.with_monitor(PanickingMonitor);
        engine.enforce_resource_limits().unwrap();
    }

    #[test]
    fn only_configured_resources_are_sampled() {
        struct MemoryOnly;
        impl ResourceMonitor for MemoryOnly {
            fn memory_mb(&self) -> Result<f64, MonitorError> {
                Ok(10.0)
            }
            fn cpu_percent(&self) -> Result<f64, MonitorError> {
                panic!("cpu sampled")
            }
        }

        let (engine, _) = engine(PolicyConfig::default().with_memory_limit(100.0));
        engine.with_monitor(MemoryOnly).enforce_resource_limits().unwrap();
    }

    #[test]
    fn unavailable_monitor_fails_open_and_warns_once() {
        let (engine, sink) = engine(PolicyConfig::default().with_memory_limit(0.0));
        let engine = engine.with_monitor(UnavailableMonitor);

        engine.enforce_resource_limits().unwrap();
        engine.enforce_resource_limits().unwrap();
        assert!(engine.monitor_warned.load(Ordering::SeqCst));
        assert!(sink.is_empty());
    }

    #[test]
    fn unsampled_memory_still_enforces_cpu() {
        struct CpuOnly;
        impl ResourceMonitor for CpuOnly {
            fn memory_mb(&self) -> Result<f64, MonitorError> {
                Err(MonitorError::Unavailable("meminfo unreadable".into()))
            }
            fn cpu_percent(&self) -> Result<f64, MonitorError> {
                Ok(99.0)
            }
        }

        let (engine, sink) = engine(PolicyConfig::default().with_memory_limit(1.0).with_cpu_limit(50.0));
        let engine = engine.with_monitor(CpuOnly);

        assert!(matches!(
            engine.enforce_resource_limits(),
            Err(PolicyError::CpuLimitExceeded { used_percent, .. }) if used_percent == 99.0
        ));
        assert!(engine.monitor_warned.load(Ordering::SeqCst));
        assert_eq!(sink.of_action(AuditAction::ResourceViolation).len(), 1);
    }

    #[test]
    fn scrub_is_identity_when_redaction_disabled() {
        let (engine, _) = engine(PolicyConfig::default());
        let data = json!({"email": "a@b.com", "list": ["555-123-4567"]});
        assert_eq!(engine.scrub(data.clone()), data);
        assert_eq!(engine.scrub_str("a@b.com"), "a@b.com");
    }

    #[test]
    fn scrub_redacts_when_enabled() {
        let (engine, _) = engine(PolicyConfig::default().with_redaction(true));
        assert_eq!(
            engine.scrub(json!("email me at a@b.com")),
            json!("email me at [REDACTED]")
        );
    }

    #[test]
    fn audit_log_appends_note() {
        let (engine, sink) = engine(PolicyConfig::default());
        engine.audit_log("agent started");
        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].action, AuditAction::Note);
        assert_eq!(events[0].message, "agent started");
    }

    #[test]
    fn emergency_stop_is_terminal_and_monotonic() {
        let (engine, sink) = engine(PolicyConfig::default());
        let flag = engine.stop_flag();
        assert!(!engine.is_stopped());

        assert!(matches!(engine.emergency_stop(), PolicyError::EmergencyStop));
        assert!(engine.is_stopped());
        assert!(flag.is_set());

        assert!(matches!(engine.emergency_stop(), PolicyError::EmergencyStop));
        assert!(engine.is_stopped());

        let stops = sink.of_action(AuditAction::EmergencyStop);
        assert_eq!(stops.len(), 2);
        assert_eq!(stops[0].metadata["first_trip"], true);
        assert_eq!(stops[1].metadata["first_trip"], false);
    }

    #[test]
    fn stop_is_visible_across_threads() {
        let (engine, _) = engine(PolicyConfig::default());
        let engine = Arc::new(engine);

        let worker = {
            let engine = Arc::clone(&engine);
            std::thread::spawn(move || {
                let _ = engine.emergency_stop();
            })
        };
        worker.join().unwrap();

        assert!(engine.is_stopped());
    }
}
