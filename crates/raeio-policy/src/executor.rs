// executor.rs — Policy-supervised task execution.
//
// `TaskExecutor::execute` is the only caller-facing entry point for running
// a task. Checks run in a fixed order and short-circuit:
//
// 1. Emergency stop already tripped? → EmergencyStop, task never called
// 2. Action on the whitelist? → ActionNotAllowed
// 3. Resource usage within limits? → Memory/CpuLimitExceeded
// 4. Run the task on the raw input (tasks need the real data to act)
// 5. Stop tripped while the task ran? → EmergencyStop; a task error is
//    still recorded in that call's audit event
// 6. Task error → TaskFailed, carrying the task's error
// 7. Success → output scrubbed, then returned
//
// Every invocation produces exactly one audit event. For steps 2 and 3 the
// engine's own denial/violation event is that one event; every other path
// records a single task event here.

use std::sync::Arc;
use std::time::{Duration, Instant};

use raeio_audit::{hasher, AuditAction, AuditEvent};
use serde_json::{json, Value};

use crate::engine::PolicyEngine;
use crate::error::{ErrorKind, PolicyError, TaskError};
use crate::timeout::TimeoutSupervisor;

/// Record of one `execute` call.
#[derive(Debug, Clone)]
pub struct TaskOutcome {
    pub action: String,
    pub success: bool,
    /// The scrubbed output, on success.
    pub output: Option<Value>,
    pub error: Option<ErrorKind>,
    pub duration: Duration,
}

impl TaskOutcome {
    fn new(action: &str, result: &Result<Value, PolicyError>, duration: Duration) -> Self {
        Self {
            action: action.to_string(),
            success: result.is_ok(),
            output: result.as_ref().ok().cloned(),
            error: result.as_ref().err().map(PolicyError::kind),
            duration,
        }
    }

    pub fn duration_ms(&self) -> f64 {
        self.duration.as_secs_f64() * 1000.0
    }

    /// Audit metadata for this outcome. The output itself is left out; the
    /// event carries its hash instead.
    fn audit_metadata(&self) -> Value {
        json!({
            "action": self.action,
            "success": self.success,
            "error": self.error,
            "duration_ms": self.duration_ms(),
        })
    }
}

/// Runs tasks under a shared [`PolicyEngine`].
#[derive(Clone)]
pub struct TaskExecutor {
    engine: Arc<PolicyEngine>,
}

impl TaskExecutor {
    pub fn new(engine: Arc<PolicyEngine>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &Arc<PolicyEngine> {
        &self.engine
    }

    /// Run `task` on `input` if policy allows, returning its scrubbed output.
    pub fn execute<F, E>(&self, action: &str, input: Value, task: F) -> Result<Value, PolicyError>
    where
        F: FnOnce(Value) -> Result<Value, E>,
        E: Into<TaskError>,
    {
        self.execute_with_outcome(action, input, task).0
    }

    /// Like [`execute`](Self::execute), also returning the [`TaskOutcome`].
    pub fn execute_with_outcome<F, E>(
        &self,
        action: &str,
        input: Value,
        task: F,
    ) -> (Result<Value, PolicyError>, TaskOutcome)
    where
        F: FnOnce(Value) -> Result<Value, E>,
        E: Into<TaskError>,
    {
        let started = Instant::now();
        let (result, pending) = self.run(action, input, task);
        let outcome = TaskOutcome::new(action, &result, started.elapsed());

        if let Some(event) = pending {
            // Outcome fields first, then anything the event already carries.
            let mut metadata = outcome.audit_metadata();
            if let (Some(fields), Value::Object(extra)) = (metadata.as_object_mut(), &event.metadata) {
                fields.extend(extra.clone());
            }
            self.engine
                .record(event.with_subject(action).with_metadata(metadata));
        }

        (result, outcome)
    }

    /// Run `task` on a worker thread, failing it if it has not finished
    /// within `deadline`. See [`TimeoutSupervisor`].
    pub fn execute_with_timeout<F, E>(
        &self,
        action: &str,
        input: Value,
        deadline: Duration,
        task: F,
    ) -> Result<Value, PolicyError>
    where
        F: FnOnce(Value) -> Result<Value, E> + Send + 'static,
        E: Into<TaskError> + 'static,
    {
        self.execute(action, input, TimeoutSupervisor::new(deadline).supervise(task))
    }

    // Returns the result and the audit event still to be written, if the
    // engine has not already written one for this call.
    fn run<F, E>(
        &self,
        action: &str,
        input: Value,
        task: F,
    ) -> (Result<Value, PolicyError>, Option<AuditEvent>)
    where
        F: FnOnce(Value) -> Result<Value, E>,
        E: Into<TaskError>,
    {
        if self.engine.is_stopped() {
            tracing::warn!(action, "task rejected: emergency stop active");
            let event = AuditEvent::new(
                AuditAction::TaskRejected,
                format!("task '{}' rejected: emergency stop active", action),
            );
            return (Err(PolicyError::EmergencyStop), Some(event));
        }

        if let Err(err) = self.engine.check_action(action) {
            return (Err(err), None);
        }
        if let Err(err) = self.engine.enforce_resource_limits() {
            return (Err(err), None);
        }

        let input_hash = hasher::hash_json(&input);
        let result = task(input);

        if self.engine.is_stopped() {
            tracing::warn!(action, "emergency stop during task; output discarded");
            let halted = format!("task '{}' halted by emergency stop", action);
            let event = match result {
                Ok(_) => AuditEvent::new(AuditAction::TaskFailed, halted),
                Err(e) => {
                    let task_error: TaskError = e.into();
                    tracing::warn!(action, "task failed before the halt: {}", task_error);
                    AuditEvent::new(
                        AuditAction::TaskFailed,
                        format!("{} (task error: {})", halted, task_error),
                    )
                    .with_metadata(json!({ "task_error": task_error.to_string() }))
                }
            };
            return (Err(PolicyError::EmergencyStop), Some(event.with_input_hash(input_hash)));
        }

        match result {
            Ok(output) => {
                let output = self.engine.scrub(output);
                let event = AuditEvent::new(
                    AuditAction::TaskSucceeded,
                    format!("task '{}' succeeded", action),
                )
                .with_input_hash(input_hash)
                .with_output_hash(hasher::hash_json(&output));
                (Ok(output), Some(event))
            }
            Err(e) => {
                let source: TaskError = e.into();
                tracing::warn!(action, "task failed: {}", source);
                let event = AuditEvent::new(
                    AuditAction::TaskFailed,
                    format!("task '{}' failed: {}", action, source),
                )
                .with_input_hash(input_hash);
                let err = PolicyError::TaskFailed {
                    action: action.to_string(),
                    source,
                };
                (Err(err), Some(event))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PolicyConfig;
    use crate::monitor::StaticMonitor;
    use raeio_audit::MemorySink;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn executor(config: PolicyConfig) -> (TaskExecutor, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        let engine = PolicyEngine::new(config, sink.clone()).with_monitor(StaticMonitor::new(10.0, 5.0));
        (TaskExecutor::new(Arc::new(engine)), sink)
    }

    fn echo(input: Value) -> Result<Value, TaskError> {
        Ok(input)
    }

    #[test]
    fn success_scrubs_output_and_records_outcome() {
        let (executor, sink) =
            executor(PolicyConfig::default().with_whitelist(["read"]).with_redaction(true));

        let (result, outcome) =
            executor.execute_with_outcome("read", json!("email me at a@b.com"), echo);

        assert_eq!(result.unwrap(), json!("email me at [REDACTED]"));
        assert!(outcome.success);
        assert_eq!(outcome.output, Some(json!("email me at [REDACTED]")));
        assert_eq!(outcome.error, None);

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].action, AuditAction::TaskSucceeded);
        assert_eq!(events[0].subject.as_deref(), Some("read"));
        assert_eq!(
            events[0].output_hash.as_deref(),
            Some(hasher::hash_json(&json!("email me at [REDACTED]")).as_str())
        );
        assert_eq!(events[0].metadata["success"], true);
        assert!(events[0].metadata.get("duration_ms").is_some());
    }

    #[test]
    fn task_receives_raw_input() {
        let (executor, _) = executor(PolicyConfig::default().with_redaction(true));
        let seen = std::cell::RefCell::new(None);

        executor
            .execute("send", json!("a@b.com"), |input| {
                *seen.borrow_mut() = Some(input.clone());
                Ok::<_, TaskError>(json!("sent"))
            })
            .unwrap();

        assert_eq!(seen.into_inner(), Some(json!("a@b.com")));
    }

    #[test]
    fn denied_action_never_runs_task() {
        let (executor, sink) = executor(PolicyConfig::default().with_whitelist(["read"]));
        let calls = AtomicUsize::new(0);

        let (result, outcome) = executor.execute_with_outcome("write", json!("x"), |v| {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, TaskError>(v)
        });

        assert!(matches!(result, Err(PolicyError::ActionNotAllowed { .. })));
        assert_eq!(outcome.error, Some(ErrorKind::ActionNotAllowed));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(sink.len(), 1);
        assert_eq!(sink.events()[0].action, AuditAction::ActionDenied);
    }

    #[test]
    fn resource_violation_never_runs_task() {
        let sink = Arc::new(MemorySink::new());
        let engine = PolicyEngine::new(PolicyConfig::default().with_cpu_limit(50.0), sink.clone())
            .with_monitor(StaticMonitor::new(10.0, 80.0));
        let executor = TaskExecutor::new(Arc::new(engine));
        let calls = AtomicUsize::new(0);

        let result = executor.execute("read", json!(null), |v| {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, TaskError>(v)
        });

        assert!(matches!(result, Err(PolicyError::CpuLimitExceeded { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(sink.len(), 1);
        assert_eq!(sink.events()[0].action, AuditAction::ResourceViolation);
    }

    #[test]
    fn task_error_propagates_with_message() {
        let (executor, sink) = executor(PolicyConfig::default());

        let err = executor
            .execute("generate", json!("prompt"), |_| {
                Err::<Value, _>("model not loaded")
            })
            .unwrap_err();

        match &err {
            PolicyError::TaskFailed { action, source } => {
                assert_eq!(action, "generate");
                assert_eq!(source.to_string(), "model not loaded");
            }
            other => panic!("expected TaskFailed, got {:?}", other),
        }
        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].action, AuditAction::TaskFailed);
        assert!(events[0].message.contains("model not loaded"));
        assert_eq!(events[0].metadata["error"], "task_failure");
    }

    #[test]
    fn stop_during_task_discards_output() {
        let (executor, sink) = executor(PolicyConfig::default());
        let engine = Arc::clone(executor.engine());

        let result = executor.execute("read", json!("data"), move |v| {
            let _ = engine.emergency_stop();
            Ok::<_, TaskError>(v)
        });

        assert!(matches!(result, Err(PolicyError::EmergencyStop)));
        let task_events: Vec<_> = sink
            .events()
            .into_iter()
            .filter(|e| e.action != AuditAction::EmergencyStop)
            .collect();
        assert_eq!(task_events.len(), 1);
        assert_eq!(task_events[0].action, AuditAction::TaskFailed);
        assert_eq!(task_events[0].metadata["error"], "emergency_stop");
    }

    #[test]
    fn task_error_survives_stop_during_task() {
        let (executor, sink) = executor(PolicyConfig::default());
        let engine = Arc::clone(executor.engine());

        let result = executor.execute("read", json!("data"), move |_| {
            let _ = engine.emergency_stop();
            Err::<Value, _>("disk full")
        });

        assert!(matches!(result, Err(PolicyError::EmergencyStop)));
        let failed = sink.of_action(AuditAction::TaskFailed);
        assert_eq!(failed.len(), 1);
        assert!(failed[0].message.contains("halted by emergency stop"));
        assert!(failed[0].message.contains("disk full"));
        assert_eq!(failed[0].metadata["task_error"], "disk full");
        assert_eq!(failed[0].metadata["error"], "emergency_stop");
        assert_eq!(failed[0].metadata["success"], false);
    }

    #[test]
    fn stopped_engine_rejects_before_any_check() {
        // A whitelist that would deny "write" proves the stop check comes first.
        let (executor, sink) = executor(PolicyConfig::default().with_whitelist(["read"]));
        let _ = executor.engine().emergency_stop();
        let before = sink.len();

        let result = executor.execute("write", json!(1), echo);

        assert!(matches!(result, Err(PolicyError::EmergencyStop)));
        assert_eq!(sink.len(), before + 1);
        assert_eq!(sink.events()[before].action, AuditAction::TaskRejected);
    }
}
