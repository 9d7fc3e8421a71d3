// run.rs — Run the built-in echo task under policy.
//
// Wires the full host stack: policy file, hash-chained JSONL audit trail
// mirrored to tracing, signal-driven emergency stop, and the executor loop.
// The loop stops at the first policy error and returns it, so the process
// exits non-zero.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use raeio_audit::{FanoutSink, JsonlSink, TracingSink};
use raeio_policy::{PolicyEngine, StopFlag, TaskError, TaskExecutor};
use serde_json::{json, Value};

use crate::signals;

/// How often the pause between runs checks for an emergency stop.
const STOP_POLL: Duration = Duration::from_millis(50);

pub struct RunOptions {
    pub repeat: u32,
    pub interval: Duration,
    pub timeout: Option<Duration>,
}

pub fn execute(
    config_path: &Path,
    audit_path: &Path,
    action: &str,
    input: &str,
    options: &RunOptions,
) -> anyhow::Result<()> {
    let engine = build_engine(config_path, audit_path)?;
    signals::watch(Arc::clone(&engine)).context("cannot install signal handlers")?;
    if let Some(proxy) = engine.proxy_url() {
        tracing::info!(proxy, "outbound traffic must use the configured proxy");
    }

    let executor = TaskExecutor::new(engine);
    run_tasks(&executor, action, &parse_input(input), options, |output| {
        println!("{}", render(output))
    })
}

/// Policy engine over the policy file, auditing to the JSONL log and to
/// tracing.
fn build_engine(config_path: &Path, audit_path: &Path) -> anyhow::Result<Arc<PolicyEngine>> {
    let config = super::load_policy(config_path)?;
    let jsonl = JsonlSink::open(audit_path)
        .with_context(|| format!("cannot open audit log {}", audit_path.display()))?;
    let sink = FanoutSink::new()
        .with_sink(Arc::new(jsonl))
        .with_sink(Arc::new(TracingSink));
    Ok(Arc::new(PolicyEngine::new(config, Arc::new(sink))))
}

/// Run the echo task `options.repeat` times, handing each output to `emit`.
/// Stops at the first error.
fn run_tasks(
    executor: &TaskExecutor,
    action: &str,
    input: &Value,
    options: &RunOptions,
    mut emit: impl FnMut(&Value),
) -> anyhow::Result<()> {
    let stop = executor.engine().stop_flag();
    for round in 0..options.repeat {
        if round > 0 {
            pause(&stop, options.interval);
        }
        let output = match options.timeout {
            Some(deadline) => executor.execute_with_timeout(action, input.clone(), deadline, echo),
            None => executor.execute(action, input.clone(), echo),
        }?;
        emit(&output);
    }
    Ok(())
}

/// The built-in task: returns its input wrapped as `{"echo": input}`.
fn echo(input: Value) -> Result<Value, TaskError> {
    Ok(json!({ "echo": input }))
}

/// JSON if it parses as JSON, otherwise a plain string.
fn parse_input(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn render(output: &Value) -> String {
    match output.get("echo") {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => output.to_string(),
    }
}

/// Sleep for `interval`, returning early once the stop flag is set.
fn pause(stop: &StopFlag, interval: Duration) {
    let until = Instant::now() + interval;
    while !stop.is_set() {
        let now = Instant::now();
        if now >= until {
            break;
        }
        std::thread::sleep(STOP_POLL.min(until - now));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use raeio_audit::{AuditAction, AuditLog};
    use raeio_policy::PolicyError;

    fn write_policy(dir: &Path, yaml: &str) -> std::path::PathBuf {
        let path = dir.join("config.yaml");
        std::fs::write(&path, yaml).unwrap();
        path
    }

    fn repeat(n: u32) -> RunOptions {
        RunOptions {
            repeat: n,
            interval: Duration::ZERO,
            timeout: None,
        }
    }

    #[test]
    fn input_is_json_when_it_parses() {
        assert_eq!(parse_input("{\"a\": 1}"), json!({ "a": 1 }));
        assert_eq!(parse_input("42"), json!(42));
        assert_eq!(parse_input("hello world"), json!("hello world"));
        assert_eq!(parse_input(""), json!(""));
    }

    #[test]
    fn render_unwraps_echoed_strings() {
        assert_eq!(render(&json!({ "echo": "hi" })), "hi");
        assert_eq!(render(&json!({ "echo": { "a": 1 } })), "{\"a\":1}");
    }

    #[test]
    fn pause_returns_immediately_when_stopped() {
        let engine = PolicyEngine::new(
            Default::default(),
            Arc::new(raeio_audit::MemorySink::new()),
        );
        let _ = engine.emergency_stop();
        let started = Instant::now();
        pause(&engine.stop_flag(), Duration::from_secs(10));
        assert!(started.elapsed() < Duration::from_secs(1));

        // An untripped flag waits the full interval.
        let started = Instant::now();
        pause(&StopFlag::new(), Duration::from_millis(60));
        assert!(started.elapsed() >= Duration::from_millis(60));
    }

    #[test]
    fn repeated_runs_are_scrubbed_and_audited() {
        let dir = tempfile::tempdir().unwrap();
        let config = write_policy(
            dir.path(),
            "security:\n  action_whitelist: [read]\nprivacy_settings:\n  redact_pii: true\n",
        );
        let audit = dir.path().join(".raeio/audit.jsonl");
        let executor = TaskExecutor::new(build_engine(&config, &audit).unwrap());

        let mut outputs = Vec::new();
        run_tasks(&executor, "read", &json!("mail a@b.com"), &repeat(3), |out| {
            outputs.push(render(out))
        })
        .unwrap();

        assert_eq!(outputs, ["mail [REDACTED]"; 3]);
        let events = AuditLog::read_all(&audit).unwrap();
        assert_eq!(events.len(), 3);
        assert!(events.iter().all(|e| e.action == AuditAction::TaskSucceeded));
        assert!(AuditLog::verify_chain(&audit).unwrap());
    }

    #[test]
    fn denied_run_stops_loop_with_policy_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = write_policy(dir.path(), "security:\n  action_whitelist: [read]\n");
        let audit = dir.path().join("audit.jsonl");
        let executor = TaskExecutor::new(build_engine(&config, &audit).unwrap());

        let mut emitted = 0;
        let err = run_tasks(&executor, "delete", &json!("x"), &repeat(5), |_| emitted += 1)
            .unwrap_err();

        assert_eq!(emitted, 0);
        assert!(matches!(
            err.downcast_ref::<PolicyError>(),
            Some(PolicyError::ActionNotAllowed { .. })
        ));
        let events = AuditLog::read_all(&audit).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].action, AuditAction::ActionDenied);
    }

    #[test]
    fn stop_ends_loop_with_emergency_stop() {
        let dir = tempfile::tempdir().unwrap();
        let config = write_policy(dir.path(), "");
        let audit = dir.path().join("audit.jsonl");
        let executor = TaskExecutor::new(build_engine(&config, &audit).unwrap());

        let mut emitted = 0;
        let engine = Arc::clone(executor.engine());
        let err = run_tasks(&executor, "read", &json!(1), &repeat(5), |_| {
            emitted += 1;
            let _ = engine.emergency_stop();
        })
        .unwrap_err();

        assert_eq!(emitted, 1);
        assert!(matches!(
            err.downcast_ref::<PolicyError>(),
            Some(PolicyError::EmergencyStop)
        ));
    }

    #[test]
    fn missing_policy_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = build_engine(&dir.path().join("nope.yaml"), &dir.path().join("audit.jsonl"))
            .err()
            .expect("expected build_engine to fail");
        assert!(err.to_string().contains("not found"));
    }
}
