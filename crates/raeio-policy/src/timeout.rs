// timeout.rs — Deadline supervision for long-running tasks.
//
// The policy engine has no way to preempt a task body. A supervisor runs
// the body on its own worker thread and waits for a result up to a
// deadline. On expiry the task fails with `TaskTimedOut`, which surfaces
// as `PolicyError::TaskFailed` (see `PolicyError::is_timeout`).
//
// The worker is not cancelled: it keeps running in the background and its
// eventual result is dropped. Tasks that must stop promptly need their own
// cancellation.

use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

use crate::error::TaskError;

/// The supervised task did not finish before its deadline.
#[derive(Debug, Error)]
#[error("task did not finish within {deadline:?}")]
pub struct TaskTimedOut {
    pub deadline: Duration,
}

/// Wraps tasks so they fail after a fixed deadline.
#[derive(Debug, Clone, Copy)]
pub struct TimeoutSupervisor {
    deadline: Duration,
}

impl TimeoutSupervisor {
    pub fn new(deadline: Duration) -> Self {
        Self { deadline }
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    /// Turn `task` into a task that gives up after the deadline.
    ///
    /// The result can be passed straight to `TaskExecutor::execute`.
    pub fn supervise<F, E>(&self, task: F) -> impl FnOnce(Value) -> Result<Value, TaskError>
    where
        F: FnOnce(Value) -> Result<Value, E> + Send + 'static,
        E: Into<TaskError> + 'static,
    {
        let deadline = self.deadline;
        move |input: Value| {
            let (tx, rx) = mpsc::channel::<Result<Value, TaskError>>();
            thread::Builder::new()
                .name("raeio-task".to_string())
                .spawn(move || {
                    // The receiver is gone if the deadline already passed.
                    let _ = tx.send(task(input).map_err(Into::into));
                })
                .map_err(|e| -> TaskError { Box::new(e) })?;

            match rx.recv_timeout(deadline) {
                Ok(result) => result,
                Err(RecvTimeoutError::Timeout) => {
                    tracing::warn!(?deadline, "task exceeded deadline; abandoning worker");
                    let err: TaskError = Box::new(TaskTimedOut { deadline });
                    Err(err)
                }
                Err(RecvTimeoutError::Disconnected) => {
                    Err("task worker exited without a result".into())
                }
            }
        }
    }
}
