// summary.rs — Task performance summary over recorded outcomes.
//
// Looks at the most recent task outcome events (succeeded/failed) and
// reports how many there were, what fraction succeeded, and their mean
// duration as recorded in the `duration_ms` metadata field.

use serde::{Deserialize, Serialize};

use crate::event::{AuditAction, AuditEvent};

/// Aggregate statistics over recent task outcomes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeSummary {
    pub task_count: usize,
    /// Fraction of outcomes that succeeded, in `0.0..=1.0`.
    pub success_rate: f64,
    /// Mean duration in milliseconds, if any outcome recorded one.
    pub avg_duration_ms: Option<f64>,
}

impl OutcomeSummary {
    /// Summarize the last `last_n` task outcome events in `events`.
    ///
    /// Returns `None` when there are no outcome events at all.
    pub fn from_events(events: &[AuditEvent], last_n: usize) -> Option<Self> {
        let outcomes: Vec<&AuditEvent> = events
            .iter()
            .filter(|e| e.action.is_task_outcome())
            .collect();
        let start = outcomes.len().saturating_sub(last_n);
        let recent = &outcomes[start..];
        if recent.is_empty() {
            return None;
        }

        let successes = recent
            .iter()
            .filter(|e| e.action == AuditAction::TaskSucceeded)
            .count();
        let durations: Vec<f64> = recent
            .iter()
            .filter_map(|e| e.metadata.get("duration_ms").and_then(|d| d.as_f64()))
            .collect();
        let avg_duration_ms = if durations.is_empty() {
            None
        } else {
            Some(durations.iter().sum::<f64>() / durations.len() as f64)
        };

        Some(Self {
            task_count: recent.len(),
            success_rate: successes as f64 / recent.len() as f64,
            avg_duration_ms,
        })
    }
}
