// audit.rs — Audit subcommands: verify, tail, summary.

use std::path::{Path, PathBuf};

use clap::Subcommand;
use raeio_audit::{AuditError, AuditEvent, AuditLog, OutcomeSummary};

#[derive(Subcommand)]
pub enum AuditCommands {
    /// Verify the audit log hash chain integrity.
    Verify {
        /// Path to audit log (defaults to --audit-log).
        #[arg(long)]
        log: Option<PathBuf>,
    },
    /// Show recent audit events.
    Tail {
        /// Path to audit log (defaults to --audit-log).
        #[arg(long)]
        log: Option<PathBuf>,
        /// Number of events to show.
        #[arg(short, default_value = "10")]
        n: usize,
    },
    /// Summarize recent task outcomes.
    Summary {
        /// Path to audit log (defaults to --audit-log).
        #[arg(long)]
        log: Option<PathBuf>,
        /// Number of most recent task outcomes to include.
        #[arg(short, default_value = "100")]
        n: usize,
    },
}

pub fn execute(cmd: &AuditCommands, default_log: &Path) -> anyhow::Result<()> {
    match cmd {
        AuditCommands::Verify { log } => {
            let path = log.as_deref().unwrap_or(default_log);
            if !path.exists() {
                println!("No audit log found at {}", path.display());
                return Ok(());
            }

            match AuditLog::verify_chain(path) {
                Ok(_) => {
                    let events = AuditLog::read_all(path)?;
                    println!(
                        "Audit log verified: {} event(s), hash chain intact.",
                        events.len()
                    );
                }
                Err(AuditError::IntegrityViolation {
                    line,
                    expected,
                    actual,
                }) => {
                    println!("INTEGRITY VIOLATION at line {}:", line);
                    println!("  Expected previous_hash: {}", expected);
                    println!("  Actual previous_hash:   {}", actual);
                    println!();
                    println!("The audit log may have been tampered with.");
                    anyhow::bail!("Audit log integrity check failed");
                }
                Err(e) => return Err(e.into()),
            }
        }

        AuditCommands::Tail { log, n } => {
            let path = log.as_deref().unwrap_or(default_log);
            if !path.exists() {
                println!("No audit log found at {}", path.display());
                return Ok(());
            }

            let events = AuditLog::read_all(path)?;
            let start = events.len().saturating_sub(*n);
            let recent = &events[start..];
            if recent.is_empty() {
                println!("No audit events.");
                return Ok(());
            }

            println!(
                "{:<20} {:<19} {:<12} MESSAGE",
                "TIMESTAMP", "ACTION", "SUBJECT"
            );
            println!("{}", "-".repeat(80));
            for event in recent {
                println!("{}", tail_row(event));
            }
        }

        AuditCommands::Summary { log, n } => {
            let path = log.as_deref().unwrap_or(default_log);
            if !path.exists() {
                println!("No audit log found at {}", path.display());
                return Ok(());
            }

            let events = AuditLog::read_all(path)?;
            let violations = events.iter().filter(|e| e.action.is_violation()).count();
            match OutcomeSummary::from_events(&events, *n) {
                Some(summary) => {
                    println!("Tasks:         {}", summary.task_count);
                    println!("Success rate:  {:.1}%", summary.success_rate * 100.0);
                    match summary.avg_duration_ms {
                        Some(ms) => println!("Avg duration:  {:.2} ms", ms),
                        None => println!("Avg duration:  -"),
                    }
                }
                None => println!("No task outcomes recorded."),
            }
            println!("Violations:    {} (whole log)", violations);
        }
    }

    Ok(())
}

fn tail_row(event: &AuditEvent) -> String {
    let action = serde_json::to_value(event.action)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_else(|| format!("{:?}", event.action));
    format!(
        "{:<20} {:<19} {:<12} {}",
        event.timestamp.format("%Y-%m-%d %H:%M:%S"),
        action,
        event.subject.as_deref().unwrap_or("-"),
        event.message,
    )
}
