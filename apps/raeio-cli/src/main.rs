//! # raeio
//!
//! Command-line host for the RAEIO agent shell's policy core.
//!
//! - `raeio check` — load and validate the policy, sample resources once
//! - `raeio run <action>` — run the built-in echo task under policy
//! - `raeio scrub <text>` — redact PII the way task output is redacted
//! - `raeio audit verify/tail/summary` — inspect the hash-chained audit trail
//!
//! SIGINT/SIGTERM during `run` trip the emergency stop. Any policy error
//! makes the process exit non-zero.

mod commands;
mod signals;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use raeio_policy::PolicyError;
use tracing_subscriber::EnvFilter;

/// RAEIO policy shell — run agent tasks under whitelist, limits and audit.
#[derive(Parser)]
#[command(name = "raeio", version, about)]
struct Cli {
    /// Policy file (YAML, or JSON with a .json extension).
    #[arg(long, global = true, default_value = "config.yaml")]
    config: PathBuf,

    /// Audit trail written by `run` and read by `audit`.
    #[arg(long, global = true, default_value = ".raeio/audit.jsonl")]
    audit_log: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the policy file and show current resource usage.
    Check,
    /// Run the built-in echo task through the policy executor.
    Run {
        /// Action name checked against the whitelist.
        action: String,
        /// Task input. Parsed as JSON when possible, otherwise used as text.
        #[arg(long, default_value = "")]
        input: String,
        /// Number of times to run the task.
        #[arg(long, default_value_t = 1)]
        repeat: u32,
        /// Pause between runs, in milliseconds.
        #[arg(long, default_value_t = 1000)]
        interval_ms: u64,
        /// Fail a run that takes longer than this many seconds.
        #[arg(long)]
        timeout_secs: Option<u64>,
    },
    /// Redact emails and phone numbers from text.
    Scrub {
        text: String,
        /// Redact even when the policy has `redact_pii: false`.
        #[arg(long)]
        force: bool,
    },
    /// Inspect the audit trail.
    Audit {
        #[command(subcommand)]
        command: commands::audit::AuditCommands,
    },
}

fn main() -> ExitCode {
    if let Err(e) = init_tracing() {
        eprintln!("failed to initialize logging: {:#}", e);
        return ExitCode::FAILURE;
    }

    let cli = Cli::parse();
    match dispatch(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(exit_status(&e))
        }
    }
}

fn init_tracing() -> anyhow::Result<()> {
    // Logs go to stderr so task output on stdout stays clean.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("raeio_policy=info".parse()?)
                .add_directive("raeio_audit=info".parse()?)
                .add_directive("raeio=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
    Ok(())
}

fn dispatch(cli: &Cli) -> anyhow::Result<()> {
    match &cli.command {
        Commands::Check => commands::check::execute(&cli.config),
        Commands::Run {
            action,
            input,
            repeat,
            interval_ms,
            timeout_secs,
        } => commands::run::execute(
            &cli.config,
            &cli.audit_log,
            action,
            input,
            &commands::run::RunOptions {
                repeat: *repeat,
                interval: Duration::from_millis(*interval_ms),
                timeout: timeout_secs.map(Duration::from_secs),
            },
        ),
        Commands::Scrub { text, force } => commands::scrub::execute(&cli.config, text, *force),
        Commands::Audit { command } => commands::audit::execute(command, &cli.audit_log),
    }
}

/// 130 for an emergency stop (the conventional SIGINT status), 2 for any
/// other policy error, 1 for everything else.
fn exit_status(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<PolicyError>() {
        Some(PolicyError::EmergencyStop) => 130,
        Some(_) => 2,
        None => 1,
    }
}
