// check.rs — Validate a policy file and show what it enforces.

use std::path::Path;

use raeio_policy::{PolicyConfig, ResourceMonitor, ResourceUsageSnapshot, SystemMonitor};

pub fn execute(config_path: &Path) -> anyhow::Result<()> {
    let config = super::load_policy(config_path)?;
    println!("Policy OK: {}", config_path.display());
    println!();
    for line in describe(&config) {
        println!("  {}", line);
    }
    println!();

    let monitor = SystemMonitor::new();
    match monitor.snapshot() {
        Ok(usage) => {
            println!(
                "Current usage: memory {:.0} MB, CPU {:.1}% (CPU sampled over {:?})",
                usage.memory_mb,
                usage.cpu_percent,
                monitor.interval()
            );
            for warning in over_limit(&config, &usage) {
                println!("  warning: {}", warning);
            }
        }
        Err(e) => println!("Current usage: unavailable ({}); limits will not be enforced", e),
    }
    Ok(())
}

fn describe(config: &PolicyConfig) -> Vec<String> {
    let whitelist = if config.allows_all_actions() {
        "(empty: all actions allowed)".to_string()
    } else {
        config
            .security
            .action_whitelist
            .iter()
            .cloned()
            .collect::<Vec<_>>()
            .join(", ")
    };
    let limits = &config.resource_limits;
    let privacy = &config.privacy_settings;

    vec![
        format!("{:<14} {}", "Whitelist:", whitelist),
        format!(
            "{:<14} {}",
            "Memory limit:",
            limits.memory_mb.map_or("unlimited".to_string(), |v| format!("{} MB", v))
        ),
        format!(
            "{:<14} {}",
            "CPU limit:",
            limits.cpu_percent.map_or("unlimited".to_string(), |v| format!("{}%", v))
        ),
        format!(
            "{:<14} {}",
            "Redact PII:",
            if privacy.redact_pii { "yes" } else { "no" }
        ),
        format!("{:<14} {}", "Proxy:", config.proxy_url().unwrap_or("disabled")),
    ]
}

/// Limits the current usage would already violate.
fn over_limit(config: &PolicyConfig, usage: &ResourceUsageSnapshot) -> Vec<String> {
    let mut warnings = Vec::new();
    if let Some(limit) = config.resource_limits.memory_mb {
        if usage.memory_mb > limit {
            warnings.push(format!(
                "memory {:.0} MB is over the {} MB limit; tasks would be refused",
                usage.memory_mb, limit
            ));
        }
    }
    if let Some(limit) = config.resource_limits.cpu_percent {
        if usage.cpu_percent > limit {
            warnings.push(format!(
                "CPU {:.1}% is over the {}% limit; tasks would be refused",
                usage.cpu_percent, limit
            ));
        }
    }
    warnings
}
