// config.rs — Policy configuration model.
//
// The policy file is shared with the rest of the agent's settings, so only
// three top-level sections are read here:
//
//   security:
//     action_whitelist: [read, generate]
//   resource_limits:
//     memory_mb: 4096
//     cpu_percent: 90
//   privacy_settings:
//     redact_pii: true
//     use_proxy: false
//     proxy_url: null
//
// Other top-level sections are ignored. Unknown keys *inside* these three
// sections are rejected, since a misspelled limit would otherwise silently
// disable enforcement. Every field has an explicit default: no whitelist
// restriction, no limits, no redaction, no proxy. A section (or the
// whitelist) left empty, e.g. `resource_limits:` with nothing under it,
// reads as null and gets the same defaults as a missing one. So does an
// empty or whitespace-only file, in either format.

use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::ConfigError;

/// Whitelist settings (`security` section).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SecuritySettings {
    /// Permitted actions. Empty means no restriction.
    #[serde(deserialize_with = "null_as_default")]
    pub action_whitelist: BTreeSet<String>,
}

/// Soft resource ceilings (`resource_limits` section). `None` means unlimited.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResourceLimits {
    /// System memory in use, in MiB.
    pub memory_mb: Option<f64>,
    /// System-wide CPU utilization, in percent.
    pub cpu_percent: Option<f64>,
}

impl ResourceLimits {
    pub fn is_empty(&self) -> bool {
        self.memory_mb.is_none() && self.cpu_percent.is_none()
    }
}

/// Privacy settings (`privacy_settings` section).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PrivacySettings {
    /// Redact emails and phone numbers from task output.
    pub redact_pii: bool,
    /// Route outbound traffic through `proxy_url`.
    pub use_proxy: bool,
    pub proxy_url: Option<String>,
}

/// The validated policy for one run.
///
/// Built once at startup and owned by the `PolicyEngine`, which only hands
/// out shared references. Reloading means building a new engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    #[serde(deserialize_with = "null_as_default")]
    pub security: SecuritySettings,
    #[serde(deserialize_with = "null_as_default")]
    pub resource_limits: ResourceLimits,
    #[serde(deserialize_with = "null_as_default")]
    pub privacy_settings: PrivacySettings,
}

// An explicit null reads as the type's default.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl PolicyConfig {
    /// Load a policy file. `.json` files are parsed as JSON, anything else
    /// as YAML.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

        let config = if is_json {
            Self::from_json_str(&content)?
        } else {
            Self::from_yaml_str(&content)?
        };
        tracing::debug!(
            path = %path.display(),
            whitelist = config.security.action_whitelist.len(),
            "loaded policy config"
        );
        Ok(config)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        // An empty or comment-only file is a valid, fully-defaulted policy.
        let blank = content.lines().all(|line| {
            let line = line.trim();
            line.is_empty() || line.starts_with('#')
        });
        if blank {
            return Ok(Self::default());
        }
        // A bare `~` document is null.
        let config: Option<Self> = serde_yaml::from_str(content)?;
        let config = config.unwrap_or_default();
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_str(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Option<Self> = serde_json::from_str(content)?;
        let config = config.unwrap_or_default();
        config.validate()?;
        Ok(config)
    }

    /// Check constraints serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let limits = [
            ("resource_limits.memory_mb", self.resource_limits.memory_mb),
            ("resource_limits.cpu_percent", self.resource_limits.cpu_percent),
        ];
        for (name, value) in limits {
            if let Some(v) = value {
                if !v.is_finite() || v < 0.0 {
                    return Err(ConfigError::Invalid(format!(
                        "{} must be a non-negative number, got {}",
                        name, v
                    )));
                }
            }
        }

        if self.security.action_whitelist.iter().any(|a| a.trim().is_empty()) {
            return Err(ConfigError::Invalid(
                "security.action_whitelist contains an empty action".to_string(),
            ));
        }

        let privacy = &self.privacy_settings;
        if privacy.use_proxy && privacy.proxy_url.as_deref().map_or(true, |u| u.trim().is_empty()) {
            return Err(ConfigError::Invalid(
                "privacy_settings.use_proxy is set but proxy_url is missing".to_string(),
            ));
        }

        Ok(())
    }

    /// True when the whitelist is empty (no action restriction).
    pub fn allows_all_actions(&self) -> bool {
        self.security.action_whitelist.is_empty()
    }

    pub fn has_resource_limits(&self) -> bool {
        !self.resource_limits.is_empty()
    }

    /// Proxy to route traffic through, when `use_proxy` is enabled.
    pub fn proxy_url(&self) -> Option<&str> {
        if self.privacy_settings.use_proxy {
            self.privacy_settings.proxy_url.as_deref()
        } else {
            None
        }
    }
}

/// Builder helpers, mostly for hosts that construct a policy in code.
impl PolicyConfig {
    pub fn with_whitelist<I, S>(mut self, actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.security.action_whitelist = actions.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_memory_limit(mut self, memory_mb: f64) -> Self {
        self.resource_limits.memory_mb = Some(memory_mb);
        self
    }

    pub fn with_cpu_limit(mut self, cpu_percent: f64) -> Self {
        self.resource_limits.cpu_percent = Some(cpu_percent);
        self
    }

    pub fn with_redaction(mut self, redact_pii: bool) -> Self {
        self.privacy_settings.redact_pii = redact_pii;
        self
    }
}
