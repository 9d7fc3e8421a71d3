pub mod audit;
pub mod check;
pub mod run;
pub mod scrub;

use std::path::Path;

use anyhow::Context;
use raeio_policy::PolicyConfig;

/// Load and validate the policy file, naming the path in any error.
pub(crate) fn load_policy(path: &Path) -> anyhow::Result<PolicyConfig> {
    if !path.exists() {
        anyhow::bail!(
            "policy file {} not found (pass --config to choose another)",
            path.display()
        );
    }
    PolicyConfig::load(path).with_context(|| format!("invalid policy file {}", path.display()))
}
