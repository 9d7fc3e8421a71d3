// scrub.rs — Redact PII from text on the command line.

use std::path::Path;

use raeio_policy::PiiScrubber;

pub fn execute(config_path: &Path, text: &str, force: bool) -> anyhow::Result<()> {
    if force {
        println!("{}", PiiScrubber::new().scrub_str(text));
        return Ok(());
    }

    let config = super::load_policy(config_path)?;
    if !config.privacy_settings.redact_pii {
        eprintln!("note: redact_pii is disabled in this policy; text is unchanged (use --force)");
        println!("{}", text);
        return Ok(());
    }
    println!("{}", PiiScrubber::new().scrub_str(text));
    Ok(())
}
