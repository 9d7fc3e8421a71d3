// scrub.rs — Lexical PII redaction.
//
// Detects email addresses and North-American-style phone numbers with
// regular expressions and replaces each match with `[REDACTED]`. This is a
// heuristic with known false negatives (international formats, obfuscated
// addresses) and false positives (any 10-digit run on word boundaries).
//
// The marker contains no '@' and no digits, so scrubbing is idempotent.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

/// Replacement for every detected email or phone number.
pub const REDACTION_MARKER: &str = "[REDACTED]";

const EMAIL_PATTERN: &str = r"[A-Za-z0-9_.+\-]+@[A-Za-z0-9\-]+\.[A-Za-z0-9.\-]+";
const PHONE_PATTERN: &str = r"\b[0-9]{3}[\-.]?[0-9]{3}[\-.]?[0-9]{4}\b";

// One alternation so matches are found in a single left-to-right pass and
// never overlap.
static PII_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!("(?:{})|(?:{})", EMAIL_PATTERN, PHONE_PATTERN))
        .expect("PII patterns are valid regexes")
});

/// Redacts PII from strings and nested JSON values.
#[derive(Debug, Clone, Copy, Default)]
pub struct PiiScrubber;

impl PiiScrubber {
    pub fn new() -> Self {
        Self
    }

    /// Redact a single string. Borrows when nothing matched.
    pub fn scrub_str<'a>(&self, text: &'a str) -> Cow<'a, str> {
        let redactions = PII_RE.find_iter(text).count();
        if redactions == 0 {
            return Cow::Borrowed(text);
        }
        tracing::warn!(redactions, "PII detected and redacted");
        PII_RE.replace_all(text, REDACTION_MARKER)
    }

    /// Recursively redact strings inside `value`.
    ///
    /// Object keys and array order are preserved; numbers, booleans and
    /// null pass through unchanged.
    pub fn scrub_value(&self, value: Value) -> Value {
        match value {
            Value::String(s) => match self.scrub_str(&s) {
                Cow::Borrowed(_) => Value::String(s),
                Cow::Owned(redacted) => Value::String(redacted),
            },
            Value::Array(items) => {
                Value::Array(items.into_iter().map(|v| self.scrub_value(v)).collect())
            }
            Value::Object(map) => Value::Object(
                map.into_iter()
                    .map(|(k, v)| (k, self.scrub_value(v)))
                    .collect(),
            ),
            other => other,
        }
    }

    /// True when `text` contains anything this scrubber would redact.
    pub fn contains_pii(&self, text: &str) -> bool {
        PII_RE.is_match(text)
    }
}
