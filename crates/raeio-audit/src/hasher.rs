// hasher.rs — SHA-256 hashing for the audit chain and task payloads.
//
// Hashes are lowercase hex. Task inputs and outputs are recorded by hash
// only, so the audit trail can prove what a task saw without storing the
// (possibly sensitive) data itself.

use sha2::{Digest, Sha256};

/// Hash arbitrary bytes, returning a lowercase hex-encoded SHA-256 string.
pub fn hash_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// Hash a UTF-8 string.
pub fn hash_str(s: &str) -> String {
    hash_bytes(s.as_bytes())
}

/// Hash a JSON value via its compact serialization.
///
/// `serde_json::Value` objects keep keys in sorted order by default, so
/// equal values hash equally regardless of how they were built.
pub fn hash_json(value: &serde_json::Value) -> String {
    hash_str(&value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn hash_known_value() {
        // SHA-256("") = e3b0c442...
        assert_eq!(
            hash_str(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn hash_is_lowercase_hex() {
        let hash = hash_str("test");
        assert_eq!(hash.len(), 64);
        assert!(hash
            .chars()
            .all(|c| c.is_ascii_hexdigit() && !c.is_uppercase()));
    }

    #[test]
    fn json_hash_ignores_construction_order() {
        let mut a = serde_json::Map::new();
        a.insert("b".into(), json!(2));
        a.insert("a".into(), json!(1));
        let b = json!({ "a": 1, "b": 2 });
        assert_eq!(hash_json(&serde_json::Value::Object(a)), hash_json(&b));
    }

    #[test]
    fn different_inputs_differ() {
        assert_ne!(hash_json(&json!("a@b.com")), hash_json(&json!("[REDACTED]")));
    }
}
