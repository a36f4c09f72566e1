//! Canonical serialization and digests
//!
//! Every hash in Warden (rules, audit entries, checkpoint snapshots) is a
//! SHA-256 over a canonical JSON string. `serde_json::Map` keeps its keys
//! sorted, so routing a value through `serde_json::Value` gives a stable
//! byte representation at every nesting level.

use serde::Serialize;
use sha2::{Digest, Sha256};

/// Serialize `value` to JSON with object keys sorted at every level
pub fn canonical_json<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let value = serde_json::to_value(value)?;
    serde_json::to_string(&value)
}

/// Hex-encoded SHA-256 of `bytes`
pub fn sha256_hex(bytes: impl AsRef<[u8]>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes.as_ref());
    hex::encode(hasher.finalize())
}

/// Lowercase `text` and collapse every whitespace run into a single space
///
/// Pattern matching in the violation detector runs on this form of both the
/// haystack and the needle.
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_canonical_json_sorts_keys() {
        let mut map = HashMap::new();
        map.insert("zeta", 1);
        map.insert("alpha", 2);
        map.insert("mid", 3);

        let json = canonical_json(&map).unwrap();
        assert_eq!(json, r#"{"alpha":2,"mid":3,"zeta":1}"#);
    }

    #[test]
    fn test_canonical_json_nested() {
        let value = serde_json::json!({"b": {"y": 1, "x": 2}, "a": [3, 2, 1]});
        let json = canonical_json(&value).unwrap();
        assert_eq!(json, r#"{"a":[3,2,1],"b":{"x":2,"y":1}}"#);
    }

    #[test]
    fn test_sha256_known_vector() {
        assert_eq!(
            sha256_hex("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_normalize_text() {
        assert_eq!(normalize_text("  Forced\t\n  ACTION  "), "forced action");
        assert_eq!(normalize_text(""), "");
    }
}
