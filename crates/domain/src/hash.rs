//! Canonical serialization and content hashing for canon documents.
//!
//! Hashes must be stable across processes and unaffected by key order, so
//! serialization is canonical: object keys sorted lexicographically, compact
//! separators, strings NFC-normalized, numbers in serde_json's shortest
//! form. Array positions are significant.

use serde_json::Value;
use sha2::{Digest, Sha256};
use unicode_normalization::UnicodeNormalization;

/// Render a value as canonical JSON.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

/// Hex-encoded SHA-256 of the canonical serialization.
pub fn content_hash(value: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical_json(value).as_bytes());
    hex::encode(hasher.finalize())
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_string(key, out);
                out.push(':');
                write_canonical(&map[key.as_str()], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        Value::String(s) => write_string(s, out),
        other => out.push_str(&other.to_string()),
    }
}

fn write_string(s: &str, out: &mut String) {
    let normalized: String = s.nfc().collect();
    // serde_json string rendering does not escape non-ASCII.
    out.push_str(&serde_json::to_string(&normalized).expect("string serialization is infallible"));
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn key_order_does_not_change_hash() {
        let a = json!({"b": 1, "a": {"y": 2, "x": 3}});
        let b = json!({"a": {"x": 3, "y": 2}, "b": 1});
        assert_eq!(content_hash(&a), content_hash(&b));
    }

    #[test]
    fn array_order_is_significant() {
        let a = json!({"landmarks": [1, 2, 3]});
        let b = json!({"landmarks": [3, 2, 1]});
        assert_ne!(content_hash(&a), content_hash(&b));
    }

    #[test]
    fn canonical_form_is_compact_and_sorted() {
        let value = json!({"b": [1, 2], "a": "text"});
        assert_eq!(canonical_json(&value), r#"{"a":"text","b":[1,2]}"#);
    }

    #[test]
    fn serialization_round_trip_preserves_hash() {
        let value = json!({"world_name": "Läuterung", "n": 1.5});
        let reparsed: Value = serde_json::from_str(&canonical_json(&value)).unwrap();
        assert_eq!(content_hash(&value), content_hash(&reparsed));
    }

    #[test]
    fn nfc_normalization_unifies_equivalent_strings() {
        // "é" precomposed vs "e" + combining acute.
        let composed = json!("caf\u{e9}");
        let decomposed = json!("cafe\u{301}");
        assert_eq!(content_hash(&composed), content_hash(&decomposed));
    }
}
