//! Document field bags and canonical content hashing.
//!
//! Remote documents are opaque JSON objects; the core only interprets the
//! `name` and `modified` fields. Change detection works on a canonical hash
//! computed over the document with operational fields stripped.

use chrono::NaiveDateTime;
use serde_json::{Map, Value};

/// A remote document: an unordered bag of JSON fields.
pub type Document = Map<String, Value>;

/// Fields excluded from hashing and from writes regardless of configuration.
pub const DEFAULT_EXCLUDED_FIELDS: &[&str] = &[
    "modified",
    "modified_by",
    "creation",
    "owner",
    "idx",
    "docstatus",
];

/// Unique identifier of the document within its doctype.
pub fn doc_name(doc: &Document) -> Option<&str> {
    doc.get("name").and_then(Value::as_str)
}

/// Raw `modified` timestamp string as assigned by the remote.
pub fn doc_modified(doc: &Document) -> Option<&str> {
    doc.get("modified").and_then(Value::as_str)
}

/// Parse a remote `modified` timestamp.
///
/// Accepts both the space-separated and the `T`-separated form, with or
/// without fractional seconds. Returns `None` for missing or unparseable
/// input so callers can degrade to manual conflict handling.
pub fn parse_modified(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(parsed);
        }
    }
    None
}

/// Copy of `doc` with every field named in `excluded` removed.
pub fn strip_fields(doc: &Document, excluded: &[String]) -> Document {
    doc.iter()
        .filter(|(key, _)| {
            !DEFAULT_EXCLUDED_FIELDS.contains(&key.as_str())
                && !excluded.iter().any(|field| field == key.as_str())
        })
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// Canonical content hash of a document.
///
/// Strips the default excluded fields plus `excluded`, serializes the rest
/// with lexicographically sorted keys and no whitespace, and returns the
/// lowercase hex MD5 of the UTF-8 bytes. Stable across repeated
/// serializations of equivalent documents.
pub fn canonical_hash(doc: &Document, excluded: &[String]) -> String {
    let stripped = strip_fields(doc, excluded);
    let mut serialized = String::new();
    write_canonical(&Value::Object(stripped), &mut serialized);
    format!("{:x}", md5::compute(serialized.as_bytes()))
}

/// Serialize with sorted object keys independent of the map's iteration
/// order, so the digest does not depend on serde_json feature flags.
fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (index, key) in keys.iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String((*key).clone()).to_string());
                out.push(':');
                write_canonical(&map[*key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (index, item) in items.iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn hash_is_stable_across_field_order() {
        let a = doc(json!({"name": "C1", "customer_name": "Acme", "territory": "All"}));
        let b = doc(json!({"territory": "All", "name": "C1", "customer_name": "Acme"}));
        assert_eq!(canonical_hash(&a, &[]), canonical_hash(&b, &[]));
    }

    #[test]
    fn hash_ignores_default_excluded_fields() {
        let a = doc(json!({"name": "C1", "customer_name": "Acme"}));
        let b = doc(json!({
            "name": "C1",
            "customer_name": "Acme",
            "modified": "2025-01-01 10:00:00",
            "modified_by": "admin",
            "creation": "2024-12-01 09:00:00",
            "owner": "admin",
            "idx": 3,
            "docstatus": 1
        }));
        assert_eq!(canonical_hash(&a, &[]), canonical_hash(&b, &[]));
    }

    #[test]
    fn hash_respects_configured_extras() {
        let a = doc(json!({"name": "C1", "customer_name": "Acme"}));
        let b = doc(json!({"name": "C1", "customer_name": "Acme", "_comments": "[]"}));
        assert_ne!(canonical_hash(&a, &[]), canonical_hash(&b, &[]));
        let extras = vec!["_comments".to_string()];
        assert_eq!(canonical_hash(&a, &extras), canonical_hash(&b, &extras));
    }

    #[test]
    fn hash_distinguishes_content_changes() {
        let a = doc(json!({"name": "C1", "customer_name": "Acme"}));
        let b = doc(json!({"name": "C1", "customer_name": "AcmeCo"}));
        assert_ne!(canonical_hash(&a, &[]), canonical_hash(&b, &[]));
    }

    #[test]
    fn hash_is_32_hex_chars() {
        let digest = canonical_hash(&doc(json!({"name": "C1"})), &[]);
        assert_eq!(digest.len(), 32);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(digest, digest.to_lowercase());
    }

    #[test]
    fn hash_sorts_nested_object_keys() {
        let a = doc(json!({"name": "C1", "address": {"city": "Pune", "zip": "411001"}}));
        let b = doc(json!({"name": "C1", "address": {"zip": "411001", "city": "Pune"}}));
        assert_eq!(canonical_hash(&a, &[]), canonical_hash(&b, &[]));
    }

    #[test]
    fn strip_fields_removes_defaults_and_extras() {
        let original = doc(json!({
            "name": "C1",
            "customer_name": "Acme",
            "modified": "2025-01-01 10:00:00",
            "owner": "admin",
            "_assign": "[]"
        }));
        let stripped = strip_fields(&original, &["_assign".to_string()]);
        assert_eq!(stripped.len(), 2);
        assert!(stripped.contains_key("name"));
        assert!(stripped.contains_key("customer_name"));
    }

    #[test]
    fn parse_modified_accepts_both_separators() {
        assert!(parse_modified("2025-01-01 10:00:00").is_some());
        assert!(parse_modified("2025-01-01T10:00:00").is_some());
        assert!(parse_modified("2025-01-01 10:00:00.123456").is_some());
        assert!(parse_modified("not a date").is_none());
        assert!(parse_modified("").is_none());
    }

    #[test]
    fn parse_modified_orders_correctly() {
        let earlier = parse_modified("2025-01-02 09:00:00").unwrap();
        let later = parse_modified("2025-01-02 10:00:00").unwrap();
        assert!(later > earlier);
    }
}
