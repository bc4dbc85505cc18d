//! Canonical JSON — recursively sorted keys, compact separators.
//!
//! Used by the audit log (entry_hash), the attestation bundle (bundle_id /
//! signature), and anywhere else a record is hashed. One implementation,
//! shared, so "canonical" means exactly one thing across this crate graph.

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Recursively rebuild `value` so every object is key-sorted, then render
/// it with `serde_json::to_string` (no whitespace). `serde_json::Value`'s
/// default map already iterates in sorted order without the
/// `preserve_order` feature, but we rebuild explicitly so this property
/// does not depend on a cargo feature flag staying off project-wide.
pub fn sort_keys(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<String, Value> = map
                .iter()
                .map(|(k, v)| (k.clone(), sort_keys(v)))
                .collect();
            let mut out = serde_json::Map::new();
            for (k, v) in sorted {
                out.insert(k, v);
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(sort_keys).collect()),
        other => other.clone(),
    }
}

/// Canonical compact JSON string for an arbitrary serializable value.
pub fn to_canonical_json(value: &impl Serialize) -> String {
    let raw = serde_json::to_value(value).expect("value must serialize to JSON");
    let sorted = sort_keys(&raw);
    serde_json::to_string(&sorted).expect("canonical value must serialize")
}

/// Canonical JSON string for a `serde_json::Value`, dropping the named
/// top-level keys first (used to exclude self-referential fields such as
/// `entry_hash` or `signature` before hashing/signing).
pub fn to_canonical_json_excluding(value: &Value, exclude: &[&str]) -> String {
    let mut value = value.clone();
    if let Value::Object(map) = &mut value {
        for key in exclude {
            map.remove(*key);
        }
    }
    let sorted = sort_keys(&value);
    serde_json::to_string(&sorted).expect("canonical value must serialize")
}
