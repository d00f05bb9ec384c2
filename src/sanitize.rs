//! Markup escaping for document payloads.
//!
//! [`sanitize`] walks an arbitrary JSON value and escapes every string leaf
//! so that the payload cannot be interpreted as HTML if a UI later renders it
//! without escaping. Object keys are left untouched; only values change.

use serde_json::{Map, Value as JsonValue};

/// Replacement table, applied in this order.
const ESCAPES: [(char, &str); 5] = [
    ('<', "&lt;"),
    ('>', "&gt;"),
    ('"', "&quot;"),
    ('\'', "&#x27;"),
    ('/', "&#x2F;"),
];

/// Returns a copy of `value` with every string leaf escaped.
///
/// Objects stay objects with the same keys, arrays keep their order, and
/// numbers, booleans and `null` pass through unchanged.
///
/// # Examples
///
/// ```rust
/// use offline_doc_store::sanitize;
/// use serde_json::json;
///
/// let clean = sanitize(&json!({"note": "a/b", "tags": ["<b>"], "n": 1}));
/// assert_eq!(clean, json!({"note": "a&#x2F;b", "tags": ["&lt;b&gt;"], "n": 1}));
/// ```
pub fn sanitize(value: &JsonValue) -> JsonValue {
    match value {
        JsonValue::String(s) => JsonValue::String(escape_str(s)),
        JsonValue::Array(items) => JsonValue::Array(items.iter().map(sanitize).collect()),
        JsonValue::Object(fields) => {
            let mut out = Map::with_capacity(fields.len());
            for (key, field) in fields {
                out.insert(key.clone(), sanitize(field));
            }
            JsonValue::Object(out)
        }
        other => other.clone(),
    }
}

/// Escapes the five markup-significant characters of a single string.
pub fn escape_str(input: &str) -> String {
    // Single pass; equivalent to sequential replacement since no
    // replacement text contains a later target character.
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ESCAPES.iter().find(|(target, _)| *target == ch) {
            Some((_, entity)) => out.push_str(entity),
            None => out.push(ch),
        }
    }
    out
}
