//! Canonical JSON encoding
//!
//! Compact separators, object keys sorted by their UTF-8 bytes at every
//! nesting level. Two semantically equal documents always produce the same
//! bytes, which is what the signing layer signs and verifies.

use serde_json::{Map, Value};
use thiserror::Error;

/// JSON that cannot be canonically encoded.
#[derive(Debug, Error)]
#[error("cannot canonicalize JSON: {0}")]
pub struct CanonicalJsonError(#[from] serde_json::Error);

/// Canonical encoding of an arbitrary JSON value.
pub fn canonical_json(value: &Value) -> Result<Vec<u8>, CanonicalJsonError> {
    let mut out = Vec::new();
    write_value(&mut out, value)?;
    Ok(out)
}

/// Canonical encoding of a JSON object's fields.
pub fn canonical_object(map: &Map<String, Value>) -> Result<Vec<u8>, CanonicalJsonError> {
    let mut out = Vec::new();
    write_object(&mut out, map)?;
    Ok(out)
}

fn write_value(out: &mut Vec<u8>, value: &Value) -> Result<(), CanonicalJsonError> {
    match value {
        Value::Object(map) => write_object(out, map),
        Value::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_value(out, item)?;
            }
            out.push(b']');
            Ok(())
        }
        scalar => {
            serde_json::to_writer(&mut *out, scalar)?;
            Ok(())
        }
    }
}

fn write_object(out: &mut Vec<u8>, map: &Map<String, Value>) -> Result<(), CanonicalJsonError> {
    let mut entries: Vec<(&String, &Value)> = map.iter().collect();
    entries.sort_by_key(|(key, _)| *key);

    out.push(b'{');
    for (i, (key, value)) in entries.iter().enumerate() {
        if i > 0 {
            out.push(b',');
        }
        serde_json::to_writer(&mut *out, key)?;
        out.push(b':');
        write_value(out, value)?;
    }
    out.push(b'}');
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn object_keys_are_sorted_at_every_level() {
        let value = json!({
            "zebra": 1,
            "alpha": {"nested_z": true, "nested_a": [1, 2, {"b": 1, "a": 2}]},
        });
        let bytes = canonical_json(&value).unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            r#"{"alpha":{"nested_a":[1,2,{"a":2,"b":1}],"nested_z":true},"zebra":1}"#
        );
    }

    #[test]
    fn encoding_is_independent_of_field_order_in_the_source_text() {
        let a: Value = serde_json::from_str(r#"{"b": 1, "a": {"y": 2, "x": 3}}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"a": {"x": 3, "y": 2}, "b": 1}"#).unwrap();
        assert_eq!(canonical_json(&a).unwrap(), canonical_json(&b).unwrap());
    }

    #[test]
    fn output_is_compact_and_keeps_unicode_raw() {
        let value = json!({"tag": "jobs.job-assigned", "süß": "ü"});
        let text = String::from_utf8(canonical_json(&value).unwrap()).unwrap();
        assert!(!text.contains(' '));
        assert!(text.contains("süß"));
    }

    #[test]
    fn scalars_encode_like_plain_json() {
        assert_eq!(canonical_json(&json!(null)).unwrap(), b"null");
        assert_eq!(canonical_json(&json!(true)).unwrap(), b"true");
        assert_eq!(canonical_json(&json!(42)).unwrap(), b"42");
        assert_eq!(canonical_json(&json!("x")).unwrap(), b"\"x\"");
    }
}
