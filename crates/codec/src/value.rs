//! Canonical serialization of JSON values into secondary-index keys.
//!
//! Two values are equal in a secondary index iff their serializations are
//! byte-identical, so the encoding must be canonical: one byte string per
//! equivalence class. Layout is a 1-byte type tag followed by type-specific
//! payload bytes:
//!
//! ```text
//! 0x00  "null" | "undefined"          null vs. absent path
//! 0x01  "0" | "1"                     booleans
//! 0x02  canonical scientific notation numbers (as f64)
//! 0x03  raw UTF-8                     strings
//! 0x04  compact JSON                  arrays and objects
//! ```
//!
//! Existing filter queries rely on this equality, so the number and JSON
//! canonicalizations below must not change between versions.

use serde_json::Value;

/// Tag for JSON null (`"null"`) and absent paths (`"undefined"`).
pub const TAG_NULL: u8 = 0x00;
/// Tag for booleans, payload `"0"` or `"1"`.
pub const TAG_BOOL: u8 = 0x01;
/// Tag for numbers, payload per [`canonical_number`].
pub const TAG_NUMBER: u8 = 0x02;
/// Tag for strings, payload is the raw UTF-8.
pub const TAG_STRING: u8 = 0x03;
/// Tag for arrays and objects, payload is compact JSON with sorted keys.
pub const TAG_JSON: u8 = 0x04;

/// Serializes a value looked up at an indexed path into its index key.
///
/// `None` means the dotted-path lookup found nothing ("absent"); the
/// encoding is total even though absent values are never actually indexed.
///
/// Integer and float representations of the same number yield the same key
/// (`1` and `1.0` both canonicalize through f64), matching
/// [`deep_equal`](crate::deep_equal)'s number semantics.
///
/// Arrays and objects serialize as compact JSON. serde_json's default map is
/// a `BTreeMap`, so object keys are always traversed in sorted order and two
/// structurally equal objects produce identical payloads regardless of the
/// key order they were built with.
#[must_use]
pub fn serialize_index_value(value: Option<&Value>) -> Vec<u8> {
    let (tag, payload) = match value {
        None => (TAG_NULL, "undefined".to_string()),
        Some(Value::Null) => (TAG_NULL, "null".to_string()),
        Some(Value::Bool(b)) => (TAG_BOOL, if *b { "1" } else { "0" }.to_string()),
        Some(Value::Number(n)) => (
            TAG_NUMBER,
            canonical_number(n.as_f64().unwrap_or(f64::NAN)),
        ),
        Some(Value::String(s)) => (TAG_STRING, s.clone()),
        Some(v) => (TAG_JSON, v.to_string()),
    };

    let mut out = Vec::with_capacity(1 + payload.len());
    out.push(tag);
    out.extend_from_slice(payload.as_bytes());
    out
}

/// Canonical scientific-notation form of a number.
///
/// Explicit mantissa sign, one integer digit, 15 fractional digits, `e`,
/// explicit exponent sign: `+1.500000000000000e+0`. Negative zero collapses
/// into positive zero so `0` and `-0` share a key. Non-finite values use the
/// sentinels `NaN`, `+Infinity`, `-Infinity`.
fn canonical_number(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n == f64::INFINITY {
        return "+Infinity".to_string();
    }
    if n == f64::NEG_INFINITY {
        return "-Infinity".to_string();
    }
    // -0.0 == 0.0 under IEEE comparison; rebind so both format identically.
    let n = if n == 0.0 { 0.0 } else { n };

    let s = format!("{:+.15e}", n);

    // `{:+.15e}` renders non-negative exponents without a sign ("e0");
    // insert the `+` so the form is fully canonical.
    match s.find('e') {
        Some(pos) if !matches!(s.as_bytes().get(pos + 1), Some(b'+') | Some(b'-')) => {
            format!("{}e+{}", &s[..pos], &s[pos + 1..])
        }
        _ => s,
    }
}

#[cfg(test)]
mod value_tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn canonical_number_forms() {
        assert_eq!(canonical_number(1.5), "+1.500000000000000e+0");
        assert_eq!(canonical_number(-12.0), "-1.200000000000000e+1");
        assert_eq!(canonical_number(0.001), "+1.000000000000000e-3");
        assert_eq!(canonical_number(0.0), "+0.000000000000000e+0");
        assert_eq!(canonical_number(-0.0), "+0.000000000000000e+0");
        assert_eq!(canonical_number(f64::NAN), "NaN");
        assert_eq!(canonical_number(f64::INFINITY), "+Infinity");
        assert_eq!(canonical_number(f64::NEG_INFINITY), "-Infinity");
    }

    #[test]
    fn integer_and_float_share_a_key() {
        assert_eq!(
            serialize_index_value(Some(&json!(1))),
            serialize_index_value(Some(&json!(1.0))),
        );
    }

    #[test]
    fn null_and_absent_are_distinct() {
        assert_ne!(
            serialize_index_value(Some(&serde_json::Value::Null)),
            serialize_index_value(None),
        );
    }

    #[test]
    fn object_key_order_does_not_matter() {
        let a = serde_json::from_str::<serde_json::Value>(r#"{"a":1,"b":2}"#).unwrap();
        let b = serde_json::from_str::<serde_json::Value>(r#"{"b":2,"a":1}"#).unwrap();
        assert_eq!(
            serialize_index_value(Some(&a)),
            serialize_index_value(Some(&b)),
        );
    }
}
