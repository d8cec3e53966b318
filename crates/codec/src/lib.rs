//! # Codec — binary primitives and document utilities
//!
//! The leaf crate shared by every other SmolDB crate. It owns three small,
//! dependency-light concerns:
//!
//! - **Length-prefixed string/byte codecs** used by the index file format
//!   (`u16` prefixes for identifiers and field paths, `u32` prefixes for
//!   serialized index values). All integers are little-endian.
//! - **CRC-32** (reflected IEEE polynomial `0xEDB88320`, initial register
//!   `0xFFFFFFFF`, final XOR `0xFFFFFFFF`) via [`crc32`].
//! - **Document utilities**: canonical serialization of JSON values into
//!   secondary-index keys ([`serialize_index_value`]), dotted-path lookup
//!   ([`get_nested`]), structural equality ([`deep_equal`]) and filter
//!   matching ([`matches`]).
//!
//! ## Example
//!
//! ```rust
//! use codec::{get_nested, serialize_index_value};
//! use serde_json::json;
//!
//! let doc = json!({"profile": {"country": "US"}});
//! let v = get_nested(&doc, "profile.country");
//! assert_eq!(v, Some(&json!("US")));
//!
//! // Two index keys are equal iff the values are index-equal.
//! assert_eq!(
//!     serialize_index_value(v),
//!     serialize_index_value(Some(&json!("US"))),
//! );
//! ```

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use crc32fast::Hasher as Crc32;
use std::io::{self, Read, Write};

mod value;

pub use value::{
    serialize_index_value, TAG_BOOL, TAG_JSON, TAG_NULL, TAG_NUMBER, TAG_STRING,
};

/// Computes the CRC-32 of `bytes` (reflected IEEE polynomial).
///
/// `crc32fast` implements exactly the classic table-driven algorithm the
/// on-disk format prescribes: init `0xFFFFFFFF`, final XOR `0xFFFFFFFF`.
#[must_use]
pub fn crc32(bytes: &[u8]) -> u32 {
    let mut hasher = Crc32::new();
    hasher.update(bytes);
    hasher.finalize()
}

/// Appends a `u16`-length-prefixed UTF-8 string to `w`.
///
/// Used for document ids and index field paths, both of which the index file
/// format caps at `u16::MAX` bytes.
///
/// # Errors
///
/// Returns `InvalidInput` if the string exceeds 65 535 bytes.
pub fn write_str_u16<W: Write>(w: &mut W, s: &str) -> io::Result<()> {
    if s.len() > u16::MAX as usize {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("string too long for u16 prefix: {} bytes", s.len()),
        ));
    }
    w.write_u16::<LittleEndian>(s.len() as u16)?;
    w.write_all(s.as_bytes())
}

/// Reads a `u16`-length-prefixed UTF-8 string from `r`.
///
/// # Errors
///
/// Returns `InvalidData` if the bytes are not valid UTF-8, or any underlying
/// I/O error (including `UnexpectedEof` on a truncated prefix or body).
pub fn read_str_u16<R: Read>(r: &mut R) -> io::Result<String> {
    let len = r.read_u16::<LittleEndian>()? as usize;
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    String::from_utf8(buf)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, format!("invalid utf-8: {}", e)))
}

/// Appends a `u32`-length-prefixed byte string to `w`.
///
/// Used for serialized secondary-index values, which can exceed the `u16`
/// range (tag `0x04` carries whole JSON documents).
pub fn write_bytes_u32<W: Write>(w: &mut W, bytes: &[u8]) -> io::Result<()> {
    if bytes.len() > u32::MAX as usize {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "byte string too long for u32 prefix",
        ));
    }
    w.write_u32::<LittleEndian>(bytes.len() as u32)?;
    w.write_all(bytes)
}

/// Reads a `u32`-length-prefixed byte string from `r`, refusing lengths
/// above `max` (OOM guard against corrupt files).
pub fn read_bytes_u32<R: Read>(r: &mut R, max: usize) -> io::Result<Vec<u8>> {
    let len = r.read_u32::<LittleEndian>()? as usize;
    if len > max {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("length {} exceeds maximum {}", len, max),
        ));
    }
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    Ok(buf)
}

/// Looks up a dotted path (`"a.b.c"`) in a JSON document.
///
/// Walks keys left-to-right. Returns `None` ("absent") when any intermediate
/// value is not an object — including null — or when a key is missing.
/// Absent values are never indexed and never match a filter.
#[must_use]
pub fn get_nested<'a>(doc: &'a serde_json::Value, path: &str) -> Option<&'a serde_json::Value> {
    let mut current = doc;
    for segment in path.split('.') {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Structural equality over JSON values.
///
/// - Arrays are order-sensitive, objects are key-order-insensitive.
/// - Numbers compare as `f64`, so integer `1` equals float `1.0` — the same
///   equivalence [`serialize_index_value`] produces for index keys.
/// - Scalars of different types are never equal.
#[must_use]
pub fn deep_equal(a: &serde_json::Value, b: &serde_json::Value) -> bool {
    use serde_json::Value;
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        },
        (Value::String(x), Value::String(y)) => x == y,
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y.iter()).all(|(a, b)| deep_equal(a, b))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x.iter()
                    .all(|(k, v)| y.get(k).map_or(false, |w| deep_equal(v, w)))
        }
        _ => false,
    }
}

/// Returns `true` if `doc` satisfies every `(path, value)` entry of `filter`.
///
/// The filter is a conjunction: each entry requires
/// `deep_equal(get_nested(doc, path), value)`. An absent path matches
/// nothing (filters are JSON, so they cannot ask for "absent").
#[must_use]
pub fn matches(doc: &serde_json::Value, filter: &serde_json::Map<String, serde_json::Value>) -> bool {
    filter
        .iter()
        .all(|(path, expected)| get_nested(doc, path).map_or(false, |v| deep_equal(v, expected)))
}

#[cfg(test)]
mod tests;
