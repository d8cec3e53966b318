use super::*;
use serde_json::{json, Map, Value};
use std::io::Cursor;

// --------------------- string / byte codecs ---------------------

#[test]
fn str_u16_round_trip() {
    let mut buf = Vec::new();
    write_str_u16(&mut buf, "user_1").unwrap();
    assert_eq!(&buf[..2], &6u16.to_le_bytes());

    let s = read_str_u16(&mut Cursor::new(&buf)).unwrap();
    assert_eq!(s, "user_1");
}

#[test]
fn str_u16_rejects_oversized() {
    let big = "x".repeat(u16::MAX as usize + 1);
    let mut buf = Vec::new();
    assert!(write_str_u16(&mut buf, &big).is_err());
}

#[test]
fn str_u16_truncated_is_eof() {
    let mut buf = Vec::new();
    write_str_u16(&mut buf, "hello").unwrap();
    buf.truncate(4); // cut into the body

    let err = read_str_u16(&mut Cursor::new(&buf)).unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::UnexpectedEof);
}

#[test]
fn bytes_u32_round_trip() {
    let mut buf = Vec::new();
    write_bytes_u32(&mut buf, b"\x03admin").unwrap();

    let out = read_bytes_u32(&mut Cursor::new(&buf), 1024).unwrap();
    assert_eq!(out, b"\x03admin");
}

#[test]
fn bytes_u32_enforces_cap() {
    let mut buf = Vec::new();
    write_bytes_u32(&mut buf, &[0u8; 100]).unwrap();

    assert!(read_bytes_u32(&mut Cursor::new(&buf), 10).is_err());
}

// --------------------- crc32 ---------------------

#[test]
fn crc32_known_vector() {
    // The classic IEEE check value for "123456789".
    assert_eq!(crc32(b"123456789"), 0xCBF4_3926);
    assert_eq!(crc32(b""), 0);
}

#[test]
fn crc32_detects_single_byte_flip() {
    let mut data = b"hello world".to_vec();
    let before = crc32(&data);
    data[4] ^= 0x01;
    assert_ne!(crc32(&data), before);
}

// --------------------- dotted-path lookup ---------------------

#[test]
fn get_nested_walks_objects() {
    let doc = json!({"a": {"b": {"c": 42}}});
    assert_eq!(get_nested(&doc, "a.b.c"), Some(&json!(42)));
    assert_eq!(get_nested(&doc, "a.b"), Some(&json!({"c": 42})));
}

#[test]
fn get_nested_absent_cases() {
    let doc = json!({"a": {"b": null, "s": "str"}, "n": 1});
    assert_eq!(get_nested(&doc, "missing"), None);
    assert_eq!(get_nested(&doc, "a.missing"), None);
    // Intermediate null is not an object.
    assert_eq!(get_nested(&doc, "a.b.c"), None);
    // Intermediate scalar is not an object.
    assert_eq!(get_nested(&doc, "a.s.x"), None);
    assert_eq!(get_nested(&doc, "n.x"), None);
    // But the null itself is reachable.
    assert_eq!(get_nested(&doc, "a.b"), Some(&Value::Null));
}

// --------------------- deep_equal ---------------------

#[test]
fn deep_equal_scalars() {
    assert!(deep_equal(&json!(null), &json!(null)));
    assert!(deep_equal(&json!(true), &json!(true)));
    assert!(deep_equal(&json!("x"), &json!("x")));
    assert!(deep_equal(&json!(1), &json!(1.0)));

    assert!(!deep_equal(&json!(1), &json!("1")));
    assert!(!deep_equal(&json!(0), &json!(false)));
    assert!(!deep_equal(&json!(null), &json!(0)));
}

#[test]
fn deep_equal_arrays_are_order_sensitive() {
    assert!(deep_equal(&json!([1, 2, 3]), &json!([1, 2, 3])));
    assert!(!deep_equal(&json!([1, 2, 3]), &json!([3, 2, 1])));
    assert!(!deep_equal(&json!([1, 2]), &json!([1, 2, 3])));
}

#[test]
fn deep_equal_objects_are_key_order_insensitive() {
    let a = serde_json::from_str::<Value>(r#"{"x":1,"y":[true]}"#).unwrap();
    let b = serde_json::from_str::<Value>(r#"{"y":[true],"x":1}"#).unwrap();
    assert!(deep_equal(&a, &b));

    let c = json!({"x": 1});
    assert!(!deep_equal(&a, &c));
}

// --------------------- filter matching ---------------------

fn filter(v: Value) -> Map<String, Value> {
    v.as_object().unwrap().clone()
}

#[test]
fn matches_is_a_conjunction() {
    let doc = json!({"role": "admin", "active": true});

    assert!(matches(&doc, &filter(json!({"role": "admin"}))));
    assert!(matches(&doc, &filter(json!({"role": "admin", "active": true}))));
    assert!(!matches(&doc, &filter(json!({"role": "admin", "active": false}))));
}

#[test]
fn matches_empty_filter_accepts_everything() {
    let doc = json!({"anything": 1});
    assert!(matches(&doc, &Map::new()));
}

#[test]
fn matches_dotted_paths() {
    let doc = json!({"profile": {"country": "US"}});
    assert!(matches(&doc, &filter(json!({"profile.country": "US"}))));
    assert!(!matches(&doc, &filter(json!({"profile.country": "DE"}))));
    // Absent path never matches.
    assert!(!matches(&doc, &filter(json!({"profile.city": null}))));
}
