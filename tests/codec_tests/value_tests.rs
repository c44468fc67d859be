//! Tests for the tagged value codec
//!
//! These tests verify:
//! - Exact wire bytes for each value type
//! - Nested values and map insertion order survive a round trip
//! - Unknown tags, truncation, trailing bytes and bad strings are rejected
//! - Depth and ASCII limits from the config

use starpack::codec::{decode_value, encode_to_vec, Decoder, TypeTag};
use starpack::{Config, ErrorKind, Map, PackError, Value};

// =============================================================================
// Helper Functions
// =============================================================================

fn config() -> Config {
    Config::default()
}

fn round_trip(value: &Value) -> Value {
    let bytes = encode_to_vec(value, &config()).unwrap();
    decode_value(&bytes, &config()).unwrap()
}

fn player() -> Value {
    let mut map = Map::new();
    map.insert("hp".to_string(), Value::Integer(42));
    map.insert("name".to_string(), Value::from("Avian"));
    map.insert("tags".to_string(), Value::List(vec![Value::from("boss")]));
    Value::Map(map)
}

// =============================================================================
// Wire Format
// =============================================================================

#[test]
fn test_scalar_wire_bytes() {
    let cfg = config();
    assert_eq!(encode_to_vec(&Value::Null, &cfg).unwrap(), vec![0x01]);
    assert_eq!(encode_to_vec(&Value::Bool(true), &cfg).unwrap(), vec![0x03, 0x01]);
    assert_eq!(encode_to_vec(&Value::Bool(false), &cfg).unwrap(), vec![0x03, 0x00]);
    assert_eq!(encode_to_vec(&Value::Integer(42), &cfg).unwrap(), vec![0x04, 0x54]);
    assert_eq!(encode_to_vec(&Value::Integer(-1), &cfg).unwrap(), vec![0x04, 0x01]);
    assert_eq!(
        encode_to_vec(&Value::from("hi"), &cfg).unwrap(),
        vec![0x05, 0x02, b'h', b'i']
    );

    let mut double = vec![0x02];
    double.extend_from_slice(&1.5f64.to_be_bytes());
    assert_eq!(encode_to_vec(&Value::Double(1.5), &cfg).unwrap(), double);
}

#[test]
fn test_container_wire_bytes() {
    let cfg = config();
    let list = Value::List(vec![Value::Null, Value::Integer(1)]);
    assert_eq!(encode_to_vec(&list, &cfg).unwrap(), vec![0x06, 0x02, 0x01, 0x04, 0x02]);

    let map: Value = [("a", Value::Bool(true))].into_iter().collect();
    assert_eq!(
        encode_to_vec(&map, &cfg).unwrap(),
        vec![0x07, 0x01, 0x01, b'a', 0x03, 0x01]
    );
}

#[test]
fn test_type_tags() {
    assert_eq!(TypeTag::of(&Value::Null) as u8, 1);
    assert_eq!(TypeTag::of(&Value::Double(0.0)) as u8, 2);
    assert_eq!(TypeTag::of(&Value::Map(Map::new())) as u8, 7);
    assert_eq!(TypeTag::from_byte(0x05), Some(TypeTag::String));
    assert_eq!(TypeTag::from_byte(0x00), None);
    assert_eq!(TypeTag::from_byte(0x08), None);
}

// =============================================================================
// Round Trips
// =============================================================================

#[test]
fn test_player_map_round_trip() {
    let value = player();
    assert_eq!(round_trip(&value), value);
}

#[test]
fn test_map_insertion_order_preserved() {
    let value: Value = [("zeta", Value::Integer(1)), ("alpha", Value::Integer(2)), ("mid", Value::Null)]
        .into_iter()
        .collect();
    let decoded = round_trip(&value);
    let keys: Vec<&str> = decoded.as_map().unwrap().keys().map(String::as_str).collect();
    assert_eq!(keys, vec!["zeta", "alpha", "mid"]);
}

#[test]
fn test_nested_and_edge_values() {
    let value = Value::List(vec![
        Value::Double(-0.0),
        Value::Double(f64::MAX),
        Value::Integer(i64::MIN),
        Value::Integer(i64::MAX),
        Value::from(""),
        Value::from("ünïcødé ✓"),
        Value::List(vec![]),
        Value::Map(Map::new()),
        player(),
    ]);
    assert_eq!(round_trip(&value), value);
}

#[test]
fn test_non_finite_doubles_survive_binary_round_trip() {
    let cfg = config();
    let bytes = encode_to_vec(&Value::Double(f64::INFINITY), &cfg).unwrap();
    assert_eq!(decode_value(&bytes, &cfg).unwrap(), Value::Double(f64::INFINITY));

    let bytes = encode_to_vec(&Value::Double(f64::NAN), &cfg).unwrap();
    assert_eq!(decode_value(&bytes, &cfg).unwrap(), Value::Double(f64::NAN));
}

#[test]
fn test_doubles_compare_by_bits() {
    assert_eq!(Value::Double(f64::NAN), Value::Double(f64::NAN));
    assert_ne!(Value::Double(0.0), Value::Double(-0.0));
    assert_ne!(Value::Double(1.0), Value::Integer(1));

    let cfg = config();
    let positive = encode_to_vec(&Value::Double(0.0), &cfg).unwrap();
    let negative = encode_to_vec(&Value::Double(-0.0), &cfg).unwrap();
    assert_ne!(positive, negative);
    assert_eq!(decode_value(&negative, &cfg).unwrap(), Value::Double(-0.0));
}

#[test]
fn test_encoded_length_reported() {
    let mut buf = Vec::new();
    let written = starpack::codec::encode_value(&player(), &mut buf, &config()).unwrap();
    assert_eq!(written, buf.len());
}

// =============================================================================
// Malformed Input
// =============================================================================

#[test]
fn test_unknown_tag() {
    let err = decode_value(&[0x09], &config()).unwrap_err();
    assert!(matches!(err, PackError::UnknownTypeTag { tag: 0x09, offset: 0 }));
    assert_eq!(err.kind(), ErrorKind::Format);

    // Offset points at the bad element, not the container
    let err = decode_value(&[0x06, 0x02, 0x01, 0x00], &config()).unwrap_err();
    assert!(matches!(err, PackError::UnknownTypeTag { tag: 0x00, offset: 3 }));
}

#[test]
fn test_truncated_input() {
    let cfg = config();
    assert!(matches!(
        decode_value(&[0x02, 0x00, 0x00], &cfg).unwrap_err(),
        PackError::TruncatedInput { .. }
    ));
    assert!(matches!(
        decode_value(&[0x05, 0x05, b'a'], &cfg).unwrap_err(),
        PackError::TruncatedInput { .. }
    ));
    assert!(matches!(decode_value(&[], &cfg).unwrap_err(), PackError::TruncatedInput { .. }));
}

#[test]
fn test_huge_count_does_not_allocate() {
    // Claims u64::MAX / 2 elements with two bytes of input left
    let mut bytes = vec![0x06];
    bytes.extend_from_slice(&starpack::codec::varint::encode_u64(u64::MAX / 2));
    bytes.extend_from_slice(&[0x01, 0x01]);
    let err = decode_value(&bytes, &config()).unwrap_err();
    assert!(matches!(err, PackError::TruncatedInput { .. }));
}

#[test]
fn test_trailing_bytes_rejected() {
    let err = decode_value(&[0x01, 0x01], &config()).unwrap_err();
    assert!(matches!(err, PackError::CorruptRecord(_)));
}

#[test]
fn test_invalid_utf8_rejected() {
    let err = decode_value(&[0x05, 0x02, 0xc3, 0x28], &config()).unwrap_err();
    assert!(matches!(err, PackError::InvalidString { offset: 2, .. }));
}

#[test]
fn test_duplicate_map_key_rejected() {
    let bytes = [0x07, 0x02, 0x01, b'k', 0x01, 0x01, b'k', 0x01];
    let err = decode_value(&bytes, &config()).unwrap_err();
    assert!(matches!(err, PackError::CorruptRecord(_)));
}

// =============================================================================
// Config Limits
// =============================================================================

#[test]
fn test_depth_limit() {
    let cfg = Config::builder().max_value_depth(3).build();

    let mut value = Value::Null;
    for _ in 0..3 {
        value = Value::List(vec![value]);
    }
    let bytes = encode_to_vec(&value, &cfg).unwrap();
    assert_eq!(decode_value(&bytes, &cfg).unwrap(), value);

    let deeper = Value::List(vec![value]);
    assert!(matches!(
        encode_to_vec(&deeper, &cfg).unwrap_err(),
        PackError::DepthLimitExceeded { limit: 3 }
    ));

    let bytes = encode_to_vec(&deeper, &config()).unwrap();
    assert!(matches!(
        decode_value(&bytes, &cfg).unwrap_err(),
        PackError::DepthLimitExceeded { limit: 3 }
    ));
}

#[test]
fn test_ascii_only_mode() {
    let ascii = Config::builder().ascii_only(true).build();
    let value = Value::from("café");

    assert!(matches!(
        encode_to_vec(&value, &ascii).unwrap_err(),
        PackError::InvalidString { .. }
    ));

    let bytes = encode_to_vec(&value, &config()).unwrap();
    assert!(matches!(
        decode_value(&bytes, &ascii).unwrap_err(),
        PackError::InvalidString { .. }
    ));

    let plain = Value::from("cafe");
    let bytes = encode_to_vec(&plain, &ascii).unwrap();
    assert_eq!(decode_value(&bytes, &ascii).unwrap(), plain);
}

#[test]
fn test_decoder_cursor() {
    let cfg = config();
    let mut bytes = encode_to_vec(&Value::Integer(7), &cfg).unwrap();
    bytes.extend(encode_to_vec(&Value::from("x"), &cfg).unwrap());

    let mut decoder = Decoder::new(&bytes, &cfg);
    assert_eq!(decoder.read_value().unwrap(), Value::Integer(7));
    assert_eq!(decoder.position(), 2);
    assert_eq!(decoder.read_value().unwrap(), Value::from("x"));
    assert!(decoder.is_empty());
    decoder.finish().unwrap();
}

#[test]
fn test_default_config_accepts_utf8() {
    let cfg = Config::default();
    assert!(!cfg.ascii_only);
    let value = Value::from("Ñuñoa ✓");
    let bytes = encode_to_vec(&value, &cfg).unwrap();
    assert_eq!(decode_value(&bytes, &cfg).unwrap(), value);
}
