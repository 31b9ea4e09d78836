use crate::*;
use std::collections::BTreeMap;

// ============================================================================
//  STRUCTURE (Happy Path)
// ============================================================================

#[test]
fn test_nested_envelope_shape_roundtrip() -> Result<()> {
    let value = Value::map([
        ("id", Value::Int(7)),
        ("message", Value::map([
            ("type", Value::from("dispatch")),
            ("method", Value::from("square")),
            ("payload", Value::List(vec![Value::Int(-3), Value::Float(0.5), Value::Unit, Value::Bool(true)])),
        ])),
    ]);

    let bytes = encode(&value)?;
    assert_eq!(decode(&bytes)?, value);
    Ok(())
}

#[test]
fn test_scalar_layout() -> Result<()> {
    assert_eq!(encode(&Value::Unit)?, vec![Tag::Unit as u8]);
    assert_eq!(encode(&Value::Bool(false))?, vec![Tag::BoolFalse as u8]);

    let bytes = encode(&Value::Int(1))?;
    assert_eq!(bytes, vec![Tag::S64 as u8, 1, 0, 0, 0, 0, 0, 0, 0]);

    let bytes = encode(&Value::from("hi"))?;
    assert_eq!(bytes, vec![Tag::String as u8, 2, 0, 0, 0, b'h', b'i']);
    Ok(())
}

#[test]
fn test_container_length_is_backpatched() -> Result<()> {
    let bytes = encode(&Value::List(vec![Value::Unit, Value::Bool(true)]))?;
    assert_eq!(bytes, vec![Tag::List as u8, 2, 0, 0, 0, Tag::Unit as u8, Tag::BoolTrue as u8]);
    Ok(())
}

#[test]
fn test_empty_containers() -> Result<()> {
    let value = Value::List(vec![Value::List(vec![]), Value::Map(BTreeMap::new())]);
    assert_eq!(decode(&encode(&value)?)?, value);
    Ok(())
}

#[test]
fn test_float_specials_survive() -> Result<()> {
    let bytes = encode(&Value::Float(f64::INFINITY))?;
    assert_eq!(decode(&bytes)?, Value::Float(f64::INFINITY));

    let bytes = encode(&Value::Float(f64::NAN))?;
    match decode(&bytes)? {
        Value::Float(v) => assert!(v.is_nan()),
        other => panic!("expected float, got {:?}", other),
    }
    Ok(())
}

// ============================================================================
//  HOSTILE INPUT
// ============================================================================

#[test]
fn test_empty_buffer_fails() {
    assert_eq!(decode(&[]), Err(Error::UnexpectedEnd));
}

#[test]
fn test_unknown_tag_fails() {
    assert_eq!(decode(&[0xFF, 0xFF, 0xFF]), Err(Error::InvalidTag(0xFF)));
}

#[test]
fn test_truncated_scalar_fails() {
    assert_eq!(decode(&[Tag::S64 as u8, 1, 2, 3]), Err(Error::UnexpectedEnd));
}

#[test]
fn test_length_past_end_fails() {
    // Claims a 100-byte string but carries 2 bytes.
    assert_eq!(decode(&[Tag::String as u8, 100, 0, 0, 0, b'h', b'i']), Err(Error::UnexpectedEnd));
}

#[test]
fn test_invalid_utf8_fails() {
    assert_eq!(decode(&[Tag::String as u8, 2, 0, 0, 0, 0xC3, 0x28]), Err(Error::InvalidUtf8));
}

#[test]
fn test_trailing_bytes_fail() {
    assert_eq!(decode(&[Tag::Unit as u8, Tag::Unit as u8]), Err(Error::TrailingBytes(1)));
}

#[test]
fn test_map_key_must_be_string() {
    // Map body starts with a bool where a key is expected.
    let bytes = [Tag::Map as u8, 2, 0, 0, 0, Tag::BoolTrue as u8, Tag::Unit as u8];
    assert_eq!(decode(&bytes), Err(Error::InvalidTag(Tag::BoolTrue as u8)));
}

#[test]
fn test_duplicate_map_key_fails() {
    let entry = [Tag::String as u8, 1, 0, 0, 0, b'a', Tag::Unit as u8];
    let mut bytes = vec![Tag::Map as u8, 14, 0, 0, 0];
    bytes.extend_from_slice(&entry);
    bytes.extend_from_slice(&entry);

    assert_eq!(decode(&bytes), Err(Error::DuplicateKey("a".into())));
}

#[test]
fn test_container_body_is_isolated() {
    // The list claims one byte of body, but its only item needs nine.
    let bytes = [Tag::List as u8, 1, 0, 0, 0, Tag::S64 as u8, 0, 0, 0, 0, 0, 0, 0, 0];
    assert_eq!(decode(&bytes), Err(Error::UnexpectedEnd));
}

fn nested_lists(levels: usize) -> Value {
    let mut value = Value::Unit;
    for _ in 0..levels {
        value = Value::List(vec![value]);
    }
    value
}

#[test]
fn test_depth_limit_is_inclusive() -> Result<()> {
    let value = nested_lists(MAX_DEPTH);
    assert_eq!(decode(&encode(&value)?)?, value);
    Ok(())
}

#[test]
fn test_encoder_rejects_excessive_depth() {
    assert_eq!(encode(&nested_lists(MAX_DEPTH + 1)), Err(Error::DepthExceeded(MAX_DEPTH)));
}

#[test]
fn test_decoder_rejects_excessive_depth() {
    // Hand-build MAX_DEPTH + 1 nested empty lists, innermost first.
    let mut bytes: Vec<u8> = vec![Tag::List as u8, 0, 0, 0, 0];
    for _ in 0..MAX_DEPTH {
        let mut outer = vec![Tag::List as u8];
        outer.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
        outer.extend_from_slice(&bytes);
        bytes = outer;
    }
    assert_eq!(decode(&bytes), Err(Error::DepthExceeded(MAX_DEPTH)));
}

// ============================================================================
//  VALUE HELPERS
// ============================================================================

#[test]
fn test_display_matches_script_stringification() {
    assert_eq!(Value::Unit.to_string(), "undefined");
    assert_eq!(Value::Float(3.0).to_string(), "3");
    assert_eq!(Value::Float(2.5).to_string(), "2.5");
    assert_eq!(Value::Float(f64::NEG_INFINITY).to_string(), "-Infinity");
    assert_eq!(Value::List(vec![Value::Int(1), Value::Unit, Value::from("x")]).to_string(), "1,,x");
    assert_eq!(Value::map([("a", Value::Int(1))]).to_string(), "[object Object]");
}

#[test]
fn test_accessors() {
    let value = Value::map([("message", Value::from("boom"))]);
    assert_eq!(value.get("message").and_then(Value::as_str), Some("boom"));
    assert_eq!(value.get("missing"), None);
    assert_eq!(Value::Int(2).as_float(), Some(2.0));
    assert_eq!(Value::from("2").as_int(), None);
    assert!(Value::default().is_unit());
}
