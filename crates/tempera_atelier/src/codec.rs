//! Attribute serialization.
//!
//! Reflected properties are written to host attributes through an
//! [`AttributeCodec`], and observed attributes are read back into properties
//! using the property's declared [`TypeTag`].

use serde::Deserialize;
use tempera_carton::CompactString;
use tempera_relief::Value;

/// Declared property type, used when deserializing attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum TypeTag {
    #[default]
    Any,
    String,
    Number,
    Boolean,
    Object,
    Array,
}

/// Converts between property values and attribute strings.
pub trait AttributeCodec {
    /// `None` means the attribute is removed.
    fn serialize(&self, value: &Value) -> Option<CompactString>;

    /// `None` input means the attribute is absent.
    fn deserialize(&self, value: Option<&str>, type_tag: TypeTag) -> Value;
}

/// Boolean presence, JSON for objects and arrays, plain strings otherwise.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultCodec;

impl AttributeCodec for DefaultCodec {
    fn serialize(&self, value: &Value) -> Option<CompactString> {
        match value {
            Value::Bool(true) => Some(CompactString::default()),
            Value::Bool(false) | Value::Undefined | Value::Null => None,
            Value::Array(_) | Value::Object(_) => {
                Some(serde_json::to_string(value).map_or_else(|_| CompactString::default(), Into::into))
            }
            _ => Some(value.to_binding_string()),
        }
    }

    fn deserialize(&self, value: Option<&str>, type_tag: TypeTag) -> Value {
        match type_tag {
            TypeTag::Boolean => Value::Bool(value.is_some()),
            TypeTag::Number => Value::Number(value.map_or(0.0, parse_number)),
            TypeTag::Object => match value {
                Some(raw) => serde_json::from_str::<serde_json::Value>(raw)
                    .map_or_else(|_| Value::from(raw), Value::from),
                None => Value::Null,
            },
            TypeTag::Array => match value {
                Some(raw) => match serde_json::from_str::<serde_json::Value>(raw) {
                    Ok(json) => Value::from(json),
                    Err(err) => {
                        tracing::warn!("could not decode array attribute `{}`: {}", raw, err);
                        Value::Null
                    }
                },
                None => Value::Null,
            },
            TypeTag::String | TypeTag::Any => value.map_or(Value::Null, Value::from),
        }
    }
}

/// Script-style number parsing: trimmed, empty is zero, garbage is `NaN`.
pub fn parse_number(raw: &str) -> f64 {
    let raw = raw.trim();
    if raw.is_empty() {
        return 0.0;
    }
    match raw {
        "Infinity" | "+Infinity" => f64::INFINITY,
        "-Infinity" => f64::NEG_INFINITY,
        _ if raw.bytes().any(|b| b.is_ascii_alphabetic() && b != b'e' && b != b'E') => f64::NAN,
        _ => raw.parse().unwrap_or(f64::NAN),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialize() {
        let codec = DefaultCodec;
        assert_eq!(codec.serialize(&Value::Bool(true)).as_deref(), Some(""));
        assert_eq!(codec.serialize(&Value::Bool(false)), None);
        assert_eq!(codec.serialize(&Value::Null), None);
        assert_eq!(codec.serialize(&Value::from(3)).as_deref(), Some("3"));
        assert_eq!(codec.serialize(&Value::from("a b")).as_deref(), Some("a b"));
        let obj = Value::object_from([("a", Value::from(1))]);
        assert_eq!(codec.serialize(&obj).as_deref(), Some(r#"{"a":1}"#));
    }

    #[test]
    fn test_deserialize() {
        let codec = DefaultCodec;
        assert_eq!(codec.deserialize(Some(""), TypeTag::Boolean), Value::Bool(true));
        assert_eq!(codec.deserialize(None, TypeTag::Boolean), Value::Bool(false));
        assert_eq!(codec.deserialize(Some(" 42 "), TypeTag::Number), Value::from(42));
        assert!(codec.deserialize(Some("abc"), TypeTag::Number).is_nan());
        assert_eq!(codec.deserialize(Some("[1,2]"), TypeTag::Array), Value::array([1.into(), 2.into()]));
        assert_eq!(codec.deserialize(Some("[1,"), TypeTag::Array), Value::Null);
        assert_eq!(codec.deserialize(Some("plain"), TypeTag::Object), Value::from("plain"));
        assert_eq!(codec.deserialize(Some("x"), TypeTag::String), Value::from("x"));
        assert_eq!(codec.deserialize(None, TypeTag::Any), Value::Null);
    }

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number(""), 0.0);
        assert_eq!(parse_number("1e3"), 1000.0);
        assert_eq!(parse_number("-Infinity"), f64::NEG_INFINITY);
        assert!(parse_number("inf").is_nan());
    }
}
