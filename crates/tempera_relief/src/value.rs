//! Dynamic values flowing through properties, paths and bindings.
//!
//! Arrays and objects are shared references: cloning a [`Value`] clones the
//! handle, not the contents. This gives paths and bindings the same identity
//! semantics as script objects (a mutation through one handle is visible
//! through all of them, and dirty checks on objects compare identity).

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use tempera_carton::{format_compact, CompactString};

/// Object storage. Keys are kept sorted so serialization is deterministic.
pub type ObjectMap = BTreeMap<CompactString, Value>;
/// Shared array handle.
pub type ArrayRef = Rc<RefCell<Vec<Value>>>;
/// Shared object handle.
pub type ObjectRef = Rc<RefCell<ObjectMap>>;

/// A dynamically typed value.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(CompactString),
    Array(ArrayRef),
    Object(ObjectRef),
}

/// Index and `length` writes never grow an array past this length.
pub const MAX_ARRAY_LEN: usize = 1 << 24;

/// Shrinking is always allowed; growing only up to [`MAX_ARRAY_LEN`].
#[inline]
fn can_resize(current: usize, len: usize) -> bool {
    len <= current || len <= MAX_ARRAY_LEN
}

impl Value {
    /// Create an empty object.
    pub fn object() -> Self {
        Value::Object(Rc::new(RefCell::new(ObjectMap::new())))
    }

    /// Create an object from key/value pairs.
    pub fn object_from<K, V, I>(entries: I) -> Self
    where
        K: Into<CompactString>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        let map = entries
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect::<ObjectMap>();
        Value::Object(Rc::new(RefCell::new(map)))
    }

    /// Create an array from values.
    pub fn array(items: impl IntoIterator<Item = Value>) -> Self {
        Value::Array(Rc::new(RefCell::new(items.into_iter().collect())))
    }

    #[inline]
    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    /// `undefined` or `null`.
    #[inline]
    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    /// Arrays and objects (values compared by identity).
    #[inline]
    pub fn is_object_like(&self) -> bool {
        matches!(self, Value::Array(_) | Value::Object(_))
    }

    #[inline]
    pub fn is_nan(&self) -> bool {
        matches!(self, Value::Number(n) if n.is_nan())
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&ArrayRef> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Script truthiness.
    pub fn truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            Value::Array(_) | Value::Object(_) => true,
        }
    }

    /// Strict equality: primitives by value, arrays/objects by identity,
    /// `NaN` is not equal to itself.
    pub fn strict_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b),
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Strict equality where `NaN` equals `NaN`. This is the dirty-check
    /// comparison used for property writes.
    pub fn same_value(&self, other: &Value) -> bool {
        self.strict_eq(other) || (self.is_nan() && other.is_nan())
    }

    /// Read a single key: object member, array index or `length`.
    pub fn get_key(&self, key: &str) -> Value {
        match self {
            Value::Object(map) => map.borrow().get(key).cloned().unwrap_or_default(),
            Value::Array(items) => {
                let items = items.borrow();
                if key == "length" {
                    return Value::Number(items.len() as f64);
                }
                key.parse::<usize>()
                    .ok()
                    .and_then(|i| items.get(i).cloned())
                    .unwrap_or_default()
            }
            Value::String(s) if key == "length" => Value::Number(s.chars().count() as f64),
            _ => Value::Undefined,
        }
    }

    /// Write a single key. Returns `false` when `self` cannot hold keys, or
    /// when an array would grow past [`MAX_ARRAY_LEN`].
    pub fn set_key(&self, key: &str, value: Value) -> bool {
        match self {
            Value::Object(map) => {
                map.borrow_mut().insert(CompactString::from(key), value);
                true
            }
            Value::Array(items) => {
                let mut items = items.borrow_mut();
                if key == "length" {
                    return match value.as_f64() {
                        Some(len) if len.is_finite() && len >= 0.0 && len.fract() == 0.0 => {
                            let len = len as usize;
                            if !can_resize(items.len(), len) {
                                return false;
                            }
                            items.resize(len, Value::Undefined);
                            true
                        }
                        _ => false,
                    };
                }
                let Ok(index) = key.parse::<usize>() else {
                    return false;
                };
                if index >= items.len() {
                    match index.checked_add(1) {
                        Some(len) if can_resize(items.len(), len) => {
                            items.resize(len, Value::Undefined)
                        }
                        _ => return false,
                    }
                }
                items[index] = value;
                true
            }
            _ => false,
        }
    }

    /// String conversion used by text and compound bindings.
    ///
    /// `undefined` and `null` become the empty string here, unlike
    /// [`Display`](fmt::Display) which spells them out.
    pub fn to_binding_string(&self) -> CompactString {
        match self {
            Value::Undefined | Value::Null => CompactString::default(),
            other => format_compact!("{other}"),
        }
    }

    /// Convert to JSON. `undefined` and non-finite numbers become `null`.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Undefined | Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => number_to_json(*n),
            Value::String(s) => serde_json::Value::String(s.to_string()),
            Value::Array(items) => {
                serde_json::Value::Array(items.borrow().iter().map(Value::to_json).collect())
            }
            Value::Object(map) => serde_json::Value::Object(
                map.borrow()
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_json()))
                    .collect(),
            ),
        }
    }
}

fn number_to_json(n: f64) -> serde_json::Value {
    if n.fract() == 0.0 && n.abs() < 9.0e15 {
        serde_json::Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null)
    }
}

fn write_number(f: &mut fmt::Formatter<'_>, n: f64) -> fmt::Result {
    if n.is_nan() {
        f.write_str("NaN")
    } else if n.is_infinite() {
        f.write_str(if n > 0.0 { "Infinity" } else { "-Infinity" })
    } else if n.fract() == 0.0 && n.abs() < 1e21 {
        // -0 prints as 0
        write!(f, "{}", (n as i64))
    } else {
        write!(f, "{n}")
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => f.write_str("undefined"),
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => write_number(f, *n),
            Value::String(s) => f.write_str(s),
            Value::Array(items) => {
                for (i, item) in items.borrow().iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    if !item.is_nullish() {
                        write!(f, "{item}")?;
                    }
                }
                Ok(())
            }
            Value::Object(_) => f.write_str("[object Object]"),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => f.write_str("undefined"),
            Value::Number(n) if !n.is_finite() => write_number(f, *n),
            other => write!(f, "{}", other.to_json()),
        }
    }
}

/// Structural equality (deep for arrays and objects).
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b) || *a.borrow() == *b.borrow(),
            (Value::Object(a), Value::Object(b)) => {
                Rc::ptr_eq(a, b) || *a.borrow() == *b.borrow()
            }
            _ => self.strict_eq(other),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Undefined | Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Number(n) if n.fract() == 0.0 && n.abs() < 9.0e15 => {
                serializer.serialize_i64(*n as i64)
            }
            Value::Number(n) => serializer.serialize_f64(*n),
            Value::String(s) => serializer.serialize_str(s),
            Value::Array(items) => {
                let items = items.borrow();
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items.iter() {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Object(map) => {
                let map = map.borrow();
                let mut out = serializer.serialize_map(Some(map.len()))?;
                for (k, v) in map.iter() {
                    out.serialize_entry(k.as_str(), v)?;
                }
                out.end()
            }
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::String(s.into()),
            serde_json::Value::Array(items) => Value::array(items.into_iter().map(Value::from)),
            serde_json::Value::Object(map) => Value::object_from(map),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

macro_rules! impl_from_int {
    ($($t:ty),*) => {
        $(impl From<$t> for Value {
            fn from(n: $t) -> Self {
                Value::Number(n as f64)
            }
        })*
    };
}

impl_from_int!(i32, i64, u32, u64, usize);

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.into())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s.into())
    }
}

impl From<CompactString> for Value {
    fn from(s: CompactString) -> Self {
        Value::String(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::array(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_identity_vs_structure() {
        let a = Value::from(json!({"x": 1}));
        let b = Value::from(json!({"x": 1}));
        assert_eq!(a, b);
        assert!(!a.strict_eq(&b));
        assert!(a.strict_eq(&a.clone()));
    }

    #[test]
    fn test_nan_comparisons() {
        let nan = Value::Number(f64::NAN);
        assert!(!nan.strict_eq(&nan));
        assert!(nan.same_value(&nan));
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::Number(1.0).to_string(), "1");
        assert_eq!(Value::Number(1.5).to_string(), "1.5");
        assert_eq!(Value::Number(-0.0).to_string(), "0");
        assert_eq!(Value::from(json!([1, null, "a"])).to_string(), "1,,a");
        assert_eq!(Value::object().to_string(), "[object Object]");
        assert_eq!(Value::Undefined.to_binding_string(), "");
    }

    #[test]
    fn test_keys() {
        let v = Value::from(json!({"items": [1, 2, 3]}));
        let items = v.get_key("items");
        assert_eq!(items.get_key("length"), Value::from(3));
        assert_eq!(items.get_key("1"), Value::from(2));
        assert!(items.get_key("7").is_undefined());
        assert!(items.set_key("4", Value::from(5)));
        assert_eq!(items.get_key("length"), Value::from(5));
        assert!(items.get_key("3").is_undefined());
        assert!(!Value::from(1).set_key("a", Value::Null));
    }

    #[test]
    fn test_json_round_trip() {
        let json = json!({"a": [1, 2.5, {"b": null}], "c": "d", "e": true});
        assert_eq!(Value::from(json.clone()).to_json(), json);
        assert_eq!(
            serde_json::to_string(&Value::from(json!({"n": 3}))).unwrap(),
            r#"{"n":3}"#
        );
    }

    #[test]
    fn test_truthy() {
        assert!(!Value::Undefined.truthy());
        assert!(!Value::from("").truthy());
        assert!(!Value::Number(f64::NAN).truthy());
        assert!(Value::from("x").truthy());
        assert!(Value::array(Vec::new()).truthy());
    }
}
