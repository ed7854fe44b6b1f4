//! Store-native typed attribute values.
//!
//! Pure data types mirroring the value model of a wide-column store: every
//! attribute carries its type tag, numbers travel as decimal strings.

use std::cmp::Ordering;
use std::collections::HashMap;

use serde_json::{Map, Number, Value};

/// A single stored row (or key) as attribute name -> typed value.
pub type Item = HashMap<String, AttrValue>;

/// A typed attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    /// String.
    S(String),
    /// Number, kept as its decimal representation.
    N(String),
    /// Boolean.
    Bool(bool),
    /// Explicit null.
    Null,
    /// Binary.
    B(Vec<u8>),
    /// List of values.
    L(Vec<AttrValue>),
    /// Nested map.
    M(HashMap<String, AttrValue>),
}

impl AttrValue {
    /// Builds a number value from anything that formats as a number.
    pub fn number(n: impl std::fmt::Display) -> Self {
        AttrValue::N(n.to_string())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::S(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            AttrValue::N(n) => n.parse().ok(),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            AttrValue::N(n) => n.parse().ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttrValue::N(n) => n.parse().ok(),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, AttrValue::Null)
    }

    /// Orders two values of the same scalar kind.
    ///
    /// - Strings: lexicographic (byte order)
    /// - Numbers: numeric
    /// - Binary: byte order
    /// - Booleans and nulls: equality only
    /// - Mismatched kinds: `None`
    pub fn compare(&self, other: &AttrValue) -> Option<Ordering> {
        match (self, other) {
            (AttrValue::S(a), AttrValue::S(b)) => Some(a.as_bytes().cmp(b.as_bytes())),
            (AttrValue::N(a), AttrValue::N(b)) => {
                let a: f64 = a.parse().ok()?;
                let b: f64 = b.parse().ok()?;
                a.partial_cmp(&b)
            }
            (AttrValue::B(a), AttrValue::B(b)) => Some(a.cmp(b)),
            (AttrValue::Bool(a), AttrValue::Bool(b)) if a == b => Some(Ordering::Equal),
            (AttrValue::Null, AttrValue::Null) => Some(Ordering::Equal),
            (a, b) if a == b => Some(Ordering::Equal),
            _ => None,
        }
    }

    /// Converts a JSON document into a typed value.
    pub fn from_json(value: Value) -> Self {
        match value {
            Value::Null => AttrValue::Null,
            Value::Bool(b) => AttrValue::Bool(b),
            Value::Number(n) => AttrValue::N(n.to_string()),
            Value::String(s) => AttrValue::S(s),
            Value::Array(values) => {
                AttrValue::L(values.into_iter().map(AttrValue::from_json).collect())
            }
            Value::Object(map) => AttrValue::M(
                map.into_iter()
                    .map(|(k, v)| (k, AttrValue::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Converts a typed value back into JSON.
    ///
    /// Binary values become arrays of bytes; numbers that do not parse are
    /// kept as strings rather than dropped.
    pub fn into_json(self) -> Value {
        match self {
            AttrValue::Null => Value::Null,
            AttrValue::Bool(b) => Value::Bool(b),
            AttrValue::S(s) => Value::String(s),
            AttrValue::N(n) => parse_json_number(&n).unwrap_or(Value::String(n)),
            AttrValue::B(bytes) => Value::Array(
                bytes
                    .into_iter()
                    .map(|b| Value::Number(Number::from(b)))
                    .collect(),
            ),
            AttrValue::L(values) => {
                Value::Array(values.into_iter().map(AttrValue::into_json).collect())
            }
            AttrValue::M(map) => Value::Object(
                map.into_iter()
                    .map(|(k, v)| (k, v.into_json()))
                    .collect::<Map<String, Value>>(),
            ),
        }
    }
}

fn parse_json_number(n: &str) -> Option<Value> {
    if let Ok(i) = n.parse::<i64>() {
        return Some(Value::Number(Number::from(i)));
    }
    if let Ok(u) = n.parse::<u64>() {
        return Some(Value::Number(Number::from(u)));
    }
    n.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        AttrValue::S(value.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(value: String) -> Self {
        AttrValue::S(value)
    }
}

impl From<&String> for AttrValue {
    fn from(value: &String) -> Self {
        AttrValue::S(value.clone())
    }
}

impl From<bool> for AttrValue {
    fn from(value: bool) -> Self {
        AttrValue::Bool(value)
    }
}

macro_rules! number_from {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for AttrValue {
                fn from(value: $ty) -> Self {
                    AttrValue::N(value.to_string())
                }
            }
        )*
    };
}

number_from!(i32, i64, u32, u64, usize, f64);

impl<T: Into<AttrValue>> From<Option<T>> for AttrValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(AttrValue::Null)
    }
}
