use crate::document::Document;
use crate::errors::{DocketError, DocketResult, ErrorKind};
use std::fmt::{Debug, Display, Formatter};

/// Compare two floats for equality with proper NaN handling.
#[inline]
fn num_eq_float(a: f64, b: f64) -> bool {
    if a.is_nan() && b.is_nan() {
        true
    } else {
        a == b
    }
}

// 2^63 and 2^64, both exact in f64.
const I64_BOUND: f64 = 9_223_372_036_854_775_808.0;
const U64_BOUND: f64 = 18_446_744_073_709_551_616.0;

/// Exact comparison of an integer with a float.
#[inline]
fn i64_eq_float(a: i64, b: f64) -> bool {
    b.fract() == 0.0 && (-I64_BOUND..I64_BOUND).contains(&b) && b as i64 == a
}

#[inline]
fn u64_eq_float(a: u64, b: f64) -> bool {
    b.fract() == 0.0 && (0.0..U64_BOUND).contains(&b) && b as u64 == a
}

/// A node in a document tree.
///
/// Documents exchanged with the server are trees of dynamically typed values:
/// objects ([Value::Document]), arrays, strings, numbers, booleans and null.
/// Numbers keep their integral or floating form so the change comparator can
/// report the exact type a field had, but equality is numeric: `I64(10)`,
/// `U64(10)` and `F64(10.0)` compare equal.
///
/// # Examples
///
/// ```text
/// let v1: Value = 42.into();
/// let v2 = Value::from("Ann");
/// let doc = doc! { name: "Ann", age: 42 };
/// ```
#[derive(Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum Value {
    /// Represents a null value.
    #[default]
    Null,
    /// Represents a boolean value.
    Bool(bool),
    /// Represents a signed integer value.
    I64(i64),
    /// Represents an unsigned integer value too large for `i64`.
    U64(u64),
    /// Represents a floating point value.
    F64(f64),
    /// Represents a string value.
    String(String),
    /// Represents an array value.
    Array(Vec<Value>),
    /// Represents a nested object.
    Document(Document),
}

impl Debug for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_debug_string(0))
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_pretty_json(0))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Document(a), Value::Document(b)) => a == b,
            (Value::I64(a), Value::I64(b)) => a == b,
            (Value::U64(a), Value::U64(b)) => a == b,
            (Value::I64(a), Value::U64(b)) | (Value::U64(b), Value::I64(a)) => {
                *a >= 0 && *a as u64 == *b
            }
            (Value::I64(a), Value::F64(b)) | (Value::F64(b), Value::I64(a)) => i64_eq_float(*a, *b),
            (Value::U64(a), Value::F64(b)) | (Value::F64(b), Value::U64(a)) => u64_eq_float(*a, *b),
            (Value::F64(a), Value::F64(b)) => num_eq_float(*a, *b),
            _ => false,
        }
    }
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_bool(&self) -> bool {
        matches!(self, Value::Bool(_))
    }

    /// Returns `true` for integral numbers.
    pub fn is_integer(&self) -> bool {
        matches!(self, Value::I64(_) | Value::U64(_))
    }

    /// Returns `true` for floating point numbers.
    pub fn is_decimal(&self) -> bool {
        matches!(self, Value::F64(_))
    }

    pub fn is_number(&self) -> bool {
        self.is_integer() || self.is_decimal()
    }

    pub fn is_string(&self) -> bool {
        matches!(self, Value::String(_))
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Value::Array(_))
    }

    pub fn is_document(&self) -> bool {
        matches!(self, Value::Document(_))
    }

    /// Arrays and objects are containers; everything else is a scalar.
    pub fn is_container(&self) -> bool {
        self.is_array() || self.is_document()
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::I64(v) => Some(*v),
            Value::U64(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::I64(v) => u64::try_from(*v).ok(),
            Value::U64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::I64(v) => Some(*v as f64),
            Value::U64(v) => Some(*v as f64),
            Value::F64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<&String> {
        match self {
            Value::String(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        self.as_string().map(|s| s.as_str())
    }

    pub fn as_array(&self) -> Option<&Vec<Value>> {
        match self {
            Value::Array(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_array_mut(&mut self) -> Option<&mut Vec<Value>> {
        match self {
            Value::Array(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_document(&self) -> Option<&Document> {
        match self {
            Value::Document(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_document_mut(&mut self) -> Option<&mut Document> {
        match self {
            Value::Document(v) => Some(v),
            _ => None,
        }
    }

    /// Consumes the value and returns the nested document.
    ///
    /// # Errors
    ///
    /// Returns `InvalidDataType` when the value is not an object.
    pub fn into_document(self) -> DocketResult<Document> {
        match self {
            Value::Document(doc) => Ok(doc),
            other => {
                log::error!("Value {} is not a document", other);
                Err(DocketError::new(
                    "Value is not a document",
                    ErrorKind::InvalidDataType,
                ))
            }
        }
    }

    /// The JSON type name of this value, as reported in change descriptors.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "Null",
            Value::Bool(_) => "Boolean",
            Value::I64(_) | Value::U64(_) => "Integer",
            Value::F64(_) => "Float",
            Value::String(_) => "String",
            Value::Array(_) => "Array",
            Value::Document(_) => "Object",
        }
    }

    /// Renders the value the way change descriptors report it: strings
    /// verbatim, everything else as compact JSON.
    pub fn to_change_string(&self) -> String {
        match self {
            Value::String(v) => v.clone(),
            _ => self.to_compact_json(),
        }
    }

    /// Renders the value as single-line JSON.
    pub fn to_compact_json(&self) -> String {
        match self {
            Value::Null => "null".to_string(),
            Value::Bool(v) => v.to_string(),
            Value::I64(v) => v.to_string(),
            Value::U64(v) => v.to_string(),
            Value::F64(v) => format_float(*v),
            Value::String(v) => format!("\"{}\"", escape_json(v)),
            Value::Array(v) => {
                let items: Vec<String> = v.iter().map(|it| it.to_compact_json()).collect();
                format!("[{}]", items.join(","))
            }
            Value::Document(v) => v.to_compact_json(),
        }
    }

    pub(crate) fn to_pretty_json(&self, indent: usize) -> String {
        match self {
            Value::Null => "null".to_string(),
            Value::Bool(v) => v.to_string(),
            Value::I64(v) => v.to_string(),
            Value::U64(v) => v.to_string(),
            Value::F64(v) => format_float(*v),
            Value::String(v) => format!("\"{}\"", escape_json(v)),
            Value::Document(v) => v.to_pretty_json(indent),
            Value::Array(v) => {
                if v.is_empty() {
                    return "[]".to_string();
                }

                let mut json_str = String::new();
                json_str.push_str("[\n");
                let indent_str = " ".repeat(indent + 2);
                for value in v {
                    json_str.push_str(&format!(
                        "{}{},\n",
                        indent_str,
                        value.to_pretty_json(indent + 2)
                    ));
                }
                json_str.pop(); // remove last comma
                json_str.pop(); // remove last newline
                json_str.push_str(&format!("\n{}]", " ".repeat(indent)));
                json_str
            }
        }
    }

    pub(crate) fn to_debug_string(&self, indent: usize) -> String {
        match self {
            Value::Null => "null".to_string(),
            Value::Bool(v) => format!("bool({})", v),
            Value::I64(v) => format!("i64({})", v),
            Value::U64(v) => format!("u64({})", v),
            Value::F64(v) => format!("f64({})", v),
            Value::String(v) => format!("string(\"{}\")", v),
            Value::Document(v) => format!("object({})", v.to_debug_string(indent)),
            Value::Array(v) => {
                if v.is_empty() {
                    return "array([])".to_string();
                }

                let mut debug_str = String::new();
                debug_str.push_str("array([\n");
                let indent_str = " ".repeat(indent + 2);
                for value in v {
                    debug_str.push_str(&format!(
                        "{}{},\n",
                        indent_str,
                        value.to_debug_string(indent + 2)
                    ));
                }
                debug_str.pop();
                debug_str.pop();
                debug_str.push_str(&format!("\n{}])", " ".repeat(indent)));
                debug_str
            }
        }
    }
}

fn format_float(v: f64) -> String {
    if v.is_finite() && v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{:.1}", v)
    } else {
        v.to_string()
    }
}

pub(crate) fn escape_json(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '"' => escaped.push_str("\\\""),
            '\\' => escaped.push_str("\\\\"),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            '\t' => escaped.push_str("\\t"),
            c if (c as u32) < 0x20 => escaped.push_str(&format!("\\u{:04x}", c as u32)),
            c => escaped.push(c),
        }
    }
    escaped
}

macro_rules! impl_from_signed {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Value {
                fn from(value: $t) -> Self {
                    Value::I64(value as i64)
                }
            }
        )*
    };
}

impl_from_signed!(i8, i16, i32, i64, isize, u8, u16, u32);

impl From<u64> for Value {
    fn from(value: u64) -> Self {
        match i64::try_from(value) {
            Ok(v) => Value::I64(v),
            Err(_) => Value::U64(value),
        }
    }
}

impl From<usize> for Value {
    fn from(value: usize) -> Self {
        Value::from(value as u64)
    }
}

impl From<f32> for Value {
    fn from(value: f32) -> Self {
        Value::F64(value as f64)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::F64(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<char> for Value {
    fn from(value: char) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<&String> for Value {
    fn from(value: &String) -> Self {
        Value::String(value.clone())
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<Document> for Value {
    fn from(value: Document) -> Self {
        Value::Document(value)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(value: Vec<T>) -> Self {
        Value::Array(value.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => v.into(),
            None => Value::Null,
        }
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::Null
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc;

    #[test]
    fn test_numeric_equality_across_forms() {
        assert_eq!(Value::I64(10), Value::U64(10));
        assert_eq!(Value::I64(10), Value::F64(10.0));
        assert_eq!(Value::U64(10), Value::F64(10.0));
        assert_ne!(Value::I64(10), Value::F64(10.5));
        assert_ne!(Value::I64(-1), Value::U64(u64::MAX));
    }

    #[test]
    fn test_large_integers_compare_exactly_with_floats() {
        let above_f64_precision = 9_007_199_254_740_993_i64;
        assert_ne!(Value::I64(above_f64_precision), Value::F64(9_007_199_254_740_992.0));
        assert_eq!(Value::I64(9_007_199_254_740_992), Value::F64(9_007_199_254_740_992.0));
        assert_ne!(Value::U64(u64::MAX), Value::F64(18_446_744_073_709_551_616.0));
        assert_ne!(Value::I64(i64::MAX), Value::F64(f64::INFINITY));
        assert_ne!(Value::F64(f64::NAN), Value::I64(0));
    }

    #[test]
    fn test_nan_equals_nan() {
        assert_eq!(Value::F64(f64::NAN), Value::F64(f64::NAN));
    }

    #[test]
    fn test_number_not_equal_to_string() {
        assert_ne!(Value::I64(10), Value::String("10".to_string()));
        assert_ne!(Value::Null, Value::Bool(false));
    }

    #[test]
    fn test_type_names() {
        assert_eq!(Value::Null.type_name(), "Null");
        assert_eq!(Value::from(true).type_name(), "Boolean");
        assert_eq!(Value::from(10).type_name(), "Integer");
        assert_eq!(Value::from(u64::MAX).type_name(), "Integer");
        assert_eq!(Value::from(1.5).type_name(), "Float");
        assert_eq!(Value::from("x").type_name(), "String");
        assert_eq!(Value::from(vec![1, 2]).type_name(), "Array");
        assert_eq!(Value::from(doc! { a: 1 }).type_name(), "Object");
    }

    #[test]
    fn test_change_string() {
        assert_eq!(Value::from("Ann").to_change_string(), "Ann");
        assert_eq!(Value::from(10).to_change_string(), "10");
        assert_eq!(Value::from(2.0).to_change_string(), "2.0");
        assert_eq!(Value::Null.to_change_string(), "null");
        assert_eq!(Value::from(vec!["a", "b"]).to_change_string(), "[\"a\",\"b\"]");
    }

    #[test]
    fn test_compact_json_escapes_strings() {
        let value = Value::from("say \"hi\"\n");
        assert_eq!(value.to_compact_json(), "\"say \\\"hi\\\"\\n\"");
    }

    #[test]
    fn test_from_u64_prefers_signed() {
        assert!(matches!(Value::from(5u64), Value::I64(5)));
        assert!(matches!(Value::from(u64::MAX), Value::U64(_)));
    }

    #[test]
    fn test_from_option() {
        let none: Option<i32> = None;
        assert!(Value::from(none).is_null());
        assert_eq!(Value::from(Some("a")), Value::from("a"));
    }

    #[test]
    fn test_accessors() {
        let value = Value::from(42);
        assert_eq!(value.as_i64(), Some(42));
        assert_eq!(value.as_u64(), Some(42));
        assert_eq!(value.as_f64(), Some(42.0));
        assert_eq!(value.as_str(), None);
        assert!(Value::from(-1).as_u64().is_none());
    }

    #[test]
    fn test_into_document_rejects_scalars() {
        let err = Value::from(1).into_document().unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::InvalidDataType);
        assert!(Value::from(doc! { a: 1 }).into_document().is_ok());
    }

    #[test]
    fn test_pretty_json_array() {
        let value = Value::from(vec![1, 2]);
        assert_eq!(value.to_pretty_json(0), "[\n  1,\n  2\n]");
        assert_eq!(Value::Array(vec![]).to_pretty_json(0), "[]");
    }
}
