use crate::common::Value;
use crate::document::Document;
use crate::errors::{DocketError, DocketResult, ErrorKind};
use std::collections::{BTreeMap, HashMap};

/// Conversion between a Rust value and a document tree [Value].
///
/// Entities implement this to produce their serialized form (an object
/// [Value::Document]) and to be materialized from a fetched document.
pub trait Convertible {
    type Output;

    fn to_value(&self) -> DocketResult<Value>;
    fn from_value(value: &Value) -> DocketResult<Self::Output>;
}

macro_rules! impl_convertible_for_int {
    ($($t:ty => $name:literal),*) => {
        $(
            impl Convertible for $t {
                type Output = $t;

                fn to_value(&self) -> DocketResult<Value> {
                    Ok(Value::from(*self))
                }

                fn from_value(value: &Value) -> DocketResult<Self> {
                    let converted = match value {
                        Value::I64(v) => <$t>::try_from(*v).ok(),
                        Value::U64(v) => <$t>::try_from(*v).ok(),
                        _ => None,
                    };
                    match converted {
                        Some(v) => Ok(v),
                        None => {
                            log::error!("Value {} is not an {}", value, $name);
                            Err(DocketError::new(
                                concat!("Value is not an ", $name),
                                ErrorKind::ObjectMappingError,
                            ))
                        }
                    }
                }
            }
        )*
    };
}

impl_convertible_for_int!(
    i8 => "i8", i16 => "i16", i32 => "i32", i64 => "i64",
    u8 => "u8", u16 => "u16", u32 => "u32", u64 => "u64",
    usize => "usize", isize => "isize"
);

impl Convertible for f64 {
    type Output = f64;

    fn to_value(&self) -> DocketResult<Value> {
        Ok(Value::F64(*self))
    }

    fn from_value(value: &Value) -> DocketResult<Self> {
        match value.as_f64() {
            Some(v) => Ok(v),
            None => {
                log::error!("Value {} is not an f64", value);
                Err(DocketError::new(
                    "Value is not an f64",
                    ErrorKind::ObjectMappingError,
                ))
            }
        }
    }
}

impl Convertible for f32 {
    type Output = f32;

    fn to_value(&self) -> DocketResult<Value> {
        Ok(Value::F64(*self as f64))
    }

    fn from_value(value: &Value) -> DocketResult<Self> {
        Ok(f64::from_value(value)? as f32)
    }
}

impl Convertible for bool {
    type Output = bool;

    fn to_value(&self) -> DocketResult<Value> {
        Ok(Value::Bool(*self))
    }

    fn from_value(value: &Value) -> DocketResult<Self> {
        match value {
            Value::Bool(v) => Ok(*v),
            _ => {
                log::error!("Value {} is not a bool", value);
                Err(DocketError::new(
                    "Value is not a bool",
                    ErrorKind::ObjectMappingError,
                ))
            }
        }
    }
}

impl Convertible for String {
    type Output = String;

    fn to_value(&self) -> DocketResult<Value> {
        Ok(Value::String(self.clone()))
    }

    fn from_value(value: &Value) -> DocketResult<Self> {
        match value {
            Value::String(v) => Ok(v.clone()),
            _ => {
                log::error!("Value {} is not a string", value);
                Err(DocketError::new(
                    "Value is not a string",
                    ErrorKind::ObjectMappingError,
                ))
            }
        }
    }
}

impl Convertible for Document {
    type Output = Document;

    fn to_value(&self) -> DocketResult<Value> {
        Ok(Value::Document(self.clone()))
    }

    fn from_value(value: &Value) -> DocketResult<Self> {
        match value {
            Value::Document(v) => Ok(v.clone()),
            _ => {
                log::error!("Value {} is not a document", value);
                Err(DocketError::new(
                    "Value is not a document",
                    ErrorKind::ObjectMappingError,
                ))
            }
        }
    }
}

impl Convertible for Value {
    type Output = Value;

    fn to_value(&self) -> DocketResult<Value> {
        Ok(self.clone())
    }

    fn from_value(value: &Value) -> DocketResult<Self::Output> {
        Ok(value.clone())
    }
}

impl<T> Convertible for Option<T>
where
    T: Convertible,
{
    type Output = Option<T::Output>;

    fn to_value(&self) -> DocketResult<Value> {
        match self {
            Some(v) => v.to_value(),
            None => Ok(Value::Null),
        }
    }

    fn from_value(value: &Value) -> DocketResult<Self::Output> {
        match value {
            Value::Null => Ok(None),
            _ => Ok(Some(T::from_value(value)?)),
        }
    }
}

impl<T> Convertible for Box<T>
where
    T: Convertible<Output = T>,
{
    type Output = Box<T>;

    fn to_value(&self) -> DocketResult<Value> {
        self.as_ref().to_value()
    }

    fn from_value(value: &Value) -> DocketResult<Self::Output> {
        Ok(Box::new(T::from_value(value)?))
    }
}

impl<T> Convertible for Vec<T>
where
    T: Convertible,
{
    type Output = Vec<T::Output>;

    fn to_value(&self) -> DocketResult<Value> {
        let mut arr = Vec::with_capacity(self.len());
        for item in self {
            arr.push(item.to_value()?);
        }
        Ok(Value::Array(arr))
    }

    fn from_value(value: &Value) -> DocketResult<Self::Output> {
        match value {
            Value::Array(arr) => {
                let mut vec = Vec::with_capacity(arr.len());
                for item in arr {
                    vec.push(T::from_value(item)?);
                }
                Ok(vec)
            }
            _ => {
                log::error!("Value {} is not an array", value);
                Err(DocketError::new(
                    "Value is not an array",
                    ErrorKind::ObjectMappingError,
                ))
            }
        }
    }
}

impl<V> Convertible for BTreeMap<String, V>
where
    V: Convertible,
{
    type Output = BTreeMap<String, V::Output>;

    fn to_value(&self) -> DocketResult<Value> {
        let mut doc = Document::new();
        for (k, v) in self {
            doc.put(k.as_str(), v.to_value()?)?;
        }
        Ok(Value::Document(doc))
    }

    fn from_value(value: &Value) -> DocketResult<Self::Output> {
        let doc = Document::from_value(value)?;
        let mut map = BTreeMap::new();
        for (k, v) in doc.iter() {
            map.insert(k.clone(), V::from_value(v)?);
        }
        Ok(map)
    }
}

impl<V> Convertible for HashMap<String, V>
where
    V: Convertible,
{
    type Output = HashMap<String, V::Output>;

    fn to_value(&self) -> DocketResult<Value> {
        let mut doc = Document::new();
        for (k, v) in self {
            doc.put(k.as_str(), v.to_value()?)?;
        }
        Ok(Value::Document(doc))
    }

    fn from_value(value: &Value) -> DocketResult<Self::Output> {
        let doc = Document::from_value(value)?;
        let mut map = HashMap::with_capacity(doc.size());
        for (k, v) in doc.iter() {
            map.insert(k.clone(), V::from_value(v)?);
        }
        Ok(map)
    }
}

pub fn from_value<T>(value: &Value) -> DocketResult<T::Output>
where
    T: Convertible,
{
    T::from_value(value)
}

pub fn to_value<T>(data: &T) -> DocketResult<Value>
where
    T: Convertible,
{
    data.to_value()
}

/// Reads a field of an object and converts it. A missing field reads as
/// [Value::Null], so `Option` fields map absent values to `None`.
///
/// # Errors
///
/// Returns `ObjectMappingError` naming the field when the conversion fails.
pub fn read_field<T>(document: &Document, field: &str) -> DocketResult<T::Output>
where
    T: Convertible,
{
    let value = document.get(field).cloned().unwrap_or(Value::Null);
    T::from_value(&value).map_err(|err| {
        log::error!("Failed to read field {}: {}", field, err);
        DocketError::new_with_cause(
            &format!("Failed to read field {}", field),
            ErrorKind::ObjectMappingError,
            err,
        )
    })
}

/// Converts a value and stores it under `field`.
pub fn write_field<T>(document: &mut Document, field: &str, data: &T) -> DocketResult<()>
where
    T: Convertible,
{
    document.put(field, data.to_value()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc;

    #[test]
    fn test_int_round_trip_through_normalized_value() {
        let value = 42i32.to_value().unwrap();
        assert!(matches!(value, Value::I64(42)));
        assert_eq!(i32::from_value(&value).unwrap(), 42);
    }

    #[test]
    fn test_int_out_of_range() {
        let err = u8::from_value(&Value::I64(300)).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::ObjectMappingError);
        assert!(u32::from_value(&Value::I64(-1)).is_err());
    }

    #[test]
    fn test_f64_accepts_integers() {
        assert_eq!(f64::from_value(&Value::I64(3)).unwrap(), 3.0);
        assert!(f64::from_value(&Value::from("3")).is_err());
    }

    #[test]
    fn test_string_rejects_number() {
        let err = String::from_value(&Value::I64(1)).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::ObjectMappingError);
    }

    #[test]
    fn test_option() {
        assert_eq!(Option::<String>::from_value(&Value::Null).unwrap(), None);
        assert_eq!(
            Option::<String>::from_value(&Value::from("a")).unwrap(),
            Some("a".to_string())
        );
        assert!(None::<i32>.to_value().unwrap().is_null());
    }

    #[test]
    fn test_vec() {
        let tags = vec!["a".to_string(), "b".to_string()];
        let value = tags.to_value().unwrap();
        assert_eq!(value, Value::from(vec!["a", "b"]));
        assert_eq!(Vec::<String>::from_value(&value).unwrap(), tags);
    }

    #[test]
    fn test_btree_map() {
        let mut map = BTreeMap::new();
        map.insert("x".to_string(), 1i64);
        let value = map.to_value().unwrap();
        assert_eq!(value, Value::from(doc! { x: 1 }));
        assert_eq!(BTreeMap::<String, i64>::from_value(&value).unwrap(), map);
    }

    #[test]
    fn test_read_field_missing_is_null() {
        let doc = doc! { name: "Ann" };
        assert_eq!(read_field::<Option<i64>>(&doc, "age").unwrap(), None);
        assert_eq!(read_field::<String>(&doc, "name").unwrap(), "Ann");

        let err = read_field::<String>(&doc, "age").unwrap_err();
        assert_eq!(err.message(), "Failed to read field age");
        assert!(err.cause().is_some());
    }

    #[test]
    fn test_write_field() {
        let mut doc = Document::new();
        write_field(&mut doc, "tags", &vec![1i64, 2]).unwrap();
        assert_eq!(doc.get("tags"), Some(&Value::from(vec![1, 2])));
    }
}
