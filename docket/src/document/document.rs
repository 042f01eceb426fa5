use im::OrdMap;

use crate::common::{escape_json, Value};
use crate::errors::{DocketError, DocketResult, ErrorKind};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt::{Debug, Display};

/// A document tree: an ordered map of field names to [Value]s.
///
/// Documents are used for entity bodies, for metadata and for the snapshots
/// the session compares against. They are backed by `im::OrdMap`, so cloning
/// is O(1) and every clone is an independent copy-on-write snapshot. The
/// conversion cache relies on this to hand out snapshots that cannot alter
/// the cached tree.
///
/// Fields iterate in key order, which keeps change reports deterministic.
#[derive(Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Document {
    data: OrdMap<String, Value>,
}

impl Document {
    /// Creates a new empty document.
    pub fn new() -> Self {
        Document {
            data: OrdMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Associates the specified [Value] with the specified field.
    ///
    /// If the field already exists its value is replaced.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOperation` if the field name is empty.
    ///
    /// # Examples
    ///
    /// ```ignore
    /// let mut doc = Document::new();
    /// doc.put("name", "Ann")?;
    /// doc.put("age", 30)?;
    /// assert_eq!(doc.size(), 2);
    /// ```
    pub fn put<'a, T: Into<Value>>(
        &mut self,
        key: impl Into<Cow<'a, str>>,
        value: T,
    ) -> DocketResult<()> {
        let key = key.into();
        if key.is_empty() {
            log::error!("Document does not support empty key");
            return Err(DocketError::new(
                "Document does not support empty key",
                ErrorKind::InvalidOperation,
            ));
        }

        self.data.insert(key.into_owned(), value.into());
        Ok(())
    }

    /// Returns the value of a top level field.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Returns a mutable reference to the value of a top level field.
    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.data.get_mut(key)
    }

    /// Returns the field as a string slice if it holds a string.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(|v| v.as_str())
    }

    /// Returns the field as a boolean if it holds one.
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.data.get(key).and_then(|v| v.as_bool())
    }

    /// Removes a field and returns its previous value.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.data.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Returns the field names in key order.
    pub fn fields(&self) -> Vec<String> {
        self.data.keys().cloned().collect()
    }

    /// Iterates over the fields in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.data.iter()
    }

    /// Copies every field of `other` into this document, replacing fields
    /// that already exist.
    pub fn merge(&mut self, other: &Document) {
        for (key, value) in other.data.iter() {
            self.data.insert(key.clone(), value.clone());
        }
    }

    pub fn to_map(&self) -> BTreeMap<String, Value> {
        self.data
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub(crate) fn to_compact_json(&self) -> String {
        let fields: Vec<String> = self
            .data
            .iter()
            .map(|(k, v)| format!("\"{}\":{}", escape_json(k), v.to_compact_json()))
            .collect();
        format!("{{{}}}", fields.join(","))
    }

    pub(crate) fn to_pretty_json(&self, indent: usize) -> String {
        if self.data.is_empty() {
            return "{}".to_string();
        }

        let indent_str = " ".repeat(indent + 2);
        let mut json_str = String::new();
        json_str.push_str("{\n");
        for (key, value) in self.data.iter() {
            json_str.push_str(&format!(
                "{}\"{}\": {},\n",
                indent_str,
                escape_json(key),
                value.to_pretty_json(indent + 2)
            ));
        }
        json_str.pop(); // remove last comma
        json_str.pop(); // remove last newline
        json_str.push_str(&format!("\n{}}}", " ".repeat(indent)));
        json_str
    }

    pub(crate) fn to_debug_string(&self, indent: usize) -> String {
        if self.data.is_empty() {
            return "{}".to_string();
        }

        let indent_str = " ".repeat(indent + 2);
        let mut debug_str = String::new();
        debug_str.push_str("{\n");
        for (key, value) in self.data.iter() {
            debug_str.push_str(&format!(
                "{}\"{}\": {},\n",
                indent_str,
                key,
                value.to_debug_string(indent + 2)
            ));
        }
        debug_str.pop();
        debug_str.pop();
        debug_str.push_str(&format!("\n{}}}", " ".repeat(indent)));
        debug_str
    }
}

impl Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_debug_string(0))
    }
}

impl Display for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_pretty_json(0))
    }
}

impl FromIterator<(String, Value)> for Document {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Document {
            data: iter.into_iter().collect(),
        }
    }
}

pub fn normalize(value: &str) -> String {
    value.trim_matches('"').to_string()
}

/// Creates a [Document] with JSON-like syntax.
///
/// # Examples
///
/// ```rust
/// use docket::doc;
///
/// let empty = doc!{};
///
/// let user = doc!{
///     name: "Ann",
///     address: {
///         city: "Oslo",
///         tags: ["home", "billing"]
///     },
///     "Raven-Entity-Name": "Users"
/// };
/// assert_eq!(user.size(), 3);
/// ```
#[macro_export]
macro_rules! doc {
    ({}) => {
        $crate::document::Document::new()
    };

    () => {
        $crate::document::Document::new()
    };

    ({ $($key:tt : $value:tt),* $(,)? }) => {
        $crate::doc!($($key : $value),*)
    };

    ($($key:tt : $value:tt),* $(,)?) => {
        {
            #[allow(unused_imports)]
            use $crate::doc_value;

            let mut doc = $crate::document::Document::new();
            $(
                doc.put($crate::document::normalize(stringify!($key)), $crate::doc_value!($value))
                .expect(&format!("Failed to put value {} in document", stringify!($value)));
            )*
            doc
        }
    };
}

/// Helper macro to convert values for the doc! macro.
#[macro_export]
macro_rules! doc_value {
    ({ $($key:tt : $value:tt),* $(,)? }) => {
        {
            $crate::common::Value::Document($crate::doc!{ $($key : $value),* })
        }
    };

    ([ $($value:tt),* $(,)? ]) => {
        $crate::common::Value::Array(vec![$($crate::doc_value!($value)),*])
    };

    ($value:expr) => {
        $crate::common::Value::from($value)
    };
}
