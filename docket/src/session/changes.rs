use std::fmt::{Display, Formatter};

use crate::common::Value;
use crate::document::Document;

/// Kind of difference reported by the change comparator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChangeType {
    DocumentDeleted,
    DocumentAdded,
    FieldChanged,
    NewField,
    RemovedField,
    ArrayValueAdded,
    ArrayValueRemoved,
}

impl Display for ChangeType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ChangeType::DocumentDeleted => write!(f, "DOCUMENT_DELETED"),
            ChangeType::DocumentAdded => write!(f, "DOCUMENT_ADDED"),
            ChangeType::FieldChanged => write!(f, "FIELD_CHANGED"),
            ChangeType::NewField => write!(f, "NEW_FIELD"),
            ChangeType::RemovedField => write!(f, "REMOVED_FIELD"),
            ChangeType::ArrayValueAdded => write!(f, "ARRAY_VALUE_ADDED"),
            ChangeType::ArrayValueRemoved => write!(f, "ARRAY_VALUE_REMOVED"),
        }
    }
}

/// One difference between a tracked object and its baseline.
///
/// Values and type names are captured as strings. Fields that do not apply
/// to a change (the old value of a new field, for instance) are empty.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DocumentsChanges {
    field_name: String,
    field_old_value: String,
    field_new_value: String,
    field_old_type: String,
    field_new_type: String,
    change: ChangeType,
}

impl DocumentsChanges {
    pub(crate) fn document_added() -> Self {
        Self::of(ChangeType::DocumentAdded, "")
    }

    pub(crate) fn document_deleted() -> Self {
        Self::of(ChangeType::DocumentDeleted, "")
    }

    pub(crate) fn field_changed(field_name: &str, old: &Value, new: &Value) -> Self {
        Self::of(ChangeType::FieldChanged, field_name)
            .with_old(old)
            .with_new(new)
    }

    fn of(change: ChangeType, field_name: &str) -> Self {
        DocumentsChanges {
            field_name: field_name.to_string(),
            field_old_value: String::new(),
            field_new_value: String::new(),
            field_old_type: String::new(),
            field_new_type: String::new(),
            change,
        }
    }

    fn with_old(mut self, old: &Value) -> Self {
        self.field_old_value = old.to_change_string();
        self.field_old_type = old.type_name().to_string();
        self
    }

    fn with_new(mut self, new: &Value) -> Self {
        self.field_new_value = new.to_change_string();
        self.field_new_type = new.type_name().to_string();
        self
    }

    pub fn field_name(&self) -> &str {
        &self.field_name
    }

    pub fn field_old_value(&self) -> &str {
        &self.field_old_value
    }

    pub fn field_new_value(&self) -> &str {
        &self.field_new_value
    }

    pub fn field_old_type(&self) -> &str {
        &self.field_old_type
    }

    pub fn field_new_type(&self) -> &str {
        &self.field_new_type
    }

    pub fn change(&self) -> ChangeType {
        self.change
    }
}

impl Display for DocumentsChanges {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} ({}: {} -> {}: {})",
            self.change,
            self.field_name,
            self.field_old_type,
            self.field_old_value,
            self.field_new_type,
            self.field_new_value
        )
    }
}

/// Structurally compares `new` against `old`.
///
/// Returns `true` when both trees are equal. When `changes` is given every
/// difference is appended to it; otherwise the comparison stops at the first
/// difference.
pub fn deep_equals(
    new: &Document,
    old: &Document,
    changes: Option<&mut Vec<DocumentsChanges>>,
) -> bool {
    let mut comparator = Comparator { changes };
    comparator.compare_documents(new, old, "")
}

struct Comparator<'a> {
    changes: Option<&'a mut Vec<DocumentsChanges>>,
}

impl Comparator<'_> {
    fn collecting(&self) -> bool {
        self.changes.is_some()
    }

    fn record(&mut self, change: DocumentsChanges) {
        if let Some(changes) = self.changes.as_mut() {
            changes.push(change);
        }
    }

    fn compare_documents(&mut self, new: &Document, old: &Document, prefix: &str) -> bool {
        let mut equal = true;

        for (field, old_value) in old.iter() {
            if !new.contains_key(field) {
                equal = false;
                if !self.collecting() {
                    return false;
                }
                let path = join_path(prefix, field);
                self.record(DocumentsChanges::of(ChangeType::RemovedField, &path).with_old(old_value));
            }
        }

        for (field, new_value) in new.iter() {
            let path = join_path(prefix, field);
            let same = match old.get(field) {
                None => {
                    self.record(DocumentsChanges::of(ChangeType::NewField, &path).with_new(new_value));
                    false
                }
                Some(old_value) => self.compare_values(new_value, old_value, &path),
            };
            if !same {
                equal = false;
                if !self.collecting() {
                    return false;
                }
            }
        }

        equal
    }

    fn compare_values(&mut self, new: &Value, old: &Value, path: &str) -> bool {
        match (new, old) {
            (Value::Document(n), Value::Document(o)) => self.compare_documents(n, o, path),
            (Value::Array(n), Value::Array(o)) => self.compare_arrays(n, o, path),
            _ => {
                if new == old {
                    true
                } else {
                    self.record(
                        DocumentsChanges::of(ChangeType::FieldChanged, path)
                            .with_old(old)
                            .with_new(new),
                    );
                    false
                }
            }
        }
    }

    fn compare_arrays(&mut self, new: &[Value], old: &[Value], path: &str) -> bool {
        if new.len() == old.len() {
            let mut equal = true;
            for (index, (n, o)) in new.iter().zip(old.iter()).enumerate() {
                let item_path = format!("{}[{}]", path, index);
                if !self.compare_values(n, o, &item_path) {
                    equal = false;
                    if !self.collecting() {
                        return false;
                    }
                }
            }
            return equal;
        }

        if !self.collecting() {
            return false;
        }

        // lengths differ: report a multiset difference
        let mut unmatched_old: Vec<&Value> = old.iter().collect();
        let mut added = Vec::new();
        for item in new {
            match unmatched_old.iter().position(|o| *o == item) {
                Some(pos) => {
                    unmatched_old.remove(pos);
                }
                None => added.push(item),
            }
        }
        for item in added {
            self.record(DocumentsChanges::of(ChangeType::ArrayValueAdded, path).with_new(item));
        }
        for item in unmatched_old {
            self.record(DocumentsChanges::of(ChangeType::ArrayValueRemoved, path).with_old(item));
        }
        false
    }
}

fn join_path(prefix: &str, field: &str) -> String {
    if prefix.is_empty() {
        field.to_string()
    } else {
        format!("{}.{}", prefix, field)
    }
}
