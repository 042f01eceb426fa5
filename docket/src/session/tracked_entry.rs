use crate::common::READ_ONLY;
use crate::document::{Document, Etag};

/// Bookkeeping the session keeps for one tracked object.
#[derive(Clone, Debug, Default)]
pub struct TrackedEntry {
    pub(crate) key: Option<String>,
    pub(crate) etag: Option<Etag>,
    pub(crate) original_snapshot: Document,
    pub(crate) original_metadata: Document,
    pub(crate) metadata: Document,
    pub(crate) ignore_changes: bool,
    pub(crate) force_concurrency_check: bool,
    // no server state known yet (stored or resolved, never saved)
    pub(crate) is_new: bool,
}

impl TrackedEntry {
    /// Entry for an object the caller just stored.
    pub(crate) fn for_new_object(
        key: Option<String>,
        etag: Option<Etag>,
        metadata: Document,
        force_concurrency_check: bool,
    ) -> Self {
        TrackedEntry {
            key,
            etag,
            original_snapshot: Document::new(),
            original_metadata: Document::new(),
            metadata,
            ignore_changes: false,
            force_concurrency_check,
            is_new: true,
        }
    }

    /// Entry for an object materialized from a server document.
    pub(crate) fn for_loaded_object(
        key: String,
        etag: Option<Etag>,
        document: Document,
        metadata: Document,
    ) -> Self {
        TrackedEntry {
            key: Some(key),
            etag,
            original_snapshot: document,
            original_metadata: metadata.clone(),
            metadata,
            ignore_changes: false,
            force_concurrency_check: false,
            is_new: false,
        }
    }

    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    pub fn etag(&self) -> Option<&Etag> {
        self.etag.as_ref()
    }

    pub fn original_snapshot(&self) -> &Document {
        &self.original_snapshot
    }

    pub fn original_metadata(&self) -> &Document {
        &self.original_metadata
    }

    pub fn metadata(&self) -> &Document {
        &self.metadata
    }

    pub fn is_ignoring_changes(&self) -> bool {
        self.ignore_changes
    }

    pub fn is_forcing_concurrency_check(&self) -> bool {
        self.force_concurrency_check
    }

    pub fn is_new(&self) -> bool {
        self.is_new
    }

    /// Read-only as far as the server is concerned (baseline metadata).
    pub fn is_originally_read_only(&self) -> bool {
        self.original_metadata.get_bool(READ_ONLY) == Some(true)
    }

    /// Read-only in both the baseline and the live metadata; such entries
    /// never report changes.
    pub fn is_read_only(&self) -> bool {
        self.is_originally_read_only() && self.metadata.get_bool(READ_ONLY) == Some(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc;

    #[test]
    fn test_new_object_has_empty_baseline() {
        let entry = TrackedEntry::for_new_object(
            Some("users/1".into()),
            None,
            doc! { "Raven-Entity-Name": "Users" },
            false,
        );
        assert!(entry.is_new());
        assert!(entry.original_snapshot().is_empty());
        assert!(entry.original_metadata().is_empty());
        assert_eq!(entry.metadata().get_str("Raven-Entity-Name"), Some("Users"));
    }

    #[test]
    fn test_loaded_object_clones_metadata() {
        let entry = TrackedEntry::for_loaded_object(
            "users/1".into(),
            Some(Etag::from("E1")),
            doc! { name: "Ann" },
            doc! { a: 1 },
        );
        assert!(!entry.is_new());
        assert_eq!(entry.key(), Some("users/1"));
        assert_eq!(entry.etag(), Some(&Etag::from("E1")));
        assert_eq!(entry.metadata(), entry.original_metadata());
    }

    #[test]
    fn test_read_only_requires_both_sides() {
        let mut entry = TrackedEntry::for_loaded_object(
            "users/1".into(),
            None,
            doc! {},
            doc! { "Raven-Read-Only": true },
        );
        assert!(entry.is_read_only());

        entry.metadata.put(READ_ONLY, false).unwrap();
        assert!(entry.is_originally_read_only());
        assert!(!entry.is_read_only());
    }
}
