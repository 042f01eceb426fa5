use chrono::{DateTime, Utc};

use crate::common::{DOCUMENT_DOES_NOT_EXIST, LAST_MODIFIED, METADATA, METADATA_ETAG};
use crate::document::{Document, Etag};

/// A document as returned by a fetch: body, metadata and the server's
/// bookkeeping for it.
#[derive(Clone, Debug, PartialEq)]
pub struct JsonDocument {
    key: String,
    data: Document,
    metadata: Document,
    etag: Option<Etag>,
    last_modified: Option<DateTime<Utc>>,
    non_authoritative_information: bool,
}

impl JsonDocument {
    pub fn new(key: impl Into<String>, data: Document, metadata: Document) -> Self {
        JsonDocument {
            key: key.into(),
            data,
            metadata,
            etag: None,
            last_modified: None,
            non_authoritative_information: false,
        }
    }

    pub fn with_etag(mut self, etag: Etag) -> Self {
        self.etag = Some(etag);
        self
    }

    pub fn with_last_modified(mut self, last_modified: DateTime<Utc>) -> Self {
        self.last_modified = Some(last_modified);
        self
    }

    /// Marks the document as modified by a transaction that has not
    /// committed yet.
    pub fn with_non_authoritative_information(mut self, value: bool) -> Self {
        self.non_authoritative_information = value;
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn data(&self) -> &Document {
        &self.data
    }

    pub fn metadata(&self) -> &Document {
        &self.metadata
    }

    pub fn metadata_mut(&mut self) -> &mut Document {
        &mut self.metadata
    }

    pub fn etag(&self) -> Option<&Etag> {
        self.etag.as_ref()
    }

    pub fn last_modified(&self) -> Option<DateTime<Utc>> {
        self.last_modified
    }

    pub fn is_non_authoritative(&self) -> bool {
        self.non_authoritative_information
    }

    /// Returns `true` when the server flagged the document as not really
    /// there (a placeholder returned for a missing key).
    pub fn is_placeholder_for_missing(&self) -> bool {
        self.metadata.get_bool(DOCUMENT_DOES_NOT_EXIST) == Some(true)
    }

    /// Copies the etag and last-modified time into the metadata unless the
    /// metadata already carries them.
    pub(crate) fn stamp_metadata(&mut self) {
        if let Some(etag) = &self.etag {
            if !self.metadata.contains_key(METADATA_ETAG) {
                // keys are constants, put cannot fail
                let _ = self.metadata.put(METADATA_ETAG, etag.to_string());
            }
        }
        if !self.metadata.contains_key(LAST_MODIFIED) {
            let stamp = self.last_modified.map(|it| it.to_rfc3339());
            let _ = self.metadata.put(LAST_MODIFIED, stamp);
        }
    }

    /// Splits the document into its key, body and metadata. Any embedded
    /// `@metadata` field is dropped from the body.
    pub fn into_parts(self) -> (String, Document, Document) {
        let mut data = self.data;
        data.remove(METADATA);
        (self.key, data, self.metadata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc;
    use chrono::TimeZone;

    #[test]
    fn test_stamp_metadata_adds_missing_headers() {
        let modified = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        let mut json = JsonDocument::new("users/1", doc! { name: "Ann" }, doc! {})
            .with_etag(Etag::from("E1"))
            .with_last_modified(modified);
        json.stamp_metadata();

        assert_eq!(json.metadata().get_str(METADATA_ETAG), Some("E1"));
        assert_eq!(
            json.metadata().get_str(LAST_MODIFIED),
            Some(modified.to_rfc3339().as_str())
        );
    }

    #[test]
    fn test_stamp_metadata_keeps_existing_headers() {
        let mut json = JsonDocument::new("users/1", doc! {}, doc! { "@etag": "E0" })
            .with_etag(Etag::from("E1"));
        json.stamp_metadata();
        assert_eq!(json.metadata().get_str(METADATA_ETAG), Some("E0"));
    }

    #[test]
    fn test_placeholder_for_missing() {
        let json = JsonDocument::new(
            "users/1",
            doc! {},
            doc! { "Raven-Document-Does-Not-Exists": true },
        );
        assert!(json.is_placeholder_for_missing());
        assert!(!JsonDocument::new("users/1", doc! {}, doc! {}).is_placeholder_for_missing());
    }

    #[test]
    fn test_into_parts_strips_embedded_metadata() {
        let json = JsonDocument::new(
            "users/1",
            doc! { name: "Ann", "@metadata": { "@id": "users/1" } },
            doc! {},
        );
        let (key, data, _) = json.into_parts();
        assert_eq!(key, "users/1");
        assert!(!data.contains_key("@metadata"));
        assert_eq!(data.get_str("name"), Some("Ann"));
    }
}
