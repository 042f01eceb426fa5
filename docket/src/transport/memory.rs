use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::{DashMap, DashSet};

use crate::common::{
    is_server_assigned_prefix, normalize_key, Atomic, ReadExecutor, WriteExecutor,
    ENTITY_NAME, KEY_PREFIX_SEPARATOR, LAST_MODIFIED,
};
use crate::document::{Document, Etag, JsonDocument};
use crate::errors::{DocketError, DocketResult, ErrorKind};
use crate::session::{BatchResult, CommandData, DeleteCommandData, PutCommandData};
use crate::transport::DocumentTransportProvider;

/// In-process document server.
///
/// Documents live in a concurrent map keyed by their case-insensitive key.
/// Every write gets a fresh etag from a monotonic counter, and batches are
/// checked against the stored etags before anything is applied, so stale
/// writes fail the whole batch.
///
/// Keys that are missing or end with `/` are assigned by the server: the
/// prefix is completed with a per-server counter (`"users/"` becomes
/// `"users/1"`). A write without any key takes its prefix from the entity
/// name in its metadata.
///
/// ```text
/// let transport = InMemoryTransport::new();
/// transport.put_document("users/1", doc!{ name: "Ann" }, doc!{})?;
/// let store = DocumentStore::builder().transport(transport.clone()).build()?;
/// ```
#[derive(Clone, Default)]
pub struct InMemoryTransport {
    inner: Arc<InMemoryTransportInner>,
}

impl InMemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a document directly, bypassing etag checks. Returns its new
    /// etag.
    pub fn put_document(
        &self,
        key: &str,
        data: Document,
        metadata: Document,
    ) -> DocketResult<Etag> {
        self.inner.put_document(key, data, metadata)
    }

    /// Returns the stored document, if any, without counting a fetch.
    pub fn get_document(&self, key: &str) -> Option<JsonDocument> {
        self.inner
            .documents
            .get(&normalize_key(key))
            .map(|stored| self.inner.to_json_document(&stored))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.documents.contains_key(&normalize_key(key))
    }

    pub fn document_count(&self) -> usize {
        self.inner.documents.len()
    }

    /// Every batch received so far, in arrival order.
    pub fn submitted_batches(&self) -> Vec<Vec<CommandData>> {
        self.inner.batches.read_with(|batches| batches.clone())
    }

    pub fn last_batch(&self) -> Option<Vec<CommandData>> {
        self.inner.batches.read_with(|batches| batches.last().cloned())
    }

    pub fn fetch_count(&self) -> u64 {
        self.inner.fetches.load(Ordering::Relaxed)
    }

    /// Makes fetches of `key` report non-authoritative information, as a
    /// replica would for a document that is being written elsewhere.
    pub fn mark_non_authoritative(&self, key: &str) {
        self.inner.non_authoritative.insert(normalize_key(key));
    }

    /// Makes the next batch fail with a transport error before it is
    /// applied.
    pub fn fail_next_batch(&self) {
        self.inner.fail_next_batch.store(true, Ordering::Relaxed);
    }
}

impl DocumentTransportProvider for InMemoryTransport {
    fn fetch(&self, key: &str) -> DocketResult<JsonDocument> {
        self.inner.fetch(key)
    }

    fn submit_batch(&self, commands: &[CommandData]) -> DocketResult<Vec<BatchResult>> {
        self.inner.submit_batch(commands)
    }
}

#[derive(Clone)]
struct StoredDocument {
    key: String,
    data: Document,
    metadata: Document,
    etag: Etag,
    last_modified: DateTime<Utc>,
}

#[derive(Default)]
struct InMemoryTransportInner {
    documents: DashMap<String, StoredDocument>,
    non_authoritative: DashSet<String>,
    batches: Atomic<Vec<Vec<CommandData>>>,
    etag_counter: AtomicU64,
    key_counter: AtomicU64,
    fetches: AtomicU64,
    fail_next_batch: AtomicBool,
}

impl InMemoryTransportInner {
    fn next_etag(&self) -> Etag {
        Etag::from_counter(self.etag_counter.fetch_add(1, Ordering::SeqCst) as u128 + 1)
    }

    fn put_document(&self, key: &str, data: Document, metadata: Document) -> DocketResult<Etag> {
        if key.is_empty() || is_server_assigned_prefix(key) {
            log::error!("Cannot store a document under key '{}'", key);
            return Err(DocketError::new(
                &format!("Cannot store a document under key '{}'", key),
                ErrorKind::InvalidOperation,
            ));
        }

        let stored = self.make_stored(key.to_string(), data, metadata)?;
        let etag = stored.etag.clone();
        self.documents.insert(normalize_key(key), stored);
        Ok(etag)
    }

    fn make_stored(
        &self,
        key: String,
        data: Document,
        mut metadata: Document,
    ) -> DocketResult<StoredDocument> {
        let last_modified = Utc::now();
        metadata.put(LAST_MODIFIED, last_modified.to_rfc3339())?;
        Ok(StoredDocument {
            key,
            data,
            metadata,
            etag: self.next_etag(),
            last_modified,
        })
    }

    fn to_json_document(&self, stored: &StoredDocument) -> JsonDocument {
        JsonDocument::new(
            stored.key.clone(),
            stored.data.clone(),
            stored.metadata.clone(),
        )
        .with_etag(stored.etag.clone())
        .with_last_modified(stored.last_modified)
        .with_non_authoritative_information(
            self.non_authoritative.contains(&normalize_key(&stored.key)),
        )
    }

    fn fetch(&self, key: &str) -> DocketResult<JsonDocument> {
        self.fetches.fetch_add(1, Ordering::Relaxed);
        match self.documents.get(&normalize_key(key)) {
            Some(stored) => Ok(self.to_json_document(&stored)),
            None => {
                log::error!("Document '{}' does not exist", key);
                Err(DocketError::new(
                    &format!("Document '{}' does not exist", key),
                    ErrorKind::NotFound,
                ))
            }
        }
    }

    fn submit_batch(&self, commands: &[CommandData]) -> DocketResult<Vec<BatchResult>> {
        self.batches.write_with(|batches| batches.push(commands.to_vec()));

        if self.fail_next_batch.swap(false, Ordering::Relaxed) {
            log::error!("Connection lost while sending a batch of {} commands", commands.len());
            return Err(DocketError::new(
                "Connection lost while sending the batch",
                ErrorKind::TransportError,
            ));
        }

        // staged changes, applied only when every command succeeded
        let mut staged: HashMap<String, Option<StoredDocument>> = HashMap::new();
        let mut results = Vec::with_capacity(commands.len());

        for command in commands {
            let result = match command {
                CommandData::Put(put) => self.apply_put(put, &mut staged)?,
                CommandData::Delete(delete) => self.apply_delete(delete, &mut staged)?,
            };
            results.push(result);
        }

        for (key, change) in staged {
            match change {
                Some(stored) => {
                    self.documents.insert(key, stored);
                }
                None => {
                    self.documents.remove(&key);
                }
            }
        }
        Ok(results)
    }

    fn current_etag(
        &self,
        normalized: &str,
        staged: &HashMap<String, Option<StoredDocument>>,
    ) -> Option<Etag> {
        match staged.get(normalized) {
            Some(change) => change.as_ref().map(|stored| stored.etag.clone()),
            None => self
                .documents
                .get(normalized)
                .map(|stored| stored.etag.clone()),
        }
    }

    fn check_etag(
        &self,
        method: &str,
        key: &str,
        expected: Option<&Etag>,
        staged: &HashMap<String, Option<StoredDocument>>,
    ) -> DocketResult<()> {
        let expected = match expected {
            Some(etag) => etag,
            None => return Ok(()),
        };

        let current = self.current_etag(&normalize_key(key), staged);
        let matches = match &current {
            None => expected.is_empty(),
            Some(current) => current == expected,
        };

        if !matches {
            log::error!(
                "{} attempted on document '{}' using a non current etag (expected {}, current {})",
                method,
                key,
                expected,
                current.map_or("none".to_string(), |e| e.to_string())
            );
            return Err(DocketError::new(
                &format!(
                    "{} attempted on document '{}' using a non current etag",
                    method, key
                ),
                ErrorKind::StaleData,
            ));
        }
        Ok(())
    }

    fn assign_key(&self, put: &PutCommandData) -> String {
        let prefix = match put.key() {
            Some(key) if is_server_assigned_prefix(key) => key.to_string(),
            Some(key) if !key.is_empty() => return key.to_string(),
            _ => match put.metadata().get_str(ENTITY_NAME) {
                Some(name) => format!("{}{}", name.to_lowercase(), KEY_PREFIX_SEPARATOR),
                None => String::new(),
            },
        };
        let next = self.key_counter.fetch_add(1, Ordering::SeqCst) + 1;
        format!("{}{}", prefix, next)
    }

    fn apply_put(
        &self,
        put: &PutCommandData,
        staged: &mut HashMap<String, Option<StoredDocument>>,
    ) -> DocketResult<BatchResult> {
        let key = self.assign_key(put);
        self.check_etag("PUT", &key, put.etag(), staged)?;

        let stored =
            self.make_stored(key.clone(), put.document().clone(), put.metadata().clone())?;
        let result = BatchResult::put(key.clone(), stored.etag.clone(), stored.metadata.clone());
        staged.insert(normalize_key(&key), Some(stored));
        Ok(result)
    }

    fn apply_delete(
        &self,
        delete: &DeleteCommandData,
        staged: &mut HashMap<String, Option<StoredDocument>>,
    ) -> DocketResult<BatchResult> {
        self.check_etag("DELETE", delete.key(), delete.etag(), staged)?;
        staged.insert(normalize_key(delete.key()), None);
        Ok(BatchResult::delete(delete.key()))
    }
}
