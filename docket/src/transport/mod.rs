mod memory;

pub use memory::*;

use std::ops::Deref;
use std::sync::Arc;

use crate::document::JsonDocument;
use crate::errors::DocketResult;
use crate::session::{BatchResult, CommandData};

/// The remote side of a session.
///
/// A transport fetches single documents by key and applies batches of write
/// and delete commands. Batches are atomic: either every command is applied
/// or the call fails and nothing changes.
///
/// # Implementations
/// - `InMemoryTransport`: in-process server used by tests and embedded use
pub trait DocumentTransportProvider: Send + Sync {
    /// Fetches the document stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns a `NotFound` error when no document exists for the key.
    fn fetch(&self, key: &str) -> DocketResult<JsonDocument>;

    /// Applies `commands` in order and returns one result per command.
    ///
    /// # Errors
    ///
    /// Returns a `StaleData` error when a command's etag does not match the
    /// stored document.
    fn submit_batch(&self, commands: &[CommandData]) -> DocketResult<Vec<BatchResult>>;
}

/// Shared handle to a [DocumentTransportProvider].
///
/// Cloning is cheap; every clone talks to the same provider.
#[derive(Clone)]
pub struct DocumentTransport {
    inner: Arc<dyn DocumentTransportProvider>,
}

impl DocumentTransport {
    pub fn new<T: DocumentTransportProvider + 'static>(inner: T) -> Self {
        DocumentTransport {
            inner: Arc::new(inner),
        }
    }
}

impl Deref for DocumentTransport {
    type Target = Arc<dyn DocumentTransportProvider>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}
