use std::sync::Arc;

use uuid::Uuid;

use crate::common::{atomic, Atomic, ReadExecutor, WriteExecutor};
use crate::conventions::DocumentConventions;
use crate::document::Etag;
use crate::document_store_builder::DocumentStoreBuilder;
use crate::session::{DocumentSession, SessionListeners};
use crate::transport::DocumentTransport;

/// Entry point of the client: owns the conventions, the listeners and the
/// transport shared by every session it opens.
///
/// `DocumentStore` is cheap to clone; clones share the same state, including
/// the etag of the last write confirmed by any session.
///
/// # Examples
///
/// ```rust,ignore
/// let store = DocumentStore::builder()
///     .transport(InMemoryTransport::new())
///     .identifier("orders-service")
///     .build()?;
///
/// let mut session = store.open_session();
/// let user = session.store(User::new("Ann"))?;
/// session.save_changes()?;
/// ```
#[derive(Clone)]
pub struct DocumentStore {
    inner: Arc<DocumentStoreInner>,
}

impl DocumentStore {
    pub(crate) fn new(
        identifier: String,
        database: Option<String>,
        conventions: DocumentConventions,
        listeners: SessionListeners,
        transport: DocumentTransport,
    ) -> Self {
        DocumentStore {
            inner: Arc::new(DocumentStoreInner {
                identifier,
                database,
                conventions,
                listeners,
                transport,
                last_written_etag: atomic(None),
            }),
        }
    }

    /// Creates a builder for configuring a store.
    pub fn builder() -> DocumentStoreBuilder {
        DocumentStoreBuilder::new()
    }

    /// Opens a new unit of work with a fresh session id.
    pub fn open_session(&self) -> DocumentSession {
        let id = Uuid::new_v4();
        log::debug!("Opening session {} on {}", id, self.store_identifier());
        DocumentSession::new(id, self.clone())
    }

    pub fn identifier(&self) -> &str {
        &self.inner.identifier
    }

    pub fn database(&self) -> Option<&str> {
        self.inner.database.as_deref()
    }

    /// `identifier;database`, used to label the store in log output.
    pub fn store_identifier(&self) -> String {
        format!(
            "{};{}",
            self.inner.identifier,
            self.inner.database.as_deref().unwrap_or("<default>")
        )
    }

    pub fn conventions(&self) -> &DocumentConventions {
        &self.inner.conventions
    }

    pub fn listeners(&self) -> &SessionListeners {
        &self.inner.listeners
    }

    pub fn transport(&self) -> &DocumentTransport {
        &self.inner.transport
    }

    /// Etag of the last write confirmed by any session of this store.
    pub fn last_written_etag(&self) -> Option<Etag> {
        self.inner.last_written_etag.read_with(|etag| etag.clone())
    }

    pub(crate) fn update_last_written_etag(&self, etag: Option<Etag>) {
        if etag.is_some() {
            self.inner
                .last_written_etag
                .write_with(|current| *current = etag);
        }
    }
}

struct DocumentStoreInner {
    identifier: String,
    database: Option<String>,
    conventions: DocumentConventions,
    listeners: SessionListeners,
    transport: DocumentTransport,
    last_written_etag: Atomic<Option<Etag>>,
}
