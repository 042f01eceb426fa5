use std::sync::Arc;

use crate::conventions::DocumentConventions;
use crate::document_store::DocumentStore;
use crate::errors::{DocketError, DocketResult, ErrorKind};
use crate::session::{
    DocumentConversionListener, DocumentDeleteListener, DocumentStoreListener, SessionListeners,
};
use crate::transport::{DocumentTransport, DocumentTransportProvider};

const DEFAULT_IDENTIFIER: &str = "docket";

/// Builder for a [DocumentStore].
///
/// Configuration errors are captured as they happen and the first one is
/// returned from [DocumentStoreBuilder::build].
///
/// # Examples
///
/// ```rust,ignore
/// let store = DocumentStore::builder()
///     .transport(InMemoryTransport::new())
///     .use_optimistic_concurrency(true)
///     .max_number_of_requests_per_session(50)
///     .build()?;
/// ```
pub struct DocumentStoreBuilder {
    error: Option<DocketError>,
    identifier: String,
    database: Option<String>,
    conventions: DocumentConventions,
    listeners: SessionListeners,
    transport: Option<DocumentTransport>,
}

impl Default for DocumentStoreBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentStoreBuilder {
    pub fn new() -> Self {
        DocumentStoreBuilder {
            error: None,
            identifier: DEFAULT_IDENTIFIER.to_string(),
            database: None,
            conventions: DocumentConventions::new(),
            listeners: SessionListeners::new(),
            transport: None,
        }
    }

    /// Sets the transport sessions use to reach the server.
    pub fn transport<T: DocumentTransportProvider + 'static>(mut self, transport: T) -> Self {
        self.transport = Some(DocumentTransport::new(transport));
        self
    }

    /// Replaces the default conventions.
    pub fn conventions(mut self, conventions: DocumentConventions) -> Self {
        self.conventions = conventions;
        self
    }

    /// Names the store in log output. The identifier cannot be empty.
    pub fn identifier(mut self, identifier: &str) -> Self {
        if self.error.is_none() {
            if identifier.is_empty() {
                log::error!("Store identifier cannot be empty");
                self.error = Some(DocketError::new(
                    "Store identifier cannot be empty",
                    ErrorKind::InvalidOperation,
                ));
            } else {
                self.identifier = identifier.to_string();
            }
        }
        self
    }

    pub fn database(mut self, database: &str) -> Self {
        self.database = Some(database.to_string());
        self
    }

    /// Shortcut for the optimistic concurrency convention.
    pub fn use_optimistic_concurrency(mut self, value: bool) -> Self {
        if self.error.is_none() {
            if let Err(e) = self.conventions.set_default_use_optimistic_concurrency(value) {
                self.error = Some(e);
            }
        }
        self
    }

    /// Shortcut for the per-session request limit convention.
    pub fn max_number_of_requests_per_session(mut self, value: u32) -> Self {
        if self.error.is_none() {
            if let Err(e) = self.conventions.set_max_number_of_requests_per_session(value) {
                self.error = Some(e);
            }
        }
        self
    }

    pub fn register_conversion_listener<L: DocumentConversionListener + 'static>(
        mut self,
        listener: L,
    ) -> Self {
        self.listeners.register_conversion_listener(Arc::new(listener));
        self
    }

    pub fn register_store_listener<L: DocumentStoreListener + 'static>(mut self, listener: L) -> Self {
        self.listeners.register_store_listener(Arc::new(listener));
        self
    }

    pub fn register_delete_listener<L: DocumentDeleteListener + 'static>(mut self, listener: L) -> Self {
        self.listeners.register_delete_listener(Arc::new(listener));
        self
    }

    /// Builds the store and freezes its conventions.
    ///
    /// # Errors
    ///
    /// Returns the first captured configuration error, or an error when no
    /// transport was configured.
    pub fn build(self) -> DocketResult<DocumentStore> {
        if let Some(error) = self.error {
            return Err(error);
        }

        let transport = match self.transport {
            Some(transport) => transport,
            None => {
                log::error!("A document store needs a transport");
                return Err(DocketError::new(
                    "A document store needs a transport",
                    ErrorKind::InvalidOperation,
                ));
            }
        };

        self.conventions.freeze();
        Ok(DocumentStore::new(
            self.identifier,
            self.database,
            self.conventions,
            self.listeners,
            transport,
        ))
    }
}
