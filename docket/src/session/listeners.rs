use std::any::Any;
use std::sync::Arc;

use crate::document::Document;

/// Hooks around conversions between tracked objects and document trees.
///
/// Every method has an empty default so implementors only override the
/// events they care about. Listeners may mutate the trees they receive.
pub trait DocumentConversionListener: Send + Sync {
    /// Called before an object is serialized.
    fn before_conversion_to_document(
        &self,
        _key: Option<&str>,
        _entity: &dyn Any,
        _metadata: &mut Document,
    ) {
    }

    /// Called after an object was serialized, with the produced tree.
    fn entity_to_document(
        &self,
        _key: Option<&str>,
        _entity: &dyn Any,
        _document: &mut Document,
        _metadata: &mut Document,
    ) {
    }

    /// Called before a fetched document is materialized into an object.
    fn before_conversion_to_entity(
        &self,
        _key: Option<&str>,
        _document: &mut Document,
        _metadata: &mut Document,
    ) {
    }

    /// Called after an object was materialized and its identity assigned.
    fn after_conversion_to_entity(
        &self,
        _key: Option<&str>,
        _document: &Document,
        _metadata: &Document,
        _entity: &mut dyn Any,
    ) {
    }
}

/// Hooks around writes.
pub trait DocumentStoreListener: Send + Sync {
    /// Called for every changed object before its write command is built.
    ///
    /// Return `true` when the listener modified the object; the session then
    /// discards the cached conversion so the write carries the new state.
    fn before_store(
        &self,
        key: Option<&str>,
        entity: &mut dyn Any,
        metadata: &mut Document,
        original: &Document,
    ) -> bool;

    /// Called after the server confirmed the write.
    fn after_store(&self, key: &str, entity: &dyn Any, metadata: &Document);
}

/// Hook called before a delete command is emitted for a tracked object.
pub trait DocumentDeleteListener: Send + Sync {
    fn before_delete(&self, key: &str, entity: Option<&dyn Any>, metadata: Option<&Document>);
}

/// The listeners a session invokes, in registration order.
#[derive(Clone, Default)]
pub struct SessionListeners {
    conversion_listeners: Vec<Arc<dyn DocumentConversionListener>>,
    store_listeners: Vec<Arc<dyn DocumentStoreListener>>,
    delete_listeners: Vec<Arc<dyn DocumentDeleteListener>>,
}

impl SessionListeners {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_conversion_listener(&mut self, listener: Arc<dyn DocumentConversionListener>) {
        self.conversion_listeners.push(listener);
    }

    pub fn register_store_listener(&mut self, listener: Arc<dyn DocumentStoreListener>) {
        self.store_listeners.push(listener);
    }

    pub fn register_delete_listener(&mut self, listener: Arc<dyn DocumentDeleteListener>) {
        self.delete_listeners.push(listener);
    }

    pub fn conversion_listeners(&self) -> &[Arc<dyn DocumentConversionListener>] {
        &self.conversion_listeners
    }

    pub fn store_listeners(&self) -> &[Arc<dyn DocumentStoreListener>] {
        &self.store_listeners
    }

    pub fn delete_listeners(&self) -> &[Arc<dyn DocumentDeleteListener>] {
        &self.delete_listeners
    }

    pub(crate) fn before_conversion_to_document(
        &self,
        key: Option<&str>,
        entity: &dyn Any,
        metadata: &mut Document,
    ) {
        for listener in &self.conversion_listeners {
            listener.before_conversion_to_document(key, entity, metadata);
        }
    }

    pub(crate) fn entity_to_document(
        &self,
        key: Option<&str>,
        entity: &dyn Any,
        document: &mut Document,
        metadata: &mut Document,
    ) {
        for listener in &self.conversion_listeners {
            listener.entity_to_document(key, entity, document, metadata);
        }
    }

    pub(crate) fn before_conversion_to_entity(
        &self,
        key: Option<&str>,
        document: &mut Document,
        metadata: &mut Document,
    ) {
        for listener in &self.conversion_listeners {
            listener.before_conversion_to_entity(key, document, metadata);
        }
    }

    pub(crate) fn after_conversion_to_entity(
        &self,
        key: Option<&str>,
        document: &Document,
        metadata: &Document,
        entity: &mut dyn Any,
    ) {
        for listener in &self.conversion_listeners {
            listener.after_conversion_to_entity(key, document, metadata, entity);
        }
    }

    /// Runs every store listener; returns `true` if any of them asked for
    /// the cached conversion to be discarded.
    pub(crate) fn before_store(
        &self,
        key: Option<&str>,
        entity: &mut dyn Any,
        metadata: &mut Document,
        original: &Document,
    ) -> bool {
        let mut modified = false;
        for listener in &self.store_listeners {
            if listener.before_store(key, entity, metadata, original) {
                modified = true;
            }
        }
        modified
    }

    pub(crate) fn after_store(&self, key: &str, entity: &dyn Any, metadata: &Document) {
        for listener in &self.store_listeners {
            listener.after_store(key, entity, metadata);
        }
    }

    pub(crate) fn before_delete(
        &self,
        key: &str,
        entity: Option<&dyn Any>,
        metadata: Option<&Document>,
    ) {
        for listener in &self.delete_listeners {
            listener.before_delete(key, entity, metadata);
        }
    }
}
