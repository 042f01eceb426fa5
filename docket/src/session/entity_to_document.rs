use std::collections::HashMap;

use crate::conventions::DocumentSimplifier;
use crate::document::Document;
use crate::errors::DocketResult;
use crate::session::entity::{AnyEntity, EntityHandle};
use crate::session::listeners::SessionListeners;

/// Converts tracked objects to document trees.
///
/// While a caching scope is open, the first conversion of an object is
/// stored and later conversions return a snapshot of it. Cached trees are
/// keyed by the object's handle, never by value. Because [Document] clones
/// are copy-on-write, a snapshot handed out can be mutated freely without
/// touching the cached tree.
///
/// The missing-field ledger keeps, per object, the fields the server sent
/// that the object's type has no property for; they are merged back into
/// every conversion so a round trip does not drop them.
pub(crate) struct EntityToDocument {
    cached_documents: Option<HashMap<EntityHandle, Document>>,
    missing_fields: HashMap<EntityHandle, Document>,
    simplifier: Option<DocumentSimplifier>,
}

impl EntityToDocument {
    pub(crate) fn new(simplifier: Option<DocumentSimplifier>) -> Self {
        EntityToDocument {
            cached_documents: None,
            missing_fields: HashMap::new(),
            simplifier,
        }
    }

    pub(crate) fn is_caching(&self) -> bool {
        self.cached_documents.is_some()
    }

    /// Opens a caching scope, or empties the one already open. Returns
    /// `true` when this call created the scope and is responsible for
    /// closing it.
    pub(crate) fn begin_caching(&mut self) -> bool {
        match self.cached_documents.as_mut() {
            Some(cache) => {
                cache.clear();
                false
            }
            None => {
                self.cached_documents = Some(HashMap::new());
                true
            }
        }
    }

    pub(crate) fn end_caching(&mut self) {
        self.cached_documents = None;
    }

    pub(crate) fn cached_count(&self) -> usize {
        self.cached_documents.as_ref().map_or(0, |c| c.len())
    }

    pub(crate) fn discard_cached(&mut self, handle: EntityHandle) {
        if let Some(cache) = self.cached_documents.as_mut() {
            cache.remove(&handle);
        }
    }

    /// Drops everything known about an object that is no longer tracked.
    pub(crate) fn forget(&mut self, handle: EntityHandle) {
        self.discard_cached(handle);
        self.missing_fields.remove(&handle);
    }

    pub(crate) fn forget_all(&mut self) {
        if let Some(cache) = self.cached_documents.as_mut() {
            cache.clear();
        }
        self.missing_fields.clear();
    }

    pub(crate) fn register_missing_fields(&mut self, handle: EntityHandle, fields: Document) {
        if fields.is_empty() {
            self.missing_fields.remove(&handle);
        } else {
            self.missing_fields.insert(handle, fields);
        }
    }

    pub(crate) fn missing_fields(&self, handle: EntityHandle) -> Option<&Document> {
        self.missing_fields.get(&handle)
    }

    /// Converts an object, running the conversion listeners and removing the
    /// identity field from the produced tree.
    pub(crate) fn convert_entity_to_document(
        &mut self,
        key: Option<&str>,
        handle: EntityHandle,
        entity: &dyn AnyEntity,
        metadata: &mut Document,
        listeners: &SessionListeners,
        identity_field: &str,
    ) -> DocketResult<Document> {
        listeners.before_conversion_to_document(key, entity.as_any(), metadata);

        let mut document = self.object_as_document(handle, entity)?;
        if !entity.is_raw_document() {
            document.remove(identity_field);
        }

        listeners.entity_to_document(key, entity.as_any(), &mut document, metadata);
        Ok(document)
    }

    fn object_as_document(
        &mut self,
        handle: EntityHandle,
        entity: &dyn AnyEntity,
    ) -> DocketResult<Document> {
        if entity.is_raw_document() {
            return entity.serialize();
        }

        if let Some(cached) = self
            .cached_documents
            .as_ref()
            .and_then(|cache| cache.get(&handle))
        {
            return Ok(cached.clone());
        }

        let mut document = entity.serialize()?;
        if let Some(missing) = self.missing_fields.get(&handle) {
            for (field, value) in missing.iter() {
                if !document.contains_key(field) {
                    document.put(field.as_str(), value.clone())?;
                }
            }
        }

        if let Some(simplify) = &self.simplifier {
            simplify(&mut document);
        }

        if let Some(cache) = self.cached_documents.as_mut() {
            cache.insert(handle, document.clone());
        }
        Ok(document)
    }
}

/// Fields present in the fetched document that did not survive a round trip
/// through the object's type.
pub(crate) fn detect_missing_fields(
    source: &Document,
    reserialized: &Document,
    identity_field: &str,
) -> Document {
    source
        .iter()
        .filter(|(field, _)| field.as_str() != identity_field && !reserialized.contains_key(field))
        .map(|(field, value)| (field.clone(), value.clone()))
        .collect()
}
