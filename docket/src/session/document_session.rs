use std::any::TypeId;

use indexmap::IndexMap;
use uuid::Uuid;

use crate::common::{
    keys_equal, registrable_key, Value, CREATE_VERSION, ENTITY_NAME, LOCAL_ONLY_HEADERS, METADATA,
    METADATA_ETAG, NON_AUTHORITATIVE_INFORMATION, READ_ONLY, READ_VETO, READ_VETO_REASON,
    READ_VETO_TRIGGER, TYPE_TAG,
};
use crate::conventions::DocumentConventions;
use crate::document::{Document, Etag, JsonDocument};
use crate::document_store::DocumentStore;
use crate::errors::{DocketError, DocketResult, ErrorKind};
use crate::session::caching_scope::CachingScope;
use crate::session::changes::{deep_equals, DocumentsChanges};
use crate::session::commands::{BatchResult, CommandData, SaveChangesData};
use crate::session::entity::{AnyEntity, DocumentEntity, EntityHandle, EntityRef, Loaded};
use crate::session::entity_to_document::{detect_missing_fields, EntityToDocument};
use crate::session::identity_map::IdentityMap;
use crate::session::includes::include_ids;
use crate::session::listeners::SessionListeners;
use crate::session::tracked_entry::TrackedEntry;

/// A unit of work against a [DocumentStore].
///
/// The session tracks the objects it loads or stores, detects which of them
/// changed since they were last synchronized, and turns those changes into a
/// single batch of write and delete commands on [DocumentSession::save_changes].
///
/// Tracked objects are owned by the session and addressed through typed
/// [EntityRef] handles. Reading or mutating an object goes through
/// [DocumentSession::entity] and [DocumentSession::entity_mut]; no explicit
/// "update" call is needed, the next save compares the object against its
/// snapshot.
///
/// A session is meant to be used by one thread for a short-lived piece of
/// work; every remote call counts against a per-session request budget.
///
/// # Examples
///
/// ```rust,ignore
/// let mut session = store.open_session();
/// let user = session.load::<User>("users/1")?.unwrap();
/// session.entity_mut(user)?.name = "Annie".to_string();
/// assert!(session.has_changed(user)?);
/// session.save_changes()?;
/// ```
pub struct DocumentSession {
    id: Uuid,
    store: DocumentStore,
    conventions: DocumentConventions,
    listeners: SessionListeners,
    identity_map: IdentityMap,
    entity_to_document: EntityToDocument,
    deferred_commands: Vec<CommandData>,
    use_optimistic_concurrency: bool,
    allow_non_authoritative_information: bool,
    generate_document_keys_on_store: bool,
    max_number_of_requests_per_session: u32,
    number_of_requests: u32,
}

impl DocumentSession {
    pub(crate) fn new(id: Uuid, store: DocumentStore) -> Self {
        let conventions = store.conventions().clone();
        let listeners = store.listeners().clone();
        DocumentSession {
            id,
            use_optimistic_concurrency: conventions.default_use_optimistic_concurrency(),
            max_number_of_requests_per_session: conventions.max_number_of_requests_per_session(),
            entity_to_document: EntityToDocument::new(conventions.document_simplifier()),
            identity_map: IdentityMap::new(),
            deferred_commands: Vec::new(),
            allow_non_authoritative_information: false,
            generate_document_keys_on_store: true,
            number_of_requests: 0,
            conventions,
            listeners,
            store,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn document_store(&self) -> &DocumentStore {
        &self.store
    }

    pub fn store_identifier(&self) -> String {
        self.store.store_identifier()
    }

    pub fn use_optimistic_concurrency(&self) -> bool {
        self.use_optimistic_concurrency
    }

    pub fn set_use_optimistic_concurrency(&mut self, value: bool) {
        self.use_optimistic_concurrency = value;
    }

    pub fn allow_non_authoritative_information(&self) -> bool {
        self.allow_non_authoritative_information
    }

    pub fn set_allow_non_authoritative_information(&mut self, value: bool) {
        self.allow_non_authoritative_information = value;
    }

    pub fn max_number_of_requests_per_session(&self) -> u32 {
        self.max_number_of_requests_per_session
    }

    pub fn set_max_number_of_requests_per_session(&mut self, value: u32) {
        self.max_number_of_requests_per_session = value;
    }

    pub fn generate_document_keys_on_store(&self) -> bool {
        self.generate_document_keys_on_store
    }

    pub fn set_generate_document_keys_on_store(&mut self, value: bool) {
        self.generate_document_keys_on_store = value;
    }

    /// Number of remote calls made so far.
    pub fn number_of_requests(&self) -> u32 {
        self.number_of_requests
    }

    pub fn number_of_entities_in_unit_of_work(&self) -> usize {
        self.identity_map.len()
    }

    pub fn deferred_commands_count(&self) -> usize {
        self.deferred_commands.len()
    }

    /// Counts one remote call against the session budget.
    ///
    /// # Errors
    ///
    /// Returns a `RequestLimitExceeded` error once the budget is spent.
    pub fn increment_request_count(&mut self) -> DocketResult<()> {
        self.number_of_requests += 1;
        if self.number_of_requests > self.max_number_of_requests_per_session {
            let message = format!(
                "The maximum number of requests ({}) allowed for this session has been reached. \
                 A session is meant to be short lived; open a new session or raise the limit \
                 with set_max_number_of_requests_per_session",
                self.max_number_of_requests_per_session
            );
            log::error!("{}", message);
            return Err(DocketError::new(&message, ErrorKind::RequestLimitExceeded));
        }
        Ok(())
    }

    pub fn entity<T: DocumentEntity>(&self, entity: EntityRef<T>) -> DocketResult<&T> {
        let tracked = self
            .identity_map
            .get(entity.handle())
            .ok_or_else(|| not_tracked(entity.handle()))?;
        tracked
            .entity
            .as_any()
            .downcast_ref::<T>()
            .ok_or_else(|| type_mismatch::<T>(entity.handle()))
    }

    pub fn entity_mut<T: DocumentEntity>(&mut self, entity: EntityRef<T>) -> DocketResult<&mut T> {
        let tracked = self
            .identity_map
            .get_mut(entity.handle())
            .ok_or_else(|| not_tracked(entity.handle()))?;
        tracked
            .entity
            .as_any_mut()
            .downcast_mut::<T>()
            .ok_or_else(|| type_mismatch::<T>(entity.handle()))
    }

    /// Bookkeeping of a tracked object.
    pub fn entry<T>(&self, entity: EntityRef<T>) -> DocketResult<&TrackedEntry> {
        self.tracked_entry(entity.handle())
    }

    pub fn etag_for<T>(&self, entity: EntityRef<T>) -> DocketResult<Option<Etag>> {
        Ok(self.tracked_entry(entity.handle())?.etag().cloned())
    }

    pub fn metadata_for<T>(&self, entity: EntityRef<T>) -> DocketResult<&Document> {
        Ok(self.tracked_entry(entity.handle())?.metadata())
    }

    /// Live metadata of a tracked object. Changes made through it are saved
    /// with the object.
    pub fn metadata_for_mut<T>(&mut self, entity: EntityRef<T>) -> DocketResult<&mut Document> {
        Ok(&mut self.tracked_entry_mut(entity.handle())?.metadata)
    }

    /// The key the object is tracked under, if it has one yet.
    pub fn document_id<T>(&self, entity: EntityRef<T>) -> DocketResult<Option<String>> {
        Ok(self
            .tracked_entry(entity.handle())?
            .key()
            .map(|key| key.to_string()))
    }

    /// Returns the tracked object stored under `key`.
    pub fn tracked_by_key<T: DocumentEntity>(&self, key: &str) -> Option<EntityRef<T>> {
        let handle = self.identity_map.handle_for_key(key)?;
        let tracked = self.identity_map.get(handle)?;
        if tracked.entity.as_any().is::<T>() {
            Some(EntityRef::new(handle))
        } else {
            None
        }
    }

    /// Marks the object read-only; a read-only object is never written or
    /// deleted once the flag is known to the server.
    pub fn mark_read_only<T>(&mut self, entity: EntityRef<T>) -> DocketResult<()> {
        self.tracked_entry_mut(entity.handle())?
            .metadata
            .put(READ_ONLY, true)
    }

    /// Makes change detection always report the object as unchanged.
    pub fn ignore_changes_for<T>(&mut self, entity: EntityRef<T>) -> DocketResult<()> {
        self.tracked_entry_mut(entity.handle())?.ignore_changes = true;
        Ok(())
    }

    /// Asks the server to keep a revision of the object on the next write.
    pub fn explicitly_version<T>(&mut self, entity: EntityRef<T>) -> DocketResult<()> {
        self.tracked_entry_mut(entity.handle())?
            .metadata
            .put(CREATE_VERSION, true)
    }

    /// Starts tracking a new object.
    ///
    /// When the object has no identifier and key generation is on, a key is
    /// generated from its type tag and written back onto the object. Objects
    /// stored without an identifier force a concurrency check so the server
    /// never overwrites an existing document with them.
    pub fn store<T: DocumentEntity>(&mut self, entity: T) -> DocketResult<EntityRef<T>> {
        let force = DocumentEntity::document_id(&entity).is_none();
        self.store_internal(Box::new(entity), None, None, force)
            .map(EntityRef::new)
    }

    /// Stores a new object under an explicit key.
    pub fn store_with_id<T: DocumentEntity>(
        &mut self,
        entity: T,
        id: &str,
    ) -> DocketResult<EntityRef<T>> {
        self.store_internal(Box::new(entity), None, Some(id.to_string()), false)
            .map(EntityRef::new)
    }

    /// Stores a new object with an expected etag. The write fails on the
    /// server when the stored document carries another etag.
    pub fn store_with_etag<T: DocumentEntity>(
        &mut self,
        entity: T,
        etag: Etag,
    ) -> DocketResult<EntityRef<T>> {
        self.store_internal(Box::new(entity), Some(etag), None, true)
            .map(EntityRef::new)
    }

    pub fn store_with<T: DocumentEntity>(
        &mut self,
        entity: T,
        etag: Etag,
        id: &str,
    ) -> DocketResult<EntityRef<T>> {
        self.store_internal(Box::new(entity), Some(etag), Some(id.to_string()), true)
            .map(EntityRef::new)
    }

    /// Stores an object that is already tracked. Only the expected etag and
    /// the concurrency check flag are updated.
    pub fn store_tracked<T: DocumentEntity>(
        &mut self,
        entity: EntityRef<T>,
        etag: Option<Etag>,
    ) -> DocketResult<()> {
        let handle = entity.handle();
        if self.identity_map.is_pending_deletion(handle) {
            let key = self.tracked_entry(handle)?.key().unwrap_or_default().to_string();
            log::error!("Can't store object {}, it was already deleted in this session", key);
            return Err(DocketError::new(
                &format!(
                    "Can't store object, it was already deleted in this session. Document id: {}",
                    key
                ),
                ErrorKind::InvalidOperation,
            ));
        }

        let tracked = self
            .identity_map
            .get_mut(handle)
            .ok_or_else(|| not_tracked(handle))?;
        let force = etag.is_some() || tracked.entity.document_id().is_none();
        if etag.is_some() {
            tracked.entry.etag = etag;
        }
        tracked.entry.force_concurrency_check = force;
        Ok(())
    }

    fn store_internal(
        &mut self,
        mut entity: Box<dyn AnyEntity>,
        etag: Option<Etag>,
        id: Option<String>,
        force_concurrency_check: bool,
    ) -> DocketResult<EntityHandle> {
        let tag = self.type_tag_for(entity.as_ref());

        let id = match id {
            Some(id) => Some(id),
            None => match entity.document_id() {
                Some(id) => Some(id),
                None if self.generate_document_keys_on_store => match &tag {
                    Some(tag) => Some(self.conventions.generate_document_key(tag)?),
                    None => None,
                },
                None => None,
            },
        };

        if let Some(id) = &id {
            if !entity.is_raw_document() {
                entity.set_document_id(id);
            }

            if self
                .deferred_commands
                .iter()
                .any(|command| command.key().map_or(false, |key| keys_equal(key, id)))
            {
                log::error!("Can't store document {}, a deferred command is registered for it", id);
                return Err(DocketError::new(
                    &format!(
                        "Can't store document, there is a deferred command registered for this \
                         document in the session. Document id: {}",
                        id
                    ),
                    ErrorKind::InvalidOperation,
                ));
            }

            self.assert_no_non_unique_instance(id, None)?;
        }

        let mut metadata = Document::new();
        if let Some(tag) = &tag {
            metadata.put(ENTITY_NAME, tag.as_str())?;
        }

        if let Some(id) = &id {
            self.identity_map.unregister_missing(id);
        }

        let entry = TrackedEntry::for_new_object(id.clone(), etag, metadata, force_concurrency_check);
        let handle = self.identity_map.insert(entity, entry);
        if let Some(key) = registrable_key(id.as_deref()) {
            self.identity_map.map_key(key, handle);
        }
        log::debug!("Session {} now tracks {:?} as {}", self.id, id, handle.index());
        Ok(handle)
    }

    fn assert_no_non_unique_instance(
        &self,
        key: &str,
        handle: Option<EntityHandle>,
    ) -> DocketResult<()> {
        let key = match registrable_key(Some(key)) {
            Some(key) => key,
            None => return Ok(()),
        };

        match self.identity_map.handle_for_key(key) {
            Some(existing) if Some(existing) != handle => {
                log::error!("Attempted to associate a different object with id '{}'", key);
                Err(DocketError::new(
                    &format!("Attempted to associate a different object with id '{}'.", key),
                    ErrorKind::UniquenessError,
                ))
            }
            _ => Ok(()),
        }
    }

    /// Starts tracking an object that exists on the server but was not
    /// loaded through this session. The document is fetched to learn its
    /// metadata; the object itself is kept as given.
    pub fn resolve<T: DocumentEntity>(&mut self, entity: T) -> DocketResult<EntityRef<T>> {
        let key = match DocumentEntity::document_id(&entity) {
            Some(key) if !key.is_empty() => key,
            _ => {
                log::error!(
                    "Could not find the document key for {}",
                    std::any::type_name::<T>()
                );
                return Err(DocketError::new(
                    &format!(
                        "Could not find the document key for {}",
                        std::any::type_name::<T>()
                    ),
                    ErrorKind::IdentityError,
                ));
            }
        };

        self.assert_no_non_unique_instance(&key, None)?;
        self.increment_request_count()?;
        let document = self.store.transport().fetch(&key)?;
        let metadata = document.metadata().clone();

        let etag = if self.use_optimistic_concurrency {
            Some(Etag::empty())
        } else {
            None
        };
        let mut entry = TrackedEntry::for_new_object(Some(key.clone()), etag, metadata.clone(), false);
        entry.original_metadata = metadata;

        let handle = self.identity_map.insert(Box::new(entity), entry);
        self.identity_map.map_key(&key, handle);
        Ok(EntityRef::new(handle))
    }

    /// Loads the document stored under `key`.
    ///
    /// A tracked object is returned as is, without a remote call. Keys known
    /// to be missing and documents the server does not have yield `None`.
    pub fn load<T: DocumentEntity>(&mut self, key: &str) -> DocketResult<Option<EntityRef<T>>> {
        if let Some(handle) = self.identity_map.handle_for_key(key) {
            return self.typed_ref::<T>(key, handle).map(Some);
        }

        if self.identity_map.is_known_missing(key) {
            return Ok(None);
        }

        let document = match self.identity_map.remove_included(key) {
            Some(document) => document,
            None => {
                self.increment_request_count()?;
                match self.store.transport().fetch(key) {
                    Ok(document) => document,
                    Err(e) if e.kind() == &ErrorKind::NotFound => {
                        self.identity_map.register_missing(key);
                        return Ok(None);
                    }
                    Err(e) => return Err(e),
                }
            }
        };

        match self.track_document::<T>(document)? {
            Some(Loaded::Tracked(entity)) => Ok(Some(entity)),
            _ => Ok(None),
        }
    }

    /// Tracks a document returned by the server.
    ///
    /// Returns `None` for placeholders of documents that do not exist.
    ///
    /// # Errors
    ///
    /// Returns a `NonAuthoritativeData` error when the document carries
    /// non-authoritative information and the session does not allow it.
    pub fn track_document<T: DocumentEntity>(
        &mut self,
        mut document: JsonDocument,
    ) -> DocketResult<Option<Loaded<T>>> {
        if document.is_non_authoritative() && !self.allow_non_authoritative_information {
            return Err(non_authoritative(document.key()));
        }

        if document.is_placeholder_for_missing() {
            return Ok(None);
        }

        document.stamp_metadata();
        let (key, data, metadata) = document.into_parts();
        self.track_entity::<T>(&key, data, metadata, false).map(Some)
    }

    /// Materializes `document` as a `T` and, unless `no_tracking` is set,
    /// tracks it under `key`.
    ///
    /// When `key` is already tracked the live object wins: it is returned
    /// unchanged and the given document is ignored.
    pub fn track_entity<T: DocumentEntity>(
        &mut self,
        key: &str,
        mut document: Document,
        metadata: Document,
        no_tracking: bool,
    ) -> DocketResult<Loaded<T>> {
        document.remove(METADATA);

        if let Some(handle) = self.identity_map.handle_for_key(key) {
            return self.typed_ref::<T>(key, handle).map(Loaded::Tracked);
        }

        let entity = self.convert_to_entity::<T>(key, &document, &metadata)?;

        if metadata.get_bool(NON_AUTHORITATIVE_INFORMATION) == Some(true)
            && !self.allow_non_authoritative_information
        {
            return Err(non_authoritative(key));
        }

        if no_tracking {
            return Ok(Loaded::Detached(entity));
        }

        let missing = if self.conventions.preserve_document_properties_not_found_on_model()
            && !DocumentEntity::is_raw_document(&entity)
        {
            let identity_field = self.identity_field_for(&entity);
            let reserialized = AnyEntity::serialize(&entity)?;
            detect_missing_fields(&document, &reserialized, &identity_field)
        } else {
            Document::new()
        };

        let etag = metadata.get_str(METADATA_ETAG).map(Etag::from);
        let entry = TrackedEntry::for_loaded_object(key.to_string(), etag, document, metadata);
        let handle = self.identity_map.insert(Box::new(entity), entry);
        self.identity_map.map_key(key, handle);
        self.identity_map.unregister_missing(key);
        self.entity_to_document.register_missing_fields(handle, missing);
        Ok(Loaded::Tracked(EntityRef::new(handle)))
    }

    fn typed_ref<T: DocumentEntity>(
        &self,
        key: &str,
        handle: EntityHandle,
    ) -> DocketResult<EntityRef<T>> {
        let tracked = self
            .identity_map
            .get(handle)
            .ok_or_else(|| not_tracked(handle))?;
        if tracked.entity.as_any().is::<T>() {
            Ok(EntityRef::new(handle))
        } else {
            log::error!(
                "Document '{}' is tracked as {}, not as {}",
                key,
                tracked.entity.type_tag(),
                std::any::type_name::<T>()
            );
            Err(DocketError::new(
                &format!(
                    "Document '{}' is already tracked as a different type",
                    key
                ),
                ErrorKind::ObjectMappingError,
            ))
        }
    }

    fn convert_to_entity<T: DocumentEntity>(
        &self,
        key: &str,
        document: &Document,
        metadata: &Document,
    ) -> DocketResult<T> {
        if TypeId::of::<T>() == TypeId::of::<Document>() {
            return T::from_value(&Value::Document(document.clone()));
        }

        let mut document = document.clone();
        let mut metadata = metadata.clone();
        self.listeners
            .before_conversion_to_entity(Some(key), &mut document, &mut metadata);

        ensure_not_read_vetoed(&metadata)?;

        let mut entity = T::from_value(&Value::Document(document.clone())).map_err(|e| {
            log::error!(
                "Could not convert document {} to {}: {}",
                key,
                std::any::type_name::<T>(),
                e
            );
            DocketError::new_with_cause(
                &format!(
                    "Could not convert document {} to entity of type {}",
                    key,
                    std::any::type_name::<T>()
                ),
                ErrorKind::ObjectMappingError,
                e,
            )
        })?;

        DocumentEntity::set_document_id(&mut entity, key);
        self.listeners
            .after_conversion_to_entity(Some(key), &document, &metadata, &mut entity);
        Ok(entity)
    }

    /// Re-fetches the document of a tracked object and replaces the object,
    /// its snapshots and its etag with the server state.
    pub fn refresh<T: DocumentEntity>(&mut self, entity: EntityRef<T>) -> DocketResult<()> {
        let handle = entity.handle();
        let key = match self.tracked_entry(handle)?.key() {
            Some(key) => key.to_string(),
            None => {
                log::error!("Cannot refresh an object that was never saved");
                return Err(DocketError::new(
                    "Cannot refresh an object that was never saved",
                    ErrorKind::InvalidOperation,
                ));
            }
        };

        self.increment_request_count()?;
        let document = match self.store.transport().fetch(&key) {
            Ok(document) => document,
            Err(e) if e.kind() == &ErrorKind::NotFound => {
                log::error!("Document '{}' no longer exists and was probably deleted", key);
                return Err(DocketError::new(
                    &format!("Document '{}' no longer exists and was probably deleted", key),
                    ErrorKind::NotFound,
                ));
            }
            Err(e) => return Err(e),
        };

        if document.is_non_authoritative() && !self.allow_non_authoritative_information {
            return Err(non_authoritative(&key));
        }

        let etag = document.etag().cloned();
        let (_, data, metadata) = document.into_parts();
        let refreshed = self.convert_to_entity::<T>(&key, &data, &metadata)?;

        let missing = if self.conventions.preserve_document_properties_not_found_on_model()
            && !DocumentEntity::is_raw_document(&refreshed)
        {
            let identity_field = self.identity_field_for(&refreshed);
            detect_missing_fields(&data, &AnyEntity::serialize(&refreshed)?, &identity_field)
        } else {
            Document::new()
        };

        let tracked = self
            .identity_map
            .get_mut(handle)
            .ok_or_else(|| not_tracked(handle))?;
        tracked.entity = Box::new(refreshed);
        tracked.entry.original_metadata = metadata.clone();
        tracked.entry.metadata = metadata;
        tracked.entry.etag = etag;
        tracked.entry.original_snapshot = data;
        tracked.entry.is_new = false;

        self.entity_to_document.discard_cached(handle);
        self.entity_to_document.register_missing_fields(handle, missing);
        Ok(())
    }

    /// Marks a tracked object for deletion on the next save.
    ///
    /// # Errors
    ///
    /// Returns `NotTracked` for unknown objects and `ReadOnlyViolation` for
    /// objects the server marked read-only.
    pub fn delete<T>(&mut self, entity: EntityRef<T>) -> DocketResult<()> {
        self.delete_handle(entity.handle())
    }

    fn delete_handle(&mut self, handle: EntityHandle) -> DocketResult<()> {
        let entry = self.tracked_entry(handle)?;
        if entry.is_originally_read_only() {
            let key = entry.key().unwrap_or_default().to_string();
            log::error!("{} is marked as read only and cannot be deleted", key);
            return Err(DocketError::new(
                &format!("{} is marked as read only and cannot be deleted", key),
                ErrorKind::ReadOnlyViolation,
            ));
        }

        let key = entry.key().map(|key| key.to_string());
        self.identity_map.mark_deleted(handle);
        if let Some(key) = key {
            self.identity_map.register_missing(&key);
        }
        Ok(())
    }

    /// Deletes the document stored under `key`.
    ///
    /// A tracked, unchanged object is deleted as if by reference. A key that
    /// is not tracked is deleted through a deferred command.
    ///
    /// # Errors
    ///
    /// Returns `AmbiguousDeletion` when the tracked object has unsaved
    /// changes.
    pub fn delete_by_key(&mut self, key: &str) -> DocketResult<()> {
        if let Some(handle) = self.identity_map.handle_for_key(key) {
            if self.entity_changed(handle, None)? {
                log::error!("Can't delete changed entity {} using its identifier", key);
                return Err(DocketError::new(
                    "Can't delete changed entity using identifier. Use delete(entity) instead.",
                    ErrorKind::AmbiguousDeletion,
                ));
            }
            return self.delete_handle(handle);
        }

        self.identity_map.remove_included(key);
        self.identity_map.register_missing(key);
        self.defer([CommandData::delete(key, None)]);
        Ok(())
    }

    /// Stops tracking an object and hands it back. Nothing is sent to the
    /// server for it, including a pending deletion.
    pub fn evict<T: DocumentEntity>(&mut self, entity: EntityRef<T>) -> Option<T> {
        let handle = entity.handle();
        let was_pending_deletion = self.identity_map.is_pending_deletion(handle);
        let removed = self.identity_map.remove(handle)?;
        if was_pending_deletion {
            if let Some(key) = removed.entry.key() {
                self.identity_map.unregister_missing(key);
            }
        }
        self.entity_to_document.forget(handle);
        removed
            .entity
            .into_any()
            .downcast::<T>()
            .ok()
            .map(|entity| *entity)
    }

    /// Stops tracking every object and forgets pending deletions and
    /// known-missing keys. Deferred commands and included documents are
    /// kept.
    pub fn clear(&mut self) {
        self.identity_map.clear();
        self.entity_to_document.forget_all();
    }

    /// Queues raw commands sent ahead of the tracked changes on the next
    /// save.
    pub fn defer(&mut self, commands: impl IntoIterator<Item = CommandData>) {
        self.deferred_commands.extend(commands);
    }

    /// Remembers a document the server sent along with a query or load
    /// result, so a later load of its key needs no remote call.
    pub fn track_included_document(&mut self, document: JsonDocument) {
        self.identity_map.include(document);
    }

    /// A key is loaded when it is neither deleted nor known missing, and is
    /// either tracked or included.
    pub fn is_loaded(&self, key: &str) -> bool {
        !self.is_deleted(key)
            && (self.identity_map.handle_for_key(key).is_some()
                || self.identity_map.is_included(key))
    }

    pub fn is_deleted(&self, key: &str) -> bool {
        self.identity_map.is_known_missing(key)
    }

    pub fn register_missing(&mut self, key: &str) {
        self.identity_map.register_missing(key);
    }

    pub fn unregister_missing(&mut self, key: &str) {
        self.identity_map.unregister_missing(key);
    }

    /// Registers as missing every key referenced through `includes` by the
    /// given results that the session has not loaded.
    pub fn register_missing_includes(&mut self, results: &[Document], includes: &[&str]) {
        for result in results {
            for path in includes {
                for id in include_ids(result, path) {
                    if !self.is_loaded(&id) {
                        self.identity_map.register_missing(&id);
                    }
                }
            }
        }
    }

    /// Whether loading `ids` together with `includes` can be answered from
    /// the session alone.
    pub fn check_if_id_already_included(&self, ids: &[&str], includes: &[&str]) -> bool {
        for id in ids {
            if self.identity_map.is_known_missing(id) {
                continue;
            }

            let tracked = match self
                .identity_map
                .handle_for_key(id)
                .and_then(|handle| self.identity_map.get(handle))
            {
                Some(tracked) => tracked,
                None => return false,
            };

            for path in includes {
                let referenced = include_ids(tracked.entry.original_snapshot(), path);
                if referenced.iter().any(|reference| !self.is_loaded(reference)) {
                    return false;
                }
            }
        }
        true
    }

    /// Whether saving now would send anything for tracked objects.
    pub fn has_changes(&mut self) -> DocketResult<bool> {
        if self.identity_map.has_pending_deletions() {
            return Ok(true);
        }

        for handle in self.identity_map.handles() {
            if self.entity_changed(handle, None)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    pub fn has_changed<T>(&mut self, entity: EntityRef<T>) -> DocketResult<bool> {
        self.entity_changed(entity.handle(), None)
    }

    /// Describes every pending change, keyed by document key.
    ///
    /// Objects without a key yet are all reported together under the empty
    /// string. This call only inspects the session; nothing is scheduled or
    /// cleared.
    pub fn what_changed(&mut self) -> DocketResult<IndexMap<String, Vec<DocumentsChanges>>> {
        let mut result: IndexMap<String, Vec<DocumentsChanges>> = IndexMap::new();

        for handle in self.identity_map.pending_deletions() {
            let entry = self.tracked_entry(handle)?;
            let key = entry.key().unwrap_or_default().to_string();
            result
                .entry(key)
                .or_default()
                .push(DocumentsChanges::document_deleted());
        }

        for handle in self.identity_map.handles() {
            if self.identity_map.is_pending_deletion(handle) {
                continue;
            }

            let mut changes = Vec::new();
            self.entity_changed(handle, Some(&mut changes))?;
            if !changes.is_empty() {
                let key = self.tracked_entry(handle)?.key().unwrap_or_default().to_string();
                result.entry(key).or_default().extend(changes);
            }
        }
        Ok(result)
    }

    fn entity_changed(
        &mut self,
        handle: EntityHandle,
        changes: Option<&mut Vec<DocumentsChanges>>,
    ) -> DocketResult<bool> {
        let identity_field = {
            let tracked = self
                .identity_map
                .get(handle)
                .ok_or_else(|| not_tracked(handle))?;
            self.identity_field_for(tracked.entity.as_ref())
        };

        let tracked = self
            .identity_map
            .get(handle)
            .ok_or_else(|| not_tracked(handle))?;
        let entity = tracked.entity.as_ref();
        let entry = &tracked.entry;

        if entry.is_ignoring_changes() {
            return Ok(false);
        }

        if !entity.is_raw_document() {
            if let Some(id) = entity.document_id() {
                let drifted = entry.key().map_or(true, |key| !keys_equal(&id, key));
                if drifted {
                    if let Some(changes) = changes {
                        changes.push(DocumentsChanges::field_changed(
                            &identity_field,
                            &entry.key().map_or(Value::Null, Value::from),
                            &Value::from(id),
                        ));
                    }
                    return Ok(true);
                }
            }
        }

        if entry.is_read_only() {
            return Ok(false);
        }

        if entry.is_new() {
            if let Some(changes) = changes {
                changes.push(DocumentsChanges::document_added());
            }
            return Ok(true);
        }

        let mut scratch_metadata = entry.metadata().clone();
        let document = self.entity_to_document.convert_entity_to_document(
            entry.key(),
            handle,
            entity,
            &mut scratch_metadata,
            &self.listeners,
            &identity_field,
        )?;

        let changed = match changes {
            Some(changes) => {
                let same_document =
                    deep_equals(&document, entry.original_snapshot(), Some(&mut *changes));
                let same_metadata =
                    deep_equals(entry.metadata(), entry.original_metadata(), Some(changes));
                !(same_document && same_metadata)
            }
            None => {
                !deep_equals(&document, entry.original_snapshot(), None)
                    || !deep_equals(entry.metadata(), entry.original_metadata(), None)
            }
        };
        Ok(changed)
    }

    /// Opens a conversion caching scope on this session. Conversions made
    /// while the scope is alive are computed once per object; the scope ends
    /// when the returned guard is dropped.
    pub fn caching_scope(&mut self) -> CachingScope<'_> {
        CachingScope::new(self)
    }

    pub(crate) fn begin_caching(&mut self) -> bool {
        self.entity_to_document.begin_caching()
    }

    pub(crate) fn end_caching(&mut self) {
        self.entity_to_document.end_caching();
    }

    pub fn is_caching(&self) -> bool {
        self.entity_to_document.is_caching()
    }

    /// Builds the batch the next save would send: deferred commands first,
    /// then deletions, then writes of changed objects.
    ///
    /// Preparing is not free of side effects: deferred commands are dequeued,
    /// deleted objects stop being tracked and written objects lose their key
    /// mapping until [DocumentSession::reconcile] restores it.
    pub fn prepare_batch(&mut self) -> DocketResult<SaveChangesData> {
        let mut scope = self.caching_scope();
        scope.prepare_batch_in_scope()
    }

    fn prepare_batch_in_scope(&mut self) -> DocketResult<SaveChangesData> {
        let deferred = std::mem::take(&mut self.deferred_commands);
        let mut data = SaveChangesData::with_deferred(deferred);
        self.prepare_deletions(&mut data);
        self.prepare_puts(&mut data)?;
        Ok(data)
    }

    fn prepare_deletions(&mut self, data: &mut SaveChangesData) {
        for handle in self.identity_map.pending_deletions() {
            let (key, etag) = match self.identity_map.get(handle) {
                Some(tracked) if tracked.entry.is_originally_read_only() => continue,
                Some(tracked) => (
                    tracked.entry.key().map(|key| key.to_string()),
                    if self.use_optimistic_concurrency {
                        tracked.entry.etag().cloned()
                    } else {
                        None
                    },
                ),
                None => continue,
            };

            let removed = match self.identity_map.remove(handle) {
                Some(removed) => removed,
                None => continue,
            };
            self.entity_to_document.forget(handle);

            match key {
                Some(key) => {
                    self.listeners.before_delete(
                        &key,
                        Some(removed.entity.as_any()),
                        Some(removed.entry.metadata()),
                    );
                    data.push(CommandData::delete(key, etag), Some(handle));
                }
                None => {
                    log::debug!("Dropping deleted object that was never saved");
                }
            }
        }
        self.identity_map.clear_pending_deletions();
    }

    fn prepare_puts(&mut self, data: &mut SaveChangesData) -> DocketResult<()> {
        for handle in self.identity_map.handles() {
            if !self.entity_changed(handle, None)? {
                continue;
            }

            let tracked = self
                .identity_map
                .get_mut(handle)
                .ok_or_else(|| not_tracked(handle))?;
            let key = tracked.entry.key.clone();
            let entry = &mut tracked.entry;
            let modified = self.listeners.before_store(
                key.as_deref(),
                tracked.entity.as_any_mut(),
                &mut entry.metadata,
                &entry.original_snapshot,
            );
            if modified {
                log::debug!("A store listener modified {:?}, discarding its conversion", key);
                self.entity_to_document.discard_cached(handle);
            }

            if let Some(key) = &key {
                self.identity_map.unmap_key(key);
            }

            let command = self.create_put_command(handle)?;
            data.push(command, Some(handle));
        }
        Ok(())
    }

    fn create_put_command(&mut self, handle: EntityHandle) -> DocketResult<CommandData> {
        let tracked = self
            .identity_map
            .get_mut(handle)
            .ok_or_else(|| not_tracked(handle))?;
        let entity = tracked.entity.as_ref();
        let entry = &mut tracked.entry;

        if !entity.is_raw_document() {
            if let (Some(id), Some(key)) = (entity.document_id(), entry.key()) {
                if !keys_equal(&id, key) {
                    log::error!(
                        "Entity {} had document key '{}' but now has document key property '{}'",
                        entity.type_tag(),
                        key,
                        id
                    );
                    return Err(DocketError::new(
                        &format!(
                            "Entity {} had document key '{}' but now has document key property \
                             '{}'. You cannot change the document key of a loaded entity",
                            entity.type_tag(),
                            key,
                            id
                        ),
                        ErrorKind::IdentityError,
                    ));
                }
            }
        }

        let identity_field = entity
            .identity_field()
            .unwrap_or_else(|| self.conventions.identity_property_name());
        let document = self.entity_to_document.convert_entity_to_document(
            entry.key.as_deref(),
            handle,
            entity,
            &mut entry.metadata,
            &self.listeners,
            &identity_field,
        )?;

        let etag = if self.use_optimistic_concurrency || entry.force_concurrency_check {
            Some(entry.etag.clone().unwrap_or_else(Etag::empty))
        } else {
            None
        };

        let mut metadata: Document = entry
            .metadata
            .iter()
            .filter(|(field, _)| !LOCAL_ONLY_HEADERS.contains(&field.as_str()))
            .map(|(field, value)| (field.clone(), value.clone()))
            .collect();
        if !entity.is_raw_document() {
            metadata.put(TYPE_TAG, entity.type_tag())?;
        }

        Ok(CommandData::put(entry.key.clone(), etag, document, metadata))
    }

    /// Applies the server's answers to a prepared batch: written objects get
    /// their final key, etag and metadata, and their snapshot is reset so
    /// they report no changes.
    pub fn reconcile(&mut self, data: &SaveChangesData, results: &[BatchResult]) -> DocketResult<()> {
        for (index, result) in results
            .iter()
            .enumerate()
            .skip(data.deferred_commands_count())
        {
            if !result.is_put() {
                continue;
            }

            let handle = match data.entity_at(index) {
                Some(handle) => handle,
                None => continue,
            };
            if !self.identity_map.contains(handle) {
                log::warn!("Written document {} is no longer tracked", result.key());
                continue;
            }

            self.apply_put_result(handle, result)?;
        }

        let last_written = results
            .iter()
            .rev()
            .find(|result| result.is_put())
            .and_then(|result| result.etag().cloned());
        self.store.update_last_written_etag(last_written);
        Ok(())
    }

    fn apply_put_result(&mut self, handle: EntityHandle, result: &BatchResult) -> DocketResult<()> {
        let key = result.key().to_string();
        let mut metadata = result.metadata().clone();
        if let Some(etag) = result.etag() {
            metadata.put(METADATA_ETAG, etag.as_str())?;
        }

        let identity_field = {
            let tracked = self
                .identity_map
                .get_mut(handle)
                .ok_or_else(|| not_tracked(handle))?;
            tracked.entry.etag = result.etag().cloned();
            tracked.entry.key = Some(key.clone());
            tracked.entry.original_metadata = metadata.clone();
            tracked.entry.metadata = metadata;
            tracked.entry.is_new = false;
            if !tracked.entity.is_raw_document() {
                tracked.entity.set_document_id(&key);
            }
            tracked
                .entity
                .identity_field()
                .unwrap_or_else(|| self.conventions.identity_property_name())
        };

        self.identity_map.map_key(&key, handle);

        let tracked = self
            .identity_map
            .get_mut(handle)
            .ok_or_else(|| not_tracked(handle))?;
        let mut scratch_metadata = tracked.entry.metadata.clone();
        tracked.entry.original_snapshot = self.entity_to_document.convert_entity_to_document(
            Some(&key),
            handle,
            tracked.entity.as_ref(),
            &mut scratch_metadata,
            &self.listeners,
            &identity_field,
        )?;

        self.listeners
            .after_store(&key, tracked.entity.as_any(), tracked.entry.metadata());
        Ok(())
    }

    /// Sends every pending change to the server in one batch.
    ///
    /// Nothing is sent when there are no changes. The conversion cache is
    /// held for the whole pass and released even when the pass fails.
    pub fn save_changes(&mut self) -> DocketResult<()> {
        let mut scope = self.caching_scope();
        let data = scope.prepare_batch_in_scope()?;
        if data.is_empty() {
            return Ok(());
        }

        scope.increment_request_count()?;
        scope.log_batch(&data);

        let results = scope.store.transport().submit_batch(data.commands())?;
        if results.len() != data.commands().len() {
            log::error!(
                "Server answered {} results for a batch of {} commands",
                results.len(),
                data.commands().len()
            );
            return Err(DocketError::new(
                "Server answered a different number of results than commands sent",
                ErrorKind::TransportError,
            ));
        }

        scope.reconcile(&data, &results)
    }

    fn log_batch(&self, data: &SaveChangesData) {
        if !log::log_enabled!(log::Level::Debug) {
            return;
        }

        log::debug!(
            "Saving {} changes to {}",
            data.commands().len(),
            self.store_identifier()
        );
        for command in data.commands() {
            log::debug!(
                "\t{} {}",
                command.method(),
                command.key().unwrap_or("<server assigned>")
            );
        }
    }

    fn tracked_entry(&self, handle: EntityHandle) -> DocketResult<&TrackedEntry> {
        self.identity_map
            .get(handle)
            .map(|tracked| &tracked.entry)
            .ok_or_else(|| not_tracked(handle))
    }

    fn tracked_entry_mut(&mut self, handle: EntityHandle) -> DocketResult<&mut TrackedEntry> {
        self.identity_map
            .get_mut(handle)
            .map(|tracked| &mut tracked.entry)
            .ok_or_else(|| not_tracked(handle))
    }

    fn identity_field_for(&self, entity: &dyn AnyEntity) -> String {
        entity
            .identity_field()
            .unwrap_or_else(|| self.conventions.identity_property_name())
    }

    fn type_tag_for(&self, entity: &dyn AnyEntity) -> Option<String> {
        entity
            .entity_name()
            .map(|name| self.conventions.find_type_tag_name(&name))
            .filter(|tag| !tag.is_empty())
    }
}

fn not_tracked(handle: EntityHandle) -> DocketError {
    log::error!(
        "Object {}#{} is not associated with the session",
        handle.index(),
        handle.generation()
    );
    DocketError::new(
        "Object is not associated with the session, cannot use an unknown entity instance",
        ErrorKind::NotTracked,
    )
}

fn type_mismatch<T>(handle: EntityHandle) -> DocketError {
    log::error!(
        "Object {} is not a {}",
        handle.index(),
        std::any::type_name::<T>()
    );
    DocketError::new(
        &format!("Tracked object is not a {}", std::any::type_name::<T>()),
        ErrorKind::ObjectMappingError,
    )
}

fn non_authoritative(key: &str) -> DocketError {
    let message = format!(
        "Document {} returned Non Authoritative Information (probably modified by a \
         transaction in progress) and allow_non_authoritative_information is set to false",
        key
    );
    log::error!("{}", message);
    DocketError::new(&message, ErrorKind::NonAuthoritativeData)
}

fn ensure_not_read_vetoed(metadata: &Document) -> DocketResult<()> {
    let veto = match metadata.get(READ_VETO).and_then(|value| value.as_document()) {
        Some(veto) => veto,
        None => return Ok(()),
    };

    let message = format!(
        "Document could not be read because of a read veto.\nThe read was vetoed by: {}\nVeto reason: {}",
        veto.get_str(READ_VETO_TRIGGER).unwrap_or_default(),
        veto.get_str(READ_VETO_REASON).unwrap_or_default()
    );
    log::error!("{}", message);
    Err(DocketError::new(&message, ErrorKind::ReadVetoed))
}
