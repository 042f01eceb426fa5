use std::any::Any;
use std::fmt::{Debug, Formatter};
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

use crate::common::{Convertible, Value};
use crate::document::Document;
use crate::errors::{DocketError, DocketResult, ErrorKind};

/// A type the session can track.
///
/// An entity knows how to convert itself to and from a document tree
/// (through [Convertible]) and exposes its client-assigned identifier, if it
/// has one.
///
/// # Examples
///
/// ```rust,ignore
/// struct User { id: Option<String>, name: String }
///
/// impl DocumentEntity for User {
///     fn document_id(&self) -> Option<String> { self.id.clone() }
///     fn set_document_id(&mut self, id: &str) { self.id = Some(id.to_string()) }
/// }
/// ```
pub trait DocumentEntity: Convertible<Output = Self> + Any + Send + Sync {
    /// The entity name used to derive the type tag (`Raven-Entity-Name`) and
    /// the key prefix. Defaults to the unqualified type name.
    fn entity_name(&self) -> Option<String> {
        Some(short_type_name(std::any::type_name::<Self>()).to_string())
    }

    /// Name of the field holding the identifier in the serialized form.
    /// `None` defers to the conventions.
    fn identity_field(&self) -> Option<String> {
        None
    }

    /// Reads the client-assigned identifier.
    fn document_id(&self) -> Option<String>;

    /// Writes the identifier back onto the object.
    fn set_document_id(&mut self, id: &str);

    /// Raw document trees are tracked as-is, without identity handling.
    fn is_raw_document(&self) -> bool {
        false
    }
}

impl DocumentEntity for Document {
    fn entity_name(&self) -> Option<String> {
        None
    }

    fn document_id(&self) -> Option<String> {
        None
    }

    fn set_document_id(&mut self, _id: &str) {}

    fn is_raw_document(&self) -> bool {
        true
    }
}

pub(crate) fn short_type_name(full: &str) -> &str {
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

/// Object-safe view of a [DocumentEntity] stored in the identity map.
pub(crate) trait AnyEntity: Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn into_any(self: Box<Self>) -> Box<dyn Any>;
    fn entity_name(&self) -> Option<String>;
    fn identity_field(&self) -> Option<String>;
    fn document_id(&self) -> Option<String>;
    fn set_document_id(&mut self, id: &str);
    fn is_raw_document(&self) -> bool;
    fn type_tag(&self) -> &'static str;
    fn serialize(&self) -> DocketResult<Document>;
}

impl<T: DocumentEntity> AnyEntity for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }

    fn entity_name(&self) -> Option<String> {
        DocumentEntity::entity_name(self)
    }

    fn identity_field(&self) -> Option<String> {
        DocumentEntity::identity_field(self)
    }

    fn document_id(&self) -> Option<String> {
        DocumentEntity::document_id(self)
    }

    fn set_document_id(&mut self, id: &str) {
        DocumentEntity::set_document_id(self, id)
    }

    fn is_raw_document(&self) -> bool {
        DocumentEntity::is_raw_document(self)
    }

    fn type_tag(&self) -> &'static str {
        std::any::type_name::<T>()
    }

    fn serialize(&self) -> DocketResult<Document> {
        match self.to_value()? {
            Value::Document(doc) => Ok(doc),
            other => {
                log::error!(
                    "Entity {} serialized to {} instead of an object",
                    std::any::type_name::<T>(),
                    other.type_name()
                );
                Err(DocketError::new(
                    "Entity must serialize to an object",
                    ErrorKind::ObjectMappingError,
                ))
            }
        }
    }
}

/// Untyped handle of a tracked object. Stable for the lifetime of the
/// tracking; a handle to an evicted object never resolves again.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityHandle {
    index: usize,
    generation: u64,
}

impl EntityHandle {
    pub(crate) fn new(index: usize, generation: u64) -> Self {
        EntityHandle { index, generation }
    }

    pub(crate) fn index(&self) -> usize {
        self.index
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }
}

/// Typed handle of an object tracked by a [crate::session::DocumentSession].
///
/// The session owns tracked objects; callers reach them through
/// [crate::session::DocumentSession::entity] and
/// [crate::session::DocumentSession::entity_mut] using this handle.
pub struct EntityRef<T> {
    handle: EntityHandle,
    _marker: PhantomData<fn() -> T>,
}

impl<T> EntityRef<T> {
    pub(crate) fn new(handle: EntityHandle) -> Self {
        EntityRef {
            handle,
            _marker: PhantomData,
        }
    }

    pub fn handle(&self) -> EntityHandle {
        self.handle
    }
}

impl<T> Clone for EntityRef<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for EntityRef<T> {}

impl<T> PartialEq for EntityRef<T> {
    fn eq(&self, other: &Self) -> bool {
        self.handle == other.handle
    }
}

impl<T> Eq for EntityRef<T> {}

impl<T> Hash for EntityRef<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.handle.hash(state)
    }
}

impl<T> Debug for EntityRef<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "EntityRef<{}>({}#{})",
            short_type_name(std::any::type_name::<T>()),
            self.handle.index,
            self.handle.generation
        )
    }
}

impl<T> From<EntityRef<T>> for EntityHandle {
    fn from(value: EntityRef<T>) -> Self {
        value.handle
    }
}

/// Result of tracking a fetched document.
#[derive(Debug)]
pub enum Loaded<T> {
    /// The object is tracked by the session.
    Tracked(EntityRef<T>),
    /// The object was materialized without tracking.
    Detached(T),
}

impl<T> Loaded<T> {
    pub fn tracked(self) -> Option<EntityRef<T>> {
        match self {
            Loaded::Tracked(r) => Some(r),
            Loaded::Detached(_) => None,
        }
    }

    pub fn detached(self) -> Option<T> {
        match self {
            Loaded::Tracked(_) => None,
            Loaded::Detached(t) => Some(t),
        }
    }
}
