//! Conventions shared by every session of a document store.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, OnceLock};

use crate::common::{DEFAULT_IDENTITY_PROPERTY, DEFAULT_MAX_REQUESTS_PER_SESSION};
use crate::document::Document;
use crate::errors::{DocketError, DocketResult, ErrorKind};
use crate::key_generator::{KeyGenerator, SequentialKeyGenerator};

/// Maps an entity name to its type tag (`User` to `Users`).
pub type TypeTagNamer = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// Post-processes every freshly serialized document tree.
pub type DocumentSimplifier = Arc<dyn Fn(&mut Document) + Send + Sync>;

/// Public interface for the document store conventions.
///
/// Conventions can be changed until a [crate::document_store::DocumentStore]
/// is built with them; after that every setter fails with
/// `InvalidOperation`.
///
/// # Examples
///
/// ```rust,ignore
/// let conventions = DocumentConventions::new();
/// conventions.set_default_use_optimistic_concurrency(true)?;
/// conventions.set_max_number_of_requests_per_session(50)?;
/// ```
#[derive(Clone)]
pub struct DocumentConventions {
    inner: Arc<DocumentConventionsInner>,
}

impl Default for DocumentConventions {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentConventions {
    /// Creates conventions with default values.
    pub fn new() -> Self {
        DocumentConventions {
            inner: Arc::new(DocumentConventionsInner::new()),
        }
    }

    /// Whether new sessions use optimistic concurrency. Defaults to `false`.
    pub fn default_use_optimistic_concurrency(&self) -> bool {
        self.inner.default_use_optimistic_concurrency.load(Ordering::Relaxed)
    }

    /// Sets whether new sessions use optimistic concurrency.
    ///
    /// # Errors
    ///
    /// Returns error if the conventions are frozen.
    pub fn set_default_use_optimistic_concurrency(&self, value: bool) -> DocketResult<()> {
        self.inner.ensure_not_frozen("default_use_optimistic_concurrency")?;
        self.inner
            .default_use_optimistic_concurrency
            .store(value, Ordering::Relaxed);
        Ok(())
    }

    /// Maximum number of remote calls a session may make. Defaults to 30.
    pub fn max_number_of_requests_per_session(&self) -> u32 {
        self.inner
            .max_number_of_requests_per_session
            .load(Ordering::Relaxed)
    }

    /// Sets the maximum number of remote calls per session.
    ///
    /// # Errors
    ///
    /// Returns error if the conventions are frozen or the value is zero.
    pub fn set_max_number_of_requests_per_session(&self, value: u32) -> DocketResult<()> {
        self.inner.ensure_not_frozen("max_number_of_requests_per_session")?;
        if value == 0 {
            log::error!("Maximum number of requests per session must be positive");
            return Err(DocketError::new(
                "Maximum number of requests per session must be positive",
                ErrorKind::InvalidOperation,
            ));
        }
        self.inner
            .max_number_of_requests_per_session
            .store(value, Ordering::Relaxed);
        Ok(())
    }

    /// Whether fields the client type has no property for are preserved
    /// across round trips. Defaults to `true`.
    pub fn preserve_document_properties_not_found_on_model(&self) -> bool {
        self.inner
            .preserve_document_properties_not_found_on_model
            .load(Ordering::Relaxed)
    }

    pub fn set_preserve_document_properties_not_found_on_model(
        &self,
        value: bool,
    ) -> DocketResult<()> {
        self.inner
            .ensure_not_frozen("preserve_document_properties_not_found_on_model")?;
        self.inner
            .preserve_document_properties_not_found_on_model
            .store(value, Ordering::Relaxed);
        Ok(())
    }

    /// The identity field used when an entity does not name its own.
    /// Defaults to `"id"`.
    pub fn identity_property_name(&self) -> String {
        self.inner
            .identity_property_name
            .get()
            .cloned()
            .unwrap_or_else(|| DEFAULT_IDENTITY_PROPERTY.to_string())
    }

    /// Sets the fallback identity field (can only be set once).
    pub fn set_identity_property_name(&self, name: &str) -> DocketResult<()> {
        self.inner.ensure_not_frozen("identity_property_name")?;
        if name.is_empty() {
            log::error!("Identity property name cannot be empty");
            return Err(DocketError::new(
                "Identity property name cannot be empty",
                ErrorKind::InvalidOperation,
            ));
        }
        self.inner
            .identity_property_name
            .set(name.to_string())
            .map_err(|_| already_set("identity_property_name"))
    }

    /// Computes the type tag of an entity name.
    pub fn find_type_tag_name(&self, entity_name: &str) -> String {
        match self.inner.type_tag_namer.get() {
            Some(namer) => namer(entity_name),
            None => default_type_tag_name(entity_name),
        }
    }

    /// Replaces the default pluralizing type-tag naming (can only be set once).
    pub fn set_type_tag_namer(&self, namer: TypeTagNamer) -> DocketResult<()> {
        self.inner.ensure_not_frozen("type_tag_namer")?;
        self.inner
            .type_tag_namer
            .set(namer)
            .map_err(|_| already_set("type_tag_namer"))
    }

    pub fn key_generator(&self) -> Arc<dyn KeyGenerator> {
        self.inner
            .key_generator
            .get_or_init(|| Arc::new(SequentialKeyGenerator::new()))
            .clone()
    }

    /// Sets the key generator (can only be set once).
    pub fn set_key_generator(&self, generator: Arc<dyn KeyGenerator>) -> DocketResult<()> {
        self.inner.ensure_not_frozen("key_generator")?;
        self.inner
            .key_generator
            .set(generator)
            .map_err(|_| already_set("key_generator"))
    }

    /// Generates a key for an object with the given type tag.
    pub fn generate_document_key(&self, tag: &str) -> DocketResult<String> {
        self.key_generator().generate_document_key(tag)
    }

    pub fn document_simplifier(&self) -> Option<DocumentSimplifier> {
        self.inner.document_simplifier.get().cloned()
    }

    /// Registers a hook run on every freshly serialized tree (can only be
    /// set once).
    pub fn set_document_simplifier(&self, simplifier: DocumentSimplifier) -> DocketResult<()> {
        self.inner.ensure_not_frozen("document_simplifier")?;
        self.inner
            .document_simplifier
            .set(simplifier)
            .map_err(|_| already_set("document_simplifier"))
    }

    pub fn is_frozen(&self) -> bool {
        self.inner.frozen.load(Ordering::Relaxed)
    }

    pub(crate) fn freeze(&self) {
        self.inner.frozen.store(true, Ordering::Relaxed);
    }
}

fn already_set(name: &str) -> DocketError {
    log::error!("Convention {} is already set", name);
    DocketError::new(
        &format!("Convention {} is already set", name),
        ErrorKind::InvalidOperation,
    )
}

/// Pluralizes an entity name the way type tags are usually spelled.
pub fn default_type_tag_name(entity_name: &str) -> String {
    let lower = entity_name.to_lowercase();
    if lower.is_empty() {
        return String::new();
    }

    let ends_with_consonant_y = lower.ends_with('y')
        && lower
            .chars()
            .rev()
            .nth(1)
            .map_or(false, |c| !"aeiou".contains(c));

    if ends_with_consonant_y {
        format!("{}ies", &entity_name[..entity_name.len() - 1])
    } else if ["s", "x", "z", "ch", "sh"].iter().any(|s| lower.ends_with(s)) {
        format!("{}es", entity_name)
    } else {
        format!("{}s", entity_name)
    }
}

/// Private implementation of the conventions.
struct DocumentConventionsInner {
    /// Set once a store is built with these conventions
    frozen: AtomicBool,
    default_use_optimistic_concurrency: AtomicBool,
    max_number_of_requests_per_session: AtomicU32,
    preserve_document_properties_not_found_on_model: AtomicBool,
    identity_property_name: OnceLock<String>,
    type_tag_namer: OnceLock<TypeTagNamer>,
    key_generator: OnceLock<Arc<dyn KeyGenerator>>,
    document_simplifier: OnceLock<DocumentSimplifier>,
}

impl DocumentConventionsInner {
    fn new() -> Self {
        DocumentConventionsInner {
            frozen: AtomicBool::from(false),
            default_use_optimistic_concurrency: AtomicBool::from(false),
            max_number_of_requests_per_session: AtomicU32::from(DEFAULT_MAX_REQUESTS_PER_SESSION),
            preserve_document_properties_not_found_on_model: AtomicBool::from(true),
            identity_property_name: OnceLock::new(),
            type_tag_namer: OnceLock::new(),
            key_generator: OnceLock::new(),
            document_simplifier: OnceLock::new(),
        }
    }

    fn ensure_not_frozen(&self, name: &str) -> DocketResult<()> {
        if self.frozen.load(Ordering::Relaxed) {
            log::error!("Convention {} cannot be changed after the store is built", name);
            return Err(DocketError::new(
                &format!("Convention {} cannot be changed after the store is built", name),
                ErrorKind::InvalidOperation,
            ));
        }
        Ok(())
    }
}
