use crate::common::{METHOD_DELETE, METHOD_PUT};
use crate::document::{Document, Etag};
use crate::session::entity::EntityHandle;

/// A write command: store `document` under `key`.
///
/// A `key` of `None`, or one ending in `/`, asks the server to assign the
/// final key.
#[derive(Clone, Debug, PartialEq)]
pub struct PutCommandData {
    key: Option<String>,
    etag: Option<Etag>,
    document: Document,
    metadata: Document,
}

impl PutCommandData {
    pub fn new(
        key: Option<String>,
        etag: Option<Etag>,
        document: Document,
        metadata: Document,
    ) -> Self {
        PutCommandData {
            key,
            etag,
            document,
            metadata,
        }
    }

    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    pub fn etag(&self) -> Option<&Etag> {
        self.etag.as_ref()
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn metadata(&self) -> &Document {
        &self.metadata
    }
}

/// A delete command. An etag makes the delete conditional.
#[derive(Clone, Debug, PartialEq)]
pub struct DeleteCommandData {
    key: String,
    etag: Option<Etag>,
}

impl DeleteCommandData {
    pub fn new(key: impl Into<String>, etag: Option<Etag>) -> Self {
        DeleteCommandData {
            key: key.into(),
            etag,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn etag(&self) -> Option<&Etag> {
        self.etag.as_ref()
    }
}

/// One entry of a batch sent to the server.
#[derive(Clone, Debug, PartialEq)]
pub enum CommandData {
    Put(PutCommandData),
    Delete(DeleteCommandData),
}

impl CommandData {
    pub fn put(
        key: Option<String>,
        etag: Option<Etag>,
        document: Document,
        metadata: Document,
    ) -> Self {
        CommandData::Put(PutCommandData::new(key, etag, document, metadata))
    }

    pub fn delete(key: impl Into<String>, etag: Option<Etag>) -> Self {
        CommandData::Delete(DeleteCommandData::new(key, etag))
    }

    pub fn method(&self) -> &'static str {
        match self {
            CommandData::Put(_) => METHOD_PUT,
            CommandData::Delete(_) => METHOD_DELETE,
        }
    }

    pub fn key(&self) -> Option<&str> {
        match self {
            CommandData::Put(put) => put.key(),
            CommandData::Delete(delete) => Some(delete.key()),
        }
    }

    pub fn etag(&self) -> Option<&Etag> {
        match self {
            CommandData::Put(put) => put.etag(),
            CommandData::Delete(delete) => delete.etag(),
        }
    }

    pub fn is_put(&self) -> bool {
        matches!(self, CommandData::Put(_))
    }
}

/// The server's answer to one command of a batch.
#[derive(Clone, Debug, PartialEq)]
pub struct BatchResult {
    method: String,
    key: String,
    etag: Option<Etag>,
    metadata: Document,
}

impl BatchResult {
    pub fn new(method: impl Into<String>, key: impl Into<String>, etag: Option<Etag>, metadata: Document) -> Self {
        BatchResult {
            method: method.into(),
            key: key.into(),
            etag,
            metadata,
        }
    }

    /// Answer to a successful write.
    pub fn put(key: impl Into<String>, etag: Etag, metadata: Document) -> Self {
        BatchResult::new(METHOD_PUT, key, Some(etag), metadata)
    }

    /// Answer to a delete.
    pub fn delete(key: impl Into<String>) -> Self {
        BatchResult::new(METHOD_DELETE, key, None, Document::new())
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn etag(&self) -> Option<&Etag> {
        self.etag.as_ref()
    }

    pub fn metadata(&self) -> &Document {
        &self.metadata
    }

    pub fn is_put(&self) -> bool {
        self.method.eq_ignore_ascii_case(METHOD_PUT)
    }
}

/// The output of batch preparation.
///
/// `entities[i]` is the tracked object behind
/// `commands[deferred_commands_count + i]`; deletes of objects that were not
/// tracked have no handle.
#[derive(Clone, Debug, Default)]
pub struct SaveChangesData {
    commands: Vec<CommandData>,
    entities: Vec<Option<EntityHandle>>,
    deferred_commands_count: usize,
}

impl SaveChangesData {
    pub(crate) fn with_deferred(deferred: Vec<CommandData>) -> Self {
        SaveChangesData {
            deferred_commands_count: deferred.len(),
            commands: deferred,
            entities: Vec::new(),
        }
    }

    pub(crate) fn push(&mut self, command: CommandData, entity: Option<EntityHandle>) {
        self.commands.push(command);
        self.entities.push(entity);
    }

    pub fn commands(&self) -> &[CommandData] {
        &self.commands
    }

    pub fn entities(&self) -> &[Option<EntityHandle>] {
        &self.entities
    }

    pub fn deferred_commands_count(&self) -> usize {
        self.deferred_commands_count
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// The tracked object behind the command at `index`, if any.
    pub fn entity_at(&self, index: usize) -> Option<EntityHandle> {
        index
            .checked_sub(self.deferred_commands_count)
            .and_then(|i| self.entities.get(i).copied().flatten())
    }
}
