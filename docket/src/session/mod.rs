mod caching_scope;
mod changes;
mod commands;
mod document_session;
mod entity;
mod entity_to_document;
mod identity_map;
mod includes;
mod listeners;
mod tracked_entry;

pub use caching_scope::*;
pub use changes::*;
pub use commands::*;
pub use document_session::*;
pub use entity::{DocumentEntity, EntityHandle, EntityRef, Loaded};
pub use includes::*;
pub use listeners::*;
pub use tracked_entry::*;

