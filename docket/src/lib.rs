#![allow(
    dead_code,
    unused_imports,
)]
//! # Docket - Unit of Work for Document Databases
//!
//! Docket is the client-side bookkeeping layer of a document database client.
//! It tracks which in-memory objects correspond to which remote documents,
//! detects which of them were modified since they were loaded, and turns those
//! modifications into one ordered batch of write and delete commands.
//!
//! ## Key Features
//!
//! - **Identity Map**: one live object per document key, addressed by typed handles
//! - **Snapshot Change Tracking**: structural diff of objects and metadata against their last known server state
//! - **Batched Writes**: deferred commands, deletions and writes sent in a single batch
//! - **Optimistic Concurrency**: etag management with a "must not exist" sentinel for new documents
//! - **Conversion Cache**: each object is serialized once per save pass
//! - **Listeners**: hooks around conversion, store and delete
//! - **Pluggable Transport**: any backend implementing fetch and submit-batch
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use docket::document_store::DocumentStore;
//! use docket::transport::InMemoryTransport;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = DocumentStore::builder()
//!     .transport(InMemoryTransport::new())
//!     .use_optimistic_concurrency(true)
//!     .build()?;
//!
//! let mut session = store.open_session();
//! let user = session.store(User::new("Ann"))?;
//! session.save_changes()?;
//!
//! session.entity_mut(user)?.name = "Annie".to_string();
//! for (key, changes) in session.what_changed()? {
//!     println!("{}: {:?}", key, changes);
//! }
//! session.save_changes()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Organization
//!
//! - [`common`] - Values, conversions, constants and utilities
//! - [`conventions`] - Store-wide conventions
//! - [`document`] - Document trees, etags and fetched documents
//! - [`document_store`] - The store facade that opens sessions
//! - [`document_store_builder`] - Store builder
//! - [`errors`] - Error types and result definitions
//! - [`key_generator`] - Client-side document key generation
//! - [`session`] - The unit of work
//! - [`transport`] - Transport abstraction and the in-memory transport

use crate::common::*;

pub mod common;
pub mod conventions;
pub mod document;
pub mod document_store;
pub mod document_store_builder;
pub mod errors;
pub mod key_generator;
pub mod session;
pub mod transport;

pub use document::Document;
pub use document_store::DocumentStore;
pub use errors::{DocketError, DocketResult, ErrorKind};
pub use session::{DocumentEntity, DocumentSession, EntityRef};
