//! Quire: an offline-first document database core
//!
//! Quire sits between an application and a pluggable storage engine:
//! - **Revisions**: every document carries a `height-hash` `_rev`
//! - **Conflict arbitration**: stale writes are reported, never applied
//! - **Hooks**: ordered pre-write / post-read document transforms
//! - **Event bulks**: one batch of change events per accepted write
//! - **Resurrection**: inserting over a tombstone just works
//!
//! # Quick Start
//!
//! ```no_run
//! use quire::prelude::*;
//! use std::sync::Arc;
//!
//! # async fn demo() -> Result<()> {
//! let db = Database::open(DatabaseConfig::new("app"), HookChain::new())?;
//! let people = db.wrap_storage_instance(Arc::new(MemoryStorageInstance::open(
//!     MemoryStorageConfig::new("app", "people"),
//!     CollectionSchema::new("id"),
//! )?));
//!
//! let mut doc = DocumentData::from_value(serde_json::json!({ "id": "p1", "name": "ada" }))?;
//! doc.rev = create_revision(people.hasher(), &doc, None)?;
//! let stored = write_single(&people, BulkWriteRow::insert(doc), "quickstart").await?;
//! assert!(stored.rev.starts_with("1-"));
//! # Ok(())
//! # }
//! ```

pub mod db;
pub mod dedup;
pub mod helpers;
pub mod hooks;
pub mod prelude;
pub mod wrapper;

// Re-export core types
pub use quire_core::{
    attachments::{attachment_size, classify_attachments, hash_attachment_data, AttachmentOperations},
    categorize::{categorize_bulk_write_rows, event_key, CategorizedWrites},
    config::{DatabaseConfig, DedupConfig, MemoryStorageConfig},
    error::{QuireError, Result},
    revision::{create_revision, parse_revision, Revision},
    traits::{Clock, MonotonicClock, RevisionHasher, StorageInstance, Xxh3Hasher},
    types::{
        stack_checkpoints, AttachmentData, BulkWriteResult, BulkWriteRow, ChangeEvent,
        ChangeOperation, ChangedDocuments, Checkpoint, CollectionChangeEvent, CollectionSchema,
        ConflictHandlerInput, ConflictHandlerOutput, ConflictResolutionTask,
        ConflictResolutionTaskSolution, DocumentData, DocumentId, DocumentMeta, EventBulk,
        PreparedQuery, PrimaryKey, QueryResult, ResolvedDocument, SortDirection, StorageScope,
        WriteError,
    },
    RunQueue,
};

// Re-export implementations
pub use quire_memory::MemoryStorageInstance;

// Re-export main types from this crate
pub use db::Database;
pub use dedup::EventBulkDedup;
pub use helpers::{
    ensure_write_succeeded, get_all_documents, get_newest_of_document_states,
    get_single_document, to_collection_change_event, write_single, INTERNAL_STORAGE_NAME,
    LOCAL_DOCS_STORAGE_NAME,
};
pub use hooks::{DocumentHook, FnHook, HookChain, HookContext};
pub use wrapper::WrappedStorageInstance;
