//! Quire Core: data model and write arbitration for the Quire document database
//!
//! This crate defines what every storage engine plugged into Quire shares:
//! - Document states with `_rev`, `_deleted`, `_meta` and `_attachments`
//! - Revision tokens (`height-hash`) and their creation
//! - The bulk-write categorizer deciding inserts, updates, conflicts and events
//! - The attachment side-channel classifier
//! - Change events, event bulks and stackable checkpoints
//! - The `StorageInstance` contract engines implement
//!
//! Key guarantees:
//! - Every row of a bulk write lands in exactly one of `success` / `error`
//! - Conflicts are reported, never resolved silently
//! - One event bulk per accepted bulk write

pub mod attachments;
pub mod categorize;
pub mod config;
pub mod error;
pub mod observe;
pub mod revision;
pub mod run_queue;
pub mod stream;
pub mod traits;
pub mod types;

pub use attachments::{
    attachment_size, classify_attachments, hash_attachment_data, AttachmentOperations,
};
pub use categorize::{
    batch_document_ids, categorize_bulk_write_rows, event_key, random_token, CategorizedWrites,
};
pub use config::{DatabaseConfig, DedupConfig, MemoryStorageConfig};
pub use error::{QuireError, Result};
pub use revision::{create_revision, parse_revision, revision_height, Revision};
pub use run_queue::RunQueue;
pub use stream::broadcast_stream;
pub use traits::{Clock, MonotonicClock, RevisionHasher, StorageInstance, Xxh3Hasher};
pub use types::*;
