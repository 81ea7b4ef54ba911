//! Quire Prelude
//!
//! Import this to get all commonly used types and traits:
//!
//! ```
//! use quire::prelude::*;
//! ```

// Core types
pub use crate::{
    BulkWriteResult, BulkWriteRow, ChangeEvent, ChangeOperation, Checkpoint, CollectionSchema,
    Database, DocumentData, DocumentId, EventBulk, PreparedQuery, QuireError, Result, WriteError,
};

// Configs
pub use crate::{DatabaseConfig, DedupConfig, MemoryStorageConfig};

// Traits
pub use crate::{Clock, DocumentHook, RevisionHasher, StorageInstance};

// Implementations
pub use crate::{MemoryStorageInstance, WrappedStorageInstance};

// Hooks
pub use crate::{FnHook, HookChain, HookContext};

// Revisions and helpers
pub use crate::{
    create_revision, get_all_documents, get_single_document, parse_revision, stack_checkpoints,
    write_single,
};
