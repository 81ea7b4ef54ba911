pub mod checkpoint;
pub mod conflict;
pub mod document;
pub mod event;
pub mod query;
pub mod schema;
pub mod write;

pub use checkpoint::{stack_checkpoints, Checkpoint};
pub use conflict::{
    ConflictHandlerInput, ConflictHandlerOutput, ConflictResolutionTask,
    ConflictResolutionTaskSolution, ResolvedDocument,
};
pub use document::{AttachmentData, DocumentData, DocumentId, DocumentMeta, META_LWT_MINIMUM};
pub use event::{ChangeEvent, ChangeOperation, CollectionChangeEvent, EventBulk};
pub use query::{
    compare_values, ChangedDocuments, PreparedQuery, QueryResult, SortDirection, SortField,
};
pub use schema::{CollectionSchema, PrimaryKey};
pub use write::{
    AttachmentRemove, AttachmentWrite, BulkWriteResult, BulkWriteRow, StorageScope, WriteError,
};
