use crate::error::Result;
use crate::traits::hasher::RevisionHasher;
use crate::types::{
    BulkWriteResult, BulkWriteRow, ChangedDocuments, Checkpoint, CollectionSchema,
    ConflictResolutionTask, ConflictResolutionTaskSolution, DocumentData, DocumentId, EventBulk,
    PreparedQuery, QueryResult, StorageScope,
};
use async_trait::async_trait;
use futures::stream::BoxStream;
use std::collections::HashMap;
use std::time::Duration;

/// Contract of a pluggable storage engine for one collection
///
/// Engines own the physical layout. They must honour these rules on
/// `bulk_write`:
/// - The current state used for conflict detection is fixed at call entry and
///   is not affected by other rows of the same batch.
/// - Every input id lands in exactly one of `success` / `error`.
/// - Conflicts and missing attachments are reported in `error`, never raised.
/// - One [`EventBulk`] is pushed on the change stream per call that produced
///   at least one event.
///
/// Engines built on [`categorize_bulk_write_rows`](crate::categorize::categorize_bulk_write_rows)
/// get these rules for free.
#[async_trait]
pub trait StorageInstance: Send + Sync {
    fn scope(&self) -> &StorageScope;

    fn schema(&self) -> &CollectionSchema;

    /// Fingerprint strategy used to build revisions for this engine
    fn hasher(&self) -> &dyn RevisionHasher;

    async fn bulk_write(&self, rows: Vec<BulkWriteRow>, context: &str)
        -> Result<BulkWriteResult>;

    /// Look up documents by id
    ///
    /// Tombstones are only returned when `with_deleted` is set. Missing ids
    /// are absent from the map.
    async fn find_documents_by_id(
        &self,
        ids: &[DocumentId],
        with_deleted: bool,
    ) -> Result<HashMap<DocumentId, DocumentData>>;

    /// Run a prepared query over live documents; tombstones never match
    async fn query(&self, query: &PreparedQuery) -> Result<QueryResult>;

    /// Documents (tombstones included) written after `checkpoint`, oldest first
    async fn get_changed_documents_since(
        &self,
        limit: usize,
        checkpoint: Option<&Checkpoint>,
    ) -> Result<ChangedDocuments>;

    /// Base64 payload of a stored attachment
    async fn get_attachment_data(&self, document_id: &str, attachment_id: &str)
        -> Result<String>;

    /// Purge tombstones older than `min_deleted_age`
    ///
    /// Returns `true` once nothing is left to purge.
    async fn cleanup(&self, min_deleted_age: Duration) -> Result<bool>;

    /// Push stream of event bulks, one per accepted bulk write
    fn change_stream(&self) -> BoxStream<'static, EventBulk>;

    /// Conflicts raised while replicating, waiting for a resolution
    fn conflict_resolution_tasks(&self) -> BoxStream<'static, ConflictResolutionTask>;

    async fn resolve_conflict_resolution_task(
        &self,
        solution: ConflictResolutionTaskSolution,
    ) -> Result<()>;

    /// Delete all data of this instance and close it
    async fn remove(&self) -> Result<()>;

    async fn close(&self) -> Result<()>;
}
