use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use parking_lot::{Mutex, RwLock};
use quire_core::{
    batch_document_ids, broadcast_stream, categorize_bulk_write_rows,
    error::{QuireError, Result},
    BulkWriteResult, BulkWriteRow, ChangedDocuments, Checkpoint, Clock, CollectionSchema,
    ConflictResolutionTask, ConflictResolutionTaskSolution, DocumentData, DocumentId, EventBulk,
    MemoryStorageConfig, MonotonicClock, PreparedQuery, QueryResult, RevisionHasher,
    StorageInstance, StorageScope, Xxh3Hasher,
};
use serde_json::json;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info};

/// Documents and attachment payloads of one collection
#[derive(Default)]
struct MemoryState {
    docs: BTreeMap<DocumentId, DocumentData>,
    /// Base64 payloads keyed by (document id, attachment id)
    attachments: HashMap<(DocumentId, String), String>,
}

/// In-memory storage instance for one collection
///
/// All reads and writes go through one `RwLock`, so a bulk write sees a
/// consistent snapshot and is applied atomically.
pub struct MemoryStorageInstance {
    config: MemoryStorageConfig,
    scope: StorageScope,
    schema: CollectionSchema,
    hasher: Xxh3Hasher,
    clock: MonotonicClock,
    state: RwLock<MemoryState>,
    changes: Mutex<Option<broadcast::Sender<EventBulk>>>,
    conflict_tasks: Mutex<Option<broadcast::Sender<ConflictResolutionTask>>>,
    resolved: Mutex<Vec<ConflictResolutionTaskSolution>>,
    closed: AtomicBool,
}

impl MemoryStorageInstance {
    pub fn open(config: MemoryStorageConfig, schema: CollectionSchema) -> Result<Self> {
        if config.change_stream_capacity == 0 {
            return Err(QuireError::Config(
                "change_stream_capacity must be positive".into(),
            ));
        }

        let (changes, _) = broadcast::channel(config.change_stream_capacity);
        let (conflict_tasks, _) = broadcast::channel(config.change_stream_capacity);
        let scope = StorageScope::new(&config.database_name, &config.collection_name);

        info!(
            database = %scope.database_name,
            collection = %scope.collection_name,
            "Opened memory storage instance"
        );

        Ok(Self {
            config,
            scope,
            schema,
            hasher: Xxh3Hasher,
            clock: MonotonicClock::new(),
            state: RwLock::new(MemoryState::default()),
            changes: Mutex::new(Some(changes)),
            conflict_tasks: Mutex::new(Some(conflict_tasks)),
            resolved: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &MemoryStorageConfig {
        &self.config
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(AtomicOrdering::SeqCst)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(QuireError::Closed(format!(
                "{}/{}",
                self.scope.database_name, self.scope.collection_name
            )));
        }
        Ok(())
    }

    /// Number of stored documents, tombstones included
    pub fn document_count(&self) -> usize {
        self.state.read().docs.len()
    }

    /// Raise a replication conflict for subscribers of
    /// [`conflict_resolution_tasks`](StorageInstance::conflict_resolution_tasks)
    pub fn push_conflict_task(&self, task: ConflictResolutionTask) -> Result<()> {
        self.ensure_open()?;
        if let Some(sender) = self.conflict_tasks.lock().as_ref() {
            // No subscriber is not an error
            let _ = sender.send(task);
        }
        Ok(())
    }

    /// Solutions received so far, in arrival order
    pub fn resolved_tasks(&self) -> Vec<ConflictResolutionTaskSolution> {
        self.resolved.lock().clone()
    }

    /// Categorize and apply a batch under the state lock
    fn apply_rows(
        &self,
        rows: &[BulkWriteRow],
        context: &str,
    ) -> Result<(BulkWriteResult, EventBulk)> {
        let mut state = self.state.write();
        self.ensure_open()?;

        let ids = batch_document_ids(&self.schema, rows)?;
        let docs_in_db: HashMap<DocumentId, DocumentData> = ids
            .iter()
            .filter_map(|id| state.docs.get(id).map(|doc| (id.clone(), doc.clone())))
            .collect();

        let categorized = categorize_bulk_write_rows(
            &self.scope,
            &self.schema,
            &docs_in_db,
            rows,
            context,
            &self.clock,
        )?;

        let primary_path = self.schema.primary_path();
        let mut writes = Vec::with_capacity(categorized.changed_document_ids.len());
        for row in categorized
            .bulk_insert_docs
            .into_iter()
            .chain(categorized.bulk_update_docs)
        {
            let id = row.document.primary_key(primary_path)?;
            writes.push((id, row.document));
        }

        let mut result = BulkWriteResult::new();
        for (id, doc) in writes {
            state.docs.insert(id.clone(), doc.clone());
            result.success.insert(id, doc);
        }
        for error in categorized.errors {
            result.error.insert(error.document_id().to_string(), error);
        }

        for write in categorized
            .attachments_add
            .into_iter()
            .chain(categorized.attachments_update)
        {
            if let Some(data) = write.attachment_data.data {
                state
                    .attachments
                    .insert((write.document_id, write.attachment_id), data);
            }
        }
        for remove in categorized.attachments_remove {
            state
                .attachments
                .remove(&(remove.document_id, remove.attachment_id));
        }

        let mut event_bulk = categorized.event_bulk;
        event_bulk.checkpoint = categorized
            .changed_document_ids
            .last()
            .and_then(|id| state.docs.get(id))
            .map(|doc| checkpoint_of(primary_path, doc));

        Ok((result, event_bulk))
    }
}

fn checkpoint_of(primary_path: &str, doc: &DocumentData) -> Checkpoint {
    Checkpoint::new()
        .with("id", doc.get(primary_path).cloned().unwrap_or(json!(null)))
        .with("lwt", json!(doc.meta.lwt))
}

/// Sort position of a document in the changes feed
fn change_position(primary_path: &str, doc: &DocumentData) -> (f64, String) {
    let id = doc.primary_key(primary_path).unwrap_or_default();
    (doc.meta.lwt, id)
}

fn compare_positions(a: &(f64, String), b: &(f64, String)) -> Ordering {
    a.0.total_cmp(&b.0).then_with(|| a.1.cmp(&b.1))
}

#[async_trait]
impl StorageInstance for MemoryStorageInstance {
    fn scope(&self) -> &StorageScope {
        &self.scope
    }

    fn schema(&self) -> &CollectionSchema {
        &self.schema
    }

    fn hasher(&self) -> &dyn RevisionHasher {
        &self.hasher
    }

    async fn bulk_write(&self, rows: Vec<BulkWriteRow>, context: &str) -> Result<BulkWriteResult> {
        let (result, event_bulk) = self.apply_rows(&rows, context)?;

        debug!(
            collection = %self.scope.collection_name,
            rows = rows.len(),
            success = result.success.len(),
            error = result.error.len(),
            events = event_bulk.events.len(),
            "Applied bulk write"
        );

        if !event_bulk.is_empty() {
            if let Some(sender) = self.changes.lock().as_ref() {
                let _ = sender.send(event_bulk);
            }
        }

        Ok(result)
    }

    async fn find_documents_by_id(
        &self,
        ids: &[DocumentId],
        with_deleted: bool,
    ) -> Result<HashMap<DocumentId, DocumentData>> {
        self.ensure_open()?;
        let state = self.state.read();
        Ok(ids
            .iter()
            .filter_map(|id| state.docs.get(id).map(|doc| (id.clone(), doc)))
            .filter(|(_, doc)| with_deleted || !doc.deleted)
            .map(|(id, doc)| (id, doc.clone()))
            .collect())
    }

    async fn query(&self, query: &PreparedQuery) -> Result<QueryResult> {
        self.ensure_open()?;
        let state = self.state.read();
        let live = state.docs.values().filter(|doc| !doc.deleted).cloned();
        Ok(QueryResult {
            documents: query.execute(live),
        })
    }

    async fn get_changed_documents_since(
        &self,
        limit: usize,
        checkpoint: Option<&Checkpoint>,
    ) -> Result<ChangedDocuments> {
        self.ensure_open()?;
        let primary_path = self.schema.primary_path();

        let after = checkpoint.map(|cp| {
            let lwt = cp.get("lwt").and_then(|v| v.as_f64()).unwrap_or(0.0);
            let id = match cp.get("id") {
                Some(serde_json::Value::String(s)) => s.clone(),
                Some(serde_json::Value::Number(n)) => n.to_string(),
                _ => String::new(),
            };
            (lwt, id)
        });

        let mut changed: Vec<((f64, String), DocumentData)> = {
            let state = self.state.read();
            state
                .docs
                .values()
                .map(|doc| (change_position(primary_path, doc), doc.clone()))
                .filter(|(position, _)| match &after {
                    Some(after) => compare_positions(position, after) == Ordering::Greater,
                    None => true,
                })
                .collect()
        };
        changed.sort_by(|a, b| compare_positions(&a.0, &b.0));
        changed.truncate(limit);

        let documents: Vec<DocumentData> = changed.into_iter().map(|(_, doc)| doc).collect();
        let checkpoint = match documents.last() {
            Some(last) => Some(checkpoint_of(primary_path, last)),
            None => checkpoint.cloned(),
        };

        Ok(ChangedDocuments {
            documents,
            checkpoint,
        })
    }

    async fn get_attachment_data(&self, document_id: &str, attachment_id: &str) -> Result<String> {
        self.ensure_open()?;
        self.state
            .read()
            .attachments
            .get(&(document_id.to_string(), attachment_id.to_string()))
            .cloned()
            .ok_or_else(|| {
                QuireError::NotFound(format!("attachment {}/{}", document_id, attachment_id))
            })
    }

    async fn cleanup(&self, min_deleted_age: Duration) -> Result<bool> {
        self.ensure_open()?;
        let cutoff = self.clock.now() - min_deleted_age.as_secs_f64() * 1000.0;

        let mut state = self.state.write();
        let purge: Vec<DocumentId> = state
            .docs
            .iter()
            .filter(|(_, doc)| doc.deleted && doc.meta.lwt <= cutoff)
            .map(|(id, _)| id.clone())
            .collect();

        for id in &purge {
            state.docs.remove(id);
        }
        state.attachments.retain(|(doc_id, _), _| !purge.contains(doc_id));

        debug!(
            collection = %self.scope.collection_name,
            purged = purge.len(),
            "Cleaned up tombstones"
        );
        Ok(true)
    }

    fn change_stream(&self) -> BoxStream<'static, EventBulk> {
        match self.changes.lock().as_ref() {
            Some(sender) => broadcast_stream(sender.subscribe(), "memory.changes"),
            None => stream::empty().boxed(),
        }
    }

    fn conflict_resolution_tasks(&self) -> BoxStream<'static, ConflictResolutionTask> {
        match self.conflict_tasks.lock().as_ref() {
            Some(sender) => broadcast_stream(sender.subscribe(), "memory.conflicts"),
            None => stream::empty().boxed(),
        }
    }

    async fn resolve_conflict_resolution_task(
        &self,
        solution: ConflictResolutionTaskSolution,
    ) -> Result<()> {
        self.ensure_open()?;
        self.resolved.lock().push(solution);
        Ok(())
    }

    async fn remove(&self) -> Result<()> {
        self.ensure_open()?;
        {
            let mut state = self.state.write();
            state.docs.clear();
            state.attachments.clear();
        }
        info!(
            collection = %self.scope.collection_name,
            "Removed memory storage instance"
        );
        self.close().await
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, AtomicOrdering::SeqCst) {
            return Ok(());
        }
        self.changes.lock().take();
        self.conflict_tasks.lock().take();
        info!(
            collection = %self.scope.collection_name,
            "Closed memory storage instance"
        );
        Ok(())
    }
}
