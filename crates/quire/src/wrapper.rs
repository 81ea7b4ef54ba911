//! Logical-document wrapper around a raw storage instance
//!
//! [`WrappedStorageInstance`] is what the rest of Quire talks to. It:
//! - Stamps `_meta.lwt` and runs pre-write hooks on every write
//! - Checks revision and metadata invariants in dev mode
//! - Funnels every call through the database run-queue
//! - Re-inserts documents over tombstones without surfacing a conflict
//! - Runs post-read hooks on everything handed back, errors included

use crate::db::Database;
use crate::hooks::HookContext;
use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use quire_core::{
    batch_document_ids, create_revision, observe, parse_revision, BulkWriteResult, BulkWriteRow,
    ChangeEvent, ChangedDocuments, Checkpoint, CollectionSchema, ConflictHandlerInput,
    ConflictHandlerOutput, ConflictResolutionTask, ConflictResolutionTaskSolution, DocumentData,
    DocumentId, DocumentMeta, EventBulk, PreparedQuery, QueryResult, QuireError, Result,
    ResolvedDocument, RevisionHasher, StorageInstance, StorageScope, WriteError,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error};

/// Moves documents between their logical and physical shapes
///
/// Owned by the wrapper and cloned into its streams.
#[derive(Clone)]
struct Translator {
    database: Arc<Database>,
    schema: Arc<CollectionSchema>,
}

impl Translator {
    fn context(&self, doc: DocumentData) -> HookContext<'_> {
        HookContext {
            database_name: self.database.name(),
            primary_path: self.schema.primary_path(),
            schema: &self.schema,
            doc,
        }
    }

    fn pre_write(&self, doc: DocumentData) -> Result<DocumentData> {
        Ok(self.database.hooks().run_pre_write(self.context(doc))?.doc)
    }

    fn post_read(&self, doc: DocumentData) -> Result<DocumentData> {
        Ok(self.database.hooks().run_post_read(self.context(doc))?.doc)
    }

    /// Dev-mode checks on a row as the caller handed it in
    fn check_row(&self, row: &BulkWriteRow) -> Result<()> {
        let primary_path = self.schema.primary_path();
        let actual = row.document.primary_key(primary_path)?;
        let expected = self.schema.derive_primary_key(&row.document)?;
        if actual != expected {
            return Err(QuireError::InternalConsistency(format!(
                "primary key '{}' is {} but must be {}",
                primary_path, actual, expected
            )));
        }

        if let Some(previous) = &row.previous {
            let previous_rev = parse_revision(&previous.rev)?;
            let current_rev = parse_revision(&row.document.rev)?;
            if current_rev.height <= previous_rev.height {
                return Err(QuireError::InternalConsistency(format!(
                    "revision of {} does not grow: {} after {}",
                    actual, current_rev, previous_rev
                )));
            }

            check_meta_retained(&actual, previous, &row.document)?;
        }

        Ok(())
    }

    /// Turn a caller row into the row handed to the raw engine
    fn to_storage(&self, row: BulkWriteRow) -> Result<BulkWriteRow> {
        let dev_mode = self.database.config().dev_mode;
        let caller_previous = if dev_mode {
            self.check_row(&row)?;
            row.previous.clone()
        } else {
            None
        };

        let mut document = row.document;
        document.meta.lwt = self.database.clock().now();

        // Previous first, then the new state
        let previous = row.previous.map(|p| self.pre_write(p)).transpose()?;
        let document = self.pre_write(document)?;

        // Hooks must not drop metadata keys either
        if dev_mode {
            let id = document.primary_key(self.schema.primary_path())?;
            for previous in caller_previous.iter().chain(previous.iter()) {
                check_meta_retained(&id, previous, &document)?;
            }
        }

        if document.rev.is_empty() {
            return Err(QuireError::InternalConsistency(format!(
                "document {} has no _rev; the caller must supply it",
                document
                    .primary_key(self.schema.primary_path())
                    .unwrap_or_default()
            )));
        }

        Ok(BulkWriteRow { document, previous })
    }

    fn translate_result(&self, result: BulkWriteResult) -> Result<BulkWriteResult> {
        let mut out = BulkWriteResult::new();
        for (id, doc) in result.success {
            out.success.insert(id, self.post_read(doc)?);
        }
        for (id, err) in result.error {
            out.error
                .insert(id, err.try_map_documents(|doc| self.post_read(doc))?);
        }
        Ok(out)
    }

    fn translate_event_bulk(&self, bulk: EventBulk) -> Result<EventBulk> {
        let mut events = Vec::with_capacity(bulk.events.len());
        for event in bulk.events {
            events.push(ChangeEvent {
                doc: event.doc.map(|d| self.post_read(d)).transpose()?,
                previous: event.previous.map(|d| self.post_read(d)).transpose()?,
                ..event
            });
        }
        Ok(EventBulk {
            id: bulk.id,
            events,
            checkpoint: bulk.checkpoint,
            context: bulk.context,
        })
    }

    fn translate_task(&self, task: ConflictResolutionTask) -> Result<ConflictResolutionTask> {
        let input = task.input;
        Ok(ConflictResolutionTask {
            id: task.id,
            context: task.context,
            input: ConflictHandlerInput {
                assumed_master_state: input
                    .assumed_master_state
                    .map(|d| self.post_read(d))
                    .transpose()?,
                real_master_state: self.post_read(input.real_master_state)?,
                new_document_state: self.post_read(input.new_document_state)?,
            },
        })
    }
}

/// Every `_meta` key of `previous` must survive on `document`
fn check_meta_retained(id: &str, previous: &DocumentData, document: &DocumentData) -> Result<()> {
    match previous
        .meta
        .keys()
        .find(|key| !document.meta.contains_key(key))
    {
        Some(missing) => Err(QuireError::InternalConsistency(format!(
            "_meta.{} of {} was dropped instead of merged",
            missing, id
        ))),
        None => Ok(()),
    }
}

/// Corrective rows for inserts that hit a tombstone
///
/// Matches conflicts whose row had no `previous`, whose new document is live
/// and whose stored document is deleted. Each becomes an update of the
/// tombstone with a revision chained off its height.
fn resurrection_rows(
    hasher: &dyn RevisionHasher,
    result: &BulkWriteResult,
) -> Result<Vec<(DocumentId, BulkWriteRow)>> {
    let mut rows = Vec::new();
    for (id, err) in &result.error {
        if let WriteError::Conflict {
            write_row,
            document_in_db,
            ..
        } = err
        {
            if write_row.previous.is_none() && !write_row.document.deleted && document_in_db.deleted
            {
                let mut document = write_row.document.clone();
                document.rev = create_revision(hasher, &document, Some(document_in_db))?;
                rows.push((
                    id.clone(),
                    BulkWriteRow::update(document_in_db.clone(), document),
                ));
            }
        }
    }
    Ok(rows)
}

/// A raw storage instance bound to a [`Database`]
pub struct WrappedStorageInstance<S> {
    raw: Arc<S>,
    translator: Translator,
}

impl<S: StorageInstance + 'static> WrappedStorageInstance<S> {
    pub(crate) fn new(database: Arc<Database>, raw: Arc<S>) -> Self {
        let schema = Arc::new(raw.schema().clone());
        Self {
            raw,
            translator: Translator { database, schema },
        }
    }

    /// The engine underneath, bypassing hooks and the run-queue
    pub fn raw(&self) -> &Arc<S> {
        &self.raw
    }
}

#[async_trait]
impl<S: StorageInstance + 'static> StorageInstance for WrappedStorageInstance<S> {
    fn scope(&self) -> &StorageScope {
        self.raw.scope()
    }

    fn schema(&self) -> &CollectionSchema {
        &self.translator.schema
    }

    fn hasher(&self) -> &dyn RevisionHasher {
        self.raw.hasher()
    }

    async fn bulk_write(
        &self,
        rows: Vec<BulkWriteRow>,
        context: &str,
    ) -> Result<BulkWriteResult> {
        let database = &self.translator.database;
        database.ensure_open()?;
        let started = Instant::now();

        batch_document_ids(&self.translator.schema, &rows)?;
        let rows = rows
            .into_iter()
            .map(|row| self.translator.to_storage(row))
            .collect::<Result<Vec<_>>>()?;
        let row_count = rows.len();

        let result = {
            let _guard = database.run_queue().exclusive().await?;
            let mut result = self.raw.bulk_write(rows, context).await?;

            // Still under the guard: no caller write can slip in between
            let reinserts = resurrection_rows(self.raw.hasher(), &result)?;
            if !reinserts.is_empty() {
                debug!(
                    collection = %self.raw.scope().collection_name,
                    count = reinserts.len(),
                    "Re-inserting over tombstones"
                );
                observe::record_resurrections(reinserts.len());

                let mut corrective = Vec::with_capacity(reinserts.len());
                for (id, row) in reinserts {
                    result.error.remove(&id);
                    corrective.push(row);
                }
                let sub_result = self.raw.bulk_write(corrective, context).await?;
                result.merge(sub_result);
            }
            result
        };

        debug!(
            collection = %self.raw.scope().collection_name,
            rows = row_count,
            success = result.success.len(),
            error = result.error.len(),
            "Wrapped bulk write"
        );
        observe::record_bulk_write(started.elapsed(), result.success.len(), result.error.len());

        self.translator.translate_result(result)
    }

    async fn find_documents_by_id(
        &self,
        ids: &[DocumentId],
        with_deleted: bool,
    ) -> Result<HashMap<DocumentId, DocumentData>> {
        let database = &self.translator.database;
        database.ensure_open()?;
        let found = {
            let _guard = database.run_queue().shared().await?;
            self.raw.find_documents_by_id(ids, with_deleted).await?
        };
        found
            .into_iter()
            .map(|(id, doc)| self.translator.post_read(doc).map(|doc| (id, doc)))
            .collect()
    }

    async fn query(&self, query: &PreparedQuery) -> Result<QueryResult> {
        let database = &self.translator.database;
        database.ensure_open()?;
        let result = {
            let _guard = database.run_queue().shared().await?;
            self.raw.query(query).await?
        };
        Ok(QueryResult {
            documents: result
                .documents
                .into_iter()
                .map(|doc| self.translator.post_read(doc))
                .collect::<Result<_>>()?,
        })
    }

    async fn get_changed_documents_since(
        &self,
        limit: usize,
        checkpoint: Option<&Checkpoint>,
    ) -> Result<ChangedDocuments> {
        let database = &self.translator.database;
        database.ensure_open()?;
        let changed = {
            let _guard = database.run_queue().shared().await?;
            self.raw.get_changed_documents_since(limit, checkpoint).await?
        };
        Ok(ChangedDocuments {
            documents: changed
                .documents
                .into_iter()
                .map(|doc| self.translator.post_read(doc))
                .collect::<Result<_>>()?,
            checkpoint: changed.checkpoint,
        })
    }

    async fn get_attachment_data(
        &self,
        document_id: &str,
        attachment_id: &str,
    ) -> Result<String> {
        let database = &self.translator.database;
        database.ensure_open()?;
        let _guard = database.run_queue().shared().await?;
        self.raw.get_attachment_data(document_id, attachment_id).await
    }

    async fn cleanup(&self, min_deleted_age: Duration) -> Result<bool> {
        let database = &self.translator.database;
        database.ensure_open()?;
        let _guard = database.run_queue().exclusive().await?;
        self.raw.cleanup(min_deleted_age).await
    }

    fn change_stream(&self) -> BoxStream<'static, EventBulk> {
        let translator = self.translator.clone();
        self.raw
            .change_stream()
            .filter_map(move |bulk| {
                let bulk_id = bulk.id.clone();
                let translated = match translator.translate_event_bulk(bulk) {
                    Ok(bulk) => Some(bulk),
                    Err(e) => {
                        error!(bulk = %bulk_id, error = %e, "Failed to translate event bulk");
                        None
                    }
                };
                futures::future::ready(translated)
            })
            .boxed()
    }

    fn conflict_resolution_tasks(&self) -> BoxStream<'static, ConflictResolutionTask> {
        let translator = self.translator.clone();
        self.raw
            .conflict_resolution_tasks()
            .filter_map(move |task| {
                let task_id = task.id.clone();
                let translated = match translator.translate_task(task) {
                    Ok(task) => Some(task),
                    Err(e) => {
                        error!(task = %task_id, error = %e, "Failed to translate conflict task");
                        None
                    }
                };
                futures::future::ready(translated)
            })
            .boxed()
    }

    async fn resolve_conflict_resolution_task(
        &self,
        solution: ConflictResolutionTaskSolution,
    ) -> Result<()> {
        let database = &self.translator.database;
        database.ensure_open()?;

        let resolved = match solution.output {
            ConflictHandlerOutput::Equal => {
                return self
                    .raw
                    .resolve_conflict_resolution_task(ConflictResolutionTaskSolution {
                        id: solution.id,
                        output: ConflictHandlerOutput::Equal,
                    })
                    .await;
            }
            ConflictHandlerOutput::Resolved { document_data } => document_data,
        };

        let mut doc = DocumentData {
            fields: resolved.fields,
            rev: String::new(),
            deleted: resolved.deleted,
            meta: DocumentMeta::new(database.clock().now()),
            attachments: BTreeMap::new(),
        };
        doc.rev = create_revision(self.raw.hasher(), &doc, None)?;
        let doc = self.translator.pre_write(doc)?;

        self.raw
            .resolve_conflict_resolution_task(ConflictResolutionTaskSolution {
                id: solution.id,
                output: ConflictHandlerOutput::Resolved {
                    document_data: ResolvedDocument {
                        fields: doc.fields,
                        deleted: doc.deleted,
                    },
                },
            })
            .await
    }

    async fn remove(&self) -> Result<()> {
        let database = &self.translator.database;
        database.ensure_open()?;
        let _guard = database.run_queue().exclusive().await?;
        self.raw.remove().await
    }

    async fn close(&self) -> Result<()> {
        let database = &self.translator.database;
        let _guard = database.run_queue().exclusive().await?;
        self.raw.close().await
    }
}
