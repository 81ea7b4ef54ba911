//! Bulk write categorization
//!
//! Storage engines call [`categorize_bulk_write_rows`] with a snapshot of the
//! documents a batch touches. The result tells the engine exactly which rows
//! to persist, which attachment payloads to move, which errors to report and
//! which change events to publish. The function does no I/O.

use crate::attachments::{classify_attachments, AttachmentOperations};
use crate::error::{QuireError, Result};
use crate::traits::clock::Clock;
use crate::types::{
    AttachmentRemove, AttachmentWrite, BulkWriteRow, ChangeEvent, ChangeOperation,
    CollectionSchema, DocumentData, DocumentId, EventBulk, StorageScope, WriteError,
};
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::collections::{HashMap, HashSet};

/// Length of generated event bulk ids
pub const EVENT_BULK_ID_LENGTH: usize = 10;

/// Everything an engine needs to apply one bulk write
#[derive(Debug, Clone)]
pub struct CategorizedWrites {
    /// Rows for documents that do not exist yet, payloads stripped
    pub bulk_insert_docs: Vec<BulkWriteRow>,
    /// Rows replacing a stored document, payloads stripped
    pub bulk_update_docs: Vec<BulkWriteRow>,
    pub errors: Vec<WriteError>,
    /// Ids of every accepted row, in batch order
    pub changed_document_ids: Vec<DocumentId>,
    pub event_bulk: EventBulk,
    pub attachments_add: Vec<AttachmentWrite>,
    pub attachments_update: Vec<AttachmentWrite>,
    pub attachments_remove: Vec<AttachmentRemove>,
}

impl CategorizedWrites {
    fn new(context: &str) -> Self {
        Self {
            bulk_insert_docs: Vec::new(),
            bulk_update_docs: Vec::new(),
            errors: Vec::new(),
            changed_document_ids: Vec::new(),
            event_bulk: EventBulk::new(random_token(EVENT_BULK_ID_LENGTH), context),
            attachments_add: Vec::new(),
            attachments_update: Vec::new(),
            attachments_remove: Vec::new(),
        }
    }

    fn accept_attachments(&mut self, ops: AttachmentOperations) {
        self.attachments_add.extend(ops.add);
        self.attachments_update.extend(ops.update);
        self.attachments_remove.extend(ops.remove);
    }
}

/// Random alphanumeric token
pub fn random_token(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Deterministic key of the event a row produces
///
/// Two deliveries of the same logical change (a local write and its broadcast
/// echo) map to the same key.
pub fn event_key(scope: &StorageScope, document_id: &str, row: &BulkWriteRow) -> String {
    let bit = |b: bool| if b { '1' } else { '0' };
    let has_previous = row.previous.is_some();
    let previous_deleted = row.previous.as_ref().is_some_and(|p| p.deleted);
    format!(
        "{}|{}|{}||{}{}{}|{}",
        scope.database_name,
        scope.collection_name,
        document_id,
        bit(has_previous),
        bit(previous_deleted),
        bit(row.document.deleted),
        row.document.rev
    )
}

/// Primary keys of `rows`, rejecting a batch that names the same id twice
pub fn batch_document_ids(
    schema: &CollectionSchema,
    rows: &[BulkWriteRow],
) -> Result<Vec<DocumentId>> {
    let primary_path = schema.primary_path();
    let mut seen = HashSet::with_capacity(rows.len());
    let mut ids = Vec::with_capacity(rows.len());
    for row in rows {
        let id = row.document.primary_key(primary_path)?;
        if !seen.insert(id.clone()) {
            return Err(QuireError::DuplicateDocumentInBatch(id));
        }
        ids.push(id);
    }
    Ok(ids)
}

/// Derive the change event of an accepted update from the two tombstone flags
///
/// Returns `None` for a tombstone overwritten by a tombstone.
fn derive_update_change(
    row: &BulkWriteRow,
    stored_doc: DocumentData,
) -> Result<Option<(ChangeOperation, Option<DocumentData>, Option<DocumentData>)>> {
    let previous = row.previous.as_ref().ok_or_else(|| {
        QuireError::InternalConsistency(format!(
            "accepted update of {} has no previous state",
            row.document.rev
        ))
    })?;

    match (previous.deleted, row.document.deleted) {
        (true, false) => Ok(Some((ChangeOperation::Insert, Some(stored_doc), None))),
        (false, false) => Ok(Some((
            ChangeOperation::Update,
            Some(stored_doc),
            Some(previous.clone()),
        ))),
        (false, true) => Ok(Some((ChangeOperation::Delete, None, Some(previous.clone())))),
        (true, true) => Ok(None),
    }
}

/// Split a batch into inserts, updates, errors and one event bulk
///
/// `docs_in_db` must hold the stored state of every id in `rows`, captured
/// once at call entry. Rows never see each other's effects.
pub fn categorize_bulk_write_rows(
    scope: &StorageScope,
    schema: &CollectionSchema,
    docs_in_db: &HashMap<DocumentId, DocumentData>,
    rows: &[BulkWriteRow],
    context: &str,
    clock: &dyn Clock,
) -> Result<CategorizedWrites> {
    let ids = batch_document_ids(schema, rows)?;
    let mut out = CategorizedWrites::new(context);
    let start_time = clock.now();

    for (id, row) in ids.into_iter().zip(rows) {
        let (operation, doc, previous) = match docs_in_db.get(&id) {
            None => {
                let ops = match classify_attachments(&id, &row.document, None) {
                    Ok(ops) => ops,
                    Err(attachment_id) => {
                        out.errors.push(WriteError::AttachmentMissing {
                            document_id: id,
                            write_row: row.clone(),
                            attachment_id,
                            document_in_db: None,
                        });
                        continue;
                    }
                };
                out.accept_attachments(ops);

                let stored = row.strip_attachment_payloads();
                let inserted_is_deleted = stored.document.deleted;
                let stored_doc = stored.document.clone();
                out.bulk_insert_docs.push(stored);
                out.changed_document_ids.push(id.clone());

                if inserted_is_deleted {
                    continue;
                }
                (ChangeOperation::Insert, Some(stored_doc), None)
            }
            Some(document_in_db) => {
                let rev_matches = row
                    .previous
                    .as_ref()
                    .is_some_and(|previous| previous.rev == document_in_db.rev);
                if !rev_matches {
                    out.errors.push(WriteError::Conflict {
                        document_id: id,
                        write_row: row.clone(),
                        document_in_db: document_in_db.clone(),
                    });
                    continue;
                }

                let ops = match classify_attachments(&id, &row.document, Some(document_in_db)) {
                    Ok(ops) => ops,
                    Err(attachment_id) => {
                        out.errors.push(WriteError::AttachmentMissing {
                            document_id: id,
                            write_row: row.clone(),
                            attachment_id,
                            document_in_db: Some(document_in_db.clone()),
                        });
                        continue;
                    }
                };
                out.accept_attachments(ops);

                let stored = row.strip_attachment_payloads();
                let change = derive_update_change(row, stored.document.clone())?;
                out.bulk_update_docs.push(stored);
                out.changed_document_ids.push(id.clone());

                match change {
                    Some(change) => change,
                    None => continue,
                }
            }
        };

        out.event_bulk.events.push(ChangeEvent {
            event_id: event_key(scope, &id, row),
            document_id: id,
            operation,
            doc,
            previous,
            start_time,
            end_time: clock.now(),
        });
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AttachmentData;
    use serde_json::json;
    use std::sync::atomic::{AtomicU64, Ordering};

    struct StepClock(AtomicU64);

    impl Clock for StepClock {
        fn now(&self) -> f64 {
            self.0.fetch_add(1, Ordering::SeqCst) as f64 + 1.0
        }
    }

    fn clock() -> StepClock {
        StepClock(AtomicU64::new(0))
    }

    fn scope() -> StorageScope {
        StorageScope::new("db", "people")
    }

    fn schema() -> CollectionSchema {
        CollectionSchema::new("id")
    }

    fn doc(id: &str, rev: &str, deleted: bool) -> DocumentData {
        DocumentData::from_value(json!({ "id": id }))
            .unwrap()
            .with_rev(rev)
            .with_deleted(deleted)
    }

    fn stored(docs: &[DocumentData]) -> HashMap<DocumentId, DocumentData> {
        docs.iter()
            .map(|d| (d.primary_key("id").unwrap(), d.clone()))
            .collect()
    }

    #[test]
    fn test_insert_emits_insert_event() {
        let rows = vec![BulkWriteRow::insert(doc("a", "1-x", false))];
        let out = categorize_bulk_write_rows(
            &scope(),
            &schema(),
            &HashMap::new(),
            &rows,
            "ctx",
            &clock(),
        )
        .unwrap();

        assert_eq!(out.bulk_insert_docs.len(), 1);
        assert!(out.bulk_update_docs.is_empty());
        assert!(out.errors.is_empty());
        assert_eq!(out.changed_document_ids, vec!["a".to_string()]);
        assert_eq!(out.event_bulk.context, "ctx");
        assert_eq!(out.event_bulk.id.len(), EVENT_BULK_ID_LENGTH);
        assert!(out.event_bulk.checkpoint.is_none());

        let event = &out.event_bulk.events[0];
        assert_eq!(event.operation, ChangeOperation::Insert);
        assert!(event.previous.is_none());
        assert_eq!(event.event_id, "db|people|a||000|1-x");
        assert!(event.end_time > event.start_time);
    }

    #[test]
    fn test_insert_tombstone_has_no_event() {
        let rows = vec![BulkWriteRow::insert(doc("a", "1-x", true))];
        let out = categorize_bulk_write_rows(
            &scope(),
            &schema(),
            &HashMap::new(),
            &rows,
            "",
            &clock(),
        )
        .unwrap();
        assert_eq!(out.bulk_insert_docs.len(), 1);
        assert!(out.event_bulk.is_empty());
    }

    #[test]
    fn test_event_derivation_table() {
        let cases = [
            (true, false, Some(ChangeOperation::Insert)),
            (false, false, Some(ChangeOperation::Update)),
            (false, true, Some(ChangeOperation::Delete)),
            (true, true, None),
        ];

        for (previous_deleted, new_deleted, expected) in cases {
            let in_db = doc("a", "1-x", previous_deleted);
            let rows = vec![BulkWriteRow::update(
                in_db.clone(),
                doc("a", "2-y", new_deleted),
            )];
            let out = categorize_bulk_write_rows(
                &scope(),
                &schema(),
                &stored(&[in_db]),
                &rows,
                "",
                &clock(),
            )
            .unwrap();

            assert_eq!(out.bulk_update_docs.len(), 1);
            assert_eq!(
                out.event_bulk.events.first().map(|e| e.operation),
                expected,
                "previous_deleted={} new_deleted={}",
                previous_deleted,
                new_deleted
            );

            if let Some(event) = out.event_bulk.events.first() {
                match event.operation {
                    ChangeOperation::Insert => {
                        assert!(event.previous.is_none());
                        assert!(event.doc.is_some());
                    }
                    ChangeOperation::Update => {
                        assert!(event.previous.is_some());
                        assert!(event.doc.is_some());
                    }
                    ChangeOperation::Delete => {
                        assert!(event.previous.is_some());
                        assert!(event.doc.is_none());
                    }
                }
            }
        }
    }

    #[test]
    fn test_conflicts() {
        let in_db = doc("a", "2-current", false);

        // No previous while the document exists
        let rows = vec![BulkWriteRow::insert(doc("a", "1-x", false))];
        let out =
            categorize_bulk_write_rows(&scope(), &schema(), &stored(&[in_db.clone()]), &rows, "", &clock())
                .unwrap();
        assert_eq!(out.errors.len(), 1);
        assert_eq!(out.errors[0].status(), 409);
        assert_eq!(out.errors[0].document_in_db(), Some(&in_db));

        // Stale previous
        let rows = vec![BulkWriteRow::update(
            doc("a", "1-stale", false),
            doc("a", "2-y", false),
        )];
        let out =
            categorize_bulk_write_rows(&scope(), &schema(), &stored(&[in_db]), &rows, "", &clock())
                .unwrap();
        assert!(out.errors[0].is_conflict());
        assert!(out.bulk_update_docs.is_empty());
        assert!(out.changed_document_ids.is_empty());
        assert!(out.event_bulk.is_empty());
    }

    #[test]
    fn test_attachment_missing_is_not_persisted() {
        let d = doc("a", "1-x", false).with_attachment(
            "file",
            AttachmentData {
                digest: "d".into(),
                length: 1,
                content_type: "text/plain".into(),
                data: None,
            },
        );
        let rows = vec![BulkWriteRow::insert(d)];
        let out = categorize_bulk_write_rows(
            &scope(),
            &schema(),
            &HashMap::new(),
            &rows,
            "",
            &clock(),
        )
        .unwrap();

        assert_eq!(out.errors.len(), 1);
        assert_eq!(out.errors[0].status(), 510);
        assert!(out.bulk_insert_docs.is_empty());
        assert!(out.attachments_add.is_empty());
        assert!(out.event_bulk.is_empty());
    }

    #[test]
    fn test_payload_stripped_from_persisted_and_event() {
        let d = doc("a", "1-x", false).with_attachment(
            "file",
            AttachmentData {
                digest: "d".into(),
                length: 3,
                content_type: "text/plain".into(),
                data: Some("YWJj".into()),
            },
        );
        let rows = vec![BulkWriteRow::insert(d)];
        let out = categorize_bulk_write_rows(
            &scope(),
            &schema(),
            &HashMap::new(),
            &rows,
            "",
            &clock(),
        )
        .unwrap();

        assert_eq!(out.attachments_add.len(), 1);
        assert!(out.attachments_add[0].attachment_data.has_payload());
        assert!(!out.bulk_insert_docs[0].document.has_attachment_payloads());
        let event_doc = out.event_bulk.events[0].doc.as_ref().unwrap();
        assert!(!event_doc.has_attachment_payloads());
        assert_eq!(event_doc.attachments["file"].length, 3);
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let rows = vec![
            BulkWriteRow::insert(doc("a", "1-x", false)),
            BulkWriteRow::insert(doc("a", "1-y", false)),
        ];
        let result = categorize_bulk_write_rows(
            &scope(),
            &schema(),
            &HashMap::new(),
            &rows,
            "",
            &clock(),
        );
        assert!(matches!(
            result,
            Err(QuireError::DuplicateDocumentInBatch(id)) if id == "a"
        ));
    }

    #[test]
    fn test_start_time_shared_across_events() {
        let rows = vec![
            BulkWriteRow::insert(doc("a", "1-x", false)),
            BulkWriteRow::insert(doc("b", "1-x", false)),
        ];
        let out = categorize_bulk_write_rows(
            &scope(),
            &schema(),
            &HashMap::new(),
            &rows,
            "",
            &clock(),
        )
        .unwrap();
        let events = &out.event_bulk.events;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].start_time, events[1].start_time);
        assert!(events[1].end_time > events[0].end_time);
    }
}
