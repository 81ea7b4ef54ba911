//! Convenience operations on top of any storage instance

use quire_core::{
    compare_values, BulkWriteRow, ChangeEvent, ChangeOperation, CollectionChangeEvent,
    DocumentData, PreparedQuery, QuireError, Result, StorageInstance, WriteError,
};

/// Name of the storage holding database-wide metadata
pub const INTERNAL_STORAGE_NAME: &str = "_quire_internal";

/// Name of the storage holding a database's local documents
pub const LOCAL_DOCS_STORAGE_NAME: &str = "quiredatabase_storage_local";

/// Write one row, failing with [`QuireError::Write`] if it was rejected
pub async fn write_single<S>(instance: &S, row: BulkWriteRow, context: &str) -> Result<DocumentData>
where
    S: StorageInstance + ?Sized,
{
    let result = instance.bulk_write(vec![row], context).await?;
    if let Some(error) = result.error.into_values().next() {
        return Err(QuireError::Write(Box::new(error)));
    }
    result.success.into_values().next().ok_or_else(|| {
        QuireError::InternalConsistency("bulk write returned neither success nor error".into())
    })
}

/// A single live document, `None` when missing or deleted
pub async fn get_single_document<S>(instance: &S, id: &str) -> Result<Option<DocumentData>>
where
    S: StorageInstance + ?Sized,
{
    let mut found = instance
        .find_documents_by_id(&[id.to_string()], false)
        .await?;
    Ok(found.remove(id))
}

/// All live documents, sorted by primary key
pub async fn get_all_documents<S>(instance: &S) -> Result<Vec<DocumentData>>
where
    S: StorageInstance + ?Sized,
{
    let query = PreparedQuery::all_sorted_by(instance.schema().primary_path());
    Ok(instance.query(&query).await?.documents)
}

/// The state written last, ties broken by the larger primary key
pub fn get_newest_of_document_states<'a>(
    primary_path: &str,
    docs: &'a [DocumentData],
) -> Result<&'a DocumentData> {
    docs.iter()
        .max_by(|a, b| {
            a.meta
                .lwt
                .total_cmp(&b.meta.lwt)
                .then_with(|| compare_values(a.get(primary_path), b.get(primary_path)))
        })
        .ok_or_else(|| QuireError::InternalConsistency("no document states to compare".into()))
}

/// Collection-level view of a storage change event
pub fn to_collection_change_event(
    is_local: bool,
    event: &ChangeEvent,
    collection_name: Option<&str>,
) -> CollectionChangeEvent {
    let document_data = match event.operation {
        ChangeOperation::Delete => None,
        _ => event.doc.clone(),
    };
    let previous_document_data = match event.operation {
        ChangeOperation::Insert => None,
        _ => event.previous.clone(),
    };

    CollectionChangeEvent {
        event_id: event.event_id.clone(),
        document_id: event.document_id.clone(),
        collection_name: collection_name.map(str::to_string),
        start_time: event.start_time,
        end_time: event.end_time,
        is_local,
        operation: event.operation,
        document_data,
        previous_document_data,
    }
}

/// Raise a write error as a call failure
///
/// Conflicts become [`QuireError::DocumentConflict`] naming the collection;
/// other write errors pass through as [`QuireError::Write`].
pub fn ensure_write_succeeded(
    collection: &str,
    id: &str,
    error: Option<WriteError>,
) -> Result<()> {
    match error {
        None => Ok(()),
        Some(error) if error.is_conflict() => Err(QuireError::DocumentConflict {
            collection: collection.to_string(),
            id: id.to_string(),
            error: Box::new(error),
        }),
        Some(error) => Err(QuireError::Write(Box::new(error))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(id: &str, lwt: f64) -> DocumentData {
        let mut d = DocumentData::from_value(json!({ "id": id })).unwrap();
        d.meta.lwt = lwt;
        d
    }

    #[test]
    fn test_newest_state() {
        let docs = vec![doc("a", 1.0), doc("b", 3.0), doc("c", 2.0)];
        assert_eq!(
            get_newest_of_document_states("id", &docs).unwrap().get("id"),
            Some(&json!("b"))
        );

        // Same lwt: the larger primary key wins
        let docs = vec![doc("a", 5.0), doc("z", 5.0), doc("m", 5.0)];
        assert_eq!(
            get_newest_of_document_states("id", &docs).unwrap().get("id"),
            Some(&json!("z"))
        );

        assert!(get_newest_of_document_states("id", &[]).is_err());
    }

    #[test]
    fn test_collection_change_event_shape() {
        let event = ChangeEvent {
            event_id: "k".into(),
            document_id: "a".into(),
            operation: ChangeOperation::Delete,
            doc: None,
            previous: Some(doc("a", 1.0)),
            start_time: 1.0,
            end_time: 2.0,
        };
        let view = to_collection_change_event(false, &event, Some("people"));
        assert!(view.document_data.is_none());
        assert!(view.previous_document_data.is_some());
        assert_eq!(view.collection_name.as_deref(), Some("people"));

        let insert = ChangeEvent {
            operation: ChangeOperation::Insert,
            doc: Some(doc("a", 1.0)),
            previous: Some(doc("a", 0.5)),
            ..event
        };
        let view = to_collection_change_event(true, &insert, None);
        assert!(view.document_data.is_some());
        assert!(view.previous_document_data.is_none());
        assert!(view.is_local);
    }

    #[test]
    fn test_ensure_write_succeeded() {
        let row = BulkWriteRow::insert(doc("a", 1.0));
        assert!(ensure_write_succeeded("people", "a", None).is_ok());

        let conflict = WriteError::Conflict {
            document_id: "a".into(),
            write_row: row.clone(),
            document_in_db: doc("a", 2.0),
        };
        assert!(matches!(
            ensure_write_succeeded("people", "a", Some(conflict)),
            Err(QuireError::DocumentConflict { collection, .. }) if collection == "people"
        ));

        let missing = WriteError::AttachmentMissing {
            document_id: "a".into(),
            write_row: row,
            attachment_id: "f".into(),
            document_in_db: None,
        };
        assert!(matches!(
            ensure_write_succeeded("people", "a", Some(missing)),
            Err(QuireError::Write(_))
        ));
    }
}
