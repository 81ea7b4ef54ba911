//! Event bulk forwarding and conflict-resolution task plumbing

use futures::StreamExt;
use quire::prelude::*;
use quire::{
    ConflictHandlerInput, ConflictHandlerOutput, ConflictResolutionTask,
    ConflictResolutionTaskSolution, ResolvedDocument,
};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;

type People = WrappedStorageInstance<MemoryStorageInstance>;

fn tagging_hooks() -> HookChain {
    HookChain::new()
        .with_pre_write(FnHook::new("tag", |doc: &mut DocumentData| {
            doc.set("stored", json!(true));
            Ok(())
        }))
        .with_post_read(FnHook::new("untag", |doc: &mut DocumentData| {
            doc.fields.remove("stored");
            Ok(())
        }))
}

fn open(hooks: HookChain) -> Result<(Arc<Database>, People)> {
    let db = Database::open(
        DatabaseConfig::new("app").with_event_bulk_dedup(DedupConfig::new(60_000, 100)),
        hooks,
    )?;
    let raw = MemoryStorageInstance::open(
        MemoryStorageConfig::new("app", "people"),
        CollectionSchema::new("id"),
    )?;
    let people = db.wrap_storage_instance(Arc::new(raw));
    Ok((db, people))
}

fn new_doc(people: &People, value: Value) -> Result<DocumentData> {
    let mut doc = DocumentData::from_value(value)?;
    doc.rev = create_revision(people.hasher(), &doc, None)?;
    Ok(doc)
}

async fn within<T>(fut: impl std::future::Future<Output = Option<T>>) -> Option<T> {
    tokio::time::timeout(Duration::from_secs(2), fut)
        .await
        .ok()
        .flatten()
}

#[tokio::test]
async fn test_forwarded_bulks_are_emitted_once() -> Result<()> {
    let (db, people) = open(HookChain::new())?;
    let mut bulks = db.event_bulks();
    let forwarder = db.forward_changes(&people);

    write_single(
        &people,
        BulkWriteRow::insert(new_doc(&people, json!({ "id": "a" }))?),
        "first",
    )
    .await?;

    let bulk = within(bulks.next()).await.expect("forwarded bulk");
    assert_eq!(bulk.context, "first");
    assert_eq!(bulk.events.len(), 1);
    assert!(bulk.checkpoint.is_some());

    // Echo of the same bulk is dropped
    assert!(!db.emit(bulk.clone()));

    write_single(
        &people,
        BulkWriteRow::insert(new_doc(&people, json!({ "id": "b" }))?),
        "second",
    )
    .await?;
    let next = within(bulks.next()).await.expect("second bulk");
    assert_eq!(next.context, "second");
    assert_ne!(next.id, bulk.id);

    db.close().await?;
    assert!(within(bulks.next()).await.is_none());
    forwarder.abort();
    Ok(())
}

#[tokio::test]
async fn test_event_ids_are_deterministic() -> Result<()> {
    let (_db, people) = open(HookChain::new())?;
    let mut changes = people.change_stream();

    let doc = new_doc(&people, json!({ "id": "a" }))?;
    let rev = doc.rev.clone();
    write_single(&people, BulkWriteRow::insert(doc), "ctx").await?;

    let bulk = within(changes.next()).await.expect("bulk");
    let event = &bulk.events[0];
    assert_eq!(event.event_id, format!("app|people|a||000|{}", rev));
    assert!(event.end_time >= event.start_time);
    Ok(())
}

#[tokio::test]
async fn test_conflict_tasks_are_translated() -> Result<()> {
    let (_db, people) = open(tagging_hooks())?;
    let mut tasks = people.conflict_resolution_tasks();

    let mut master = new_doc(&people, json!({ "id": "a", "v": 1 }))?;
    master.set("stored", json!(true));
    people.raw().push_conflict_task(ConflictResolutionTask {
        id: "task-1".into(),
        context: "replication".into(),
        input: ConflictHandlerInput {
            assumed_master_state: Some(master.clone()),
            real_master_state: master.clone(),
            new_document_state: master,
        },
    })?;

    let task = within(tasks.next()).await.expect("task");
    assert_eq!(task.id, "task-1");
    assert!(task.input.real_master_state.get("stored").is_none());
    assert!(task
        .input
        .assumed_master_state
        .as_ref()
        .is_some_and(|d| d.get("stored").is_none()));
    Ok(())
}

#[tokio::test]
async fn test_resolved_solution_is_stamped_and_hooked() -> Result<()> {
    let (_db, people) = open(tagging_hooks())?;

    let mut fields = Map::new();
    fields.insert("id".into(), json!("a"));
    fields.insert("v".into(), json!(2));
    people
        .resolve_conflict_resolution_task(ConflictResolutionTaskSolution {
            id: "task-1".into(),
            output: ConflictHandlerOutput::Resolved {
                document_data: ResolvedDocument {
                    fields,
                    deleted: false,
                },
            },
        })
        .await?;

    people
        .resolve_conflict_resolution_task(ConflictResolutionTaskSolution {
            id: "task-2".into(),
            output: ConflictHandlerOutput::Equal,
        })
        .await?;

    let solutions = people.raw().resolved_tasks();
    assert_eq!(solutions.len(), 2);
    match &solutions[0].output {
        ConflictHandlerOutput::Resolved { document_data } => {
            assert_eq!(document_data.fields.get("stored"), Some(&json!(true)));
            assert_eq!(document_data.fields.get("v"), Some(&json!(2)));
            assert!(!document_data.deleted);
        }
        other => panic!("expected a resolved document, got {other:?}"),
    }
    assert_eq!(solutions[1].output, ConflictHandlerOutput::Equal);
    Ok(())
}
