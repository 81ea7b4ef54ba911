use crate::types::checkpoint::Checkpoint;
use crate::types::document::{DocumentData, DocumentId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeOperation {
    Insert,
    Update,
    Delete,
}

/// A single document change observed by a storage instance
///
/// `doc` is `None` for deletes, `previous` is `None` for inserts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// Deterministic key used to drop the same event arriving twice
    pub event_id: String,
    pub document_id: DocumentId,
    pub operation: ChangeOperation,
    pub doc: Option<DocumentData>,
    pub previous: Option<DocumentData>,
    pub start_time: f64,
    pub end_time: f64,
}

/// All change events produced by one accepted bulk write
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventBulk {
    pub id: String,
    pub events: Vec<ChangeEvent>,
    pub checkpoint: Option<Checkpoint>,
    pub context: String,
}

impl EventBulk {
    pub fn new(id: impl Into<String>, context: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            events: Vec::new(),
            checkpoint: None,
            context: context.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Collection-level view of a change event, as handed to reactive queries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionChangeEvent {
    pub event_id: String,
    pub document_id: DocumentId,
    pub collection_name: Option<String>,
    pub start_time: f64,
    pub end_time: f64,
    /// Whether the change came from a local-documents storage
    pub is_local: bool,
    pub operation: ChangeOperation,
    pub document_data: Option<DocumentData>,
    pub previous_document_data: Option<DocumentData>,
}
