use crate::types::document::DocumentData;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The three document states a replication conflict handler looks at
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictHandlerInput {
    pub assumed_master_state: Option<DocumentData>,
    pub real_master_state: DocumentData,
    pub new_document_state: DocumentData,
}

/// A conflict raised by a storage engine during replication
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictResolutionTask {
    pub id: String,
    pub context: String,
    pub input: ConflictHandlerInput,
}

/// Document content chosen by a conflict handler, without `_rev`, `_meta`
/// and `_attachments`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedDocument {
    #[serde(flatten)]
    pub fields: Map<String, Value>,
    #[serde(rename = "_deleted", default)]
    pub deleted: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum ConflictHandlerOutput {
    /// Both sides hold the same content, nothing to write
    Equal,
    Resolved { document_data: ResolvedDocument },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictResolutionTaskSolution {
    pub id: String,
    pub output: ConflictHandlerOutput,
}
