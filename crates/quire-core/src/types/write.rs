use crate::error::Result;
use crate::types::document::{AttachmentData, DocumentData, DocumentId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Identifies the database and collection a storage instance belongs to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StorageScope {
    pub database_name: String,
    pub collection_name: String,
}

impl StorageScope {
    pub fn new(database_name: impl Into<String>, collection_name: impl Into<String>) -> Self {
        Self {
            database_name: database_name.into(),
            collection_name: collection_name.into(),
        }
    }
}

/// One proposed mutation in a bulk write
///
/// `previous` is the writer's belief of the currently stored state. `None`
/// means the writer believes the document does not exist yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkWriteRow {
    pub document: DocumentData,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous: Option<DocumentData>,
}

impl BulkWriteRow {
    pub fn insert(document: DocumentData) -> Self {
        Self {
            document,
            previous: None,
        }
    }

    pub fn update(previous: DocumentData, document: DocumentData) -> Self {
        Self {
            document,
            previous: Some(previous),
        }
    }

    /// Copy of this row with attachment payloads removed from the new document
    pub fn strip_attachment_payloads(&self) -> Self {
        Self {
            document: self.document.strip_attachment_payloads(),
            previous: self.previous.clone(),
        }
    }
}

/// Per-document rejection reported in a bulk write result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum WriteError {
    /// The stated previous revision does not match the stored one
    Conflict {
        document_id: DocumentId,
        write_row: BulkWriteRow,
        document_in_db: DocumentData,
    },

    /// A newly referenced attachment has neither prior metadata nor payload
    AttachmentMissing {
        document_id: DocumentId,
        write_row: BulkWriteRow,
        attachment_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        document_in_db: Option<DocumentData>,
    },
}

impl WriteError {
    pub const CONFLICT_STATUS: u16 = 409;
    pub const ATTACHMENT_MISSING_STATUS: u16 = 510;

    pub fn status(&self) -> u16 {
        match self {
            WriteError::Conflict { .. } => Self::CONFLICT_STATUS,
            WriteError::AttachmentMissing { .. } => Self::ATTACHMENT_MISSING_STATUS,
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, WriteError::Conflict { .. })
    }

    pub fn document_id(&self) -> &str {
        match self {
            WriteError::Conflict { document_id, .. }
            | WriteError::AttachmentMissing { document_id, .. } => document_id,
        }
    }

    pub fn write_row(&self) -> &BulkWriteRow {
        match self {
            WriteError::Conflict { write_row, .. }
            | WriteError::AttachmentMissing { write_row, .. } => write_row,
        }
    }

    pub fn document_in_db(&self) -> Option<&DocumentData> {
        match self {
            WriteError::Conflict { document_in_db, .. } => Some(document_in_db),
            WriteError::AttachmentMissing { document_in_db, .. } => document_in_db.as_ref(),
        }
    }

    /// Apply `f` to every document embedded in this error
    pub fn try_map_documents<F>(self, mut f: F) -> Result<Self>
    where
        F: FnMut(DocumentData) -> Result<DocumentData>,
    {
        let mut map_row = |row: BulkWriteRow| -> Result<BulkWriteRow> {
            Ok(BulkWriteRow {
                document: f(row.document)?,
                previous: row.previous.map(&mut f).transpose()?,
            })
        };

        Ok(match self {
            WriteError::Conflict {
                document_id,
                write_row,
                document_in_db,
            } => {
                let write_row = map_row(write_row)?;
                WriteError::Conflict {
                    document_id,
                    write_row,
                    document_in_db: f(document_in_db)?,
                }
            }
            WriteError::AttachmentMissing {
                document_id,
                write_row,
                attachment_id,
                document_in_db,
            } => {
                let write_row = map_row(write_row)?;
                WriteError::AttachmentMissing {
                    document_id,
                    write_row,
                    attachment_id,
                    document_in_db: document_in_db.map(&mut f).transpose()?,
                }
            }
        })
    }
}

impl fmt::Display for WriteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriteError::Conflict { document_id, .. } => {
                write!(f, "conflict (409) on document {}", document_id)
            }
            WriteError::AttachmentMissing {
                document_id,
                attachment_id,
                ..
            } => write!(
                f,
                "attachment {} missing (510) on document {}",
                attachment_id, document_id
            ),
        }
    }
}

/// Outcome of a bulk write: every input id lands in exactly one map
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BulkWriteResult {
    pub success: HashMap<DocumentId, DocumentData>,
    pub error: HashMap<DocumentId, WriteError>,
}

impl BulkWriteResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.success.len() + self.error.len()
    }

    pub fn is_empty(&self) -> bool {
        self.success.is_empty() && self.error.is_empty()
    }

    /// Merge `other` into `self`, entries of `other` win for the same id
    pub fn merge(&mut self, other: BulkWriteResult) {
        for (id, doc) in other.success {
            self.error.remove(&id);
            self.success.insert(id, doc);
        }
        for (id, err) in other.error {
            self.success.remove(&id);
            self.error.insert(id, err);
        }
    }
}

/// An attachment payload to store or replace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttachmentWrite {
    pub document_id: DocumentId,
    pub attachment_id: String,
    pub attachment_data: AttachmentData,
}

/// An attachment payload to drop
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentRemove {
    pub document_id: DocumentId,
    pub attachment_id: String,
}
