use crate::types::WriteError;
use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum QuireError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Malformed revision: {0}")]
    MalformedRevision(String),

    /// A "should never happen" condition: a broken revision chain, a hook that
    /// dropped a metadata key, an event transition that cannot be derived.
    /// Always indicates a bug in a hook or a storage engine.
    #[error("Internal consistency violation: {0}")]
    InternalConsistency(String),

    #[error("Document {0} appears more than once in the same bulk write")]
    DuplicateDocumentInBatch(String),

    #[error("Missing primary key: {0}")]
    MissingPrimaryKey(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Storage instance is closed: {0}")]
    Closed(String),

    #[error("Lock acquisition timed out after {timeout_ms}ms")]
    LockTimeout { timeout_ms: u64 },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Write rejected: {0}")]
    Write(Box<WriteError>),

    #[error("Conflict writing document {id} in collection {collection}")]
    DocumentConflict {
        collection: String,
        id: String,
        error: Box<WriteError>,
    },

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl QuireError {
    /// Whether this error signals a bug rather than a runtime condition.
    pub fn is_internal_consistency(&self) -> bool {
        matches!(
            self,
            QuireError::InternalConsistency(_) | QuireError::MalformedRevision(_)
        )
    }
}

impl From<serde_json::Error> for QuireError {
    fn from(err: serde_json::Error) -> Self {
        QuireError::Serialization(err.to_string())
    }
}

impl From<WriteError> for QuireError {
    fn from(err: WriteError) -> Self {
        QuireError::Write(Box::new(err))
    }
}

pub type Result<T> = std::result::Result<T, QuireError>;
