use crate::error::{QuireError, Result};
use crate::types::document::DocumentData;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Primary key definition of a collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PrimaryKey {
    /// The id is stored in a single application field
    Field(String),

    /// The id is derived by joining several fields with a separator and
    /// stored in `key`
    Composite {
        key: String,
        fields: Vec<String>,
        separator: String,
    },
}

/// The parts of a collection schema this layer depends on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionSchema {
    #[serde(default)]
    pub version: u32,

    #[serde(rename = "primaryKey")]
    pub primary_key: PrimaryKey,

    /// Whether documents of this collection may carry attachments
    #[serde(default)]
    pub attachments: bool,
}

impl CollectionSchema {
    pub fn new(primary_path: impl Into<String>) -> Self {
        Self {
            version: 0,
            primary_key: PrimaryKey::Field(primary_path.into()),
            attachments: false,
        }
    }

    pub fn composite(
        key: impl Into<String>,
        fields: Vec<String>,
        separator: impl Into<String>,
    ) -> Self {
        Self {
            version: 0,
            primary_key: PrimaryKey::Composite {
                key: key.into(),
                fields,
                separator: separator.into(),
            },
            attachments: false,
        }
    }

    pub fn with_attachments(mut self, attachments: bool) -> Self {
        self.attachments = attachments;
        self
    }

    /// Name of the field holding the document id
    pub fn primary_path(&self) -> &str {
        match &self.primary_key {
            PrimaryKey::Field(path) => path,
            PrimaryKey::Composite { key, .. } => key,
        }
    }

    /// Compute the id a document must carry according to this schema
    pub fn derive_primary_key(&self, doc: &DocumentData) -> Result<String> {
        match &self.primary_key {
            PrimaryKey::Field(path) => doc.primary_key(path),
            PrimaryKey::Composite {
                fields, separator, ..
            } => {
                let mut parts = Vec::with_capacity(fields.len());
                for field in fields {
                    let part = match doc.get(field) {
                        Some(Value::String(s)) => s.clone(),
                        Some(Value::Number(n)) => n.to_string(),
                        Some(Value::Bool(b)) => b.to_string(),
                        _ => {
                            return Err(QuireError::MissingPrimaryKey(format!(
                                "composite key part '{}' is not set",
                                field
                            )))
                        }
                    };
                    parts.push(part);
                }
                Ok(parts.join(separator))
            }
        }
    }

    /// Return `doc` with its composite primary key filled in
    ///
    /// Single-field keys are left untouched.
    pub fn fill_primary_key(&self, mut doc: DocumentData) -> Result<DocumentData> {
        if let PrimaryKey::Composite { key, .. } = &self.primary_key {
            let value = self.derive_primary_key(&doc)?;
            doc.set(key.clone(), Value::String(value));
        }
        Ok(doc)
    }
}
