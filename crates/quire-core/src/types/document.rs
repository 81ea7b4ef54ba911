use crate::error::{QuireError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Primary key value of a document
pub type DocumentId = String;

/// Smallest `lwt` a stored document can carry
pub const META_LWT_MINIMUM: f64 = 1.0;

/// Reserved `_meta` object of a document
///
/// `lwt` (last write time, fractional milliseconds) is always present and is
/// re-stamped by the wrapper on every write. Plugins may add their own keys;
/// those must survive every later write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentMeta {
    pub lwt: f64,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DocumentMeta {
    pub fn new(lwt: f64) -> Self {
        Self {
            lwt,
            extra: Map::new(),
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        key == "lwt" || self.extra.contains_key(key)
    }

    /// All metadata keys, `lwt` first
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        std::iter::once("lwt").chain(self.extra.keys().map(String::as_str))
    }
}

impl Default for DocumentMeta {
    fn default() -> Self {
        Self::new(META_LWT_MINIMUM)
    }
}

/// Attachment metadata, optionally carrying the inline base64 payload
///
/// The payload only exists on documents handed to a bulk write. It is split
/// off into the attachment side-channel before anything is persisted or
/// emitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttachmentData {
    pub digest: String,
    pub length: u64,
    #[serde(rename = "type")]
    pub content_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

impl AttachmentData {
    pub fn has_payload(&self) -> bool {
        self.data.is_some()
    }

    /// Metadata only, payload removed
    pub fn stripped(&self) -> Self {
        Self {
            digest: self.digest.clone(),
            length: self.length,
            content_type: self.content_type.clone(),
            data: None,
        }
    }
}

/// A document state as stored and exchanged with storage engines
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentData {
    /// Application fields, including the primary key field
    #[serde(flatten)]
    pub fields: Map<String, Value>,

    #[serde(rename = "_rev", default)]
    pub rev: String,

    #[serde(rename = "_deleted", default)]
    pub deleted: bool,

    #[serde(rename = "_meta", default)]
    pub meta: DocumentMeta,

    #[serde(rename = "_attachments", default)]
    pub attachments: BTreeMap<String, AttachmentData>,
}

impl DocumentData {
    /// Create a live document with no revision yet
    pub fn new(fields: Map<String, Value>) -> Self {
        Self {
            fields,
            rev: String::new(),
            deleted: false,
            meta: DocumentMeta::default(),
            attachments: BTreeMap::new(),
        }
    }

    /// Build from a JSON object; reserved keys are picked up if present
    pub fn from_value(value: Value) -> Result<Self> {
        if !value.is_object() {
            return Err(QuireError::Serialization(
                "document must be a JSON object".into(),
            ));
        }
        Ok(serde_json::from_value(value)?)
    }

    pub fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn with_rev(mut self, rev: impl Into<String>) -> Self {
        self.rev = rev.into();
        self
    }

    pub fn with_deleted(mut self, deleted: bool) -> Self {
        self.deleted = deleted;
        self
    }

    pub fn with_attachment(mut self, id: impl Into<String>, attachment: AttachmentData) -> Self {
        self.attachments.insert(id.into(), attachment);
        self
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn set(&mut self, field: impl Into<String>, value: Value) {
        self.fields.insert(field.into(), value);
    }

    /// Read the primary key stored at `primary_path`
    ///
    /// Strings are used as-is, numbers are rendered in their JSON form.
    pub fn primary_key(&self, primary_path: &str) -> Result<DocumentId> {
        match self.fields.get(primary_path) {
            Some(Value::String(s)) => Ok(s.clone()),
            Some(Value::Number(n)) => Ok(n.to_string()),
            Some(other) => Err(QuireError::MissingPrimaryKey(format!(
                "field '{}' holds a non-scalar value: {}",
                primary_path, other
            ))),
            None => Err(QuireError::MissingPrimaryKey(format!(
                "field '{}' is not set",
                primary_path
            ))),
        }
    }

    pub fn has_attachment_payloads(&self) -> bool {
        self.attachments.values().any(AttachmentData::has_payload)
    }

    /// Copy of this document with every inline attachment payload removed
    pub fn strip_attachment_payloads(&self) -> Self {
        let mut doc = self.clone();
        for attachment in doc.attachments.values_mut() {
            attachment.data = None;
        }
        doc
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_flat_json_shape() {
        let doc = DocumentData::from_value(json!({
            "id": "p1",
            "name": "alice",
            "_rev": "1-abc",
            "_deleted": false,
            "_meta": { "lwt": 10.5, "plugin": true },
            "_attachments": {}
        }))
        .unwrap();

        assert_eq!(doc.rev, "1-abc");
        assert_eq!(doc.meta.lwt, 10.5);
        assert!(doc.meta.contains_key("plugin"));
        assert_eq!(doc.get("name"), Some(&json!("alice")));
        assert!(!doc.fields.contains_key("_rev"));

        let back = doc.to_value().unwrap();
        assert_eq!(back["_meta"]["plugin"], json!(true));
        assert_eq!(back["id"], json!("p1"));
    }

    #[test]
    fn test_primary_key_forms() {
        let doc = DocumentData::from_value(json!({ "id": "x", "n": 7, "o": {} })).unwrap();
        assert_eq!(doc.primary_key("id").unwrap(), "x");
        assert_eq!(doc.primary_key("n").unwrap(), "7");
        assert!(matches!(
            doc.primary_key("o"),
            Err(QuireError::MissingPrimaryKey(_))
        ));
        assert!(matches!(
            doc.primary_key("missing"),
            Err(QuireError::MissingPrimaryKey(_))
        ));
    }

    #[test]
    fn test_strip_attachment_payloads() {
        let doc = DocumentData::from_value(json!({ "id": "x" }))
            .unwrap()
            .with_attachment(
                "a.txt",
                AttachmentData {
                    digest: "d".into(),
                    length: 3,
                    content_type: "text/plain".into(),
                    data: Some("YWJj".into()),
                },
            );
        assert!(doc.has_attachment_payloads());

        let stripped = doc.strip_attachment_payloads();
        assert!(!stripped.has_attachment_payloads());
        assert_eq!(stripped.attachments["a.txt"].length, 3);
        let value = stripped.to_value().unwrap();
        assert!(value["_attachments"]["a.txt"].get("data").is_none());
    }
}
