//! Attachment side-channel classification

use crate::error::{QuireError, Result};
use crate::traits::hasher::RevisionHasher;
use crate::types::{AttachmentRemove, AttachmentWrite, DocumentData};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;

/// Side-channel operations derived from one write row
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttachmentOperations {
    pub add: Vec<AttachmentWrite>,
    pub update: Vec<AttachmentWrite>,
    pub remove: Vec<AttachmentRemove>,
}

/// Decide which attachment payloads must be added, replaced or dropped
///
/// `previous` is the stored state on the update path and `None` on the insert
/// path. A tombstone `previous` holds no payloads, so its attachment
/// metadata never counts as known. On error the id of the first attachment that has neither an inline
/// payload nor prior metadata is returned, and no operation of the row may be
/// applied.
pub fn classify_attachments(
    document_id: &str,
    document: &DocumentData,
    previous: Option<&DocumentData>,
) -> std::result::Result<AttachmentOperations, String> {
    let mut ops = AttachmentOperations::default();

    if document.deleted {
        if let Some(previous) = previous {
            ops.remove = previous
                .attachments
                .keys()
                .map(|attachment_id| AttachmentRemove {
                    document_id: document_id.to_string(),
                    attachment_id: attachment_id.clone(),
                })
                .collect();
            return Ok(ops);
        }
    }

    // Payloads of a tombstone were dropped when it was deleted
    let previous = previous.filter(|p| !p.deleted);

    for (attachment_id, attachment) in &document.attachments {
        let known = previous.is_some_and(|p| p.attachments.contains_key(attachment_id));
        if !known && !attachment.has_payload() {
            return Err(attachment_id.clone());
        }
    }

    for (attachment_id, attachment) in &document.attachments {
        if !attachment.has_payload() {
            continue;
        }
        let write = AttachmentWrite {
            document_id: document_id.to_string(),
            attachment_id: attachment_id.clone(),
            attachment_data: attachment.clone(),
        };
        let known = previous.is_some_and(|p| p.attachments.contains_key(attachment_id));
        if known {
            ops.update.push(write);
        } else {
            ops.add.push(write);
        }
    }

    if let Some(previous) = previous {
        for attachment_id in previous.attachments.keys() {
            if !document.attachments.contains_key(attachment_id) {
                ops.remove.push(AttachmentRemove {
                    document_id: document_id.to_string(),
                    attachment_id: attachment_id.clone(),
                });
            }
        }
    }

    Ok(ops)
}

fn decode(base64_data: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(base64_data)
        .map_err(|e| QuireError::Serialization(format!("invalid attachment payload: {}", e)))
}

/// Decoded byte length of a base64 attachment payload
pub fn attachment_size(base64_data: &str) -> Result<u64> {
    Ok(decode(base64_data)?.len() as u64)
}

/// Digest of the decoded bytes of a base64 attachment payload
pub fn hash_attachment_data(base64_data: &str, hasher: &dyn RevisionHasher) -> Result<String> {
    Ok(hasher.hash(&decode(base64_data)?))
}
