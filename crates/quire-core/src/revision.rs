//! Revision tokens
//!
//! Every stored document carries a `_rev` of the form `<height>-<hash>`.
//! The height strictly increases with every accepted write; the hash is an
//! opaque content fingerprint produced by the engine's [`RevisionHasher`].

use crate::error::{QuireError, Result};
use crate::traits::hasher::RevisionHasher;
use crate::types::DocumentData;
use serde_json::Value;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Parsed form of a `_rev` token
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Revision {
    pub height: u64,
    pub hash: String,
}

impl Revision {
    pub fn new(height: u64, hash: impl Into<String>) -> Self {
        Self {
            height,
            hash: hash.into(),
        }
    }
}

impl FromStr for Revision {
    type Err = QuireError;

    fn from_str(token: &str) -> Result<Self> {
        let malformed = || QuireError::MalformedRevision(token.to_string());

        let (height, hash) = token.split_once('-').ok_or_else(malformed)?;
        if height.is_empty() || !height.bytes().all(|b| b.is_ascii_digit()) || hash.is_empty() {
            return Err(malformed());
        }
        let height = height.parse::<u64>().map_err(|_| malformed())?;

        Ok(Self {
            height,
            hash: hash.to_string(),
        })
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.height, self.hash)
    }
}

impl PartialOrd for Revision {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Revisions order by height; the hash only breaks ties deterministically
impl Ord for Revision {
    fn cmp(&self, other: &Self) -> Ordering {
        self.height
            .cmp(&other.height)
            .then_with(|| self.hash.cmp(&other.hash))
    }
}

pub fn parse_revision(token: &str) -> Result<Revision> {
    token.parse()
}

/// Height of a document's current revision
pub fn revision_height(doc: &DocumentData) -> Result<u64> {
    Ok(parse_revision(&doc.rev)?.height)
}

/// Build the revision for `document`, chained off `previous`
///
/// The hash covers every field of the document except `_rev`, in key-sorted
/// JSON form, so identical content on the same base always yields the same
/// token.
pub fn create_revision(
    hasher: &dyn RevisionHasher,
    document: &DocumentData,
    previous: Option<&DocumentData>,
) -> Result<String> {
    let previous_height = match previous {
        Some(previous) => revision_height(previous)?,
        None => 0,
    };

    let mut value = document.to_value()?;
    if let Value::Object(map) = &mut value {
        map.remove("_rev");
    }
    let bytes = serde_json::to_vec(&value)?;

    Ok(Revision::new(previous_height + 1, hasher.hash(&bytes)).to_string())
}
