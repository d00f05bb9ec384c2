//! Data model definitions for document storage.
//!
//! [`DocumentRecord`] is the only persisted entity. It is created by
//! [`DocumentStore::save`](crate::DocumentStore::save), read back by the
//! lookup operations and removed by delete; records are never updated in
//! place.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::{Result, StoreError};

/// `docType` recorded when the payload does not carry one.
pub const UNKNOWN_DOC_TYPE: &str = "unknown";

/// A stored document.
///
/// Field names serialize in camelCase (`docId`, `userId`, `docType`,
/// `createdAt`) so records cross the host binding unchanged.
///
/// # Examples
///
/// ```rust
/// use offline_doc_store::DocumentRecord;
/// use serde_json::json;
///
/// let record: DocumentRecord = serde_json::from_value(json!({
///     "id": 7,
///     "docId": "inv-001",
///     "title": "Invoice",
///     "data": {"docType": "invoice"},
///     "userId": "u1",
///     "docType": "invoice",
///     "timestamp": 1700000000000_i64,
///     "createdAt": "2023-11-14T22:13:20.000Z"
/// }))?;
/// assert_eq!(record.doc_id, "inv-001");
/// # Ok::<(), serde_json::Error>(())
/// ```
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DocumentRecord {
    /// Store-assigned primary key. Never reused.
    pub id: u64,

    /// Caller-supplied logical identifier. Several records may share one.
    pub doc_id: String,

    pub title: String,

    /// Sanitized payload.
    pub data: JsonValue,

    /// Owner of the record.
    pub user_id: String,

    /// Taken from `data.docType`, or [`UNKNOWN_DOC_TYPE`].
    pub doc_type: String,

    /// Save time in epoch milliseconds. Sort key for lookups.
    pub timestamp: i64,

    /// ISO-8601 rendering of `timestamp`.
    pub created_at: String,
}

/// Save request as sent by a host.
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct NewDocument {
    pub doc_id: String,
    pub title: String,
    pub data: JsonValue,
    pub user_id: String,
}

/// Derives the record's `docType` from the raw payload.
pub fn doc_type_of(data: &JsonValue) -> String {
    match data.get("docType").and_then(JsonValue::as_str) {
        Some(doc_type) if !doc_type.is_empty() => doc_type.to_string(),
        _ => UNKNOWN_DOC_TYPE.to_string(),
    }
}

/// Trims `value` and rejects it when nothing is left.
pub(crate) fn required_text<'a>(param: &'static str, value: &'a str) -> Result<&'a str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(StoreError::validation(param, "must be a non-empty string"));
    }
    Ok(trimmed)
}

/// Primary key argument for lookups and deletes.
///
/// Hosts pass ids either as integers or as text. Text is trimmed; text that
/// is not a decimal integer cannot name a stored record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentKey {
    Id(u64),
    Text(String),
}

impl DocumentKey {
    /// Resolves the key to a primary key.
    ///
    /// Returns `Ok(None)` for well-formed text that can never match a record.
    pub fn resolve(&self) -> Result<Option<u64>> {
        match self {
            DocumentKey::Id(id) => Ok(Some(*id)),
            DocumentKey::Text(text) => {
                let trimmed = required_text("id", text)?;
                Ok(trimmed.parse::<u64>().ok())
            }
        }
    }
}

impl From<u64> for DocumentKey {
    fn from(id: u64) -> Self {
        DocumentKey::Id(id)
    }
}

impl From<&str> for DocumentKey {
    fn from(text: &str) -> Self {
        DocumentKey::Text(text.to_string())
    }
}

impl From<String> for DocumentKey {
    fn from(text: String) -> Self {
        DocumentKey::Text(text)
    }
}

impl From<&String> for DocumentKey {
    fn from(text: &String) -> Self {
        DocumentKey::Text(text.clone())
    }
}
