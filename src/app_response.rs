//! JSON envelope handed back across the C ABI.
//!
//! Hosts branch on the variant name: `{"Ok":"..."}` carries a payload (an id,
//! a count or a JSON document), every other variant carries a message.

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use serde_json::Error as SerdeError;

use crate::error::StoreError;

#[derive(Debug, Serialize, Deserialize)]
pub enum AppResponse {
    /// LMDB, transaction or bulk delete failure.
    DatabaseError(String),
    /// A payload or stored record could not be encoded or decoded.
    SerializationError(String),
    /// Primary key lookup found no document.
    NotFound(String),
    /// A save or lookup argument was rejected before touching the store.
    ValidationError(String),
    /// Null pointers and non UTF-8 strings from the host.
    BadRequest(String),
    Ok(String),
}

impl Display for AppResponse {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            AppResponse::DatabaseError(msg) => write!(f, "Document store failure: {msg}"),
            AppResponse::SerializationError(msg) => write!(f, "Malformed document JSON: {msg}"),
            AppResponse::NotFound(msg) => write!(f, "No such document: {msg}"),
            AppResponse::ValidationError(msg) => write!(f, "Rejected document input: {msg}"),
            AppResponse::BadRequest(msg) => write!(f, "Unusable call from host: {msg}"),
            AppResponse::Ok(payload) => write!(f, "{payload}"),
        }
    }
}

impl From<StoreError> for AppResponse {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Validation { .. } => AppResponse::ValidationError(err.to_string()),
            StoreError::Serialization(msg) => AppResponse::SerializationError(msg),
            other => AppResponse::DatabaseError(other.to_string()),
        }
    }
}

impl From<SerdeError> for AppResponse {
    fn from(err: SerdeError) -> Self {
        AppResponse::SerializationError(err.to_string())
    }
}

impl AppResponse {
    pub fn success(payload: impl Into<String>) -> Self {
        AppResponse::Ok(payload.into())
    }

    /// Envelope for a primary key that names no stored document.
    pub fn missing_document(id: &str) -> Self {
        AppResponse::NotFound(format!("id {}", id.trim()))
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, AppResponse::Ok(_))
    }
}
