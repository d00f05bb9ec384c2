//! Error types for document store operations.
//!
//! Every fault raised by the store is one of these variants. Validation
//! errors are produced before any database work starts; all other variants
//! carry the text of the underlying LMDB, I/O or serde failure.

use thiserror::Error;

/// Result type alias for document store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Core error type for document store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Bad caller input, detected before any I/O.
    #[error("Validation error: invalid `{param}`: {reason}")]
    Validation { param: &'static str, reason: String },

    /// The host cannot provide a local storage directory.
    #[error("Unsupported environment: {0}")]
    UnsupportedEnvironment(String),

    /// The host rejected opening or provisioning the database.
    #[error("Open error: {0}")]
    Open(String),

    /// A transaction could not be started or failed to commit.
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// The store rejected an individual insert.
    #[error("Insert error: {0}")]
    Insert(String),

    /// A lookup or index scan failed.
    #[error("Query error: {0}")]
    Query(String),

    /// The store rejected an individual delete.
    #[error("Delete error: {0}")]
    Delete(String),

    /// At least one delete of a bulk clear failed. Other deletes may have
    /// committed.
    #[error("Bulk delete error: {failed} of {attempted} deletes failed: {reason}")]
    BulkDelete {
        attempted: usize,
        failed: usize,
        reason: String,
    },

    /// A stored record could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl StoreError {
    pub(crate) fn validation(param: &'static str, reason: impl Into<String>) -> Self {
        StoreError::Validation {
            param,
            reason: reason.into(),
        }
    }

    /// Returns true for errors raised before the database was touched.
    pub fn is_validation(&self) -> bool {
        matches!(self, StoreError::Validation { .. })
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}
