//! Database layout and provisioning.
//!
//! Version 1 of the schema consists of:
//!
//! - `meta`: schema version and the primary key counter
//! - `documents`: primary key (`u64`, big endian) to JSON-encoded record
//! - one index database per indexed field (`docId`, `userId`, `timestamp`,
//!   `docType`), all non-unique
//!
//! Index entries are keyed by `<encoded field value><record id>` so that
//! every record owns exactly one entry per index and an equality lookup is a
//! prefix scan. Text values are length-prefixed, which keeps one value from
//! matching as a prefix of another.

use lmdb::{Database, DatabaseFlags, Environment, Error as LmdbError, Transaction, WriteFlags};
use log::{debug, info};

use crate::document_model::DocumentRecord;
use crate::error::{Result, StoreError};

/// Default logical database name.
pub const DATABASE_NAME: &str = "document_storage";

/// Schema version written by this crate.
pub const SCHEMA_VERSION: u32 = 1;

pub const META_DB: &str = "meta";
pub const DOCUMENTS_DB: &str = "documents";

pub(crate) const SCHEMA_VERSION_KEY: &str = "schema_version";
pub(crate) const NEXT_ID_KEY: &str = "next_id";

/// Named databases the environment must be able to hold.
pub(crate) const MAX_DBS: u32 = 2 + INDEXES.len() as u32;

/// Longest text value (in bytes) that can be indexed. LMDB keys are capped
/// at 511 bytes and index keys also carry a length prefix and the id.
pub const MAX_INDEXED_LEN: usize = 400;

/// Indexed record fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexField {
    DocId,
    UserId,
    Timestamp,
    DocType,
}

pub const INDEXES: [IndexField; 4] = [
    IndexField::DocId,
    IndexField::UserId,
    IndexField::Timestamp,
    IndexField::DocType,
];

impl IndexField {
    /// Record field this index covers.
    pub fn field_name(self) -> &'static str {
        match self {
            IndexField::DocId => "docId",
            IndexField::UserId => "userId",
            IndexField::Timestamp => "timestamp",
            IndexField::DocType => "docType",
        }
    }

    /// Name of the backing LMDB database.
    pub fn db_name(self) -> &'static str {
        match self {
            IndexField::DocId => "idx_docId",
            IndexField::UserId => "idx_userId",
            IndexField::Timestamp => "idx_timestamp",
            IndexField::DocType => "idx_docType",
        }
    }

    fn position(self) -> usize {
        match self {
            IndexField::DocId => 0,
            IndexField::UserId => 1,
            IndexField::Timestamp => 2,
            IndexField::DocType => 3,
        }
    }

    /// Encoded field value of `record`, without the trailing id.
    pub fn value_prefix(self, record: &DocumentRecord) -> Vec<u8> {
        match self {
            IndexField::DocId => text_prefix(&record.doc_id),
            IndexField::UserId => text_prefix(&record.user_id),
            IndexField::Timestamp => timestamp_prefix(record.timestamp).to_vec(),
            IndexField::DocType => text_prefix(&record.doc_type),
        }
    }

    /// Full index key of `record`.
    pub fn entry_key(self, record: &DocumentRecord) -> Vec<u8> {
        let mut key = self.value_prefix(record);
        key.extend_from_slice(&primary_key(record.id));
        key
    }
}

/// Primary key bytes. Big endian keeps LMDB's byte order equal to id order.
pub fn primary_key(id: u64) -> [u8; 8] {
    id.to_be_bytes()
}

pub fn decode_id(bytes: &[u8]) -> Result<u64> {
    let raw: [u8; 8] = bytes
        .try_into()
        .map_err(|_| StoreError::Query(format!("malformed record id ({} bytes)", bytes.len())))?;
    Ok(u64::from_be_bytes(raw))
}

/// Length-prefixed text, the exact-match prefix for text indexes.
pub fn text_prefix(value: &str) -> Vec<u8> {
    let bytes = value.as_bytes();
    let mut key = Vec::with_capacity(4 + bytes.len() + 8);
    key.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
    key.extend_from_slice(bytes);
    key
}

/// Sign-flipped big endian so negative timestamps sort before positive ones.
pub fn timestamp_prefix(timestamp: i64) -> [u8; 8] {
    ((timestamp as u64) ^ (1 << 63)).to_be_bytes()
}

/// Handles to every database of a provisioned environment.
#[derive(Debug, Clone, Copy)]
pub struct Schema {
    pub meta: Database,
    pub documents: Database,
    indexes: [Database; 4],
}

impl Schema {
    pub fn index(&self, field: IndexField) -> Database {
        self.indexes[field.position()]
    }
}

/// Opens the schema, provisioning it first when the environment is new or
/// carries an older version.
pub fn provision(env: &Environment) -> Result<Schema> {
    let meta = open_or_create(env, META_DB)?;
    let version = stored_version(env, meta)?;

    if version > SCHEMA_VERSION {
        return Err(StoreError::Open(format!(
            "database schema version {version} is newer than supported version {SCHEMA_VERSION}"
        )));
    }

    let schema = if version < SCHEMA_VERSION {
        info!("Upgrading document store schema from version {version} to {SCHEMA_VERSION}");
        let schema = Schema {
            meta,
            documents: open_or_create(env, DOCUMENTS_DB)?,
            indexes: [
                open_or_create(env, IndexField::DocId.db_name())?,
                open_or_create(env, IndexField::UserId.db_name())?,
                open_or_create(env, IndexField::Timestamp.db_name())?,
                open_or_create(env, IndexField::DocType.db_name())?,
            ],
        };
        write_version(env, meta, SCHEMA_VERSION)?;
        schema
    } else {
        Schema {
            meta,
            documents: open_existing(env, DOCUMENTS_DB)?,
            indexes: [
                open_existing(env, IndexField::DocId.db_name())?,
                open_existing(env, IndexField::UserId.db_name())?,
                open_existing(env, IndexField::Timestamp.db_name())?,
                open_existing(env, IndexField::DocType.db_name())?,
            ],
        }
    };

    debug!("Document store schema ready at version {SCHEMA_VERSION}");
    Ok(schema)
}

/// Persisted schema version, or 0 for an unprovisioned environment.
pub fn stored_version(env: &Environment, meta: Database) -> Result<u32> {
    let txn = env
        .begin_ro_txn()
        .map_err(|e| StoreError::Open(format!("cannot read schema version: {e}")))?;
    let version = match txn.get(meta, &SCHEMA_VERSION_KEY) {
        Ok(bytes) => {
            let raw: [u8; 4] = bytes.try_into().map_err(|_| {
                StoreError::Open(format!("malformed schema version ({} bytes)", bytes.len()))
            })?;
            u32::from_be_bytes(raw)
        }
        Err(LmdbError::NotFound) => 0,
        Err(e) => return Err(StoreError::Open(format!("cannot read schema version: {e}"))),
    };
    txn.abort();
    Ok(version)
}

pub(crate) fn write_version(env: &Environment, meta: Database, version: u32) -> Result<()> {
    let mut txn = env
        .begin_rw_txn()
        .map_err(|e| StoreError::Open(format!("cannot record schema version: {e}")))?;
    txn.put(
        meta,
        &SCHEMA_VERSION_KEY,
        &version.to_be_bytes(),
        WriteFlags::empty(),
    )
    .map_err(|e| StoreError::Open(format!("cannot record schema version: {e}")))?;
    txn.commit()
        .map_err(|e| StoreError::Open(format!("cannot record schema version: {e}")))
}

// Check-before-create keeps repeated upgrades harmless.
fn open_or_create(env: &Environment, name: &str) -> Result<Database> {
    match env.open_db(Some(name)) {
        Ok(db) => Ok(db),
        Err(LmdbError::NotFound) => {
            debug!("Creating database '{name}'");
            env.create_db(Some(name), DatabaseFlags::empty())
                .map_err(|e| StoreError::Open(format!("cannot create database '{name}': {e}")))
        }
        Err(e) => Err(StoreError::Open(format!("cannot open database '{name}': {e}"))),
    }
}

fn open_existing(env: &Environment, name: &str) -> Result<Database> {
    env.open_db(Some(name))
        .map_err(|e| StoreError::Open(format!("database '{name}' is missing or unreadable: {e}")))
}
