//! LMDB-backed document store.
//!
//! A [`DocumentStore`] owns one LMDB environment. Each public operation runs
//! in its own transaction, so operations issued from different threads
//! proceed independently and the transaction is the unit of atomicity.
//!
//! ```no_run
//! use offline_doc_store::{DocumentStore, StoreConfig};
//! use serde_json::json;
//!
//! let store = DocumentStore::open(StoreConfig::new("/tmp/app"))?;
//! let id = store.save("inv-001", "Invoice", &json!({"docType": "invoice"}), "u1")?;
//! let mine = store.get_by_user("u1")?;
//! assert_eq!(mine[0].id, id);
//! # Ok::<(), offline_doc_store::StoreError>(())
//! ```

use std::fs;
use std::num::NonZeroUsize;
use std::thread;

use chrono::{SecondsFormat, Utc};
use lmdb::{Cursor, Environment, Error as LmdbError, RoTransaction, RwTransaction, Transaction, WriteFlags};
use lmdb_sys::{MDB_NEXT, MDB_SET_RANGE};
use log::{debug, error, info, warn};
use serde_json::Value as JsonValue;

use crate::config::StoreConfig;
use crate::document_model::{doc_type_of, required_text, DocumentKey, DocumentRecord};
use crate::error::{Result, StoreError};
use crate::sanitize::sanitize;
use crate::schema::{
    self, decode_id, primary_key, text_prefix, IndexField, Schema, INDEXES, MAX_DBS,
    MAX_INDEXED_LEN, NEXT_ID_KEY,
};

/// Upper bound on worker threads used by [`DocumentStore::clear_user_documents`].
const MAX_BULK_WORKERS: usize = 8;

pub struct DocumentStore {
    pub(crate) env: Environment,
    pub(crate) schema: Schema,
    config: StoreConfig,
}

impl DocumentStore {
    /// Opens the database described by `config`, creating and provisioning
    /// it on first use.
    ///
    /// # Errors
    ///
    /// - `Validation` for an unusable configuration
    /// - `UnsupportedEnvironment` when the storage root is not a usable
    ///   directory
    /// - `Open` when LMDB rejects the environment or its schema
    pub fn open(config: StoreConfig) -> Result<Self> {
        config.validate()?;
        prepare_root(&config)?;

        let db_dir = config.database_dir();
        fs::create_dir_all(&db_dir).map_err(|e| {
            StoreError::Open(format!("cannot create {}: {e}", db_dir.display()))
        })?;

        info!("Opening document store at {}", db_dir.display());

        let env = Environment::new()
            .set_max_dbs(MAX_DBS)
            .set_map_size(config.map_size)
            .set_max_readers(config.max_readers)
            .open(&db_dir)
            .map_err(|e| StoreError::Open(format!("{}: {e}", db_dir.display())))?;

        let schema = schema::provision(&env)?;

        info!("Document store '{}' ready", config.name);
        Ok(Self { env, schema, config })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Schema version persisted in the database.
    pub fn schema_version(&self) -> Result<u32> {
        schema::stored_version(&self.env, self.schema.meta)
    }

    /// Persists a new document and returns its generated id.
    ///
    /// `doc_id`, `title` and `user_id` are trimmed; `data` is sanitized.
    /// The record and its four index entries are written in one transaction:
    /// either all of them become visible or none do.
    pub fn save(&self, doc_id: &str, title: &str, data: &JsonValue, user_id: &str) -> Result<u64> {
        let doc_id = required_text("docId", doc_id)?;
        let title = required_text("title", title)?;
        if !(data.is_object() || data.is_array()) {
            return Err(StoreError::validation(
                "data",
                "must be a JSON object or array",
            ));
        }
        let user_id = required_text("userId", user_id)?;
        let doc_type = doc_type_of(data);
        check_indexable("docId", doc_id)?;
        check_indexable("userId", user_id)?;
        check_indexable("data", &doc_type)?;

        let clean = sanitize(data);
        let now = Utc::now();

        let mut txn = self
            .env
            .begin_rw_txn()
            .map_err(|e| StoreError::Transaction(format!("cannot begin save: {e}")))?;

        let id = self.allocate_id(&mut txn)?;
        let record = DocumentRecord {
            id,
            doc_id: doc_id.to_string(),
            title: title.to_string(),
            data: clean,
            user_id: user_id.to_string(),
            doc_type,
            timestamp: now.timestamp_millis(),
            created_at: now.to_rfc3339_opts(SecondsFormat::Millis, true),
        };

        self.insert_record(&mut txn, &record)?;

        txn.commit()
            .map_err(|e| StoreError::Transaction(format!("save of '{doc_id}' aborted: {e}")))?;

        debug!("Saved document {id} ('{doc_id}') for user '{user_id}'");
        Ok(id)
    }

    /// All records owned by `user_id`, most recent first.
    pub fn get_by_user(&self, user_id: &str) -> Result<Vec<DocumentRecord>> {
        let user_id = required_text("userId", user_id)?;
        self.find_by(IndexField::UserId, text_prefix(user_id))
    }

    /// All saved versions of the logical document `doc_id`, most recent first.
    pub fn get_by_doc_id(&self, doc_id: &str) -> Result<Vec<DocumentRecord>> {
        let doc_id = required_text("docId", doc_id)?;
        self.find_by(IndexField::DocId, text_prefix(doc_id))
    }

    /// All records of the given `docType`, most recent first.
    pub fn get_by_doc_type(&self, doc_type: &str) -> Result<Vec<DocumentRecord>> {
        let doc_type = required_text("docType", doc_type)?;
        self.find_by(IndexField::DocType, text_prefix(doc_type))
    }

    /// Primary key lookup. `Ok(None)` means no such record.
    pub fn get_by_id(&self, id: impl Into<DocumentKey>) -> Result<Option<DocumentRecord>> {
        let key: DocumentKey = id.into();
        let Some(id) = key.resolve()? else {
            return Ok(None);
        };

        let txn = self
            .env
            .begin_ro_txn()
            .map_err(|e| StoreError::Query(format!("cannot begin lookup: {e}")))?;
        let record = self.read_record(&txn, id, StoreError::Query)?;
        txn.abort();
        Ok(record)
    }

    /// Deletes the record with the given primary key.
    ///
    /// Deleting an id that does not exist commits an empty transaction and
    /// succeeds.
    pub fn delete(&self, id: impl Into<DocumentKey>) -> Result<()> {
        let key: DocumentKey = id.into();
        let Some(id) = key.resolve()? else {
            return Ok(());
        };

        let mut txn = self
            .env
            .begin_rw_txn()
            .map_err(|e| StoreError::Transaction(format!("cannot begin delete: {e}")))?;

        match self.read_record(&txn, id, StoreError::Delete)? {
            Some(record) => self.remove_record(&mut txn, &record)?,
            None => debug!("Delete of missing document {id} is a no-op"),
        }

        txn.commit()
            .map_err(|e| StoreError::Transaction(format!("delete of {id} aborted: {e}")))
    }

    /// Deletes every record owned by `user_id` and returns how many existed.
    ///
    /// Each record is removed by its own [`delete`](Self::delete), spread
    /// over a few worker threads. This is not atomic: on `BulkDelete` some
    /// records may already be gone. Calling it again is safe.
    pub fn clear_user_documents(&self, user_id: &str) -> Result<usize> {
        let user_id = required_text("userId", user_id)?;
        let ids = {
            let txn = self
                .env
                .begin_ro_txn()
                .map_err(|e| StoreError::Transaction(format!("cannot begin query: {e}")))?;
            let ids = self.scan_index(&txn, IndexField::UserId, &text_prefix(user_id))?;
            txn.abort();
            ids
        };
        let attempted = ids.len();
        if attempted == 0 {
            return Ok(0);
        }

        let workers = thread::available_parallelism()
            .map(NonZeroUsize::get)
            .unwrap_or(1)
            .clamp(1, MAX_BULK_WORKERS)
            .min(attempted);
        let chunk_size = attempted.div_ceil(workers);

        let failures: Vec<StoreError> = thread::scope(|scope| {
            let handles: Vec<_> = ids
                .chunks(chunk_size)
                .map(|chunk| {
                    scope.spawn(move || {
                        chunk
                            .iter()
                            .filter_map(|&id| self.delete(id).err())
                            .collect::<Vec<_>>()
                    })
                })
                .collect();

            handles
                .into_iter()
                .flat_map(|handle| {
                    handle.join().unwrap_or_else(|_| {
                        vec![StoreError::Delete("delete worker panicked".to_string())]
                    })
                })
                .collect()
        });

        if let Some(first) = failures.first() {
            for failure in &failures {
                error!("Clearing documents of '{user_id}' failed: {failure}");
            }
            return Err(StoreError::BulkDelete {
                attempted,
                failed: failures.len(),
                reason: first.to_string(),
            });
        }

        info!("Cleared {attempted} documents for user '{user_id}'");
        Ok(attempted)
    }

    /// Flushes the environment and closes the store.
    pub fn close(self) -> Result<()> {
        self.env
            .sync(true)
            .map_err(|e| StoreError::Transaction(format!("final sync failed: {e}")))?;
        info!("Document store '{}' closed", self.config.name);
        Ok(())
    }

    fn allocate_id(&self, txn: &mut RwTransaction) -> Result<u64> {
        let next = match txn.get(self.schema.meta, &NEXT_ID_KEY) {
            Ok(bytes) => decode_id(bytes).map_err(|e| StoreError::Insert(e.to_string()))?,
            Err(LmdbError::NotFound) => 1,
            Err(e) => return Err(StoreError::Insert(format!("cannot read id counter: {e}"))),
        };
        let following = next
            .checked_add(1)
            .ok_or_else(|| StoreError::Insert("id space exhausted".to_string()))?;
        txn.put(
            self.schema.meta,
            &NEXT_ID_KEY,
            &primary_key(following),
            WriteFlags::empty(),
        )
        .map_err(|e| StoreError::Insert(format!("cannot advance id counter: {e}")))?;
        Ok(next)
    }

    fn insert_record(&self, txn: &mut RwTransaction, record: &DocumentRecord) -> Result<()> {
        let key = primary_key(record.id);
        let bytes = serde_json::to_vec(record)?;
        txn.put(self.schema.documents, &key, &bytes, WriteFlags::NO_OVERWRITE)
            .map_err(|e| StoreError::Insert(format!("record {}: {e}", record.id)))?;

        for field in INDEXES {
            txn.put(
                self.schema.index(field),
                &field.entry_key(record),
                &key,
                WriteFlags::NO_OVERWRITE,
            )
            .map_err(|e| {
                StoreError::Insert(format!(
                    "{} index entry for record {}: {e}",
                    field.field_name(),
                    record.id
                ))
            })?;
        }
        Ok(())
    }

    fn remove_record(&self, txn: &mut RwTransaction, record: &DocumentRecord) -> Result<()> {
        txn.del(self.schema.documents, &primary_key(record.id), None)
            .map_err(|e| StoreError::Delete(format!("record {}: {e}", record.id)))?;

        for field in INDEXES {
            match txn.del(self.schema.index(field), &field.entry_key(record), None) {
                Ok(()) => {}
                Err(LmdbError::NotFound) => warn!(
                    "Record {} had no {} index entry",
                    record.id,
                    field.field_name()
                ),
                Err(e) => {
                    return Err(StoreError::Delete(format!(
                        "{} index entry for record {}: {e}",
                        field.field_name(),
                        record.id
                    )))
                }
            }
        }
        Ok(())
    }

    fn read_record<T: Transaction>(
        &self,
        txn: &T,
        id: u64,
        fault: fn(String) -> StoreError,
    ) -> Result<Option<DocumentRecord>> {
        match txn.get(self.schema.documents, &primary_key(id)) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(bytes)?)),
            Err(LmdbError::NotFound) => Ok(None),
            Err(e) => Err(fault(format!("record {id}: {e}"))),
        }
    }

    /// Exact-match lookup through one index, newest first. Equal timestamps
    /// are ordered by descending id.
    fn find_by(&self, field: IndexField, prefix: Vec<u8>) -> Result<Vec<DocumentRecord>> {
        let txn = self
            .env
            .begin_ro_txn()
            .map_err(|e| StoreError::Transaction(format!("cannot begin query: {e}")))?;

        let ids = self.scan_index(&txn, field, &prefix)?;

        let mut records = Vec::with_capacity(ids.len());
        for id in ids {
            match self.read_record(&txn, id, StoreError::Query)? {
                Some(record) => records.push(record),
                None => {
                    return Err(StoreError::Query(format!(
                        "{} index references missing record {id}",
                        field.field_name()
                    )))
                }
            }
        }
        txn.abort();

        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));
        Ok(records)
    }

    /// Ids of every entry in `field`'s index whose key starts with `prefix`.
    ///
    /// The cursor is positioned with `MDB_SET_RANGE`, which reports
    /// `NotFound` when no key sorts at or after `prefix`; that is an empty
    /// result, not an error.
    fn scan_index(&self, txn: &RoTransaction, field: IndexField, prefix: &[u8]) -> Result<Vec<u64>> {
        let fault = |e: LmdbError| StoreError::Query(format!("{} index: {e}", field.field_name()));
        let cursor = txn.open_ro_cursor(self.schema.index(field)).map_err(fault)?;

        let mut ids = Vec::new();
        let mut entry = cursor.get(Some(prefix), None, MDB_SET_RANGE);
        loop {
            match entry {
                Ok((Some(key), value)) if key.starts_with(prefix) => ids.push(decode_id(value)?),
                Ok(_) | Err(LmdbError::NotFound) => break,
                Err(e) => return Err(fault(e)),
            }
            entry = cursor.get(None, None, MDB_NEXT);
        }
        Ok(ids)
    }
}

impl Drop for DocumentStore {
    fn drop(&mut self) {
        if let Err(e) = self.env.sync(true) {
            warn!("Background sync of document store '{}' failed: {e}", self.config.name);
        }
    }
}

fn prepare_root(config: &StoreConfig) -> Result<()> {
    let root = config.root();
    if root.exists() && !root.is_dir() {
        return Err(StoreError::UnsupportedEnvironment(format!(
            "storage root {} is not a directory",
            root.display()
        )));
    }
    fs::create_dir_all(root).map_err(|e| {
        StoreError::UnsupportedEnvironment(format!(
            "no local storage available at {}: {e}",
            root.display()
        ))
    })
}

fn check_indexable(param: &'static str, value: &str) -> Result<()> {
    if value.len() > MAX_INDEXED_LEN {
        return Err(StoreError::validation(
            param,
            format!("indexed value exceeds {MAX_INDEXED_LEN} bytes"),
        ));
    }
    Ok(())
}
