//! # Offline Doc Store
//!
//! A local, per-user document store built on LMDB (Lightning Memory-Mapped
//! Database), designed to sit behind an app shell through a C-compatible
//! interface. Documents are saved under a logical `docId` and an owning
//! `userId`, found again through secondary indexes, and deleted one by one or
//! per user.
//!
//! ## Features
//!
//! - **Versioned schema**: one record collection plus four non-unique indexes
//!   (`docId`, `userId`, `timestamp`, `docType`), provisioned once per version
//! - **Transactional writes**: a save either commits the record and all its
//!   index entries or leaves the database untouched
//! - **Markup-safe payloads**: string values of every saved payload are
//!   HTML-escaped before they are persisted
//! - **Safe error handling**: no `unwrap()` calls in production code
//!
//! ## Quick Start
//!
//! ```no_run
//! use offline_doc_store::{DocumentStore, StoreConfig};
//! use serde_json::json;
//!
//! let store = DocumentStore::open(StoreConfig::new("/tmp/app"))?;
//!
//! let id = store.save("inv-001", "Invoice <1>", &json!({"docType": "invoice", "note": "a/b"}), "u1")?;
//! let record = store.get_by_id(id)?.expect("just saved");
//! assert_eq!(record.data["note"], "a&#x2F;b");
//!
//! let removed = store.clear_user_documents("u1")?;
//! assert_eq!(removed, 1);
//! # Ok::<(), offline_doc_store::StoreError>(())
//! ```
//!
//! ## FFI Functions
//!
//! Every function taking a store pointer returns a JSON-encoded
//! [`AppResponse`] that must be released with [`free_response`].
//!
//! - [`open_store`] - Open (or create) a store from a JSON configuration
//! - [`save_document`] - Save a new document
//! - [`get_documents_by_user`] - All documents of a user, newest first
//! - [`get_document_by_id`] - Primary key lookup
//! - [`delete_document`] - Delete by primary key
//! - [`clear_user_documents`] - Delete every document of a user
//! - [`sanitize_json`] - Escape a JSON payload without touching the store
//! - [`close_store`] - Flush and release a store
//! - [`free_response`] - Release a response string

pub mod app_response;
pub mod config;
pub mod document_model;
pub mod document_store;
pub mod error;
pub mod sanitize;
pub mod schema;

pub use crate::app_response::AppResponse;
pub use crate::config::StoreConfig;
pub use crate::document_model::{DocumentKey, DocumentRecord, NewDocument};
pub use crate::document_store::DocumentStore;
pub use crate::error::{Result, StoreError};
pub use crate::sanitize::sanitize;

use std::ffi::{CStr, CString};
use std::os::raw::c_char;

use log::{info, warn};
use serde_json::Value as JsonValue;

/// Opens the store described by a JSON [`StoreConfig`].
///
/// # Parameters
///
/// * `config_json` - Null-terminated C string, e.g. `{"root":"/data/app"}`
///
/// # Returns
///
/// A pointer to the [`DocumentStore`] on success, or a null pointer on
/// failure. Release it with [`close_store`].
///
/// # Examples
///
/// ```no_run
/// use std::ffi::CString;
/// use offline_doc_store::{open_store, close_store, free_response};
///
/// let config = CString::new(r#"{"root":"/tmp/app"}"#).unwrap();
/// let store = open_store(config.as_ptr());
/// if !store.is_null() {
///     free_response(close_store(store));
/// }
/// ```
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn open_store(config_json: *const c_char) -> *mut DocumentStore {
    if config_json.is_null() {
        warn!("Null config pointer passed to open_store");
        return std::ptr::null_mut();
    }

    let json = match unsafe { CStr::from_ptr(config_json).to_str() } {
        Ok(s) => s,
        Err(e) => {
            warn!("Invalid UTF-8 in config parameter: {e}");
            return std::ptr::null_mut();
        }
    };

    let config = match StoreConfig::from_json(json) {
        Ok(config) => config,
        Err(e) => {
            warn!("Rejected store configuration: {e}");
            return std::ptr::null_mut();
        }
    };

    let location = config.database_dir();
    match DocumentStore::open(config) {
        Ok(store) => {
            info!("Store opened at {}", location.display());
            Box::into_raw(Box::new(store))
        }
        Err(e) => {
            warn!("Failed to open store at {}: {e}", location.display());
            std::ptr::null_mut()
        }
    }
}

/// Saves a new document.
///
/// # Parameters
///
/// * `store` - Pointer returned by [`open_store`]
/// * `json_ptr` - Null-terminated JSON [`NewDocument`]:
///
/// ```json
/// { "docId": "inv-001", "title": "Invoice", "data": { "docType": "invoice" }, "userId": "u1" }
/// ```
///
/// # Returns
///
/// `{"Ok":"<id>"}` with the generated id, or an error envelope.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn save_document(store: *mut DocumentStore, json_ptr: *const c_char) -> *const c_char {
    let store = match store_ref(store, "save_document") {
        Ok(store) => store,
        Err(err) => return err,
    };

    let json_str = match c_ptr_to_string(json_ptr, "JSON") {
        Ok(json) => json,
        Err(err) => return err,
    };

    let doc: NewDocument = match serde_json::from_str(&json_str) {
        Ok(doc) => doc,
        Err(e) => {
            let error = AppResponse::SerializationError(format!("Invalid document JSON: {e}"));
            return response_to_c_string(&error);
        }
    };

    match store.save(&doc.doc_id, &doc.title, &doc.data, &doc.user_id) {
        Ok(id) => response_to_c_string(&AppResponse::success(id.to_string())),
        Err(e) => response_to_c_string(&AppResponse::from(e)),
    }
}

/// Returns all documents of a user as a JSON array, newest first.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn get_documents_by_user(store: *mut DocumentStore, user_id: *const c_char) -> *const c_char {
    let store = match store_ref(store, "get_documents_by_user") {
        Ok(store) => store,
        Err(err) => return err,
    };

    let user_id = match c_ptr_to_string(user_id, "userId") {
        Ok(user_id) => user_id,
        Err(err) => return err,
    };

    match store.get_by_user(&user_id) {
        Ok(records) => json_response(&records),
        Err(e) => response_to_c_string(&AppResponse::from(e)),
    }
}

/// Looks up one document by its primary key.
///
/// A missing record yields a `NotFound` envelope rather than an error.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn get_document_by_id(store: *mut DocumentStore, id: *const c_char) -> *const c_char {
    let store = match store_ref(store, "get_document_by_id") {
        Ok(store) => store,
        Err(err) => return err,
    };

    let id_str = match c_ptr_to_string(id, "id") {
        Ok(id) => id,
        Err(err) => return err,
    };

    match store.get_by_id(&id_str) {
        Ok(Some(record)) => json_response(&record),
        Ok(None) => response_to_c_string(&AppResponse::missing_document(&id_str)),
        Err(e) => response_to_c_string(&AppResponse::from(e)),
    }
}

/// Deletes one document by its primary key. Missing ids succeed.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn delete_document(store: *mut DocumentStore, id: *const c_char) -> *const c_char {
    let store = match store_ref(store, "delete_document") {
        Ok(store) => store,
        Err(err) => return err,
    };

    let id_str = match c_ptr_to_string(id, "id") {
        Ok(id) => id,
        Err(err) => return err,
    };

    match store.delete(&id_str) {
        Ok(()) => response_to_c_string(&AppResponse::success("Document deleted")),
        Err(e) => response_to_c_string(&AppResponse::from(e)),
    }
}

/// Deletes every document of a user; `{"Ok":"<count>"}` on success.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn clear_user_documents(store: *mut DocumentStore, user_id: *const c_char) -> *const c_char {
    let store = match store_ref(store, "clear_user_documents") {
        Ok(store) => store,
        Err(err) => return err,
    };

    let user_id = match c_ptr_to_string(user_id, "userId") {
        Ok(user_id) => user_id,
        Err(err) => return err,
    };

    match store.clear_user_documents(&user_id) {
        Ok(count) => response_to_c_string(&AppResponse::success(count.to_string())),
        Err(e) => response_to_c_string(&AppResponse::from(e)),
    }
}

/// Escapes a JSON payload the same way [`save_document`] does.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn sanitize_json(json_ptr: *const c_char) -> *const c_char {
    let json_str = match c_ptr_to_string(json_ptr, "JSON") {
        Ok(json) => json,
        Err(err) => return err,
    };

    match serde_json::from_str::<JsonValue>(&json_str) {
        Ok(value) => json_response(&sanitize(&value)),
        Err(e) => response_to_c_string(&AppResponse::from(e)),
    }
}

/// Flushes and releases a store returned by [`open_store`].
///
/// The pointer must not be used afterwards.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn close_store(store: *mut DocumentStore) -> *const c_char {
    if store.is_null() {
        let error = AppResponse::BadRequest("Null store pointer passed to close_store".to_string());
        return response_to_c_string(&error);
    }

    let store = unsafe { *Box::from_raw(store) };
    match store.close() {
        Ok(()) => response_to_c_string(&AppResponse::success("Store closed")),
        Err(e) => response_to_c_string(&AppResponse::from(e)),
    }
}

/// Releases a string returned by any function of this library.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn free_response(ptr: *const c_char) {
    if ptr.is_null() {
        return;
    }
    drop(unsafe { CString::from_raw(ptr as *mut c_char) });
}

fn store_ref<'a>(store: *mut DocumentStore, caller: &str) -> std::result::Result<&'a DocumentStore, *const c_char> {
    match unsafe { store.as_ref() } {
        Some(store) => Ok(store),
        None => {
            let error = AppResponse::BadRequest(format!("Null store pointer passed to {caller}"));
            Err(response_to_c_string(&error))
        }
    }
}

fn json_response<T: serde::Serialize>(value: &T) -> *const c_char {
    match serde_json::to_string(value) {
        Ok(json) => response_to_c_string(&AppResponse::Ok(json)),
        Err(e) => response_to_c_string(&AppResponse::from(e)),
    }
}

/// Serializes an [`AppResponse`] into a C string owned by the caller.
///
/// Returns a null pointer if serialization or C string creation fails.
fn response_to_c_string(response: &AppResponse) -> *const c_char {
    let json = match serde_json::to_string(response) {
        Ok(j) => j,
        Err(e) => {
            warn!("Error serializing response: {e}");
            return std::ptr::null();
        }
    };

    match CString::new(json) {
        Ok(c_str) => c_str.into_raw(),
        Err(e) => {
            warn!("Error creating CString: {e}");
            std::ptr::null()
        }
    }
}

/// Converts a C string pointer to a Rust `String`, reporting null pointers
/// and invalid UTF-8 as a ready-made `BadRequest` response.
fn c_ptr_to_string(ptr: *const c_char, field_name: &str) -> std::result::Result<String, *const c_char> {
    if ptr.is_null() {
        let error = AppResponse::BadRequest(format!("Null {field_name} pointer"));
        return Err(response_to_c_string(&error));
    }

    match unsafe { CStr::from_ptr(ptr).to_str() } {
        Ok(s) => Ok(s.to_string()),
        Err(e) => {
            let error = AppResponse::BadRequest(format!("Invalid UTF-8 in {field_name}: {e}"));
            Err(response_to_c_string(&error))
        }
    }
}
