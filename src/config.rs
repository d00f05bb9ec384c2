//! Store configuration.
//!
//! A [`StoreConfig`] tells the store where its database directory lives and
//! how large the memory map may grow. Hosts usually hand it over as JSON:
//!
//! ```json
//! { "root": "/data/user/0/app/files", "name": "document_storage" }
//! ```
//!
//! Only `root` is required; every other field falls back to its default.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};
use crate::schema::DATABASE_NAME;

/// Default memory map size (64 MiB).
pub const DEFAULT_MAP_SIZE: usize = 64 * 1024 * 1024;

/// Default number of concurrent reader slots.
pub const DEFAULT_MAX_READERS: u32 = 126;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoreConfig {
    /// Directory that holds the `<name>.lmdb` database directory.
    pub root: PathBuf,

    /// Logical database name.
    #[serde(default = "default_name")]
    pub name: String,

    /// Upper bound on the database size, in bytes.
    #[serde(default = "default_map_size")]
    pub map_size: usize,

    /// Maximum number of simultaneous read transactions.
    #[serde(default = "default_max_readers")]
    pub max_readers: u32,
}

fn default_name() -> String {
    DATABASE_NAME.to_string()
}

fn default_map_size() -> usize {
    DEFAULT_MAP_SIZE
}

fn default_max_readers() -> u32 {
    DEFAULT_MAX_READERS
}

impl StoreConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            name: default_name(),
            map_size: DEFAULT_MAP_SIZE,
            max_readers: DEFAULT_MAX_READERS,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_map_size(mut self, map_size: usize) -> Self {
        self.map_size = map_size;
        self
    }

    pub fn with_max_readers(mut self, max_readers: u32) -> Self {
        self.max_readers = max_readers;
        self
    }

    /// Parses a JSON configuration object.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: StoreConfig = serde_json::from_str(json)
            .map_err(|e| StoreError::validation("config", e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.root.as_os_str().is_empty() {
            return Err(StoreError::validation("root", "must not be empty"));
        }
        let name = self.name.trim();
        if name.is_empty() {
            return Err(StoreError::validation("name", "must not be empty"));
        }
        if name.contains(['/', '\\']) {
            return Err(StoreError::validation(
                "name",
                "must not contain path separators",
            ));
        }
        if self.map_size == 0 {
            return Err(StoreError::validation("map_size", "must be greater than zero"));
        }
        if self.max_readers == 0 {
            return Err(StoreError::validation(
                "max_readers",
                "must be greater than zero",
            ));
        }
        Ok(())
    }

    /// Directory holding the LMDB data and lock files.
    pub fn database_dir(&self) -> PathBuf {
        self.root.join(format!("{}.lmdb", self.name.trim()))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}
