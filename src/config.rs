//! Store configuration.
//!
//! The CLI fills a [`StoreConfig`] from flags and environment variables; the
//! library only consumes it.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::app_response::{AppResponse, Result};

pub const DEFAULT_DATABASE: &str = "kmidbt";
pub const DEFAULT_MAP_SIZE: usize = 64 * 1024 * 1024;
pub const DEFAULT_MAX_COLLECTIONS: u32 = 32;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Directory that holds the `<database>.lmdb` environment.
    pub data_dir: PathBuf,
    pub database: String,
    /// Upper bound for the LMDB memory map, in bytes.
    pub map_size: usize,
    pub max_collections: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("."),
            database: DEFAULT_DATABASE.to_string(),
            map_size: DEFAULT_MAP_SIZE,
            max_collections: DEFAULT_MAX_COLLECTIONS,
        }
    }
}

impl StoreConfig {
    pub fn new(data_dir: impl AsRef<Path>, database: impl Into<String>) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
            database: database.into(),
            ..Self::default()
        }
    }

    pub fn with_map_size(mut self, map_size: usize) -> Self {
        self.map_size = map_size;
        self
    }

    pub fn environment_path(&self) -> PathBuf {
        self.data_dir.join(format!("{}.lmdb", self.database))
    }

    pub fn validate(&self) -> Result<()> {
        if self.database.trim().is_empty() {
            return Err(AppResponse::ValidationError(
                "database name cannot be empty".to_string(),
            ));
        }
        if self.database.contains(['/', '\\']) {
            return Err(AppResponse::ValidationError(format!(
                "database name '{}' must not contain path separators",
                self.database
            )));
        }
        if self.map_size < 1024 * 1024 {
            return Err(AppResponse::ValidationError(format!(
                "map_size {} is below the 1 MiB minimum",
                self.map_size
            )));
        }
        if self.max_collections == 0 {
            return Err(AppResponse::ValidationError(
                "max_collections must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
