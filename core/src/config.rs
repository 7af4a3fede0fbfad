//! Run configuration for the ingestion and search modes.
//!
//! Values are built once by the front-end and passed down explicitly; nothing here is global.

use crate::error::{Error, Result};
use std::path::PathBuf;

/// Default output prefix for shards, and default search pattern.
pub const DEFAULT_INDEX_PREFIX: &str = "index";

/// Default number of workers in both pools.
pub const DEFAULT_WORKERS: usize = 5;

/// Extension of an on-disk shard.
pub const SHARD_EXTENSION: &str = "idx";

/// Number of raw records an ingestion worker may have queued before the dispatcher waits.
pub const RECORD_QUEUE_DEPTH: usize = 256;

#[derive(Debug, Clone)]
pub struct IndexConfig {
    /// Data source: a newline-delimited record file, or a directory of them.
    pub data_path: PathBuf,
    /// Shards are written to `<prefix>_<n>.idx`.
    pub prefix: String,
    pub workers: usize,
    /// Global cap on routed records, `None` for unlimited.
    pub max_documents: Option<usize>,
}

impl IndexConfig {
    pub fn new(data_path: impl Into<PathBuf>) -> Self {
        Self {
            data_path: data_path.into(),
            prefix: DEFAULT_INDEX_PREFIX.to_string(),
            workers: DEFAULT_WORKERS,
            max_documents: None,
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_max_documents(mut self, max: Option<usize>) -> Self {
        self.max_documents = max;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.data_path.as_os_str().is_empty() {
            return Err(Error::Config("a data path is required".into()));
        }
        if self.prefix.trim().is_empty() {
            return Err(Error::Config("the index prefix must not be empty".into()));
        }
        if self.workers == 0 {
            return Err(Error::Config("at least one indexing worker is required".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// Shard prefix or glob pattern, see [`crate::persist::resolve_pattern`].
    pub pattern: String,
    pub workers: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self { pattern: DEFAULT_INDEX_PREFIX.to_string(), workers: DEFAULT_WORKERS }
    }
}

impl SearchConfig {
    pub fn validate(&self) -> Result<()> {
        if self.pattern.trim().is_empty() {
            return Err(Error::Config("the index pattern must not be empty".into()));
        }
        if self.workers == 0 {
            return Err(Error::Config("at least one search worker is required".into()));
        }
        Ok(())
    }
}
