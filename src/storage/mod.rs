//! Persistent storage for the embedded engine
//!
//! This module provides:
//! - `StorageHandle`: the single database location and its access mode
//! - Parquet payload inspection and registration inside the data directory

mod parquet;

pub use self::parquet::{register_payload, PayloadSummary, EXPECTED_COST_COLUMNS};

use std::fmt;
use std::path::{Path, PathBuf};

/// Access mode the database file is opened with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccessMode {
    #[default]
    ReadWrite,
    ReadOnly,
}

impl AccessMode {
    pub(crate) fn to_engine(self) -> duckdb::AccessMode {
        match self {
            AccessMode::ReadWrite => duckdb::AccessMode::ReadWrite,
            AccessMode::ReadOnly => duckdb::AccessMode::ReadOnly,
        }
    }
}

impl fmt::Display for AccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessMode::ReadWrite => write!(f, "read_write"),
            AccessMode::ReadOnly => write!(f, "read_only"),
        }
    }
}

/// A persistent logical database location
///
/// Immutable once created; the engine that opens it owns it for its lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageHandle {
    path: PathBuf,
    access_mode: AccessMode,
}

impl StorageHandle {
    pub fn new(path: impl Into<PathBuf>, access_mode: AccessMode) -> Self {
        Self {
            path: path.into(),
            access_mode,
        }
    }

    pub fn read_write(path: impl Into<PathBuf>) -> Self {
        Self::new(path, AccessMode::ReadWrite)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn access_mode(&self) -> AccessMode {
        self.access_mode
    }

    /// Directory containing the database file
    pub fn data_dir(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new("."))
    }

    /// Create the containing directory if it does not exist yet
    pub(crate) fn ensure_parent(&self) -> std::io::Result<()> {
        let dir = self.data_dir();
        if !dir.as_os_str().is_empty() {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }
}

impl fmt::Display for StorageHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.path.display(), self.access_mode)
    }
}
