//! Parquet payload handling
//!
//! The fetched payload is inspected in memory before the engine is touched,
//! then written next to the database under a fixed file name so the engine
//! can scan it.

use crate::error::{PipelineError, Result};
use ::parquet::file::reader::{FileReader, SerializedFileReader};
use bytes::Bytes;
use std::fmt;
use std::path::{Path, PathBuf};

/// Columns the canonical queries read from the cost table
pub const EXPECTED_COST_COLUMNS: [&str; 6] = [
    "AWS_SERVICE",
    "LINE_ITEM_USAGE_START_DATE",
    "LINE_ITEM_USAGE_END_DATE",
    "UNBLENDED_COST",
    "CURRENCY",
    "DESCRIPTION",
];

/// Footer-level facts about a Parquet payload
#[derive(Clone, PartialEq, Eq)]
pub struct PayloadSummary {
    /// Payload size in bytes
    pub size_bytes: usize,
    /// Row count recorded in the footer
    pub num_rows: i64,
    /// Number of row groups
    pub num_row_groups: usize,
    /// Top-level column names in file order
    pub columns: Vec<String>,
}

impl fmt::Debug for PayloadSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PayloadSummary")
            .field("size_bytes", &self.size_bytes)
            .field("num_rows", &self.num_rows)
            .field("num_row_groups", &self.num_row_groups)
            .field("columns", &self.columns.len())
            .finish()
    }
}

impl PayloadSummary {
    /// Read the footer of an in-memory Parquet payload
    pub fn inspect(payload: &Bytes) -> Result<Self> {
        let reader = SerializedFileReader::new(payload.clone()).map_err(|e| {
            PipelineError::Materialization(format!("payload is not a readable Parquet file: {}", e))
        })?;

        let metadata = reader.metadata();
        let file_metadata = metadata.file_metadata();
        let columns = file_metadata
            .schema_descr()
            .root_schema()
            .get_fields()
            .iter()
            .map(|field| field.name().to_string())
            .collect();

        Ok(Self {
            size_bytes: payload.len(),
            num_rows: file_metadata.num_rows(),
            num_row_groups: metadata.num_row_groups(),
            columns,
        })
    }

    /// Expected cost columns absent from the payload (case-insensitive)
    pub fn missing_columns(&self) -> Vec<&'static str> {
        EXPECTED_COST_COLUMNS
            .iter()
            .filter(|expected| {
                !self
                    .columns
                    .iter()
                    .any(|column| column.eq_ignore_ascii_case(expected))
            })
            .copied()
            .collect()
    }
}

/// Write the payload to `path`, replacing any previous registration.
///
/// The bytes land in a sibling temp file first and are renamed into place,
/// so the engine never scans a half-written payload.
pub async fn register_payload(path: &Path, payload: &Bytes) -> Result<PathBuf> {
    let staging = staging_path(path);

    tokio::fs::write(&staging, payload).await.map_err(|e| {
        PipelineError::Materialization(format!(
            "failed to stage payload at {}: {}",
            staging.display(),
            e
        ))
    })?;

    if let Err(e) = tokio::fs::rename(&staging, path).await {
        let _ = tokio::fs::remove_file(&staging).await;
        return Err(PipelineError::Materialization(format!(
            "failed to register payload at {}: {}",
            path.display(),
            e
        )));
    }

    Ok(path.to_path_buf())
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".partial");
    path.with_file_name(name)
}
