//! Ingestion of a remote Parquet object into the cost table
//!
//! The steps run strictly in order and each has its own error variant:
//! resolve the object key, fetch the object, then register the payload and
//! replace the table in one statement. Nothing touches the engine until the
//! payload has been fetched and its footer parsed, so a failed resolve or
//! fetch leaves the table exactly as it was.

use crate::engine::EngineInstance;
use crate::error::{PipelineError, Result};
use crate::query::COST_TABLE;
use crate::remote::ObjectSource;
use crate::storage::{register_payload, PayloadSummary};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Outcome of one successful ingestion
#[derive(Debug, Clone)]
pub struct IngestReport {
    /// Object key that was loaded
    pub object_key: String,
    /// Footer facts about the payload
    pub payload: PayloadSummary,
    /// Where the payload was registered
    pub payload_path: PathBuf,
    /// Row count of the table after the replace
    pub table_rows: i64,
    /// Wall time of the whole ingestion
    pub elapsed: Duration,
}

/// Loads token-gated objects into the engine
pub struct Ingestor {
    source: Arc<dyn ObjectSource>,
    payload_path: PathBuf,
}

impl Ingestor {
    /// Create an ingestor registering payloads at `payload_path`
    pub fn new(source: Arc<dyn ObjectSource>, payload_path: impl Into<PathBuf>) -> Self {
        Self {
            source,
            payload_path: payload_path.into(),
        }
    }

    pub fn payload_path(&self) -> &Path {
        &self.payload_path
    }

    /// Fetch `object_key` and atomically replace the cost table with its rows
    pub async fn ingest(&self, engine: &EngineInstance, object_key: &str) -> Result<IngestReport> {
        let start = Instant::now();
        info!(object_key, "Starting ingestion");

        let object = self.source.resolve(object_key).await?;
        let payload = self.source.fetch(&object).await?;

        let summary = PayloadSummary::inspect(&payload)?;
        let missing = summary.missing_columns();
        if !missing.is_empty() {
            warn!(object_key, ?missing, "Payload lacks columns the cost queries read");
        }

        let payload_path = register_payload(&self.payload_path, &payload).await?;
        drop(payload);

        let statement = replace_statement(&payload_path);
        let table_rows = engine
            .spawn(move |engine| {
                let session = engine.open_session().map_err(|e| {
                    PipelineError::Materialization(format!("failed to open session: {}", e))
                })?;
                session
                    .execute_batch(&statement)
                    .map_err(|e| PipelineError::Materialization(e.to_string()))?;
                session
                    .query_i64(&format!("SELECT COUNT(*) FROM {}", COST_TABLE))
                    .map_err(|e| PipelineError::Materialization(e.to_string()))
            })
            .await?;

        let report = IngestReport {
            object_key: object_key.to_string(),
            payload: summary,
            payload_path,
            table_rows,
            elapsed: start.elapsed(),
        };

        info!(
            object_key,
            bytes = report.payload.size_bytes,
            rows = report.table_rows,
            elapsed = ?report.elapsed,
            "Ingestion finished"
        );
        Ok(report)
    }
}

/// The single statement that swaps in the new table contents
fn replace_statement(payload_path: &Path) -> String {
    format!(
        "CREATE OR REPLACE TABLE {} AS SELECT * FROM read_parquet('{}')",
        COST_TABLE,
        payload_path.display().to_string().replace('\'', "''")
    )
}
