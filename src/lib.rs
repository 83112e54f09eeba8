//! Cost Lens
//!
//! Fetches a cost-and-usage Parquet export through a presigned URL,
//! materializes it into a persistent embedded DuckDB database as the `cost`
//! table, and answers the canonical detail and per-service aggregate queries.

pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod ingest;
pub mod pipeline;
pub mod projector;
pub mod query;
pub mod remote;
pub mod storage;

#[cfg(test)]
mod test_util;

// Re-export main types
pub use config::PipelineConfig;
pub use engine::{EngineInstance, EngineLifecycle, Session};
pub use error::{PipelineError, Result};
pub use ingest::{IngestReport, Ingestor};
pub use pipeline::{CostPipeline, CostReport, PipelineState};
pub use projector::{AggregateRecord, DetailRecord, ResultProjector, Row, ScalarValue};
pub use query::{AggregateOrder, CanonicalQuery, QueryOutput, QueryRunner};
pub use remote::{HttpObjectSource, ObjectSource, RemoteObjectRef};
pub use storage::{AccessMode, StorageHandle};
