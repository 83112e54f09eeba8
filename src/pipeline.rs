//! Load/query pipeline driven by a UI shell
//!
//! `CostPipeline` sequences engine startup, ingestion and queries through an
//! explicit state machine:
//!
//! ```text
//! Uninitialized --open--> Ready --load--> Loading --ok--> Loaded
//!       |                   ^                |
//!       +------load---------+------err-------+
//! ```
//!
//! Queries are only admitted in `Loaded`. A table persisted by an earlier
//! process counts as loaded once the engine is open.

use crate::config::PipelineConfig;
use crate::engine::{EngineInstance, EngineLifecycle};
use crate::error::{PipelineError, Result};
use crate::ingest::{IngestReport, Ingestor};
use crate::projector::{AggregateRecord, DetailRecord, Row};
use crate::query::{CanonicalQuery, QueryOutput, QueryRunner, COST_TABLE};
use crate::remote::{HttpObjectSource, ObjectSource};
use crate::storage::StorageHandle;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

/// Pipeline state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// Engine not started
    Uninitialized,
    /// Engine startup or ingestion in progress
    Loading,
    /// Engine ready, cost table not loaded
    Ready,
    /// Cost table loaded; queries allowed
    Loaded,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineState::Uninitialized => "uninitialized",
            PipelineState::Loading => "loading",
            PipelineState::Ready => "ready",
            PipelineState::Loaded => "loaded",
        };
        write!(f, "{}", name)
    }
}

/// Both result sets of the "query" action
#[derive(Debug, Clone)]
pub struct CostReport {
    pub details: Vec<DetailRecord>,
    pub totals: Vec<AggregateRecord>,
}

/// Engine, ingestor and query runner behind the "load" and "query" actions
pub struct CostPipeline {
    lifecycle: EngineLifecycle,
    ingestor: Ingestor,
    runner: QueryRunner,
    object_key: Option<String>,
    state: Mutex<PipelineState>,
    last_load: Mutex<Option<IngestReport>>,
}

impl fmt::Debug for CostPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CostPipeline")
            .field("state", &self.state())
            .field("lifecycle", &self.lifecycle)
            .field("object_key", &self.object_key)
            .finish()
    }
}

impl CostPipeline {
    /// Build a pipeline fetching over HTTP as configured
    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        let source = HttpObjectSource::from_config(&config.remote)?;
        Ok(Self::with_source(config, Arc::new(source)))
    }

    /// Build a pipeline around any object source
    pub fn with_source(config: &PipelineConfig, source: Arc<dyn ObjectSource>) -> Self {
        let storage = StorageHandle::read_write(config.storage.database_path());
        Self {
            lifecycle: EngineLifecycle::new(storage, config.engine.clone()),
            ingestor: Ingestor::new(source, config.storage.payload_path()),
            runner: QueryRunner::new().with_order(config.aggregate_order),
            object_key: config.remote.object_key.clone(),
            state: Mutex::new(PipelineState::Uninitialized),
            last_load: Mutex::new(None),
        }
    }

    pub fn state(&self) -> PipelineState {
        *self.state.lock()
    }

    pub fn lifecycle(&self) -> &EngineLifecycle {
        &self.lifecycle
    }

    /// Report of the most recent successful load in this process
    pub fn last_load(&self) -> Option<IngestReport> {
        self.last_load.lock().clone()
    }

    /// Start the engine and detect a previously persisted table
    pub async fn open(&self) -> Result<PipelineState> {
        {
            let mut state = self.state.lock();
            match *state {
                PipelineState::Uninitialized => *state = PipelineState::Loading,
                PipelineState::Loading => {
                    return Err(PipelineError::InvalidState(
                        "pipeline is already loading".into(),
                    ))
                }
                current => return Ok(current),
            }
        }

        let outcome = self.open_engine().await;
        let mut state = self.state.lock();
        match outcome {
            Ok((_, persisted)) => {
                *state = if persisted {
                    PipelineState::Loaded
                } else {
                    PipelineState::Ready
                };
                Ok(*state)
            }
            Err(e) => {
                *state = PipelineState::Uninitialized;
                Err(e)
            }
        }
    }

    async fn open_engine(&self) -> Result<(EngineInstance, bool)> {
        let engine = self.lifecycle.initialize().await?;
        let persisted = engine.table_exists(COST_TABLE).await?;
        if persisted {
            info!(storage = %engine.storage(), "Found persisted cost table");
        }
        Ok((engine, persisted))
    }

    /// The "load" action: start the engine if needed and ingest once.
    ///
    /// Returns `None` when the table is already loaded.
    pub async fn load(&self) -> Result<Option<IngestReport>> {
        self.load_inner(false).await
    }

    /// Ingest again even if the table is already loaded
    pub async fn reload(&self) -> Result<IngestReport> {
        self.load_inner(true)
            .await?
            .ok_or_else(|| PipelineError::Internal("forced load produced no report".into()))
    }

    async fn load_inner(&self, force: bool) -> Result<Option<IngestReport>> {
        let (object_key, previous) = {
            let mut state = self.state.lock();
            match *state {
                PipelineState::Loading => {
                    return Err(PipelineError::InvalidState(
                        "pipeline is already loading".into(),
                    ))
                }
                PipelineState::Loaded if !force => return Ok(None),
                current => {
                    let object_key = self.object_key.clone().ok_or_else(|| {
                        PipelineError::Config(
                            "no object key configured (COST_LENS_OBJECT_KEY)".into(),
                        )
                    })?;
                    *state = PipelineState::Loading;
                    (object_key, current)
                }
            }
        };

        let outcome = self.run_load(&object_key).await;

        let next = match &outcome {
            Ok(_) => PipelineState::Loaded,
            Err(_) => self.state_after_failure(previous).await,
        };

        *self.state.lock() = next;
        match outcome {
            Ok(report) => {
                *self.last_load.lock() = Some(report.clone());
                Ok(Some(report))
            }
            Err(e) => {
                warn!(step = e.step(), error = %e, state = %next, "Load failed");
                Err(e)
            }
        }
    }

    /// A failed replace never commits, so whatever table was there still serves
    async fn state_after_failure(&self, previous: PipelineState) -> PipelineState {
        let Some(engine) = self.lifecycle.instance() else {
            return PipelineState::Uninitialized;
        };
        match engine.table_exists(COST_TABLE).await {
            Ok(true) => PipelineState::Loaded,
            Ok(false) => PipelineState::Ready,
            Err(e) => {
                warn!(error = %e, "Could not check for the cost table after a failed load");
                if previous == PipelineState::Loaded {
                    PipelineState::Loaded
                } else {
                    PipelineState::Ready
                }
            }
        }
    }

    async fn run_load(&self, object_key: &str) -> Result<IngestReport> {
        let engine = self.lifecycle.initialize().await?;
        self.ingestor.ingest(&engine, object_key).await
    }

    fn loaded_engine(&self) -> Result<EngineInstance> {
        let state = self.state();
        if state != PipelineState::Loaded {
            return Err(PipelineError::InvalidState(format!(
                "query requires a loaded table, pipeline is {}",
                state
            )));
        }
        self.lifecycle
            .instance()
            .ok_or_else(|| PipelineError::InvalidState("engine is not initialized".into()))
    }

    /// Raw Arrow output of one canonical query against the loaded table
    pub async fn execute(&self, query: CanonicalQuery) -> Result<QueryOutput> {
        let engine = self.loaded_engine()?;
        self.runner.execute(&engine, query).await
    }

    /// Line items of the loaded table
    pub async fn query_detail(&self) -> Result<Vec<Row>> {
        let engine = self.loaded_engine()?;
        self.runner.query_detail(&engine).await
    }

    /// Per-service totals of the loaded table
    pub async fn query_aggregate(&self) -> Result<Vec<Row>> {
        let engine = self.loaded_engine()?;
        self.runner.query_aggregate(&engine).await
    }

    /// The "query" action: both result sets as typed records
    pub async fn query_records(&self) -> Result<CostReport> {
        let engine = self.loaded_engine()?;
        let totals = self.runner.aggregate_records(&engine).await?;
        let details = self.runner.detail_records(&engine).await?;
        Ok(CostReport { details, totals })
    }

    /// Query runner with this pipeline's ordering policy
    pub fn runner(&self) -> &QueryRunner {
        &self.runner
    }

    /// The engine, if the table is loaded
    pub fn engine(&self) -> Result<EngineInstance> {
        self.loaded_engine()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::RemoteObjectRef;
    use crate::test_util::write_cost_fixture;
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct SwitchableSource {
        payload: Bytes,
        deny: AtomicBool,
        fetches: AtomicUsize,
    }

    #[async_trait]
    impl ObjectSource for SwitchableSource {
        async fn resolve(&self, key: &str) -> Result<RemoteObjectRef> {
            if self.deny.load(Ordering::SeqCst) {
                return Err(PipelineError::AuthResolution("HTTP 403 Forbidden".into()));
            }
            Ok(RemoteObjectRef::new(key, "memory://store/obj"))
        }

        async fn fetch(&self, _object: &RemoteObjectRef) -> Result<Bytes> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            Ok(self.payload.clone())
        }
    }

    fn pipeline_in(dir: &std::path::Path, deny: bool) -> (CostPipeline, Arc<SwitchableSource>) {
        let source = Arc::new(SwitchableSource {
            payload: write_cost_fixture(dir, &[("EC2", "10.5"), ("EC2", "4.5"), ("S3", "2.0")]),
            deny: AtomicBool::new(deny),
            fetches: AtomicUsize::new(0),
        });
        let config = PipelineConfig::new(dir.join("store")).with_object_key("exports/jan.parquet");
        (CostPipeline::with_source(&config, source.clone()), source)
    }

    #[tokio::test]
    async fn test_query_gated_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let (pipeline, _) = pipeline_in(dir.path(), false);

        let err = pipeline.query_aggregate().await.unwrap_err();
        assert!(matches!(err, PipelineError::InvalidState(_)));
        let err = pipeline.execute(CanonicalQuery::Detail).await.unwrap_err();
        assert!(matches!(err, PipelineError::InvalidState(_)));

        assert_eq!(pipeline.open().await.unwrap(), PipelineState::Ready);
        let err = pipeline.query_detail().await.unwrap_err();
        assert!(matches!(err, PipelineError::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_load_is_one_shot() {
        let dir = tempfile::tempdir().unwrap();
        let (pipeline, source) = pipeline_in(dir.path(), false);

        let report = pipeline.load().await.unwrap().unwrap();
        assert_eq!(report.table_rows, 3);
        assert_eq!(pipeline.state(), PipelineState::Loaded);

        assert!(pipeline.load().await.unwrap().is_none());
        assert_eq!(source.fetches.load(Ordering::SeqCst), 1);

        let report = pipeline.reload().await.unwrap();
        assert_eq!(report.table_rows, 3);
        assert_eq!(source.fetches.load(Ordering::SeqCst), 2);
        assert_eq!(pipeline.last_load().unwrap().table_rows, 3);

        let report = pipeline.query_records().await.unwrap();
        assert_eq!(report.details.len(), 3);
        assert_eq!(report.totals.len(), 2);

        let output = pipeline.execute(CanonicalQuery::Aggregate).await.unwrap();
        assert_eq!(output.row_count, 2);
    }

    #[tokio::test]
    async fn test_failed_load_returns_to_ready() {
        let dir = tempfile::tempdir().unwrap();
        let (pipeline, source) = pipeline_in(dir.path(), true);

        let err = pipeline.load().await.unwrap_err();
        assert!(matches!(err, PipelineError::AuthResolution(_)));
        assert_eq!(pipeline.state(), PipelineState::Ready);

        source.deny.store(false, Ordering::SeqCst);
        pipeline.load().await.unwrap();
        assert_eq!(pipeline.state(), PipelineState::Loaded);
    }

    #[tokio::test]
    async fn test_failed_reload_keeps_loaded_table() {
        let dir = tempfile::tempdir().unwrap();
        let (pipeline, source) = pipeline_in(dir.path(), false);
        pipeline.load().await.unwrap();

        source.deny.store(true, Ordering::SeqCst);
        assert!(pipeline.reload().await.is_err());
        assert_eq!(pipeline.state(), PipelineState::Loaded);
        assert_eq!(pipeline.query_detail().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_load_without_object_key() {
        let dir = tempfile::tempdir().unwrap();
        let source = Arc::new(SwitchableSource {
            payload: Bytes::new(),
            deny: AtomicBool::new(false),
            fetches: AtomicUsize::new(0),
        });
        let pipeline = CostPipeline::with_source(&PipelineConfig::new(dir.path()), source);

        let err = pipeline.load().await.unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
        assert_eq!(pipeline.state(), PipelineState::Uninitialized);
    }

    #[tokio::test]
    async fn test_load_when_loaded_needs_no_object_key() {
        let dir = tempfile::tempdir().unwrap();
        {
            let (pipeline, _) = pipeline_in(dir.path(), false);
            pipeline.load().await.unwrap();
        }

        let source = Arc::new(SwitchableSource {
            payload: Bytes::new(),
            deny: AtomicBool::new(false),
            fetches: AtomicUsize::new(0),
        });
        let pipeline =
            CostPipeline::with_source(&PipelineConfig::new(dir.path().join("store")), source.clone());

        assert_eq!(pipeline.open().await.unwrap(), PipelineState::Loaded);
        assert!(pipeline.load().await.unwrap().is_none());
        assert_eq!(pipeline.state(), PipelineState::Loaded);

        let err = pipeline.reload().await.unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
        assert_eq!(pipeline.state(), PipelineState::Loaded);
        assert_eq!(source.fetches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failed_reload_finds_persisted_table() {
        let dir = tempfile::tempdir().unwrap();
        {
            let (pipeline, _) = pipeline_in(dir.path(), false);
            pipeline.load().await.unwrap();
        }

        // Never opened: the engine starts inside the failing reload
        let (pipeline, _) = pipeline_in(dir.path(), true);
        assert_eq!(pipeline.state(), PipelineState::Uninitialized);

        let err = pipeline.reload().await.unwrap_err();
        assert!(matches!(err, PipelineError::AuthResolution(_)));
        assert_eq!(pipeline.state(), PipelineState::Loaded);
        assert_eq!(pipeline.query_detail().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_persisted_table_is_detected_on_open() {
        let dir = tempfile::tempdir().unwrap();
        {
            let (pipeline, _) = pipeline_in(dir.path(), false);
            pipeline.load().await.unwrap();
        }

        let (pipeline, source) = pipeline_in(dir.path(), false);
        assert_eq!(pipeline.open().await.unwrap(), PipelineState::Loaded);
        assert_eq!(pipeline.query_aggregate().await.unwrap().len(), 2);
        assert!(pipeline.load().await.unwrap().is_none());
        assert_eq!(source.fetches.load(Ordering::SeqCst), 0);
    }
}
