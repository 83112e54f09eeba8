//! Canonical read queries against the cost table
//!
//! Each query opens its own session, runs a fixed read-only statement, and
//! hands the Arrow result to the projector. Queries never write.

use crate::engine::EngineInstance;
use crate::error::{PipelineError, Result};
use crate::projector::{AggregateRecord, DetailRecord, ResultProjector, Row};
use duckdb::arrow::datatypes::SchemaRef;
use duckdb::arrow::record_batch::RecordBatch;
use std::time::{Duration, Instant};
use tracing::debug;

/// Name of the materialized table
pub const COST_TABLE: &str = "cost";

const DETAIL_SQL: &str = "SELECT AWS_SERVICE, LINE_ITEM_USAGE_START_DATE, LINE_ITEM_USAGE_END_DATE, \
     UNBLENDED_COST, CURRENCY, DESCRIPTION FROM cost";

const AGGREGATE_SQL: &str = "SELECT AWS_SERVICE, SUM(UNBLENDED_COST) AS TOTAL_UNBLENDED_COST \
     FROM cost GROUP BY AWS_SERVICE";

/// Row order of the aggregate query
///
/// The engine makes no ordering promise for a GROUP BY, so any order a
/// consumer relies on has to be requested here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AggregateOrder {
    /// Whatever order the engine returns; may differ between calls
    #[default]
    EngineDefault,
    /// Service name ascending
    ByService,
    /// Total cost descending, ties by service name
    ByTotalDescending,
}

impl AggregateOrder {
    /// Parse an ordering from its name
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "engine" | "default" | "none" => Some(Self::EngineDefault),
            "service" => Some(Self::ByService),
            "total" | "total_desc" => Some(Self::ByTotalDescending),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::EngineDefault => "engine",
            Self::ByService => "service",
            Self::ByTotalDescending => "total_desc",
        }
    }

    fn order_clause(&self) -> Option<&'static str> {
        match self {
            Self::EngineDefault => None,
            Self::ByService => Some("ORDER BY AWS_SERVICE NULLS LAST"),
            Self::ByTotalDescending => {
                Some("ORDER BY TOTAL_UNBLENDED_COST DESC NULLS LAST, AWS_SERVICE NULLS LAST")
            }
        }
    }
}

/// The fixed statements the runner can issue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CanonicalQuery {
    /// Six line-item columns, unmodified
    Detail,
    /// Total unblended cost per service
    Aggregate,
}

impl CanonicalQuery {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Detail => "detail",
            Self::Aggregate => "aggregate",
        }
    }

    /// SQL text for this query under the given aggregate ordering
    pub fn sql(&self, order: AggregateOrder) -> String {
        match self {
            Self::Detail => DETAIL_SQL.to_string(),
            Self::Aggregate => match order.order_clause() {
                Some(clause) => format!("{} {}", AGGREGATE_SQL, clause),
                None => AGGREGATE_SQL.to_string(),
            },
        }
    }
}

/// Query execution result
#[derive(Debug)]
pub struct QueryOutput {
    /// Output schema
    pub schema: SchemaRef,
    /// Result batches
    pub batches: Vec<RecordBatch>,
    /// Total row count
    pub row_count: usize,
    /// Execution metrics
    pub metrics: QueryMetrics,
}

/// Query execution metrics
#[derive(Debug, Default, Clone, Copy)]
pub struct QueryMetrics {
    /// Time spent opening the session
    pub session_time: Duration,
    /// Time spent executing and collecting batches
    pub execute_time: Duration,
    /// Total time
    pub total_time: Duration,
}

/// Runs the canonical queries
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryRunner {
    order: AggregateOrder,
}

impl QueryRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the aggregate ordering policy
    pub fn with_order(mut self, order: AggregateOrder) -> Self {
        self.order = order;
        self
    }

    pub fn order(&self) -> AggregateOrder {
        self.order
    }

    /// Run one canonical query on a fresh session
    pub async fn execute(&self, engine: &EngineInstance, query: CanonicalQuery) -> Result<QueryOutput> {
        let sql = query.sql(self.order);

        let output = engine
            .spawn(move |engine| {
                let start = Instant::now();
                let mut metrics = QueryMetrics::default();

                let session = engine.open_session().map_err(|e| {
                    PipelineError::QueryExecution(format!("failed to open session: {}", e))
                })?;
                metrics.session_time = start.elapsed();

                let execute_start = Instant::now();
                let (schema, batches) = session
                    .query_arrow(&sql)
                    .map_err(PipelineError::from_query_engine)?;
                metrics.execute_time = execute_start.elapsed();
                metrics.total_time = start.elapsed();

                let row_count = batches.iter().map(|b| b.num_rows()).sum();
                Ok(QueryOutput {
                    schema,
                    batches,
                    row_count,
                    metrics,
                })
            })
            .await?;

        debug!(
            query = query.name(),
            rows = output.row_count,
            elapsed = ?output.metrics.total_time,
            "Query finished"
        );
        Ok(output)
    }

    /// Line items of the cost table
    pub async fn query_detail(&self, engine: &EngineInstance) -> Result<Vec<Row>> {
        let output = self.execute(engine, CanonicalQuery::Detail).await?;
        ResultProjector::project(&output.schema, &output.batches)
    }

    /// Total cost per service, one row per distinct service
    pub async fn query_aggregate(&self, engine: &EngineInstance) -> Result<Vec<Row>> {
        let output = self.execute(engine, CanonicalQuery::Aggregate).await?;
        ResultProjector::project(&output.schema, &output.batches)
    }

    /// Line items as typed records
    pub async fn detail_records(&self, engine: &EngineInstance) -> Result<Vec<DetailRecord>> {
        self.query_detail(engine)
            .await?
            .iter()
            .map(DetailRecord::from_row)
            .collect()
    }

    /// Per-service totals as typed records
    pub async fn aggregate_records(&self, engine: &EngineInstance) -> Result<Vec<AggregateRecord>> {
        self.query_aggregate(engine)
            .await?
            .iter()
            .map(AggregateRecord::from_row)
            .collect()
    }
}
