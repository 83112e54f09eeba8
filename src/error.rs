//! Error types for the ingestion and query pipeline

use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Main error type for the pipeline
///
/// Each variant corresponds to one failure domain. Messages carry the
/// underlying status or engine message so the caller can log and display it.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Engine init error: {0}")]
    EngineInit(String),

    #[error("Auth resolution error: {0}")]
    AuthResolution(String),

    #[error("Object fetch error: {0}")]
    ObjectFetch(String),

    #[error("Materialization error: {0}")]
    Materialization(String),

    #[error("Table not found: {0}")]
    TableNotFound(String),

    #[error("Query execution error: {0}")]
    QueryExecution(String),

    #[error("Projection error: {0}")]
    Projection(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    /// Name of the pipeline step that produced this error
    pub fn step(&self) -> &'static str {
        match self {
            PipelineError::EngineInit(_) => "engine_init",
            PipelineError::AuthResolution(_) => "auth_resolution",
            PipelineError::ObjectFetch(_) => "object_fetch",
            PipelineError::Materialization(_) => "materialization",
            PipelineError::TableNotFound(_) | PipelineError::QueryExecution(_) => "query",
            PipelineError::Projection(_) => "projection",
            PipelineError::InvalidState(_) => "state",
            PipelineError::Config(_) => "config",
            PipelineError::Io(_) => "io",
            PipelineError::Internal(_) => "internal",
        }
    }

    /// Classify an engine error raised while running a read query.
    ///
    /// A missing table is passed through with the engine's own message.
    pub(crate) fn from_query_engine(err: duckdb::Error) -> Self {
        let message = err.to_string();
        if is_missing_table(&message) {
            PipelineError::TableNotFound(message)
        } else {
            PipelineError::QueryExecution(message)
        }
    }
}

fn is_missing_table(message: &str) -> bool {
    message.contains("Table with name") && message.contains("does not exist")
}
