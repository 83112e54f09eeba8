//! Pipeline configuration
//!
//! All settings have defaults and can be overridden from `COST_LENS_*`
//! environment variables via [`PipelineConfig::from_env`].

use crate::error::{PipelineError, Result};
use crate::query::AggregateOrder;
use std::path::PathBuf;
use std::time::Duration;

/// File name of the database inside the data directory
pub const DATABASE_FILE_NAME: &str = "cost.duckdb";

/// File name the fetched payload is registered under
pub const PAYLOAD_FILE_NAME: &str = "cost_payload.parquet";

/// Storage location settings
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Private directory holding the database and the registered payload
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: resolve_data_dir(),
        }
    }
}

impl StorageConfig {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    /// Well-known path of the database file
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(DATABASE_FILE_NAME)
    }

    /// Path the fetched payload is registered under
    pub fn payload_path(&self) -> PathBuf {
        self.data_dir.join(PAYLOAD_FILE_NAME)
    }
}

/// Authorization endpoint and HTTP client settings
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    /// Endpoint that exchanges an object key for a presigned URL
    pub presign_endpoint: Option<String>,
    /// Object key to load
    pub object_key: Option<String>,
    /// Request timeout in seconds; `None` leaves requests unbounded
    pub timeout_secs: Option<u64>,
    /// Connection pool max idle connections per host
    pub pool_max_idle: usize,
    /// Connection pool idle timeout in seconds
    pub pool_idle_timeout_secs: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            presign_endpoint: None,
            object_key: None,
            timeout_secs: None,
            pool_max_idle: 10,
            pool_idle_timeout_secs: 90,
        }
    }
}

impl RemoteConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

/// Embedded engine settings
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    /// Worker threads for the engine; defaults to the host's parallelism
    pub threads: Option<usize>,
    /// Engine memory limit, e.g. `"2GB"`
    pub memory_limit: Option<String>,
}

/// Top-level configuration
#[derive(Debug, Clone, Default)]
pub struct PipelineConfig {
    pub storage: StorageConfig,
    pub remote: RemoteConfig,
    pub engine: EngineConfig,
    pub aggregate_order: AggregateOrder,
}

impl PipelineConfig {
    /// Configuration rooted at the given data directory
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            storage: StorageConfig::new(data_dir),
            ..Default::default()
        }
    }

    pub fn with_presign_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.remote.presign_endpoint = Some(endpoint.into());
        self
    }

    pub fn with_object_key(mut self, key: impl Into<String>) -> Self {
        self.remote.object_key = Some(key.into());
        self
    }

    pub fn with_engine_threads(mut self, threads: usize) -> Self {
        self.engine.threads = Some(threads.max(1));
        self
    }

    pub fn with_aggregate_order(mut self, order: AggregateOrder) -> Self {
        self.aggregate_order = order;
        self
    }

    /// Loads configuration from environment variables with sensible defaults.
    pub fn from_env() -> Result<Self> {
        let storage = match non_empty_var("COST_LENS_DATA_DIR") {
            Some(dir) => StorageConfig::new(dir),
            None => StorageConfig::default(),
        };

        let defaults = RemoteConfig::default();
        let remote = RemoteConfig {
            presign_endpoint: non_empty_var("COST_LENS_PRESIGN_ENDPOINT"),
            object_key: non_empty_var("COST_LENS_OBJECT_KEY"),
            timeout_secs: parse_optional_u64(
                "COST_LENS_HTTP_TIMEOUT_SECS",
                non_empty_var("COST_LENS_HTTP_TIMEOUT_SECS"),
            )?,
            pool_max_idle: parse_usize(
                "COST_LENS_HTTP_POOL_MAX_IDLE",
                non_empty_var("COST_LENS_HTTP_POOL_MAX_IDLE"),
                defaults.pool_max_idle,
            )?,
            pool_idle_timeout_secs: defaults.pool_idle_timeout_secs,
        };

        let engine = EngineConfig {
            threads: parse_optional_u64(
                "COST_LENS_ENGINE_THREADS",
                non_empty_var("COST_LENS_ENGINE_THREADS"),
            )?
            .map(|threads| (threads as usize).max(1)),
            memory_limit: non_empty_var("COST_LENS_ENGINE_MEMORY_LIMIT"),
        };

        let aggregate_order = match non_empty_var("COST_LENS_AGGREGATE_ORDER") {
            Some(value) => AggregateOrder::from_str(&value).ok_or_else(|| {
                PipelineError::Config(format!(
                    "COST_LENS_AGGREGATE_ORDER: unknown ordering '{}'",
                    value
                ))
            })?,
            None => AggregateOrder::default(),
        };

        Ok(Self {
            storage,
            remote,
            engine,
            aggregate_order,
        })
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_usize(name: &str, value: Option<String>, default: usize) -> Result<usize> {
    match value {
        Some(raw) => raw
            .parse::<usize>()
            .map_err(|e| PipelineError::Config(format!("{}: invalid value '{}': {}", name, raw, e))),
        None => Ok(default),
    }
}

fn parse_optional_u64(name: &str, value: Option<String>) -> Result<Option<u64>> {
    value
        .map(|raw| {
            raw.parse::<u64>().map_err(|e| {
                PipelineError::Config(format!("{}: invalid value '{}': {}", name, raw, e))
            })
        })
        .transpose()
}

fn resolve_data_dir() -> PathBuf {
    if let Some(home) = std::env::var_os("HOME") {
        return PathBuf::from(home).join(".cost_lens");
    }

    PathBuf::from(".cost_lens")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_well_known_paths() {
        let storage = StorageConfig::new("/tmp/lens");
        assert_eq!(storage.database_path(), PathBuf::from("/tmp/lens/cost.duckdb"));
        assert_eq!(
            storage.payload_path(),
            PathBuf::from("/tmp/lens/cost_payload.parquet")
        );
    }

    #[test]
    fn test_builder() {
        let config = PipelineConfig::new("/tmp/lens")
            .with_presign_endpoint("http://localhost:8000/presigned-url")
            .with_object_key("exports/jan.parquet")
            .with_engine_threads(0)
            .with_aggregate_order(AggregateOrder::ByService);

        assert_eq!(config.engine.threads, Some(1));
        assert_eq!(config.remote.object_key.as_deref(), Some("exports/jan.parquet"));
        assert_eq!(config.aggregate_order, AggregateOrder::ByService);
        assert!(config.remote.timeout().is_none());
    }

    #[test]
    fn test_parse_helpers() {
        assert_eq!(parse_usize("X", None, 7).unwrap(), 7);
        assert_eq!(parse_usize("X", Some("3".into()), 7).unwrap(), 3);
        assert!(matches!(
            parse_usize("X", Some("three".into()), 7),
            Err(PipelineError::Config(_))
        ));
        assert_eq!(parse_optional_u64("X", Some("30".into())).unwrap(), Some(30));
        assert_eq!(parse_optional_u64("X", None).unwrap(), None);
    }
}
