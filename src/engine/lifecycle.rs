//! Engine lifecycle - creation and readiness of the single engine instance

use super::session::Session;
use crate::config::EngineConfig;
use crate::error::{PipelineError, Result};
use crate::storage::StorageHandle;
use duckdb::{Config, Connection};
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Engine runtime settings chosen for the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeProfile {
    /// Engine worker threads
    pub threads: usize,
    /// Engine memory limit, if any
    pub memory_limit: Option<String>,
}

impl RuntimeProfile {
    /// Pick a profile from config, falling back to the host's parallelism
    pub fn detect(config: &EngineConfig) -> Self {
        let threads = config.threads.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        });

        Self {
            threads: threads.max(1),
            memory_limit: config.memory_limit.clone(),
        }
    }

    fn engine_config(&self, storage: &StorageHandle) -> duckdb::Result<Config> {
        let config = Config::default()
            .access_mode(storage.access_mode().to_engine())?
            .threads(self.threads as i64)?;

        match &self.memory_limit {
            Some(limit) => config.max_memory(limit),
            None => Ok(config),
        }
    }
}

/// Handle to the running engine
///
/// Cloning is cheap; all clones refer to the same database.
#[derive(Clone)]
pub struct EngineInstance {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    storage: StorageHandle,
    profile: RuntimeProfile,
    root: Mutex<Connection>,
    next_session: AtomicU64,
}

impl fmt::Debug for EngineInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineInstance")
            .field("storage", &self.inner.storage)
            .field("profile", &self.inner.profile)
            .finish()
    }
}

impl EngineInstance {
    /// Open the database behind `storage`. Blocking.
    fn open(storage: StorageHandle, profile: RuntimeProfile) -> std::result::Result<Self, String> {
        storage
            .ensure_parent()
            .map_err(|e| format!("cannot create {}: {}", storage.data_dir().display(), e))?;

        let config = profile
            .engine_config(&storage)
            .map_err(|e| format!("invalid engine settings {:?}: {}", profile, e))?;

        let conn = Connection::open_with_flags(storage.path(), config)
            .map_err(|e| format!("failed to open {}: {}", storage, e))?;

        Ok(Self {
            inner: Arc::new(EngineInner {
                storage,
                profile,
                root: Mutex::new(conn),
                next_session: AtomicU64::new(1),
            }),
        })
    }

    pub fn storage(&self) -> &StorageHandle {
        &self.inner.storage
    }

    pub fn profile(&self) -> &RuntimeProfile {
        &self.inner.profile
    }

    /// Whether two handles refer to the same engine
    pub fn same_instance(&self, other: &EngineInstance) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Open a new session. Blocking; prefer [`EngineInstance::spawn`] from async code.
    pub fn open_session(&self) -> duckdb::Result<Session> {
        let conn = self.inner.root.lock().try_clone()?;
        let id = self.inner.next_session.fetch_add(1, Ordering::Relaxed);
        debug!(session = id, "Opened engine session");
        Ok(Session::new(id, conn))
    }

    /// Run blocking engine work on the blocking pool
    pub async fn spawn<T, F>(&self, work: F) -> Result<T>
    where
        F: FnOnce(&EngineInstance) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let engine = self.clone();
        tokio::task::spawn_blocking(move || work(&engine))
            .await
            .map_err(|e| PipelineError::Internal(format!("engine task failed: {}", e)))?
    }

    /// Whether a table with this name exists in the main schema
    pub async fn table_exists(&self, name: &str) -> Result<bool> {
        let sql = format!(
            "SELECT COUNT(*) FROM duckdb_tables() WHERE schema_name = 'main' AND table_name = '{}'",
            name.replace('\'', "''")
        );
        self.spawn(move |engine| {
            let session = engine
                .open_session()
                .map_err(|e| PipelineError::QueryExecution(format!("failed to open session: {}", e)))?;
            let count = session
                .query_i64(&sql)
                .map_err(|e| PipelineError::QueryExecution(e.to_string()))?;
            Ok(count > 0)
        })
        .await
    }
}

type InitFuture = Shared<BoxFuture<'static, std::result::Result<EngineInstance, String>>>;

enum InitState {
    Idle,
    InFlight { attempt: usize, future: InitFuture },
    Ready(EngineInstance),
}

/// Owns creation of the one engine instance bound to one storage location
///
/// Concurrent `initialize` calls share a single in-flight attempt. A failed
/// attempt is reported to every waiter and leaves the lifecycle idle, so a
/// later call starts over.
pub struct EngineLifecycle {
    storage: StorageHandle,
    config: EngineConfig,
    state: Mutex<InitState>,
    open_attempts: AtomicUsize,
    ready: watch::Sender<bool>,
}

impl fmt::Debug for EngineLifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineLifecycle")
            .field("storage", &self.storage)
            .field("ready", &self.is_ready())
            .field("open_attempts", &self.storage_open_attempts())
            .finish()
    }
}

impl EngineLifecycle {
    pub fn new(storage: StorageHandle, config: EngineConfig) -> Self {
        let (ready, _) = watch::channel(false);
        Self {
            storage,
            config,
            state: Mutex::new(InitState::Idle),
            open_attempts: AtomicUsize::new(0),
            ready,
        }
    }

    pub fn storage(&self) -> &StorageHandle {
        &self.storage
    }

    /// Start the engine, or join the initialization already in flight
    pub async fn initialize(&self) -> Result<EngineInstance> {
        let (attempt, future) = {
            let mut state = self.state.lock();
            match &*state {
                InitState::Ready(engine) => return Ok(engine.clone()),
                InitState::InFlight { attempt, future } => (*attempt, future.clone()),
                InitState::Idle => {
                    let attempt = self.open_attempts.fetch_add(1, Ordering::SeqCst) + 1;
                    let future = self.start(attempt);
                    *state = InitState::InFlight {
                        attempt,
                        future: future.clone(),
                    };
                    (attempt, future)
                }
            }
        };

        let outcome = future.await;

        let mut state = self.state.lock();
        let current = matches!(&*state, InitState::InFlight { attempt: a, .. } if *a == attempt);
        match outcome {
            Ok(engine) => {
                if current {
                    *state = InitState::Ready(engine.clone());
                    self.ready.send_replace(true);
                    info!(
                        storage = %self.storage,
                        threads = engine.profile().threads,
                        "Engine ready"
                    );
                }
                Ok(engine)
            }
            Err(message) => {
                if current {
                    *state = InitState::Idle;
                    warn!(storage = %self.storage, attempt, error = %message, "Engine initialization failed");
                }
                Err(PipelineError::EngineInit(message))
            }
        }
    }

    fn start(&self, attempt: usize) -> InitFuture {
        let storage = self.storage.clone();
        let profile = RuntimeProfile::detect(&self.config);
        debug!(storage = %storage, attempt, ?profile, "Starting engine");

        let handle = tokio::task::spawn_blocking(move || EngineInstance::open(storage, profile));
        async move {
            match handle.await {
                Ok(result) => result,
                Err(e) => Err(format!("engine start task failed: {}", e)),
            }
        }
        .boxed()
        .shared()
    }

    /// Whether the engine has reached the ready state
    pub fn is_ready(&self) -> bool {
        *self.ready.borrow()
    }

    /// The ready engine, if initialization has completed
    pub fn instance(&self) -> Option<EngineInstance> {
        match &*self.state.lock() {
            InitState::Ready(engine) => Some(engine.clone()),
            _ => None,
        }
    }

    /// Wait until some caller's initialization succeeds
    pub async fn wait_ready(&self) -> Result<EngineInstance> {
        let mut rx = self.ready.subscribe();
        rx.wait_for(|ready| *ready)
            .await
            .map_err(|e| PipelineError::Internal(format!("ready signal closed: {}", e)))?;
        self.instance()
            .ok_or_else(|| PipelineError::Internal("engine marked ready without an instance".into()))
    }

    /// Number of times the storage location has been opened
    pub fn storage_open_attempts(&self) -> usize {
        self.open_attempts.load(Ordering::SeqCst)
    }
}
