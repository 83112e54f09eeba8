//! Shared helpers for integration tests: Parquet fixtures and a mock
//! presign endpoint plus object store served over local HTTP.

#![allow(dead_code)]

use axum::extract::{Path as UrlPath, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use bytes::Bytes;
use cost_lens::PipelineConfig;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Write a Parquet cost export for `(service, cost)` rows and return its bytes
pub fn cost_parquet(dir: &Path, rows: &[(&str, &str)]) -> Bytes {
    let values: Vec<String> = rows
        .iter()
        .enumerate()
        .map(|(i, (service, cost))| {
            format!(
                "('{service}', TIMESTAMP '2025-01-01 00:00:00', TIMESTAMP '2025-01-31 23:59:59', \
                 CAST('{cost}' AS DECIMAL(18,4)), 'USD', 'usage {i}')"
            )
        })
        .collect();

    let path = dir.join(format!("fixture-{}.parquet", rows.len()));
    let conn = duckdb::Connection::open_in_memory().unwrap();
    conn.execute_batch(&format!(
        "COPY (SELECT * FROM (VALUES {}) AS t(AWS_SERVICE, LINE_ITEM_USAGE_START_DATE, \
         LINE_ITEM_USAGE_END_DATE, UNBLENDED_COST, CURRENCY, DESCRIPTION)) TO '{}' (FORMAT PARQUET)",
        values.join(", "),
        path.display()
    ))
    .unwrap();
    Bytes::from(std::fs::read(&path).unwrap())
}

/// Behaviour of the mock presign endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresignMode {
    /// Hand out a URL pointing at the mock object store
    Grant,
    /// Answer 403
    Deny,
    /// Answer 200 with a body lacking `url`
    OmitUrl,
    /// Answer 200 with `url` set to an empty string
    EmptyUrl,
    /// Answer 200 with a body that is not JSON
    Garbage,
    /// Hand out a URL on a port nothing listens on
    Unreachable,
}

/// Base URL of a local port that refuses connections
pub async fn closed_port_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}

pub struct MockState {
    base_url: String,
    dead_url: String,
    mode: Mutex<PresignMode>,
    objects: Mutex<HashMap<String, Bytes>>,
    pub presign_calls: AtomicUsize,
    pub object_calls: AtomicUsize,
    pub saw_token: AtomicBool,
}

/// Local HTTP server playing both the presign endpoint and the object store
pub struct MockRemote {
    pub state: Arc<MockState>,
}

impl MockRemote {
    pub async fn start() -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let state = Arc::new(MockState {
            base_url: format!("http://{}", addr),
            dead_url: closed_port_url().await,
            mode: Mutex::new(PresignMode::Grant),
            objects: Mutex::new(HashMap::new()),
            presign_calls: AtomicUsize::new(0),
            object_calls: AtomicUsize::new(0),
            saw_token: AtomicBool::new(false),
        });

        let app = Router::new()
            .route("/presigned-url", get(presign_handler))
            .route("/obj/*key", get(object_handler))
            .with_state(state.clone());

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { state }
    }

    pub fn presign_endpoint(&self) -> String {
        format!("{}/presigned-url", self.state.base_url)
    }

    pub fn put_object(&self, key: &str, body: Bytes) {
        self.state.objects.lock().insert(key.to_string(), body);
    }

    pub fn set_mode(&self, mode: PresignMode) {
        *self.state.mode.lock() = mode;
    }

    pub fn presign_calls(&self) -> usize {
        self.state.presign_calls.load(Ordering::SeqCst)
    }

    pub fn object_calls(&self) -> usize {
        self.state.object_calls.load(Ordering::SeqCst)
    }

    /// Pipeline config rooted at `data_dir`, talking to this server
    pub fn config(&self, data_dir: &Path, key: &str) -> PipelineConfig {
        PipelineConfig::new(data_dir)
            .with_presign_endpoint(self.presign_endpoint())
            .with_object_key(key)
    }
}

async fn presign_handler(
    State(state): State<Arc<MockState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    state.presign_calls.fetch_add(1, Ordering::SeqCst);
    let mode = *state.mode.lock();
    let Some(key) = params.get("key") else {
        return (StatusCode::BAD_REQUEST, "missing key").into_response();
    };

    match mode {
        PresignMode::Deny => (StatusCode::FORBIDDEN, "denied").into_response(),
        PresignMode::OmitUrl => Json(serde_json::json!({ "expires_in": 900 })).into_response(),
        PresignMode::EmptyUrl => Json(serde_json::json!({ "url": "" })).into_response(),
        PresignMode::Garbage => (StatusCode::OK, "<html>gateway</html>").into_response(),
        PresignMode::Unreachable => Json(serde_json::json!({
            "url": format!("{}/obj/{}?X-Amz-Signature=token", state.dead_url, key)
        }))
        .into_response(),
        PresignMode::Grant => Json(serde_json::json!({
            "url": format!("{}/obj/{}?X-Amz-Signature=token", state.base_url, key)
        }))
        .into_response(),
    }
}

async fn object_handler(
    State(state): State<Arc<MockState>>,
    UrlPath(key): UrlPath<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    state.object_calls.fetch_add(1, Ordering::SeqCst);
    if params.get("X-Amz-Signature").map(String::as_str) == Some("token") {
        state.saw_token.store(true, Ordering::SeqCst);
    }

    match state.objects.lock().get(&key).cloned() {
        Some(body) => (StatusCode::OK, body).into_response(),
        None => (StatusCode::NOT_FOUND, "no such key").into_response(),
    }
}
