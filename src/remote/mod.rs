//! Remote object access
//!
//! An object key is first exchanged for a time-limited download URL at the
//! authorization endpoint, then the object body is fetched from that URL.
//! Both requests are single attempts; retrying is left to the caller.

use crate::config::RemoteConfig;
use crate::error::{PipelineError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use serde::Deserialize;
use std::fmt;
use std::time::Duration;
use tracing::debug;

/// A resolved, authorization-scoped reference to one remote object
///
/// Transient: created per ingestion attempt and never persisted. The URL's
/// query string carries the token, so `Display` and `Debug` omit it.
#[derive(Clone, PartialEq, Eq)]
pub struct RemoteObjectRef {
    key: String,
    resolved_url: String,
}

impl RemoteObjectRef {
    pub fn new(key: impl Into<String>, resolved_url: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            resolved_url: resolved_url.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// The full URL, including its token
    pub fn resolved_url(&self) -> &str {
        &self.resolved_url
    }

    /// The URL without its query string
    pub fn redacted_url(&self) -> &str {
        self.resolved_url
            .split_once('?')
            .map(|(base, _)| base)
            .unwrap_or(&self.resolved_url)
    }
}

impl fmt::Debug for RemoteObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteObjectRef")
            .field("key", &self.key)
            .field("resolved_url", &self.redacted_url())
            .finish()
    }
}

impl fmt::Display for RemoteObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.key, self.redacted_url())
    }
}

/// Source of token-gated remote objects
#[async_trait]
pub trait ObjectSource: Send + Sync {
    /// Exchange an object key for a download reference
    async fn resolve(&self, key: &str) -> Result<RemoteObjectRef>;

    /// Download the object body
    async fn fetch(&self, object: &RemoteObjectRef) -> Result<Bytes>;
}

/// Authorization endpoint response
#[derive(Debug, Deserialize)]
struct PresignResponse {
    #[serde(default)]
    url: Option<String>,
}

/// HTTP implementation of [`ObjectSource`]
pub struct HttpObjectSource {
    /// HTTP client with connection pooling
    client: Client,
    /// Endpoint that issues presigned URLs
    presign_endpoint: String,
}

impl fmt::Debug for HttpObjectSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpObjectSource")
            .field("presign_endpoint", &self.presign_endpoint)
            .finish()
    }
}

impl HttpObjectSource {
    /// Create a source with default client settings
    pub fn new(presign_endpoint: impl Into<String>) -> Result<Self> {
        Self::with_config(presign_endpoint, &RemoteConfig::default())
    }

    /// Create a source with custom client settings
    pub fn with_config(presign_endpoint: impl Into<String>, config: &RemoteConfig) -> Result<Self> {
        let mut builder = Client::builder()
            .pool_max_idle_per_host(config.pool_max_idle)
            .pool_idle_timeout(Duration::from_secs(config.pool_idle_timeout_secs));
        if let Some(timeout) = config.timeout() {
            builder = builder.timeout(timeout);
        }

        let client = builder
            .build()
            .map_err(|e| PipelineError::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            presign_endpoint: presign_endpoint.into(),
        })
    }

    /// Build a source from config; the presign endpoint must be set
    pub fn from_config(config: &RemoteConfig) -> Result<Self> {
        let endpoint = config.presign_endpoint.clone().ok_or_else(|| {
            PipelineError::Config("no presign endpoint configured (COST_LENS_PRESIGN_ENDPOINT)".into())
        })?;
        Self::with_config(endpoint, config)
    }

    pub fn presign_endpoint(&self) -> &str {
        &self.presign_endpoint
    }
}

#[async_trait]
impl ObjectSource for HttpObjectSource {
    async fn resolve(&self, key: &str) -> Result<RemoteObjectRef> {
        let response = self
            .client
            .get(&self.presign_endpoint)
            .query(&[("key", key)])
            .send()
            .await
            .map_err(|e| {
                PipelineError::AuthResolution(format!("request for key '{}' failed: {}", key, e))
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::AuthResolution(format!(
                "failed to get presigned URL for key '{}': HTTP {}",
                key, status
            )));
        }

        let body: PresignResponse = response.json().await.map_err(|e| {
            PipelineError::AuthResolution(format!("failed to parse presign response: {}", e))
        })?;

        let url = body
            .url
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| {
                PipelineError::AuthResolution(format!(
                    "no presigned URL found in response for key '{}'",
                    key
                ))
            })?;

        let object = RemoteObjectRef::new(key, url);
        debug!(object = %object, "Resolved presigned URL");
        Ok(object)
    }

    async fn fetch(&self, object: &RemoteObjectRef) -> Result<Bytes> {
        let response = self
            .client
            .get(object.resolved_url())
            .send()
            .await
            .map_err(|e| {
                PipelineError::ObjectFetch(format!(
                    "request for {} failed: {}",
                    object.redacted_url(),
                    e.without_url()
                ))
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::ObjectFetch(format!(
                "failed to fetch {}: HTTP {}",
                object.redacted_url(),
                status
            )));
        }

        let body = response.bytes().await.map_err(|e| {
            PipelineError::ObjectFetch(format!(
                "failed to read body of {}: {}",
                object.redacted_url(),
                e.without_url()
            ))
        })?;

        debug!(object = %object, bytes = body.len(), "Fetched object");
        Ok(body)
    }
}
