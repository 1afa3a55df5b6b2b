//! HTTP client module for delivering log batches to the collection endpoint.
//!
//! Delivery is a single attempt. A failed batch is reported back to the
//! caller as a [`TransportError`] and never retried or requeued.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::config::LoggerConfig;
use crate::record::LogBatch;

/// Response from the collection endpoint.
///
/// Collectors may answer with an empty body; every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct IngestResponse {
    /// Identifier echoed by the collector
    #[serde(default, alias = "batch_id", alias = "batchId")]
    pub id: Option<String>,

    /// Optional status message from the collector
    #[serde(default)]
    pub status: Option<String>,
}

impl IngestResponse {
    /// Parse a 2xx body, tolerating empty or non-JSON payloads.
    pub fn from_body(body: &[u8]) -> Self {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Self::default();
        }
        serde_json::from_slice(body).unwrap_or_default()
    }
}

/// Errors that can occur while delivering a batch.
#[derive(Debug, Error)]
pub enum TransportError {
    /// HTTP request failed before a response arrived
    #[error("HTTP request failed: {0}")]
    Request(#[source] reqwest::Error),

    /// Collector returned a non-2xx status code
    #[error("Collector error ({code}): {message}")]
    Status { code: StatusCode, message: String },

    /// Request timeout
    #[error("Request timed out")]
    Timeout,

    /// Batch could not be encoded
    #[error("Failed to serialize batch: {0}")]
    Serialize(#[from] serde_json::Error),

    /// No usable collection endpoint
    #[error("Transport configuration error: {0}")]
    Config(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout
        } else {
            TransportError::Request(err)
        }
    }
}

/// Destination for flushed batches.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Deliver one batch to the endpoint named by `config`.
    ///
    /// Takes ownership of the batch; it is dropped whatever the outcome.
    async fn send(
        &self,
        config: &LoggerConfig,
        batch: LogBatch,
    ) -> Result<IngestResponse, TransportError>;
}

/// Transport that POSTs batches as JSON using reqwest.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    /// The underlying HTTP client (reused for connection pooling)
    client: Client,
}

impl HttpTransport {
    /// Create a transport with its own connection pool.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Config` if the HTTP client cannot be built.
    pub fn new() -> Result<Self, TransportError> {
        let client = Client::builder()
            .pool_max_idle_per_host(2)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| TransportError::Config(e.to_string()))?;

        Ok(Self { client })
    }

    /// Create a transport on top of an existing client.
    ///
    /// The client should be a plain one, not one wrapped for instrumentation.
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(
        &self,
        config: &LoggerConfig,
        batch: LogBatch,
    ) -> Result<IngestResponse, TransportError> {
        let url = config.collector_url().ok_or_else(|| {
            TransportError::Config(format!(
                "'{}' is not a usable collection endpoint",
                config.collection_endpoint
            ))
        })?;
        let body = batch.to_body(config.batch_format)?;

        debug!(
            batch_size = batch.len(),
            batch_id = %batch.id,
            url = %url,
            "Sending log batch"
        );
        drop(batch);

        let response = self
            .client
            .post(url)
            .timeout(config.request_timeout)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            let body = response.bytes().await?;
            Ok(IngestResponse::from_body(&body))
        } else {
            let message = response
                .text()
                .await
                .ok()
                .filter(|t| !t.trim().is_empty())
                .or_else(|| status.canonical_reason().map(str::to_string))
                .unwrap_or_else(|| "Unknown error".to_string());

            Err(TransportError::Status {
                code: status,
                message,
            })
        }
    }
}

/// Statistics about delivery attempts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryStats {
    /// Total number of batches accepted by the collector
    pub batches_sent: u64,

    /// Total number of records in accepted batches
    pub logs_sent: u64,

    /// Total number of batches discarded after a failed attempt
    pub batches_dropped: u64,

    /// Total number of records in discarded batches
    pub logs_dropped: u64,
}

/// A transport wrapper that tracks delivery statistics.
pub struct TrackedTransport {
    /// The underlying transport
    inner: Arc<dyn Transport>,

    /// Statistics about delivery attempts
    stats: RwLock<DeliveryStats>,
}

impl TrackedTransport {
    /// Wrap a transport.
    pub fn new(inner: Arc<dyn Transport>) -> Self {
        Self {
            inner,
            stats: RwLock::new(DeliveryStats::default()),
        }
    }

    /// Get current delivery statistics.
    pub fn stats(&self) -> DeliveryStats {
        self.stats.read().clone()
    }
}

#[async_trait]
impl Transport for TrackedTransport {
    async fn send(
        &self,
        config: &LoggerConfig,
        batch: LogBatch,
    ) -> Result<IngestResponse, TransportError> {
        let batch_size = batch.len() as u64;
        let result = self.inner.send(config, batch).await;

        let mut stats = self.stats.write();
        match &result {
            Ok(_) => {
                stats.batches_sent += 1;
                stats.logs_sent += batch_size;
            }
            Err(_) => {
                stats.batches_dropped += 1;
                stats.logs_dropped += batch_size;
            }
        }
        result
    }
}
