//! Telemetry Forwarder Library
//!
//! This library provides the client-side half of a structured logging
//! pipeline:
//!
//! - **record**: Log records, levels and batch envelopes
//! - **fingerprint**: One-time snapshot of the host environment
//! - **config**: Environment-based configuration and collector matching
//! - **buffer**: Ordered in-memory buffer with atomic drain
//! - **scheduler**: Cancellable periodic flush timer
//! - **client**: Batch delivery over HTTP
//! - **http_error**: Readable summaries of failed HTTP calls
//! - **interceptor**: Instrumentation of outbound `reqwest` calls
//! - **logger**: The `Logger` handle tying it all together
//!
//! # Example
//!
//! ```no_run
//! use telemetry_forwarder::config::LoggerConfig;
//! use telemetry_forwarder::logger::Logger;
//! use telemetry_forwarder::record::LogKind;
//!
//! #[tokio::main]
//! async fn main() {
//!     let logger = Logger::new().expect("Failed to create logger");
//!     logger.init(LoggerConfig::from_env().expect("Failed to load config"));
//!
//!     logger.sign_in("alice");
//!     logger.info(LogKind::page_view("/movies"));
//!
//!     // Calls made through the instrumented client are recorded too
//!     let client = logger.instrument(reqwest::Client::new());
//!     client.send(client.get("http://localhost:3000/movies")).await.ok();
//!
//!     logger.sign_out().await;
//!     logger.shutdown().await;
//! }
//! ```

pub mod buffer;
pub mod client;
pub mod config;
pub mod fingerprint;
pub mod http_error;
pub mod interceptor;
pub mod logger;
pub mod record;
pub mod scheduler;

pub use buffer::{BufferStats, EventBuffer};
pub use client::{
    DeliveryStats, HttpTransport, IngestResponse, TrackedTransport, Transport, TransportError,
};
pub use config::{ConfigError, LoggerConfig};
pub use fingerprint::{Fingerprint, FingerprintSource};
pub use interceptor::{HttpInterceptor, InstrumentedClient, RequestContext};
pub use logger::{FlushOutcome, LifecycleState, Logger, LoggerError};
pub use record::{BatchFormat, Identity, LogBatch, LogKind, LogLevel, LogRecord};
pub use scheduler::FlushScheduler;
