//! Logger module tying the buffer, scheduler and transport together.
//!
//! A [`Logger`] is a cheap, cloneable handle. Hosts construct as many as they
//! need; nothing is stored in process-wide statics.
//!
//! Telemetry never fails the host: every operation here is infallible from
//! the caller's point of view, and delivery problems are only reported
//! through `tracing` and the returned [`FlushOutcome`].

use std::backtrace::{Backtrace, BacktraceStatus};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::RwLock;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::buffer::{BufferStats, EventBuffer};
use crate::client::{
    DeliveryStats, HttpTransport, IngestResponse, TrackedTransport, Transport, TransportError,
};
use crate::config::{LoggerConfig, MIN_FLUSH_INTERVAL_MS};
use crate::fingerprint::Fingerprint;
use crate::interceptor::InstrumentedClient;
use crate::record::{Identity, LogBatch, LogKind, LogLevel, LogRecord, UNKNOWN_USER};
use crate::scheduler::FlushScheduler;

/// Errors that can occur while constructing a logger.
#[derive(Debug, Error)]
pub enum LoggerError {
    #[error("failed to create transport: {0}")]
    Transport(#[from] TransportError),
}

/// Where a logger is in its configuration lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// `init` has not been called; flushing is inert
    Unconfigured,
    /// `init` has been called once
    Configured,
    /// `init` has been called more than once
    Reconfigured,
}

/// Result of one flush.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Nothing was buffered; the transport was not called
    Empty,

    /// No usable endpoint; records stay buffered
    Inert { pending: usize },

    /// The collector accepted the batch
    Delivered {
        records: usize,
        response: IngestResponse,
    },

    /// Delivery failed and the batch was discarded
    Dropped { records: usize, error: String },
}

struct LoggerInner {
    config: RwLock<LoggerConfig>,
    lifecycle: RwLock<LifecycleState>,
    identity: RwLock<Identity>,
    fingerprint: Option<Fingerprint>,
    buffer: EventBuffer,
    scheduler: FlushScheduler,
    transport: TrackedTransport,
}

/// Handle to a telemetry pipeline.
#[derive(Clone)]
pub struct Logger {
    inner: Arc<LoggerInner>,
}

impl std::fmt::Debug for Logger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Logger")
            .field("lifecycle", &self.state())
            .field("pending", &self.pending())
            .finish()
    }
}

impl Logger {
    /// Create an unconfigured logger delivering over HTTP.
    ///
    /// # Errors
    ///
    /// Returns `LoggerError::Transport` if the HTTP client cannot be built.
    pub fn new() -> Result<Self, LoggerError> {
        let transport = HttpTransport::new()?;
        Ok(Self::with_transport(Arc::new(transport)))
    }

    /// Create an unconfigured logger with a custom transport and the
    /// process fingerprint.
    pub fn with_transport(transport: Arc<dyn Transport>) -> Self {
        Self::with_parts(transport, Some(Fingerprint::system().clone()))
    }

    /// Create an unconfigured logger from explicit parts.
    pub fn with_parts(transport: Arc<dyn Transport>, fingerprint: Option<Fingerprint>) -> Self {
        let config = LoggerConfig::default();
        let identity = Identity {
            app_id: config.app_id.clone(),
            ..Identity::default()
        };

        Self {
            inner: Arc::new(LoggerInner {
                config: RwLock::new(config),
                lifecycle: RwLock::new(LifecycleState::Unconfigured),
                identity: RwLock::new(identity),
                fingerprint,
                buffer: EventBuffer::new(),
                scheduler: FlushScheduler::new(),
                transport: TrackedTransport::new(transport),
            }),
        }
    }

    /// Apply `config` and (re)start the flush timer.
    ///
    /// Any previous timer is cancelled first. Outside a Tokio runtime the
    /// config is applied but no timer runs; `flush` still works on demand.
    pub fn init(&self, mut config: LoggerConfig) {
        let min_interval = Duration::from_millis(MIN_FLUSH_INTERVAL_MS);
        if config.flush_interval < min_interval {
            warn!(
                requested_ms = config.flush_interval.as_millis() as u64,
                min_ms = MIN_FLUSH_INTERVAL_MS,
                "Flush interval too short, using minimum"
            );
            config.flush_interval = min_interval;
        }
        if config.collector_url().is_none() {
            warn!(
                endpoint = %config.collection_endpoint,
                "No usable collection endpoint, records will stay buffered"
            );
        }

        let period = config.flush_interval;
        info!(
            app_id = %config.app_id,
            endpoint = %config.collection_endpoint,
            flush_interval_ms = period.as_millis() as u64,
            batch_format = ?config.batch_format,
            "Logger configured"
        );

        self.inner.identity.write().app_id = config.app_id.clone();
        *self.inner.config.write() = config;
        {
            let mut lifecycle = self.inner.lifecycle.write();
            *lifecycle = match *lifecycle {
                LifecycleState::Unconfigured => LifecycleState::Configured,
                _ => LifecycleState::Reconfigured,
            };
        }

        if tokio::runtime::Handle::try_current().is_err() {
            warn!("No Tokio runtime available, scheduled flushing disabled");
            self.inner.scheduler.stop();
            return;
        }

        let weak: Weak<LoggerInner> = Arc::downgrade(&self.inner);
        self.inner.scheduler.start(period, move || {
            let weak = weak.clone();
            async move {
                if let Some(inner) = weak.upgrade() {
                    Logger { inner }.flush().await;
                }
            }
        });
    }

    /// Replace the configuration; same as [`Self::init`].
    pub fn reconfigure(&self, config: LoggerConfig) {
        self.init(config);
    }

    pub fn state(&self) -> LifecycleState {
        *self.inner.lifecycle.read()
    }

    /// Snapshot of the current configuration.
    pub fn config(&self) -> LoggerConfig {
        self.inner.config.read().clone()
    }

    /// Whether a flush timer is running.
    pub fn is_scheduled(&self) -> bool {
        self.inner.scheduler.is_running()
    }

    /// Whether `url` is the collection endpoint (and must not be instrumented).
    pub fn targets_collector(&self, url: &str) -> bool {
        self.inner.config.read().targets_collector(url)
    }

    // ----- Identity -----

    pub fn set_user_id(&self, user_id: impl Into<String>) {
        self.inner.identity.write().user_id = user_id.into();
    }

    pub fn set_session_id(&self, session_id: Option<String>) {
        self.inner.identity.write().session_id = session_id;
    }

    pub fn set_environment(&self, environment: Option<String>) {
        self.inner.identity.write().environment = environment;
    }

    pub fn set_app_id(&self, app_id: impl Into<String>) {
        self.inner.identity.write().app_id = app_id.into();
    }

    /// Snapshot of the identity new records will carry.
    pub fn identity(&self) -> Identity {
        self.inner.identity.read().clone()
    }

    /// Begin a new session with a random id and return it.
    pub fn start_session(&self) -> String {
        let session_id = Uuid::new_v4().to_string();
        self.set_session_id(Some(session_id.clone()));
        session_id
    }

    /// Switch to `user_id` and record the sign-in.
    pub fn sign_in(&self, user_id: impl Into<String>) {
        let user_id = user_id.into();
        self.set_user_id(user_id.clone());
        self.info(LogKind::SignIn { user_id });
    }

    /// Record a rejected sign-in attempt. The current user is unchanged.
    pub fn sign_in_failed(&self, user_id: impl Into<String>) {
        self.warn(LogKind::SignInError {
            user_id: user_id.into(),
        });
    }

    /// Record the sign-out, forget the user, and flush what the session
    /// produced.
    ///
    /// The user is reset before the flush is awaited, so records appended
    /// while it is in flight are no longer attributed to them.
    pub async fn sign_out(&self) -> FlushOutcome {
        let user_id = self.inner.identity.read().user_id.clone();
        self.info(LogKind::SignOut { user_id });
        self.set_user_id(UNKNOWN_USER);
        self.flush().await
    }

    // ----- Records -----

    /// Append a record built from `kind`, `level` and the current identity.
    pub fn log(&self, kind: LogKind, level: LogLevel) {
        let record = {
            let identity = self.inner.identity.read();
            LogRecord::new(kind, level, &identity, self.inner.fingerprint.as_ref())
        };
        self.inner.buffer.append(record);
    }

    pub fn trace(&self, kind: LogKind) {
        self.log(kind, LogLevel::Trace);
    }

    pub fn debug(&self, kind: LogKind) {
        self.log(kind, LogLevel::Debug);
    }

    pub fn info(&self, kind: LogKind) {
        self.log(kind, LogLevel::Info);
    }

    pub fn warn(&self, kind: LogKind) {
        self.log(kind, LogLevel::Warn);
    }

    pub fn error(&self, kind: LogKind) {
        self.log(kind, LogLevel::Error);
    }

    /// Record an error the host did not handle.
    pub fn report_uncaught_error(&self, message: impl Into<String>, stacktrace: impl Into<String>) {
        self.error(LogKind::UncaughtError {
            message: message.into(),
            stacktrace: stacktrace.into(),
        });
    }

    /// Record every panic as an `UncaughtError`, then run the previous hook.
    ///
    /// The hook holds a weak reference, so it stops recording once every
    /// handle to this logger is dropped.
    pub fn install_panic_hook(&self) {
        let weak = Arc::downgrade(&self.inner);
        let previous = std::panic::take_hook();

        std::panic::set_hook(Box::new(move |panic_info| {
            if let Some(inner) = weak.upgrade() {
                let payload = panic_info.payload();
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "panic with non-string payload".to_string());

                let backtrace = Backtrace::capture();
                let stacktrace = match backtrace.status() {
                    BacktraceStatus::Captured => backtrace.to_string(),
                    _ => panic_info
                        .location()
                        .map(|l| format!("at {}:{}:{}", l.file(), l.line(), l.column()))
                        .unwrap_or_default(),
                };

                Logger { inner }.report_uncaught_error(message, stacktrace);
            }
            previous(panic_info);
        }));
    }

    /// Take everything buffered so far, bypassing the transport.
    pub fn drain_snapshot(&self) -> Vec<LogRecord> {
        self.inner.buffer.drain_snapshot()
    }

    /// Number of records waiting for the next flush.
    pub fn pending(&self) -> usize {
        self.inner.buffer.len()
    }

    pub fn buffer_stats(&self) -> BufferStats {
        self.inner.buffer.stats()
    }

    pub fn delivery_stats(&self) -> DeliveryStats {
        self.inner.transport.stats()
    }

    // ----- Delivery -----

    /// Drain the buffer and send it as one batch.
    ///
    /// Never fails: a rejected batch is logged locally and discarded.
    pub async fn flush(&self) -> FlushOutcome {
        let config = self.inner.config.read().clone();
        if config.collector_url().is_none() {
            let pending = self.inner.buffer.len();
            if pending == 0 {
                return FlushOutcome::Empty;
            }
            debug!(pending, "Flush skipped, no usable collection endpoint");
            return FlushOutcome::Inert { pending };
        }

        let records = self.inner.buffer.drain_snapshot();
        if records.is_empty() {
            return FlushOutcome::Empty;
        }

        let batch = {
            let identity = self.inner.identity.read();
            LogBatch::new(records, &identity, self.inner.fingerprint.as_ref())
        };
        let batch_size = batch.len();

        match self.inner.transport.send(&config, batch).await {
            Ok(response) => {
                debug!(
                    batch_size,
                    collector_id = ?response.id,
                    "Log batch delivered"
                );
                FlushOutcome::Delivered {
                    records: batch_size,
                    response,
                }
            }
            Err(e) => {
                warn!(error = %e, dropped = batch_size, "Error sending log batch, dropping it");
                FlushOutcome::Dropped {
                    records: batch_size,
                    error: e.to_string(),
                }
            }
        }
    }

    /// Stop the timer and flush whatever is left.
    ///
    /// A timer flush already in flight is awaited first, so its batch is
    /// delivered or reported before the final flush runs.
    pub async fn shutdown(&self) -> FlushOutcome {
        self.inner.scheduler.stop_and_wait().await;
        let outcome = self.flush().await;
        info!(outcome = ?outcome, "Logger shut down");
        outcome
    }

    /// Wrap `client` so its calls are recorded by this logger.
    pub fn instrument(&self, client: reqwest::Client) -> InstrumentedClient {
        InstrumentedClient::new(client, self.clone())
    }
}
