//! Telemetry Forwarder - forwards structured log records to a collector
//!
//! Each line read from stdin becomes a `Message` record. Records are
//! buffered and delivered in batches on a fixed interval.
//!
//! ## Configuration
//!
//! Configuration is loaded from environment variables:
//!
//! - `TELEMETRY_APP_ID`: Application identifier (default: telemetry-forwarder)
//! - `TELEMETRY_COLLECTOR_URL`: Collection endpoint (default: unset, nothing is sent)
//! - `TELEMETRY_FLUSH_INTERVAL_MS`: Milliseconds between flushes (default: 5000)
//! - `TELEMETRY_REQUEST_TIMEOUT_SECS`: Upload timeout (default: 30)
//! - `TELEMETRY_BATCH_FORMAT`: `raw` or `enveloped` (default: raw)
//! - `TELEMETRY_PROBE_URLS`: Comma-separated URLs fetched once through the
//!   instrumented client at startup (default: none)
//! - `RUST_LOG`: Logging level filter (default: info)

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use telemetry_forwarder::config::LoggerConfig;
use telemetry_forwarder::logger::{FlushOutcome, Logger};
use telemetry_forwarder::record::LogKind;

const PROBE_URLS_VAR: &str = "TELEMETRY_PROBE_URLS";

/// Upper bound on the final flush at shutdown.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() {
    init_tracing();

    info!("Starting Telemetry Forwarder...");

    let config = match LoggerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Failed to load configuration");
            std::process::exit(1);
        }
    };

    let logger = match Logger::new() {
        Ok(logger) => logger,
        Err(e) => {
            error!(error = %e, "Failed to create logger");
            std::process::exit(1);
        }
    };
    logger.init(config);
    logger.install_panic_hook();
    let session_id = logger.start_session();
    info!(session_id = %session_id, "Session started");

    let probes = probe_urls(std::env::var(PROBE_URLS_VAR).ok().as_deref());
    if !probes.is_empty() {
        run_probes(&logger, &probes).await;
    }

    info!("Forwarding stdin lines. Press Ctrl+C or close stdin to stop.");
    let lines_forwarded = tokio::select! {
        count = forward_stdin(&logger) => count,
        result = tokio::signal::ctrl_c() => {
            match result {
                Ok(()) => info!("Shutdown signal received, stopping..."),
                Err(e) => error!(error = %e, "Failed to listen for shutdown signal"),
            }
            0
        }
    };
    if lines_forwarded > 0 {
        info!(lines_forwarded, "Input closed");
    }

    info!("Initiating graceful shutdown...");
    match tokio::time::timeout(SHUTDOWN_TIMEOUT, logger.shutdown()).await {
        Ok(FlushOutcome::Dropped { records, error }) => {
            warn!(records, error = %error, "Final batch was not delivered");
        }
        Ok(FlushOutcome::Inert { pending }) => {
            warn!(pending, "No collection endpoint configured, records discarded");
        }
        Ok(_) => {}
        Err(_) => {
            warn!("Final flush timed out after {:?}", SHUTDOWN_TIMEOUT);
        }
    }

    let stats = logger.delivery_stats();
    info!(
        batches_sent = stats.batches_sent,
        logs_sent = stats.logs_sent,
        batches_dropped = stats.batches_dropped,
        logs_dropped = stats.logs_dropped,
        "Telemetry Forwarder stopped"
    );
}

/// Initialize the tracing subscriber with environment-based filtering.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();
}

/// Turn each non-empty stdin line into a `Message` record until EOF.
///
/// Returns the number of lines forwarded.
async fn forward_stdin(logger: &Logger) -> u64 {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut forwarded: u64 = 0;

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if let Some(message) = message_from_line(&line) {
                    logger.info(LogKind::message(message));
                    forwarded += 1;
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "Failed to read stdin, stopping");
                break;
            }
        }
    }
    forwarded
}

fn message_from_line(line: &str) -> Option<&str> {
    let trimmed = line.trim_end_matches(['\r', '\n']);
    if trimmed.trim().is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

fn probe_urls(raw: Option<&str>) -> Vec<String> {
    raw.unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .map(str::to_string)
        .collect()
}

/// Fetch each URL once so the calls show up as API-call records.
async fn run_probes(logger: &Logger, urls: &[String]) {
    let client = logger.instrument(reqwest::Client::new());
    for url in urls {
        match client.send(client.get(url.as_str())).await {
            Ok(response) => info!(url = %url, status = %response.status(), "Probe completed"),
            Err(e) => warn!(url = %url, error = %e, "Probe failed"),
        }
    }
}
