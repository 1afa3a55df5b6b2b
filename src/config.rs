//! Configuration module for the telemetry forwarder.
//!
//! This module provides the logger configuration handed to `Logger::init`,
//! plus environment-based loading for hosts that prefer env vars.

use std::env;
use std::time::Duration;

use reqwest::Url;
use thiserror::Error;

use crate::record::BatchFormat;

/// Application identifier used when none is configured
const DEFAULT_APP_ID: &str = "telemetry-forwarder";

/// Default flush interval in milliseconds
const DEFAULT_FLUSH_INTERVAL_MS: u64 = 5_000;

/// Minimum flush interval to keep the timer from spinning
pub const MIN_FLUSH_INTERVAL_MS: u64 = 100;

/// Maximum flush interval to ensure reasonable data freshness
const MAX_FLUSH_INTERVAL_MS: u64 = 300_000;

/// Default timeout for one batch upload
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Error type for configuration loading failures
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable held an unusable value
    #[error("Configuration error for {env_var}: {message}")]
    InvalidVar { env_var: String, message: String },

    /// A programmatic setting was out of range
    #[error("Configuration error: {0}")]
    Invalid(String),
}

impl ConfigError {
    fn var(env_var: &str, message: impl Into<String>) -> Self {
        ConfigError::InvalidVar {
            env_var: env_var.to_string(),
            message: message.into(),
        }
    }
}

/// Configuration for a [`Logger`](crate::logger::Logger).
///
/// All settings can be configured via environment variables:
/// - `TELEMETRY_APP_ID`: application identifier (default: telemetry-forwarder)
/// - `TELEMETRY_COLLECTOR_URL`: collection endpoint (default: unset, flushing is inert)
/// - `TELEMETRY_FLUSH_INTERVAL_MS`: milliseconds between flushes (default: 5000)
/// - `TELEMETRY_REQUEST_TIMEOUT_SECS`: upload timeout (default: 30)
/// - `TELEMETRY_BATCH_FORMAT`: `raw` or `enveloped` (default: raw)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggerConfig {
    /// Application (or system) identifier stamped on every record
    pub app_id: String,

    /// URL batches are POSTed to; empty means "not configured"
    pub collection_endpoint: String,

    /// Time between scheduled flushes
    pub flush_interval: Duration,

    /// Timeout for a single batch upload
    pub request_timeout: Duration,

    /// Request body layout
    pub batch_format: BatchFormat,
}

impl LoggerConfig {
    /// Create a config with the three required settings and default extras.
    pub fn new(
        app_id: impl Into<String>,
        collection_endpoint: impl Into<String>,
        flush_interval: Duration,
    ) -> Self {
        Self {
            app_id: app_id.into(),
            collection_endpoint: normalize_endpoint(&collection_endpoint.into()),
            flush_interval,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            batch_format: BatchFormat::default(),
        }
    }

    /// Use a different request body layout.
    pub fn with_batch_format(mut self, batch_format: BatchFormat) -> Self {
        self.batch_format = batch_format;
        self
    }

    /// Use a different upload timeout.
    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - `TELEMETRY_FLUSH_INTERVAL_MS` is not a number or is out of range
    /// - `TELEMETRY_REQUEST_TIMEOUT_SECS` is not a positive number
    /// - `TELEMETRY_BATCH_FORMAT` is not `raw` or `enveloped`
    ///
    /// A missing or malformed collector URL is not an error; the logger
    /// just keeps its buffer until a usable endpoint is configured.
    pub fn from_env() -> Result<Self, ConfigError> {
        let app_id = env::var("TELEMETRY_APP_ID")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_APP_ID.to_string());

        let collection_endpoint = env::var("TELEMETRY_COLLECTOR_URL").unwrap_or_default();

        let flush_interval = Duration::from_millis(Self::parse_flush_interval()?);
        let request_timeout = Duration::from_secs(Self::parse_request_timeout()?);
        let batch_format = Self::parse_batch_format()?;

        Ok(Self::new(app_id, collection_endpoint, flush_interval)
            .with_request_timeout(request_timeout)
            .with_batch_format(batch_format))
    }

    /// Parse flush interval from environment variable with validation.
    fn parse_flush_interval() -> Result<u64, ConfigError> {
        let env_var = "TELEMETRY_FLUSH_INTERVAL_MS";

        match env::var(env_var) {
            Ok(value) => {
                let interval: u64 = value
                    .trim()
                    .parse()
                    .map_err(|_| {
                        ConfigError::var(env_var, format!("'{}' is not a valid number", value))
                    })?;

                if interval < MIN_FLUSH_INTERVAL_MS {
                    return Err(ConfigError::var(
                        env_var,
                        format!(
                            "flush interval {} is below minimum ({}ms)",
                            interval, MIN_FLUSH_INTERVAL_MS
                        ),
                    ));
                }

                if interval > MAX_FLUSH_INTERVAL_MS {
                    return Err(ConfigError::var(
                        env_var,
                        format!(
                            "flush interval {} exceeds maximum ({}ms)",
                            interval, MAX_FLUSH_INTERVAL_MS
                        ),
                    ));
                }

                Ok(interval)
            }
            Err(_) => Ok(DEFAULT_FLUSH_INTERVAL_MS),
        }
    }

    fn parse_request_timeout() -> Result<u64, ConfigError> {
        let env_var = "TELEMETRY_REQUEST_TIMEOUT_SECS";

        match env::var(env_var) {
            Ok(value) => match value.trim().parse::<u64>() {
                Ok(0) => Err(ConfigError::var(env_var, "timeout must be greater than 0")),
                Ok(secs) => Ok(secs),
                Err(_) => Err(ConfigError::var(
                    env_var,
                    format!("'{}' is not a valid number", value),
                )),
            },
            Err(_) => Ok(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }

    fn parse_batch_format() -> Result<BatchFormat, ConfigError> {
        let env_var = "TELEMETRY_BATCH_FORMAT";

        match env::var(env_var) {
            Ok(value) => value.parse().map_err(|e: String| ConfigError::var(env_var, e)),
            Err(_) => Ok(BatchFormat::default()),
        }
    }

    /// Check the settings a running logger depends on.
    ///
    /// The endpoint is deliberately not checked here, see [`Self::collector_url`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.flush_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "flush interval must be greater than 0".to_string(),
            ));
        }
        if self.request_timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "request timeout must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Parsed collection endpoint, or `None` when it is unset or unusable.
    pub fn collector_url(&self) -> Option<Url> {
        if self.collection_endpoint.is_empty() {
            return None;
        }
        Url::parse(&self.collection_endpoint)
            .ok()
            .filter(|url| matches!(url.scheme(), "http" | "https"))
    }

    /// Whether `url` points at the collection endpoint itself.
    ///
    /// Both sides are compared as parsed URLs: scheme, host and effective
    /// port must be equal, and the path must be the endpoint path or lie
    /// below it. Query strings are ignored.
    pub fn targets_collector(&self, url: &str) -> bool {
        let Some(collector) = self.collector_url() else {
            return false;
        };
        let Ok(candidate) = Url::parse(url) else {
            return false;
        };

        collector.scheme() == candidate.scheme()
            && collector.host_str() == candidate.host_str()
            && collector.port_or_known_default() == candidate.port_or_known_default()
            && path_within(collector.path(), candidate.path())
    }
}

/// Whether `path` equals `base` or is a sub-path of it.
fn path_within(base: &str, path: &str) -> bool {
    let base = base.trim_end_matches('/');
    base.is_empty()
        || path
            .strip_prefix(base)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
}

impl Default for LoggerConfig {
    /// An unconfigured logger: default app id, no endpoint, default cadence.
    fn default() -> Self {
        Self::new(
            DEFAULT_APP_ID,
            "",
            Duration::from_millis(DEFAULT_FLUSH_INTERVAL_MS),
        )
    }
}

fn normalize_endpoint(endpoint: &str) -> String {
    endpoint.trim().trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Env vars are process-wide; tests touching them take this lock.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    // Helper to temporarily set environment variables for testing
    struct EnvGuard {
        key: String,
        original: Option<String>,
    }

    impl EnvGuard {
        fn set(key: &str, value: &str) -> Self {
            let original = env::var(key).ok();
            env::set_var(key, value);
            Self {
                key: key.to_string(),
                original,
            }
        }

        fn remove(key: &str) -> Self {
            let original = env::var(key).ok();
            env::remove_var(key);
            Self {
                key: key.to_string(),
                original,
            }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            match &self.original {
                Some(val) => env::set_var(&self.key, val),
                None => env::remove_var(&self.key),
            }
        }
    }

    fn clear_env() -> Vec<EnvGuard> {
        [
            "TELEMETRY_APP_ID",
            "TELEMETRY_COLLECTOR_URL",
            "TELEMETRY_FLUSH_INTERVAL_MS",
            "TELEMETRY_REQUEST_TIMEOUT_SECS",
            "TELEMETRY_BATCH_FORMAT",
        ]
        .iter()
        .map(|key| EnvGuard::remove(key))
        .collect()
    }

    #[test]
    fn test_default_config() {
        let config = LoggerConfig::default();
        assert_eq!(config.app_id, "telemetry-forwarder");
        assert!(config.collection_endpoint.is_empty());
        assert_eq!(config.flush_interval, Duration::from_secs(5));
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.batch_format, BatchFormat::Raw);
        assert!(config.collector_url().is_none());
    }

    #[test]
    fn test_config_from_env_with_defaults() {
        let _lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let _guards = clear_env();

        let config = LoggerConfig::from_env().expect("Should load with defaults");
        assert_eq!(config, LoggerConfig::default());
    }

    #[test]
    fn test_config_from_env_custom_values() {
        let _lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let _guards = clear_env();
        let _g1 = EnvGuard::set("TELEMETRY_APP_ID", "movie-app");
        let _g2 = EnvGuard::set("TELEMETRY_COLLECTOR_URL", "http://collector:8080/logs/");
        let _g3 = EnvGuard::set("TELEMETRY_FLUSH_INTERVAL_MS", "1000");
        let _g4 = EnvGuard::set("TELEMETRY_BATCH_FORMAT", "enveloped");

        let config = LoggerConfig::from_env().expect("Should load custom values");
        assert_eq!(config.app_id, "movie-app");
        // Trailing slash removed
        assert_eq!(config.collection_endpoint, "http://collector:8080/logs");
        assert_eq!(config.flush_interval, Duration::from_millis(1000));
        assert_eq!(config.batch_format, BatchFormat::Enveloped);
    }

    #[test]
    fn test_invalid_flush_interval() {
        let _lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let _guards = clear_env();
        let _guard = EnvGuard::set("TELEMETRY_FLUSH_INTERVAL_MS", "soon");

        let err = LoggerConfig::from_env().unwrap_err();
        assert!(err.to_string().contains("not a valid number"));
    }

    #[test]
    fn test_flush_interval_below_min() {
        let _lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let _guards = clear_env();
        let _guard = EnvGuard::set("TELEMETRY_FLUSH_INTERVAL_MS", "5");

        let err = LoggerConfig::from_env().unwrap_err();
        assert!(err.to_string().contains("below minimum"));
    }

    #[test]
    fn test_flush_interval_exceeds_max() {
        let _lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let _guards = clear_env();
        let _guard = EnvGuard::set("TELEMETRY_FLUSH_INTERVAL_MS", "999999");

        let err = LoggerConfig::from_env().unwrap_err();
        assert!(err.to_string().contains("exceeds maximum"));
    }

    #[test]
    fn test_zero_request_timeout() {
        let _lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let _guards = clear_env();
        let _guard = EnvGuard::set("TELEMETRY_REQUEST_TIMEOUT_SECS", "0");

        let err = LoggerConfig::from_env().unwrap_err();
        assert!(err.to_string().contains("greater than 0"));
    }

    #[test]
    fn test_unknown_batch_format() {
        let _lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let _guards = clear_env();
        let _guard = EnvGuard::set("TELEMETRY_BATCH_FORMAT", "protobuf");

        let err = LoggerConfig::from_env().unwrap_err();
        assert!(err.to_string().contains("TELEMETRY_BATCH_FORMAT"));
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let config = LoggerConfig::new("app", "http://collector/logs", Duration::ZERO);
        assert!(config.validate().is_err());

        let config = LoggerConfig::new("app", "http://collector/logs", Duration::from_secs(1));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_collector_url_rejects_unusable_endpoints() {
        let config = LoggerConfig::new("app", "not a url", Duration::from_secs(1));
        assert!(config.collector_url().is_none());

        let config = LoggerConfig::new("app", "ftp://collector/logs", Duration::from_secs(1));
        assert!(config.collector_url().is_none());

        let config = LoggerConfig::new("app", "http://collector:8080/logs", Duration::from_secs(1));
        assert_eq!(
            config.collector_url().map(|u| u.to_string()).as_deref(),
            Some("http://collector:8080/logs")
        );
    }

    #[test]
    fn test_targets_collector() {
        let config = LoggerConfig::new(
            "app",
            "http://collector:8080/logs/",
            Duration::from_secs(1),
        );

        assert!(config.targets_collector("http://collector:8080/logs"));
        assert!(config.targets_collector("http://collector:8080/logs?batch=1"));
        assert!(config.targets_collector("http://collector:8080/logs/v2"));
        assert!(!config.targets_collector("http://collector:8080/logsink"));
        assert!(!config.targets_collector("http://collector:9090/logs"));
        assert!(!config.targets_collector("https://collector:8080/logs"));
        assert!(!config.targets_collector("http://api.local/movies"));
        assert!(!config.targets_collector("not a url"));

        let unconfigured = LoggerConfig::default();
        assert!(!unconfigured.targets_collector("http://collector:8080/logs"));
    }

    #[test]
    fn test_targets_collector_with_non_canonical_endpoint() {
        let explicit_port = LoggerConfig::new(
            "app",
            "http://collector.local:80/logs",
            Duration::from_secs(1),
        );
        assert!(explicit_port.targets_collector("http://collector.local/logs"));

        let mixed_case = LoggerConfig::new(
            "app",
            "http://Collector.Local/logs",
            Duration::from_secs(1),
        );
        assert!(mixed_case.targets_collector("http://collector.local/logs"));

        let https = LoggerConfig::new("app", "https://collector.local/", Duration::from_secs(1));
        assert!(https.targets_collector("https://collector.local:443/anything"));
        assert!(!https.targets_collector("https://other.local/anything"));
    }

    #[test]
    fn test_config_error_display() {
        let error = ConfigError::var("TEST_VAR", "test error");
        assert_eq!(
            format!("{}", error),
            "Configuration error for TEST_VAR: test error"
        );

        let error = ConfigError::Invalid("general error".to_string());
        assert_eq!(format!("{}", error), "Configuration error: general error");
    }
}
