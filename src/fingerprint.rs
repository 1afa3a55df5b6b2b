//! Fingerprint module for describing the host environment.
//!
//! The snapshot is taken once and then attached to every record and batch,
//! so the queries behind [`FingerprintSource`] never run per record.

use std::env;
use std::sync::OnceLock;

use chrono::Local;
use serde::{Deserialize, Serialize};

/// Device, runtime and locale attributes of the host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fingerprint {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub browser: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub browser_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_vendor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screen_resolution: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

/// Synchronous queries against the host environment.
///
/// Every query defaults to `None` so a source only answers what it knows.
pub trait FingerprintSource {
    fn browser(&self) -> Option<String> {
        None
    }
    fn browser_version(&self) -> Option<String> {
        None
    }
    fn os(&self) -> Option<String> {
        None
    }
    fn os_version(&self) -> Option<String> {
        None
    }
    fn device(&self) -> Option<String> {
        None
    }
    fn device_type(&self) -> Option<String> {
        None
    }
    fn device_vendor(&self) -> Option<String> {
        None
    }
    fn screen_resolution(&self) -> Option<String> {
        None
    }
    fn timezone(&self) -> Option<String> {
        None
    }
    fn language(&self) -> Option<String> {
        None
    }
}

impl Fingerprint {
    /// Run every query of `source` once and freeze the answers.
    pub fn collect(source: &dyn FingerprintSource) -> Self {
        Self {
            browser: source.browser(),
            browser_version: source.browser_version(),
            os: source.os(),
            os_version: source.os_version(),
            device: source.device(),
            device_type: source.device_type(),
            device_vendor: source.device_vendor(),
            screen_resolution: source.screen_resolution(),
            timezone: source.timezone(),
            language: source.language(),
        }
    }

    /// Fingerprint of the current process, collected on first use.
    pub fn system() -> &'static Fingerprint {
        static SYSTEM: OnceLock<Fingerprint> = OnceLock::new();
        SYSTEM.get_or_init(|| Fingerprint::collect(&SystemSource))
    }
}

/// Answers fingerprint queries from the OS and process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemSource;

impl FingerprintSource for SystemSource {
    fn browser(&self) -> Option<String> {
        Some(env!("CARGO_PKG_NAME").to_string())
    }

    fn browser_version(&self) -> Option<String> {
        Some(env!("CARGO_PKG_VERSION").to_string())
    }

    fn os(&self) -> Option<String> {
        Some(env::consts::OS.to_string())
    }

    fn device(&self) -> Option<String> {
        non_empty_var("HOSTNAME").or_else(|| non_empty_var("COMPUTERNAME"))
    }

    fn device_type(&self) -> Option<String> {
        Some(env::consts::ARCH.to_string())
    }

    fn timezone(&self) -> Option<String> {
        non_empty_var("TZ").or_else(|| Some(Local::now().format("%:z").to_string()))
    }

    fn language(&self) -> Option<String> {
        ["LC_ALL", "LC_MESSAGES", "LANG"]
            .iter()
            .find_map(|var| non_empty_var(var))
            .and_then(|locale| normalize_locale(&locale))
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Turn a POSIX locale such as `en_US.UTF-8` into a language tag (`en-US`).
fn normalize_locale(locale: &str) -> Option<String> {
    let base = locale.split(['.', '@']).next().unwrap_or_default();
    if base.is_empty() || base == "C" || base == "POSIX" {
        return None;
    }
    Some(base.replace('_', "-"))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct BrowserSource;

    impl FingerprintSource for BrowserSource {
        fn browser(&self) -> Option<String> {
            Some("Firefox".to_string())
        }

        fn screen_resolution(&self) -> Option<String> {
            Some("1920x1080".to_string())
        }
    }

    #[test]
    fn test_collect_from_partial_source() {
        let fingerprint = Fingerprint::collect(&BrowserSource);

        assert_eq!(fingerprint.browser.as_deref(), Some("Firefox"));
        assert_eq!(fingerprint.screen_resolution.as_deref(), Some("1920x1080"));
        assert!(fingerprint.os.is_none());
        assert!(fingerprint.language.is_none());
    }

    #[test]
    fn test_system_fingerprint_is_cached() {
        let first = Fingerprint::system();
        let second = Fingerprint::system();

        assert!(std::ptr::eq(first, second));
        assert_eq!(first.os.as_deref(), Some(env::consts::OS));
        assert_eq!(first.device_type.as_deref(), Some(env::consts::ARCH));
        assert!(first.timezone.is_some());
    }

    #[test]
    fn test_serialization_skips_missing_fields() {
        let fingerprint = Fingerprint::collect(&BrowserSource);
        let json = serde_json::to_string(&fingerprint).unwrap();

        assert!(json.contains(r#""browser":"Firefox""#));
        assert!(json.contains(r#""screenResolution":"1920x1080""#));
        assert!(!json.contains("osVersion"));
    }

    #[test]
    fn test_normalize_locale() {
        assert_eq!(normalize_locale("en_US.UTF-8").as_deref(), Some("en-US"));
        assert_eq!(normalize_locale("de_DE@euro").as_deref(), Some("de-DE"));
        assert_eq!(normalize_locale("fr").as_deref(), Some("fr"));
        assert!(normalize_locale("C").is_none());
        assert!(normalize_locale("POSIX.UTF-8").is_none());
    }
}
