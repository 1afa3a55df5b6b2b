//! Record module defining the structured telemetry events and batches.
//!
//! Every record carries the identity and fingerprint that were current when it
//! was appended, plus a tagged [`LogKind`] payload describing what happened.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::fingerprint::Fingerprint;

/// User id attached to records before anyone signs in.
pub const UNKNOWN_USER: &str = "unknown";

/// Log severity levels accepted by the collector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Get all possible log levels.
    pub fn all() -> &'static [LogLevel] {
        &[
            LogLevel::Trace,
            LogLevel::Debug,
            LogLevel::Info,
            LogLevel::Warn,
            LogLevel::Error,
        ]
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Trace => write!(f, "trace"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Error => write!(f, "error"),
        }
    }
}

/// Kind of UI element that produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UiElementType {
    Anchor,
    Button,
    Div,
    Img,
    Input,
    Select,
    Textarea,
    Other,
}

/// Event emitted by a UI element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UiElementEventType {
    Blur,
    Change,
    Click,
    Dblclick,
    Focus,
    Mouseenter,
    Mouseleave,
    Other,
}

/// What a record describes.
///
/// Serialized with a `type` tag next to the envelope fields, so a message
/// record looks like `{"timestamp": .., "level": "info", "type": "Message",
/// "message": "Hello", ..}` on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum LogKind {
    /// An instrumented HTTP call was dispatched.
    ApiCallStart {
        url: String,
        method: String,
        start_time: DateTime<Utc>,
    },

    /// An instrumented HTTP call completed, successfully or not.
    ApiCallEnd {
        url: String,
        method: String,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        duration_millis: u64,
        status: u16,
        status_text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    /// Free-form application message.
    Message { message: String },

    /// Navigation to a new page or screen.
    PageView { url: String },

    SignIn { user_id: String },

    SignInError { user_id: String },

    SignOut { user_id: String },

    /// Event produced by a UI element living inside a container
    /// (page, dialog or component).
    UiElementEvent {
        event: UiElementEventType,
        container: String,
        element_type: UiElementType,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        element_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        element_value: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },

    /// An error the host application did not handle.
    UncaughtError { message: String, stacktrace: String },
}

impl LogKind {
    /// Shorthand for a [`LogKind::Message`].
    pub fn message(message: impl Into<String>) -> Self {
        LogKind::Message {
            message: message.into(),
        }
    }

    /// Shorthand for a [`LogKind::PageView`].
    pub fn page_view(url: impl Into<String>) -> Self {
        LogKind::PageView { url: url.into() }
    }

    /// Name of the variant as it appears in the `type` tag.
    pub fn name(&self) -> &'static str {
        match self {
            LogKind::ApiCallStart { .. } => "ApiCallStart",
            LogKind::ApiCallEnd { .. } => "ApiCallEnd",
            LogKind::Message { .. } => "Message",
            LogKind::PageView { .. } => "PageView",
            LogKind::SignIn { .. } => "SignIn",
            LogKind::SignInError { .. } => "SignInError",
            LogKind::SignOut { .. } => "SignOut",
            LogKind::UiElementEvent { .. } => "UiElementEvent",
            LogKind::UncaughtError { .. } => "UncaughtError",
        }
    }
}

/// Session and identity state read whenever a record is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub app_id: String,
    pub user_id: String,
    pub session_id: Option<String>,
    pub environment: Option<String>,
}

impl Default for Identity {
    fn default() -> Self {
        Self {
            app_id: String::new(),
            user_id: UNKNOWN_USER.to_string(),
            session_id: None,
            environment: None,
        }
    }
}

/// One structured telemetry event.
///
/// Fields are private; a record is frozen once built and only exposes
/// read accessors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogRecord {
    timestamp: DateTime<Utc>,
    level: LogLevel,
    app_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    environment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    fingerprint: Option<Fingerprint>,
    #[serde(flatten)]
    kind: LogKind,
}

impl LogRecord {
    /// Build a record stamped with the current time.
    pub fn new(
        kind: LogKind,
        level: LogLevel,
        identity: &Identity,
        fingerprint: Option<&Fingerprint>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            app_id: identity.app_id.clone(),
            session_id: identity.session_id.clone(),
            environment: identity.environment.clone(),
            user_id: Some(identity.user_id.clone()),
            fingerprint: fingerprint.cloned(),
            kind,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn level(&self) -> LogLevel {
        self.level
    }

    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn environment(&self) -> Option<&str> {
        self.environment.as_deref()
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub fn fingerprint(&self) -> Option<&Fingerprint> {
        self.fingerprint.as_ref()
    }

    pub fn kind(&self) -> &LogKind {
        &self.kind
    }
}

/// How a batch is laid out in the request body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchFormat {
    /// Body is a JSON array of records.
    #[default]
    Raw,

    /// Body is a [`LogBatch`] object wrapping the records.
    Enveloped,
}

impl std::str::FromStr for BatchFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "raw" => Ok(BatchFormat::Raw),
            "enveloped" | "envelope" => Ok(BatchFormat::Enveloped),
            other => Err(format!("'{}' is not a batch format (raw|enveloped)", other)),
        }
    }
}

/// A point-in-time snapshot of the buffer, ready for one transmission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogBatch {
    /// Client-generated batch id
    pub id: Uuid,

    /// When the snapshot was taken
    pub created_at: DateTime<Utc>,

    /// Application the records belong to
    pub app_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<Fingerprint>,

    /// Records in append order
    pub logs: Vec<LogRecord>,
}

impl LogBatch {
    /// Wrap drained records into a batch stamped with the current identity.
    pub fn new(
        logs: Vec<LogRecord>,
        identity: &Identity,
        fingerprint: Option<&Fingerprint>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            app_id: identity.app_id.clone(),
            user_id: Some(identity.user_id.clone()),
            fingerprint: fingerprint.cloned(),
            logs,
        }
    }

    /// Get the number of records in the batch.
    pub fn len(&self) -> usize {
        self.logs.len()
    }

    /// Check if the batch is empty.
    pub fn is_empty(&self) -> bool {
        self.logs.is_empty()
    }

    /// Serialize the batch as the request body for the given format.
    pub fn to_body(&self, format: BatchFormat) -> serde_json::Result<Vec<u8>> {
        match format {
            BatchFormat::Raw => serde_json::to_vec(&self.logs),
            BatchFormat::Enveloped => serde_json::to_vec(self),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> Identity {
        Identity {
            app_id: "demo-app".to_string(),
            ..Identity::default()
        }
    }

    #[test]
    fn test_log_level_serialization() {
        assert_eq!(serde_json::to_string(&LogLevel::Info).unwrap(), r#""info""#);
        assert_eq!(
            serde_json::to_string(&LogLevel::Error).unwrap(),
            r#""error""#
        );
    }

    #[test]
    fn test_log_level_deserialization() {
        let level: LogLevel = serde_json::from_str(r#""warn""#).unwrap();
        assert_eq!(level, LogLevel::Warn);
    }

    #[test]
    fn test_log_level_display() {
        assert_eq!(format!("{}", LogLevel::Trace), "trace");
        assert_eq!(format!("{}", LogLevel::Warn), "warn");
        assert_eq!(LogLevel::all().len(), 5);
    }

    #[test]
    fn test_identity_defaults_to_unknown_user() {
        let identity = Identity::default();
        assert_eq!(identity.user_id, UNKNOWN_USER);
        assert!(identity.session_id.is_none());
    }

    #[test]
    fn test_record_creation() {
        let record = LogRecord::new(LogKind::message("Hello"), LogLevel::Info, &identity(), None);

        assert_eq!(record.level(), LogLevel::Info);
        assert_eq!(record.app_id(), "demo-app");
        assert_eq!(record.user_id(), Some(UNKNOWN_USER));
        assert_eq!(record.kind(), &LogKind::message("Hello"));
        assert!(record.fingerprint().is_none());
    }

    #[test]
    fn test_message_record_serialization() {
        let record = LogRecord::new(LogKind::message("Hello"), LogLevel::Info, &identity(), None);
        let json: serde_json::Value = serde_json::to_value(&record).unwrap();

        assert_eq!(json["type"], "Message");
        assert_eq!(json["message"], "Hello");
        assert_eq!(json["level"], "info");
        assert_eq!(json["appId"], "demo-app");
        assert_eq!(json["userId"], "unknown");
        assert!(json["timestamp"].as_str().is_some_and(|ts| !ts.is_empty()));
        assert!(json.get("sessionId").is_none());
    }

    #[test]
    fn test_api_call_end_uses_camel_case_fields() {
        let now = Utc::now();
        let kind = LogKind::ApiCallEnd {
            url: "http://api.local/movies".to_string(),
            method: "GET".to_string(),
            start_time: now,
            end_time: now,
            duration_millis: 12,
            status: 503,
            status_text: "Service Unavailable".to_string(),
            error: Some("upstream down".to_string()),
        };
        let record = LogRecord::new(kind, LogLevel::Error, &identity(), None);
        let json: serde_json::Value = serde_json::to_value(&record).unwrap();

        assert_eq!(json["type"], "ApiCallEnd");
        assert_eq!(json["durationMillis"], 12);
        assert_eq!(json["statusText"], "Service Unavailable");
        assert_eq!(json["error"], "upstream down");
        assert!(json.get("startTime").is_some());
    }

    #[test]
    fn test_ui_element_event_deserialization() {
        let json = r#"{
            "timestamp": "2024-05-01T10:00:00Z",
            "level": "debug",
            "appId": "demo-app",
            "type": "UiElementEvent",
            "event": "click",
            "container": "SignInPage",
            "elementType": "button",
            "elementId": "Sign in"
        }"#;

        let record: LogRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.level(), LogLevel::Debug);
        match record.kind() {
            LogKind::UiElementEvent {
                event,
                element_type,
                element_id,
                element_value,
                ..
            } => {
                assert_eq!(*event, UiElementEventType::Click);
                assert_eq!(*element_type, UiElementType::Button);
                assert_eq!(element_id.as_deref(), Some("Sign in"));
                assert!(element_value.is_none());
            }
            other => panic!("unexpected kind {}", other.name()),
        }
    }

    #[test]
    fn test_batch_creation() {
        let logs = vec![
            LogRecord::new(LogKind::message("one"), LogLevel::Info, &identity(), None),
            LogRecord::new(LogKind::page_view("/movies"), LogLevel::Info, &identity(), None),
        ];
        let batch = LogBatch::new(logs, &identity(), None);

        assert_eq!(batch.len(), 2);
        assert!(!batch.is_empty());
        assert_eq!(batch.app_id, "demo-app");
        assert_eq!(batch.user_id.as_deref(), Some(UNKNOWN_USER));
    }

    #[test]
    fn test_batch_body_formats() {
        let logs = vec![LogRecord::new(
            LogKind::message("one"),
            LogLevel::Info,
            &identity(),
            None,
        )];
        let batch = LogBatch::new(logs, &identity(), None);

        let raw: serde_json::Value =
            serde_json::from_slice(&batch.to_body(BatchFormat::Raw).unwrap()).unwrap();
        assert!(raw.is_array());
        assert_eq!(raw[0]["message"], "one");

        let enveloped: serde_json::Value =
            serde_json::from_slice(&batch.to_body(BatchFormat::Enveloped).unwrap()).unwrap();
        assert_eq!(enveloped["appId"], "demo-app");
        assert_eq!(enveloped["id"], batch.id.to_string());
        assert_eq!(enveloped["logs"][0]["type"], "Message");
    }

    #[test]
    fn test_batch_format_parsing() {
        assert_eq!("raw".parse::<BatchFormat>().unwrap(), BatchFormat::Raw);
        assert_eq!(
            " Enveloped ".parse::<BatchFormat>().unwrap(),
            BatchFormat::Enveloped
        );
        assert!("xml".parse::<BatchFormat>().is_err());
    }
}
