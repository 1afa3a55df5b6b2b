//! Human-readable summaries of failed HTTP calls.

use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    errors: Vec<ErrorItem>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorItem {
    #[serde(default)]
    message: Option<String>,
}

/// Summarize a failed call.
///
/// Prefers the server's structured `errors[].message` list (joined with
/// `", "`), then a top-level `message`, then `fallback`, which is the
/// transport-level error text.
pub fn summarize(body: Option<&[u8]>, fallback: &str) -> String {
    body.and_then(summarize_body)
        .unwrap_or_else(|| fallback.to_string())
}

fn summarize_body(body: &[u8]) -> Option<String> {
    let parsed: ErrorBody = serde_json::from_slice(body).ok()?;

    let messages: Vec<String> = parsed
        .errors
        .into_iter()
        .filter_map(|item| item.message)
        .filter(|m| !m.is_empty())
        .collect();
    if !messages.is_empty() {
        return Some(messages.join(", "));
    }

    parsed.message.filter(|m| !m.is_empty())
}

/// Generic message for a response outside the 2xx range.
pub fn status_message(status: u16) -> String {
    format!("Request failed with status code {}", status)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_list_wins() {
        let body = br#"{
            "errors": [{"message": "title is required"}, {"message": "year is invalid"}],
            "message": "Bad Request"
        }"#;
        assert_eq!(
            summarize(Some(body), "fallback"),
            "title is required, year is invalid"
        );
    }

    #[test]
    fn test_message_used_without_error_list() {
        let body = br#"{"errors":[],"message":"Movie not found"}"#;
        assert_eq!(summarize(Some(body), "fallback"), "Movie not found");
    }

    #[test]
    fn test_fallback_for_unstructured_bodies() {
        assert_eq!(summarize(Some(b"<html>oops</html>"), "boom"), "boom");
        assert_eq!(summarize(Some(br#"{"detail":"x"}"#), "boom"), "boom");
        assert_eq!(summarize(Some(b""), "boom"), "boom");
        assert_eq!(summarize(None, "connection refused"), "connection refused");
    }

    #[test]
    fn test_status_message() {
        assert_eq!(status_message(503), "Request failed with status code 503");
    }
}
