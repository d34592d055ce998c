//! Best-effort extraction of human-readable messages from JSON response bodies.
use serde_json::Value;

pub(crate) fn parse(body: &[u8]) -> Option<Value> {
    serde_json::from_slice(body).ok()
}

/// `error`, then `message`, then `fallback`.
pub(crate) fn error_message(body: &[u8], fallback: &str) -> String {
    parse(body)
        .and_then(|value| text_field(&value, "error").or_else(|| text_field(&value, "message")))
        .unwrap_or_else(|| fallback.to_string())
}

pub(crate) fn message(body: &[u8]) -> Option<String> {
    parse(body).and_then(|value| text_field(&value, "message"))
}

fn text_field(value: &Value, key: &str) -> Option<String> {
    let text = value.get(key)?.as_str()?.trim();
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_prefers_error_then_message() {
        assert_eq!(
            error_message(br#"{"error":"bad header","message":"ignored"}"#, "x"),
            "bad header"
        );
        assert_eq!(error_message(br#"{"message":"too big"}"#, "x"), "too big");
        assert_eq!(error_message(br#"{"error":"  "}"#, "Upload failed"), "Upload failed");
        assert_eq!(error_message(b"<html>502</html>", "Upload failed"), "Upload failed");
    }

    #[test]
    fn message_ignores_non_strings() {
        assert_eq!(message(br#"{"message":"ok"}"#).as_deref(), Some("ok"));
        assert_eq!(message(br#"{"message":42}"#), None);
        assert_eq!(message(b""), None);
    }
}
