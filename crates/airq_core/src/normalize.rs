use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::CanonicalEvent;

/// A single event payload that could not be interpreted.
///
/// The job keeps running when this happens; later events may still be fine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("malformed event payload: {0}")]
    Malformed(String),
    #[error("event payload has no status field")]
    MissingStatus,
    #[error("field `{field}` is not a number: {value}")]
    NotANumber { field: &'static str, value: String },
}

#[derive(Debug, Deserialize)]
struct RawEvent {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    pollutant: Option<String>,
    #[serde(default)]
    percent: Option<Value>,
    /// Older revisions report the job-level percentage as `progress`.
    #[serde(default, alias = "overall")]
    progress: Option<Value>,
    #[serde(default)]
    message: Option<String>,
}

/// Parse one raw wire payload (a JSON object) into a canonical event.
pub fn normalize(raw: &str) -> Result<CanonicalEvent, ProtocolError> {
    let parsed: RawEvent =
        serde_json::from_str(raw).map_err(|err| ProtocolError::Malformed(err.to_string()))?;
    from_raw(parsed)
}

fn from_raw(raw: RawEvent) -> Result<CanonicalEvent, ProtocolError> {
    let status = raw.status.ok_or(ProtocolError::MissingStatus)?;
    let pollutant = raw.pollutant.as_deref().and_then(normalize_pollutant);
    let message = raw.message;

    let event = match status.trim().to_ascii_lowercase().as_str() {
        "start" => CanonicalEvent::JobStart { message },
        "begin" => CanonicalEvent::ItemBegin { pollutant, message },
        "processing" | "progress" => CanonicalEvent::ItemProgress {
            pollutant,
            percent: parse_percent("percent", raw.percent.as_ref())?,
            overall: parse_percent("progress", raw.progress.as_ref())?,
            message,
        },
        "done" => CanonicalEvent::ItemDone {
            pollutant,
            overall: parse_percent("progress", raw.progress.as_ref())?,
            message,
        },
        "complete" => CanonicalEvent::JobComplete { message },
        "error" => CanonicalEvent::JobError { message },
        _ => CanonicalEvent::Unknown { status },
    };
    Ok(event)
}

/// Pollutant keys are compared trimmed and lowercase; blank means absent.
fn normalize_pollutant(raw: &str) -> Option<String> {
    let key = raw.trim().to_ascii_lowercase();
    if key.is_empty() {
        None
    } else {
        Some(key)
    }
}

fn parse_percent(field: &'static str, value: Option<&Value>) -> Result<Option<u8>, ProtocolError> {
    let number = match value {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        Some(_) => None,
    };
    match number {
        Some(n) if n.is_finite() => Ok(Some(n.clamp(0.0, 100.0).round() as u8)),
        _ => Err(ProtocolError::NotANumber {
            field,
            value: value.map(ToString::to_string).unwrap_or_default(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_every_known_status() {
        let cases = [
            (r#"{"status":"start"}"#, "JobStart"),
            (r#"{"status":"begin","pollutant":"pm10"}"#, "ItemBegin"),
            (r#"{"status":"processing","pollutant":"pm10"}"#, "ItemProgress"),
            (r#"{"status":"progress","pollutant":"pm10"}"#, "ItemProgress"),
            (r#"{"status":"done","pollutant":"pm10"}"#, "ItemDone"),
            (r#"{"status":"complete"}"#, "JobComplete"),
            (r#"{"status":"error","message":"boom"}"#, "JobError"),
        ];
        for (raw, expected) in cases {
            let event = normalize(raw).unwrap();
            assert_eq!(format!("{:?}", event.kind()), expected, "payload {raw}");
        }
    }

    #[test]
    fn absent_fields_stay_unset() {
        let event = normalize(r#"{"status":"processing"}"#).unwrap();
        assert_eq!(
            event,
            CanonicalEvent::ItemProgress {
                pollutant: None,
                percent: None,
                overall: None,
                message: None,
            }
        );
    }

    #[test]
    fn explicit_zero_is_kept() {
        let event = normalize(r#"{"status":"progress","pollutant":"co","percent":0}"#).unwrap();
        assert!(matches!(
            event,
            CanonicalEvent::ItemProgress {
                percent: Some(0),
                ..
            }
        ));
    }

    #[test]
    fn progress_field_is_the_overall_percent() {
        let event =
            normalize(r#"{"status":"processing","pollutant":" PM25 ","progress":42.6}"#).unwrap();
        assert_eq!(
            event,
            CanonicalEvent::ItemProgress {
                pollutant: Some("pm25".to_string()),
                percent: None,
                overall: Some(43),
                message: None,
            }
        );
    }

    #[test]
    fn percentages_are_clamped() {
        let event = normalize(r#"{"status":"progress","percent":140,"overall":-3}"#).unwrap();
        assert!(matches!(
            event,
            CanonicalEvent::ItemProgress {
                percent: Some(100),
                overall: Some(0),
                ..
            }
        ));
    }

    #[test]
    fn numeric_strings_are_accepted() {
        let event = normalize(r#"{"status":"progress","percent":"12.4"}"#).unwrap();
        assert!(matches!(
            event,
            CanonicalEvent::ItemProgress {
                percent: Some(12),
                ..
            }
        ));
    }

    #[test]
    fn unknown_status_is_not_an_error() {
        let event = normalize(r#"{"status":"heartbeat"}"#).unwrap();
        assert_eq!(
            event,
            CanonicalEvent::Unknown {
                status: "heartbeat".to_string()
            }
        );
    }

    #[test]
    fn messages_pass_through_verbatim() {
        let event = normalize(r#"{"status":"complete","message":"  All done! "}"#).unwrap();
        assert_eq!(event.message(), Some("  All done! "));
    }

    #[test]
    fn malformed_payloads_are_protocol_errors() {
        assert!(matches!(
            normalize("not json"),
            Err(ProtocolError::Malformed(_))
        ));
        assert_eq!(
            normalize(r#"{"pollutant":"pm10"}"#),
            Err(ProtocolError::MissingStatus)
        );
        assert!(matches!(
            normalize(r#"{"status":"progress","percent":"lots"}"#),
            Err(ProtocolError::NotANumber {
                field: "percent",
                ..
            })
        ));
    }
}
