//! Signing provider webhook payloads.
//!
//! Payloads arrive as `{ "event_type": ..., "timestamp": ..., "data": { ... } }`. Recognised
//! event types are validated into [`SigningEvent`] variants; anything missing an identifier or a
//! usable timestamp is rejected as malformed. Unknown event types parse successfully as
//! [`SigningEvent::Unrecognized`] so the receiver can still acknowledge them.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use super::signing::ProviderCompletion;

pub const FORM_VIEWED: &str = "form.viewed";
pub const FORM_COMPLETED: &str = "form.completed";
pub const SUBMISSION_COMPLETED: &str = "submission.completed";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SigningEvent {
    FormViewed {
        submitter_id: String,
        viewed_at: DateTime<Utc>,
    },
    FormCompleted {
        submitter_id: String,
        submission_id: Option<String>,
        completion: ProviderCompletion,
    },
    SubmissionCompleted {
        submission_id: String,
        completed_at: DateTime<Utc>,
    },
    Unrecognized {
        event_type: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WebhookError {
    #[error("webhook body is not valid JSON: {0}")]
    InvalidJson(String),
    #[error("webhook body must be a JSON object")]
    NotAnObject,
    #[error("webhook body is missing event_type")]
    MissingEventType,
    #[error("{event_type} payload is missing {field}")]
    MissingField {
        event_type: &'static str,
        field: &'static str,
    },
    #[error("{field} is not an RFC 3339 timestamp: {value}")]
    InvalidTimestamp { field: &'static str, value: String },
}

impl SigningEvent {
    pub fn from_slice(body: &[u8]) -> Result<Self, WebhookError> {
        let value: Value =
            serde_json::from_slice(body).map_err(|err| WebhookError::InvalidJson(err.to_string()))?;
        Self::from_value(&value)
    }

    pub fn from_value(value: &Value) -> Result<Self, WebhookError> {
        let envelope = value.as_object().ok_or(WebhookError::NotAnObject)?;
        let event_type = envelope
            .get("event_type")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|kind| !kind.is_empty())
            .ok_or(WebhookError::MissingEventType)?;

        match event_type {
            FORM_VIEWED => {
                let data = data_of(envelope, FORM_VIEWED)?;
                Ok(SigningEvent::FormViewed {
                    submitter_id: required_id(data, "id", FORM_VIEWED, "data.id")?,
                    viewed_at: event_time(envelope, data, "opened_at", FORM_VIEWED)?,
                })
            }
            FORM_COMPLETED => {
                let data = data_of(envelope, FORM_COMPLETED)?;
                let completion = ProviderCompletion {
                    signature_url: first_document_url(data),
                    signer_ip: text(data, "ip"),
                    signer_user_agent: text(data, "ua"),
                    completed_at: event_time(envelope, data, "completed_at", FORM_COMPLETED)?,
                };
                Ok(SigningEvent::FormCompleted {
                    submitter_id: required_id(data, "id", FORM_COMPLETED, "data.id")?,
                    submission_id: identifier(data.get("submission_id")).or_else(|| {
                        identifier(data.get("submission").and_then(|s| s.get("id")))
                    }),
                    completion,
                })
            }
            SUBMISSION_COMPLETED => {
                let data = data_of(envelope, SUBMISSION_COMPLETED)?;
                Ok(SigningEvent::SubmissionCompleted {
                    submission_id: required_id(data, "id", SUBMISSION_COMPLETED, "data.id")?,
                    completed_at: event_time(
                        envelope,
                        data,
                        "completed_at",
                        SUBMISSION_COMPLETED,
                    )?,
                })
            }
            other => Ok(SigningEvent::Unrecognized {
                event_type: other.to_string(),
            }),
        }
    }

    pub fn event_type(&self) -> &str {
        match self {
            SigningEvent::FormViewed { .. } => FORM_VIEWED,
            SigningEvent::FormCompleted { .. } => FORM_COMPLETED,
            SigningEvent::SubmissionCompleted { .. } => SUBMISSION_COMPLETED,
            SigningEvent::Unrecognized { event_type } => event_type,
        }
    }
}

fn data_of<'a>(
    envelope: &'a Map<String, Value>,
    event_type: &'static str,
) -> Result<&'a Map<String, Value>, WebhookError> {
    envelope
        .get("data")
        .and_then(Value::as_object)
        .ok_or(WebhookError::MissingField {
            event_type,
            field: "data",
        })
}

/// Provider identifiers may be numeric or string.
fn identifier(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn required_id(
    data: &Map<String, Value>,
    key: &str,
    event_type: &'static str,
    field: &'static str,
) -> Result<String, WebhookError> {
    identifier(data.get(key)).ok_or(WebhookError::MissingField { event_type, field })
}

fn text(data: &Map<String, Value>, key: &str) -> Option<String> {
    data.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn first_document_url(data: &Map<String, Value>) -> Option<String> {
    data.get("documents")
        .and_then(Value::as_array)
        .and_then(|documents| documents.first())
        .and_then(|document| document.get("url"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Event-specific timestamp first, then the envelope timestamp.
fn event_time(
    envelope: &Map<String, Value>,
    data: &Map<String, Value>,
    key: &'static str,
    event_type: &'static str,
) -> Result<DateTime<Utc>, WebhookError> {
    let (field, raw) = match text(data, key) {
        Some(raw) => (key, raw),
        None => match text(envelope, "timestamp") {
            Some(raw) => ("timestamp", raw),
            None => {
                return Err(WebhookError::MissingField {
                    event_type,
                    field: "timestamp",
                })
            }
        },
    };
    DateTime::parse_from_rfc3339(&raw)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|_| WebhookError::InvalidTimestamp { field, value: raw })
}
