//! Wire payloads of the LKE event stream and their decoding into [`Event`].
//!
//! Decoding is lenient about fields: anything a handler does not need may be
//! missing, and identifiers or durations may arrive as numbers or strings.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::warn;

use crate::errors::StreamError;
use crate::framer::RawEvent;

/// Citation record announced mid-stream.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Reference {
    #[serde(deserialize_with = "lenient_string")]
    pub id: String,
    pub url: String,
    pub name: String,
    pub doc_name: String,
}

impl Reference {
    pub fn new(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            ..Self::default()
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Debugging {
    pub content: String,
}

/// A named reasoning sub-step reported by the backend.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Procedure {
    pub name: String,
    pub title: String,
    pub status: String,
    /// Milliseconds spent in this procedure so far.
    #[serde(deserialize_with = "lenient_f64")]
    pub elapsed: f64,
    pub debugging: Debugging,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ReferencePayload {
    pub references: Vec<Reference>,
    pub trace_id: String,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ThoughtPayload {
    pub procedures: Vec<Procedure>,
    pub trace_id: String,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ReplyPayload {
    /// Full reply text so far, not a delta.
    pub content: String,
    pub is_final: bool,
    pub is_from_self: bool,
    pub trace_id: String,
    pub record_id: String,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct TokenStatPayload {
    pub status_summary: String,
    pub status_summary_title: String,
    pub procedures: Vec<Procedure>,
    pub trace_id: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct UpstreamError {
    #[serde(deserialize_with = "lenient_string")]
    pub code: String,
    pub message: String,
}

impl From<UpstreamError> for StreamError {
    fn from(err: UpstreamError) -> Self {
        Self::Upstream {
            code: err.code,
            message: err.message,
        }
    }
}

/// One decoded event, tagged by the payload's own `type`.
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    Error(UpstreamError),
    Reference(ReferencePayload),
    Thought(ThoughtPayload),
    Reply(ReplyPayload),
    TokenStat(TokenStatPayload),
    Unsupported { event_type: String, data: Value },
}

impl Event {
    /// Wire name of the event type.
    pub fn type_name(&self) -> &str {
        match self {
            Self::Error(_) => "error",
            Self::Reference(_) => "reference",
            Self::Thought(_) => "thought",
            Self::Reply(_) => "reply",
            Self::TokenStat(_) => "token_stat",
            Self::Unsupported { event_type, .. } => event_type,
        }
    }
}

/// Decodes a framed payload into an [`Event`].
///
/// A declared type that disagrees with the payload's `type` is logged and the
/// payload's own type wins.
pub fn decode_event(raw: &RawEvent) -> Result<Event, StreamError> {
    let value: Value = serde_json::from_str(&raw.data)
        .map_err(|e| StreamError::malformed(format!("invalid event JSON: {e}"), &raw.data))?;
    let Some(event_type) = value.get("type").and_then(|v| v.as_str()) else {
        return Err(StreamError::malformed("event has no type", &raw.data));
    };
    if let Some(declared) = raw.declared_type.as_deref()
        && declared != event_type
    {
        let mismatch = StreamError::TypeMismatch {
            declared: declared.to_string(),
            actual: event_type.to_string(),
        };
        warn!(error = %mismatch, "event data not consistent with declared type");
    }

    let event = match event_type {
        "error" => Event::Error(field_or_default(&value, "error", &raw.data)?),
        "reference" => Event::Reference(field_or_default(&value, "payload", &raw.data)?),
        "thought" => Event::Thought(field_or_default(&value, "payload", &raw.data)?),
        "reply" => Event::Reply(field_or_default(&value, "payload", &raw.data)?),
        "token_stat" => Event::TokenStat(field_or_default(&value, "payload", &raw.data)?),
        other => Event::Unsupported {
            event_type: other.to_string(),
            data: value.clone(),
        },
    };
    Ok(event)
}

fn field_or_default<T: DeserializeOwned + Default>(
    value: &Value,
    field: &str,
    data: &str,
) -> Result<T, StreamError> {
    match value.get(field) {
        None | Some(Value::Null) => Ok(T::default()),
        Some(inner) => serde_json::from_value(inner.clone())
            .map_err(|e| StreamError::malformed(format!("invalid {field}: {e}"), data)),
    }
}

fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

fn lenient_f64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_f64().unwrap_or_default(),
        Value::String(s) => s.trim().parse().unwrap_or_default(),
        _ => 0.0,
    })
}
