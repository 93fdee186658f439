//! Record validation, defaulting and byte capping
//!
//! Everything reaching the transport has been through `build`, so the
//! transport never has to validate a field itself.

use super::{Level, LogData, LogRecord, Relevance};
use crate::cloner::{Data, Handle, StructuralCloner};
use crate::constants::{MAX_MESSAGE_BYTES, MAX_NAME_BYTES};
use crate::error::{Result, SinkError};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::borrow::Cow;

static NULL: Value = Value::Null;

/// Per-connection values applied when a submission omits them
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordDefaults {
    pub relevance: Relevance,
    pub commit: Option<Vec<u8>>,
}

/// Message argument of the level helpers
#[derive(Debug, Clone, Default)]
pub enum Message {
    #[default]
    None,
    Text(String),
    /// Error value: its display string becomes the message and the prepared
    /// error becomes the extra data
    Error(Handle),
}

impl Message {
    /// Capture a Rust error (and its source chain) as a message
    pub fn from_error(error: &(dyn std::error::Error + 'static)) -> Self {
        Message::Error(Handle::from_error(error))
    }
}

impl From<&str> for Message {
    fn from(s: &str) -> Self {
        Message::Text(s.to_string())
    }
}

impl From<String> for Message {
    fn from(s: String) -> Self {
        Message::Text(s)
    }
}

impl From<Option<String>> for Message {
    fn from(s: Option<String>) -> Self {
        s.map(Message::Text).unwrap_or(Message::None)
    }
}

impl From<Handle> for Message {
    fn from(handle: Handle) -> Self {
        Message::Error(handle)
    }
}

/// Cap `s` to `max` bytes of UTF-8.
///
/// Truncation happens at a byte boundary and may split the last code point,
/// which is then decoded as U+FFFD. The tail matters less than bounding the
/// size the server indexes.
pub fn cap_byte_length(s: &str, max: usize) -> Cow<'_, str> {
    // UTF-8 length is known up front, no worst-case estimate needed
    if s.len() <= max {
        return Cow::Borrowed(s);
    }
    Cow::Owned(String::from_utf8_lossy(&s.as_bytes()[..max]).into_owned())
}

/// Apply defaults and byte caps, producing the record sent on the wire
pub fn build(data: LogData, defaults: &RecordDefaults, now: DateTime<Utc>) -> LogRecord {
    LogRecord {
        origin: None,
        date: data.date.unwrap_or(now),
        name: cap_byte_length(&data.name, MAX_NAME_BYTES).into_owned(),
        level: data.level,
        relevance: data.relevance.unwrap_or(defaults.relevance),
        time: data.time,
        message: data
            .message
            .map(|m| cap_byte_length(&m, MAX_MESSAGE_BYTES).into_owned()),
        commit: data.commit.unwrap_or_else(|| defaults.commit.clone()),
        extra: data.extra,
    }
}

/// Turn a level helper call into a submission.
///
/// An error message replaces `extra` with the prepared error; otherwise the
/// extra data is cloned into JSON-safe form.
pub fn compose(
    cloner: &StructuralCloner,
    level: Level,
    name: impl Into<String>,
    message: Message,
    extra: Option<&Data>,
) -> LogData {
    let mut data = LogData::new(name, level);
    match message {
        Message::Error(error) => {
            data.message = error.error_display();
            data.extra = cloner
                .prepare_error(&Data::Object(error))
                .ok()
                .filter(|v| !v.is_null());
        }
        Message::Text(text) => {
            data.message = Some(text);
            data.extra = extra.and_then(|e| cloner.clone_extra(e));
        }
        Message::None => {
            data.extra = extra.and_then(|e| cloner.clone_extra(e));
        }
    }
    data
}

// =============================================================================
// Loose JSON submissions
// =============================================================================

impl LogData {
    /// Parse a loosely-typed submission (e.g. from a script or the CLI).
    ///
    /// Field types are checked here so that malformed input fails before
    /// anything is queued. `null` on an optional field means "absent",
    /// except `commit` where it explicitly disables the default.
    pub fn from_json(value: &Value) -> Result<Self> {
        let obj = value.as_object().ok_or_else(|| {
            SinkError::invalid(
                "data",
                format!("Invalid log data, expected an object, got {}", value),
            )
        })?;
        let field = |key: &str| obj.get(key).unwrap_or(&NULL);

        let name = match field("name") {
            Value::String(s) => s.clone(),
            other => {
                return Err(SinkError::invalid(
                    "name",
                    format!("Invalid log name, expected a string, got {}", other),
                ))
            }
        };

        let level = field("level")
            .as_u64()
            .and_then(|n| u8::try_from(n).ok())
            .and_then(|n| Level::try_from(n).ok())
            .ok_or_else(|| {
                SinkError::invalid(
                    "level",
                    format!("Invalid log level, expected a number, got {}", field("level")),
                )
            })?;

        let date = match field("date") {
            Value::Null => None,
            Value::String(s) => Some(
                DateTime::parse_from_rfc3339(s)
                    .map(|d| d.with_timezone(&Utc))
                    .map_err(|_| {
                        SinkError::invalid(
                            "date",
                            format!("Invalid log date, expected a Date, got {}", s),
                        )
                    })?,
            ),
            other => {
                return Err(SinkError::invalid(
                    "date",
                    format!("Invalid log date, expected a Date, got {}", other),
                ))
            }
        };

        let relevance = match field("relevance") {
            Value::Null => None,
            other => Some(
                other
                    .as_u64()
                    .and_then(|n| u8::try_from(n).ok())
                    .and_then(|n| Relevance::try_from(n).ok())
                    .ok_or_else(|| {
                        SinkError::invalid(
                            "relevance",
                            format!("Invalid log relevance, expected a number, got {}", other),
                        )
                    })?,
            ),
        };

        let commit = match obj.get("commit") {
            None => None,
            Some(Value::Null) => Some(None),
            Some(Value::String(s)) => Some(Some(hex::decode(s).map_err(|_| {
                SinkError::invalid(
                    "commit",
                    format!("Invalid log commit, expected a Buffer, got {}", s),
                )
            })?)),
            Some(other) => {
                return Err(SinkError::invalid(
                    "commit",
                    format!("Invalid log commit, expected a Buffer, got {}", other),
                ))
            }
        };

        let time = match field("time") {
            Value::Null => None,
            other => Some(other.as_u64().ok_or_else(|| {
                SinkError::invalid(
                    "time",
                    format!("Invalid log time, expected a number, got {}", other),
                )
            })?),
        };

        let message = match field("message") {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => {
                return Err(SinkError::invalid(
                    "message",
                    format!("Invalid log message, expected a string, got {}", other),
                ))
            }
        };

        Ok(Self {
            name,
            level,
            date,
            relevance,
            commit,
            time,
            message,
            extra: obj.get("extra").filter(|v| !v.is_null()).cloned(),
        })
    }
}
