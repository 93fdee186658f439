//! Log record types
//!
//! - `Level` / `Relevance` - ordinals sent as unsigned integers
//! - `LogData` - what the application submits
//! - `LogRecord` - canonical record on the wire (and what reads return)
//! - `filter` - stream filters and queries
//! - `builder` - validation, defaulting and byte capping

pub mod builder;
pub mod filter;

pub use builder::{cap_byte_length, compose, Message, RecordDefaults};
pub use filter::{DateRange, Query, QueryOptions, QueryRequest, Range, SetStream, StreamFilter};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

// =============================================================================
// Ordinals
// =============================================================================

/// Severity of a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Level {
    Debug = 0,
    Info = 1,
    Warn = 2,
    Error = 3,
    Fatal = 4,
}

/// Importance of a record, independent from its severity
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(try_from = "u8", into = "u8")]
pub enum Relevance {
    Low = 0,
    #[default]
    Normal = 1,
    High = 2,
}

impl From<Level> for u8 {
    fn from(level: Level) -> Self {
        level as u8
    }
}

impl TryFrom<u8> for Level {
    type Error = String;

    // `Self::Error` would be ambiguous with the `Error` variant
    fn try_from(value: u8) -> Result<Self, String> {
        match value {
            0 => Ok(Level::Debug),
            1 => Ok(Level::Info),
            2 => Ok(Level::Warn),
            3 => Ok(Level::Error),
            4 => Ok(Level::Fatal),
            other => Err(format!("unknown level {}", other)),
        }
    }
}

impl From<Relevance> for u8 {
    fn from(relevance: Relevance) -> Self {
        relevance as u8
    }
}

impl TryFrom<u8> for Relevance {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Relevance::Low),
            1 => Ok(Relevance::Normal),
            2 => Ok(Relevance::High),
            other => Err(format!("unknown relevance {}", other)),
        }
    }
}

impl FromStr for Level {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "debug" => Ok(Level::Debug),
            "info" => Ok(Level::Info),
            "warn" | "warning" => Ok(Level::Warn),
            "error" => Ok(Level::Error),
            "fatal" => Ok(Level::Fatal),
            other => Err(format!("unknown level '{}'", other)),
        }
    }
}

impl FromStr for Relevance {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(Relevance::Low),
            "normal" => Ok(Relevance::Normal),
            "high" => Ok(Relevance::High),
            other => Err(format!("unknown relevance '{}'", other)),
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
            Level::Fatal => "FATAL",
        };
        f.write_str(name)
    }
}

// =============================================================================
// Records
// =============================================================================

/// A submission, before defaulting and capping
#[derive(Debug, Clone, PartialEq)]
pub struct LogData {
    pub name: String,
    pub level: Level,
    /// Defaults to the submission time
    pub date: Option<DateTime<Utc>>,
    /// Defaults to the connection's default relevance
    pub relevance: Option<Relevance>,
    /// `None` uses the connection default, `Some(None)` sends no commit
    pub commit: Option<Option<Vec<u8>>>,
    /// Elapsed-time marker in milliseconds
    pub time: Option<u64>,
    pub message: Option<String>,
    /// Must already be JSON-safe (see `StructuralCloner`)
    pub extra: Option<Value>,
}

impl LogData {
    pub fn new(name: impl Into<String>, level: Level) -> Self {
        Self {
            name: name.into(),
            level,
            date: None,
            relevance: None,
            commit: None,
            time: None,
            message: None,
            extra: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_extra(mut self, extra: Value) -> Self {
        self.extra = Some(extra);
        self
    }

    pub fn with_relevance(mut self, relevance: Relevance) -> Self {
        self.relevance = Some(relevance);
        self
    }

    pub fn with_time(mut self, time: u64) -> Self {
        self.time = Some(time);
        self
    }

    pub fn with_date(mut self, date: DateTime<Utc>) -> Self {
        self.date = Some(date);
        self
    }

    pub fn with_commit(mut self, commit: Option<Vec<u8>>) -> Self {
        self.commit = Some(commit);
        self
    }
}

/// Canonical log record
///
/// Writes never carry `origin`; the server fills it from the authenticated
/// identity on reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    pub date: DateTime<Utc>,
    pub name: String,
    pub level: Level,
    pub relevance: Relevance,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "commit_hex")]
    pub commit: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<Value>,
}

/// Commits travel as hex strings in JSON
pub(crate) mod commit_hex {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(commit: &Option<Vec<u8>>, s: S) -> Result<S::Ok, S::Error> {
        match commit {
            Some(bytes) => s.serialize_str(&hex::encode(bytes)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Vec<u8>>, D::Error> {
        match Option::<String>::deserialize(d)? {
            Some(text) => hex::decode(text)
                .map(Some)
                .map_err(serde::de::Error::custom),
            None => Ok(None),
        }
    }
}
