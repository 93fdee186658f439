//! Stream filters and queries
//!
//! Filters are evaluated by the server. The client only fills in defaults
//! (origin, date window, relevance, limit) before sending them.

use super::{commit_hex, Relevance};
use crate::constants::{DEFAULT_QUERY_LIMIT, DEFAULT_QUERY_WINDOW_HOURS};
use crate::error::{Result, SinkError};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Inclusive numeric range; a missing bound is open
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Range {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<u64>,
}

impl Range {
    pub fn at_least(min: u64) -> Self {
        Self {
            min: Some(min),
            max: None,
        }
    }

    pub fn at_most(max: u64) -> Self {
        Self {
            min: None,
            max: Some(max),
        }
    }

    pub fn between(min: u64, max: u64) -> Self {
        Self {
            min: Some(min),
            max: Some(max),
        }
    }

    pub fn contains(&self, value: u64) -> bool {
        self.min.map_or(true, |min| value >= min) && self.max.map_or(true, |max| value <= max)
    }
}

/// Live stream filter
///
/// `origin` defaults to the connection user when left empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_regex: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<Range>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relevance: Option<Range>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<Range>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_regex: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "commit_hex")]
    pub commit: Option<Vec<u8>>,
}

/// Payload of the set-stream call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetStream {
    pub id: String,
    pub include_extra: bool,
    pub filter: StreamFilter,
}

/// Date window of a query
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DateRange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<DateTime<Utc>>,
}

impl DateRange {
    /// Window from `minutes` before `now`, open at the end.
    ///
    /// Fails on negative values and on windows reaching outside the range
    /// of representable dates.
    pub fn last_minutes(minutes: i64, now: DateTime<Utc>) -> Result<Self> {
        let out_of_range = || {
            SinkError::invalid(
                "minutes",
                format!("Invalid look-back of {} minutes", minutes),
            )
        };
        if minutes < 0 {
            return Err(out_of_range());
        }
        let min = Duration::try_minutes(minutes)
            .and_then(|window| now.checked_sub_signed(window))
            .ok_or_else(out_of_range)?;
        Ok(Self {
            min: Some(min),
            max: None,
        })
    }
}

/// Historical query
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Query {
    /// Defaults to the connection user
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    /// `min` defaults to 24 hours before the call
    #[serde(default)]
    pub date: DateRange,
    /// Defaults to the connection's default relevance
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relevance: Option<Relevance>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_regex: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<Range>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<Range>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_regex: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "commit_hex")]
    pub commit: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<Value>,
}

impl Query {
    /// Fill the date window and relevance defaults
    pub fn resolve(mut self, relevance: Relevance, now: DateTime<Utc>) -> Self {
        if self.date.min.is_none() {
            self.date.min = Some(now - Duration::hours(DEFAULT_QUERY_WINDOW_HOURS));
        }
        if self.relevance.is_none() {
            self.relevance = Some(relevance);
        }
        self
    }
}

/// Query options; skip and sort defaults belong to the server
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryOptions {
    #[serde(default)]
    pub include_extra: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<String>,
}

/// Payload of the query call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest {
    pub include_extra: bool,
    pub query: Query,
    pub limit: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<String>,
}

impl QueryRequest {
    pub fn new(query: Query, options: QueryOptions) -> Self {
        Self {
            include_extra: options.include_extra,
            query,
            limit: options.limit.unwrap_or(DEFAULT_QUERY_LIMIT),
            skip: options.skip,
            sort: options.sort,
        }
    }
}
