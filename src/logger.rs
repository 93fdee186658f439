//! Bound logger
//!
//! A `BoundLogger` fixes the record name (and optionally relevance and extra
//! data) and stamps every record with the milliseconds elapsed since its
//! clock started.

use crate::cloner::Data;
use crate::connection::Connection;
use crate::record::{compose, Level, Message, Relevance};
use serde_json::Value;
use std::time::Instant;

/// Logger bound to a name on a connection
#[derive(Debug, Clone)]
pub struct BoundLogger {
    connection: Connection,
    name: String,
    /// `None` uses the connection default at send time
    relevance: Option<Relevance>,
    extra: Option<Value>,
    started: Instant,
}

impl BoundLogger {
    pub(crate) fn new(
        connection: Connection,
        name: String,
        relevance: Option<Relevance>,
        extra: Option<Value>,
    ) -> Self {
        Self {
            connection,
            name,
            relevance,
            extra,
            started: Instant::now(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn relevance(&self) -> Option<Relevance> {
        self.relevance
    }

    /// Restart the elapsed-time clock
    pub fn restart_clock(&mut self) {
        self.started = Instant::now();
    }

    /// Milliseconds since the clock started
    pub fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    pub fn log(&self, level: Level, message: impl Into<Message>, extra: Option<Data>) {
        let cloner = self.connection.cloner();
        let mut data = compose(cloner, level, self.name.clone(), message.into(), extra.as_ref());
        data.relevance = self.relevance;
        data.time = Some(self.elapsed_ms());
        data.extra = merge_extra(self.extra.as_ref(), data.extra);
        self.connection.send_log(data);
    }

    pub fn debug(&self, message: impl Into<Message>, extra: Option<Data>) {
        self.log(Level::Debug, message, extra);
    }

    pub fn info(&self, message: impl Into<Message>, extra: Option<Data>) {
        self.log(Level::Info, message, extra);
    }

    pub fn warn(&self, message: impl Into<Message>, extra: Option<Data>) {
        self.log(Level::Warn, message, extra);
    }

    pub fn error(&self, message: impl Into<Message>, extra: Option<Data>) {
        self.log(Level::Error, message, extra);
    }

    pub fn fatal(&self, message: impl Into<Message>, extra: Option<Data>) {
        self.log(Level::Fatal, message, extra);
    }
}

/// Shallow merge when both sides are objects (call keys win), otherwise the
/// call extra, otherwise the bound one
fn merge_extra(bound: Option<&Value>, call: Option<Value>) -> Option<Value> {
    match (bound, call) {
        (Some(Value::Object(bound)), Some(Value::Object(call))) => {
            let mut merged = bound.clone();
            merged.extend(call);
            Some(Value::Object(merged))
        }
        (_, Some(call)) => Some(call),
        (bound, None) => bound.cloned(),
    }
}
