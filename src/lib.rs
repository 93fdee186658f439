//! Log-sink client library
//!
//! Emits structured log records to a log-sink server, subscribes to live
//! filtered feeds and runs historical queries over one connection.
//!
//! Modules:
//! - `connection` - state machine, pre-connect buffer, command API
//! - `stream` - live log streams multiplexed by id
//! - `logger` - name-bound logger with an elapsed-time clock
//! - `record` - record types, validation and byte capping
//! - `cloner` - cycle-safe, depth-bounded conversion to JSON
//! - `events` - typed notifiers
//! - `transport` - peer abstraction, WebSocket peer and wire protocol
//! - `config` / `cli` / `logging` - command-line tool support
//!
//! ```ignore
//! let connection = Connection::new(WebSocketConnector::new());
//! connection.connect("user", "password", &PeerOptions::default())?;
//! connection.info("deploy", "started", None);
//! let logs = connection.query(Query::default(), QueryOptions::default()).await?;
//! ```

pub mod cli;
pub mod cloner;
pub mod config;
pub mod connection;
pub mod constants;
pub mod error;
pub mod events;
pub mod logger;
pub mod logging;
pub mod record;
pub mod stream;
pub mod transport;

pub use cloner::{Data, Handle, StructuralCloner};
pub use connection::{Connection, ConnectionEvents, ConnectionState, Pending};
pub use error::{Result, SinkError};
pub use logger::BoundLogger;
pub use record::{
    Level, LogData, LogRecord, Message, Query, QueryOptions, Range, Relevance, StreamFilter,
};
pub use stream::LogStream;
pub use transport::{PeerOptions, WebSocketConnector};
