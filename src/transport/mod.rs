//! Transport abstraction for the log-sink RPC peer
//!
//! Separates the connection state machine from wire concerns:
//! - **TransportPeer**: how commands reach the server (send, call, close)
//! - **Connector**: how a peer is opened for one connect attempt
//! - **PeerEvent**: what the peer reports back (ready, error, push, closed)
//!
//! A peer runs its own I/O task and reports through the `events` channel of
//! `PeerChannels`. It must never call back into the connection while one of
//! its methods is running: the connection holds its state lock while
//! dispatching.
//!
//! # Adding a new transport
//!
//! 1. Create `transport/my_transport.rs`
//! 2. Implement `Connector` and `TransportPeer`
//! 3. Add `pub mod my_transport;` here

pub mod protocol;
pub mod websocket;

pub use websocket::WebSocketConnector;

use crate::constants::DEFAULT_SERVER_URL;
use crate::error::{Result, SinkError};
use crate::record::{LogRecord, QueryRequest, SetStream};
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::{mpsc, oneshot};

/// Completion slot of a request/response call
pub type ReplySender = oneshot::Sender<Result<Reply>>;

// =============================================================================
// Commands and replies
// =============================================================================

/// Command issued to the server
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Write one record (fire-and-forget or confirmed)
    Log(LogRecord),
    /// Register a live stream
    SetStream(SetStream),
    /// Remove a live stream by id
    UnsetStream(String),
    /// Remove every live stream of this client
    UnsetAllStreams,
    /// Historical query
    Query(QueryRequest),
    /// Ask which origins this user may read
    GetPermissions,
}

impl Command {
    /// Action name on the wire
    pub fn action(&self) -> &'static str {
        match self {
            Command::Log(_) => "log",
            Command::SetStream(_) => "setStream",
            Command::UnsetStream(_) => "unsetStream",
            Command::UnsetAllStreams => "unsetAllStreams",
            Command::Query(_) => "query",
            Command::GetPermissions => "getPermissions",
        }
    }
}

/// Result of a successful call
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// Call without a payload (log, setStream, unsetAllStreams)
    Done,
    /// Whether the stream existed on the server
    Unset(bool),
    Logs(Vec<LogRecord>),
    Permissions(Vec<String>),
}

impl Reply {
    pub(crate) fn unexpected(&self, action: &str) -> SinkError {
        SinkError::Protocol {
            message: format!("unexpected reply to {}: {:?}", action, self),
        }
    }
}

/// Record pushed by the server for a live stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamPush {
    pub id: String,
    pub include_extra: bool,
    pub log: LogRecord,
}

/// What a peer reports to its connection
#[derive(Debug)]
pub enum PeerEvent {
    /// Authenticated and ready for commands
    Ready,
    /// Non-fatal failure; the peer stays up unless `Closed` follows
    Error(SinkError),
    Push(StreamPush),
    /// Terminal; nothing follows
    Closed,
}

// =============================================================================
// Peer traits
// =============================================================================

/// Login sent when the peer opens
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user: String,
    pub password: String,
}

impl Credentials {
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &"***")
            .finish()
    }
}

/// Where and how to reach the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerOptions {
    /// Server URL (e.g. `ws://127.0.0.1:8018`)
    pub url: String,
}

impl Default for PeerOptions {
    fn default() -> Self {
        Self {
            url: DEFAULT_SERVER_URL.to_string(),
        }
    }
}

impl PeerOptions {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

/// A peer plus the channel it reports on
///
/// The channel ending without `PeerEvent::Closed` counts as a close.
pub struct PeerChannels {
    pub peer: Box<dyn TransportPeer>,
    pub events: mpsc::UnboundedReceiver<PeerEvent>,
}

/// Opaque RPC peer owned by one connection
pub trait TransportPeer: Send + Sync + 'static {
    /// Fire-and-forget message
    fn send(&self, command: Command);

    /// Request/response call; `reply` always completes, with
    /// `ConnectionClosed` if the peer goes away first
    fn call(&self, command: Command, reply: ReplySender);

    /// Ask the peer to shut down. `PeerEvent::Closed` follows.
    fn close(&self);
}

/// Factory for peers, injected into the connection at construction
///
/// Called from inside a tokio runtime; implementations spawn their I/O
/// task and return immediately.
pub trait Connector: Send + Sync + 'static {
    fn open(&self, options: &PeerOptions, credentials: Credentials) -> Result<PeerChannels>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_action_names() {
        assert_eq!(Command::UnsetStream("x".into()).action(), "unsetStream");
        assert_eq!(Command::UnsetAllStreams.action(), "unsetAllStreams");
        assert_eq!(Command::GetPermissions.action(), "getPermissions");
    }

    #[test]
    fn test_credentials_debug_hides_password() {
        let credentials = Credentials::new("test", "hunter2");
        let shown = format!("{:?}", credentials);
        assert!(shown.contains("test"));
        assert!(!shown.contains("hunter2"));
    }

    #[test]
    fn test_stream_push_from_wire() {
        let push: StreamPush = serde_json::from_value(json!({
            "id": "01H",
            "includeExtra": false,
            "log": {
                "origin": "test",
                "date": "2024-01-02T03:04:05Z",
                "name": "mocha",
                "level": 1,
                "relevance": 1
            }
        }))
        .unwrap();
        assert_eq!(push.id, "01H");
        assert_eq!(push.log.origin.as_deref(), Some("test"));
    }
}
