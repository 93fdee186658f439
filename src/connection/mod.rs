//! Connection state machine
//!
//! A `Connection` accepts commands in any state:
//!
//! - `Uninitialized` / `Connecting`: commands are buffered in submission order
//! - `Connected`: commands go straight to the peer
//! - `Closed`: confirmed commands fail with `ConnectionClosed`, others are
//!   dropped
//!
//! On the peer's ready signal the buffer is swapped out and flushed under the
//! state lock, so a command submitted concurrently is always dispatched after
//! every buffered one. Peer events are handled by a pump task spawned at
//! `connect`.

mod dispatch;
mod pending;

pub use pending::Pending;

use crate::cloner::{Data, StructuralCloner};
use crate::error::{Result, SinkError};
use crate::events::Notifier;
use crate::logger::BoundLogger;
use crate::record::builder::build;
use crate::record::{
    compose, Level, LogData, LogRecord, Message, Query, QueryOptions, QueryRequest, RecordDefaults,
    Relevance, SetStream, StreamFilter,
};
use crate::stream::LogStream;
use crate::transport::{
    Command, Connector, Credentials, PeerEvent, PeerOptions, Reply, ReplySender, StreamPush,
    TransportPeer,
};
use chrono::Utc;
use dispatch::dispatch;
use parking_lot::Mutex;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Weak};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

// =============================================================================
// State and notifications
// =============================================================================

/// Readiness of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Uninitialized = 0,
    Connecting = 1,
    Connected = 2,
    Closed = 4,
}

/// Notifications of a connection
#[derive(Default)]
pub struct ConnectionEvents {
    /// `connect` was called
    pub connecting: Notifier<()>,
    /// The peer is ready; the buffer has been flushed
    pub connect: Notifier<()>,
    /// Peer or server error; the state does not change
    pub error: Notifier<Arc<SinkError>>,
    /// Terminal; nothing is sent afterwards
    pub close: Notifier<()>,
    /// Raw stream pushes, filtered by id in each `LogStream`
    pub(crate) push: Notifier<StreamPush>,
}

struct Inner {
    state: ConnectionState,
    user: String,
    defaults: RecordDefaults,
    pending: Vec<(Command, Option<ReplySender>)>,
    peer: Option<Arc<dyn TransportPeer>>,
    /// `close` was requested while connecting
    close_on_ready: bool,
}

pub(crate) struct Shared {
    connector: Arc<dyn Connector>,
    inner: Mutex<Inner>,
    pub(crate) events: ConnectionEvents,
    cloner: StructuralCloner,
}

/// Handle to a log-sink connection
///
/// Cheap to clone; every clone drives the same connection.
#[derive(Clone)]
pub struct Connection {
    shared: Arc<Shared>,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.shared.inner.lock();
        f.debug_struct("Connection")
            .field("state", &inner.state)
            .field("user", &inner.user)
            .field("buffered", &inner.pending.len())
            .finish()
    }
}

impl Connection {
    pub fn new(connector: impl Connector) -> Self {
        Self::with_cloner(connector, StructuralCloner::new())
    }

    /// Connection preparing extra data with a custom cloner
    pub fn with_cloner(connector: impl Connector, cloner: StructuralCloner) -> Self {
        Self {
            shared: Arc::new(Shared {
                connector: Arc::new(connector),
                inner: Mutex::new(Inner {
                    state: ConnectionState::Uninitialized,
                    user: String::new(),
                    defaults: RecordDefaults::default(),
                    pending: Vec::new(),
                    peer: None,
                    close_on_ready: false,
                }),
                events: ConnectionEvents::default(),
                cloner,
            }),
        }
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Open the peer and start buffering until it is ready.
    ///
    /// Valid from `Uninitialized` or `Closed`. Must be called from inside a
    /// tokio runtime.
    pub fn connect(
        &self,
        user: impl Into<String>,
        password: impl Into<String>,
        options: &PeerOptions,
    ) -> Result<()> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| SinkError::NoRuntime)?;
        let user = user.into();

        {
            let mut inner = self.shared.inner.lock();
            match inner.state {
                ConnectionState::Uninitialized | ConnectionState::Closed => {}
                _ => {
                    return Err(SinkError::InvalidState {
                        message: "already initialized",
                    })
                }
            }
            inner.state = ConnectionState::Connecting;
            inner.user = user.clone();
        }
        debug!("Connecting to {} as {}", options.url, user);
        self.shared.events.connecting.emit(&());

        let channels = match self
            .shared
            .connector
            .open(options, Credentials::new(user, password))
        {
            Ok(channels) => channels,
            Err(e) => {
                warn!("Cannot open peer: {}", e);
                self.shared.on_closed();
                return Err(e);
            }
        };

        self.shared.inner.lock().peer = Some(Arc::from(channels.peer));
        runtime.spawn(pump(Arc::downgrade(&self.shared), channels.events));
        Ok(())
    }

    /// Close the connection
    pub fn close(&self) -> Result<()> {
        self.close_inner(None)
    }

    /// Close the connection and run `on_closed` once it is closed.
    ///
    /// While connecting, the close waits for the peer to become ready. On an
    /// already closed connection this is a no-op and `on_closed` never runs.
    pub fn close_then<F>(&self, on_closed: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.close_inner(Some(Box::new(on_closed)))
    }

    fn close_inner(&self, on_closed: Option<Box<dyn FnOnce() + Send>>) -> Result<()> {
        let mut inner = self.shared.inner.lock();
        let register = |on_closed: Option<Box<dyn FnOnce() + Send>>| {
            if let Some(on_closed) = on_closed {
                self.shared.events.close.once(move |_| on_closed());
            }
        };

        match inner.state {
            ConnectionState::Uninitialized => Err(SinkError::InvalidState {
                message: "can not close, connection is uninitialized",
            }),
            ConnectionState::Closed => Ok(()),
            ConnectionState::Connecting => {
                debug!("Close deferred until connected");
                register(on_closed);
                inner.close_on_ready = true;
                Ok(())
            }
            ConnectionState::Connected => {
                register(on_closed);
                let peer = inner.peer.clone();
                drop(inner);
                if let Some(peer) = peer {
                    peer.close();
                }
                Ok(())
            }
        }
    }

    /// Neutralize a connection.
    ///
    /// A connection that was never connected goes straight to `Closed`
    /// without opening a peer, failing whatever was buffered. Otherwise same
    /// as `close`.
    pub fn disable(&self) {
        let uninitialized = self.shared.inner.lock().state == ConnectionState::Uninitialized;
        if uninitialized {
            debug!("Disabling unused connection");
            self.shared.on_closed();
        } else {
            let _ = self.close();
        }
    }

    /// Resolves once the connection is closed (immediately if it already is).
    ///
    /// Dropping the future before it resolves removes its listener.
    pub fn closed(&self) -> impl Future<Output = ()> + Send + 'static {
        let inner = self.shared.inner.lock();
        let wait = match inner.state {
            ConnectionState::Closed => None,
            _ => Some(self.shared.events.close.wait()),
        };
        drop(inner);

        async move {
            if let Some(wait) = wait {
                wait.await;
            }
        }
    }

    // =========================================================================
    // Commands
    // =========================================================================

    /// Single entry point for every command.
    ///
    /// `reply` receives the outcome of a call; without it, logs are sent as
    /// fire-and-forget messages and other results are discarded.
    pub fn submit(&self, command: Command, reply: Option<ReplySender>) {
        let mut inner = self.shared.inner.lock();
        match inner.state {
            ConnectionState::Uninitialized | ConnectionState::Connecting => {
                inner.pending.push((command, reply));
            }
            ConnectionState::Connected => match inner.peer.clone() {
                Some(peer) => dispatch(peer.as_ref(), &inner.user, command, reply),
                None => fail(command, reply),
            },
            ConnectionState::Closed => {
                drop(inner);
                fail(command, reply);
            }
        }
    }

    fn request<T, F>(&self, command: Command, convert: F) -> Pending<T>
    where
        F: FnOnce(Reply) -> Result<T> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        self.submit(command, Some(tx));
        Pending::new(rx, move |result| result.and_then(convert))
    }

    /// Write a record without waiting for the server
    pub fn send_log(&self, data: LogData) {
        let record = self.build(data);
        self.submit(Command::Log(record), None);
    }

    /// Write a record and get the server's confirmation
    pub fn send_log_confirmed(&self, data: LogData) -> Pending<()> {
        let record = self.build(data);
        self.request(Command::Log(record), |reply| match reply {
            Reply::Done => Ok(()),
            other => Err(other.unexpected("log")),
        })
    }

    fn build(&self, data: LogData) -> LogRecord {
        let defaults = self.shared.inner.lock().defaults.clone();
        build(data, &defaults, Utc::now())
    }

    /// Log with an explicit level.
    ///
    /// An error message becomes the record message (its display string) and
    /// replaces `extra` with the prepared error.
    pub fn log(
        &self,
        level: Level,
        name: impl Into<String>,
        message: impl Into<Message>,
        extra: Option<Data>,
    ) {
        let data = compose(
            &self.shared.cloner,
            level,
            name,
            message.into(),
            extra.as_ref(),
        );
        self.send_log(data);
    }

    pub fn debug(
        &self,
        name: impl Into<String>,
        message: impl Into<Message>,
        extra: Option<Data>,
    ) {
        self.log(Level::Debug, name, message, extra);
    }

    pub fn info(
        &self,
        name: impl Into<String>,
        message: impl Into<Message>,
        extra: Option<Data>,
    ) {
        self.log(Level::Info, name, message, extra);
    }

    pub fn warn(
        &self,
        name: impl Into<String>,
        message: impl Into<Message>,
        extra: Option<Data>,
    ) {
        self.log(Level::Warn, name, message, extra);
    }

    pub fn error(
        &self,
        name: impl Into<String>,
        message: impl Into<Message>,
        extra: Option<Data>,
    ) {
        self.log(Level::Error, name, message, extra);
    }

    pub fn fatal(
        &self,
        name: impl Into<String>,
        message: impl Into<Message>,
        extra: Option<Data>,
    ) {
        self.log(Level::Fatal, name, message, extra);
    }

    /// Subscribe to the live records matching `filter`.
    ///
    /// The filter origin defaults to the connection user.
    pub fn stream(&self, filter: StreamFilter, include_extra: bool) -> Pending<LogStream> {
        // Registered before set-stream goes out so no early push is missed
        let stream = LogStream::open(self.clone(), include_extra);
        let command = Command::SetStream(SetStream {
            id: stream.id().to_string(),
            include_extra,
            filter,
        });

        let (tx, rx) = oneshot::channel();
        self.submit(command, Some(tx));
        Pending::new(rx, move |result| match result {
            Ok(Reply::Done) => Ok(stream),
            Ok(other) => {
                stream.abandon();
                Err(other.unexpected("setStream"))
            }
            Err(e) => {
                stream.abandon();
                Err(e)
            }
        })
    }

    /// Remove every live stream of this client on the server
    pub fn unset_all_streams(&self) -> Pending<()> {
        self.request(Command::UnsetAllStreams, |reply| match reply {
            Reply::Done => Ok(()),
            other => Err(other.unexpected("unsetAllStreams")),
        })
    }

    /// Run a historical query.
    ///
    /// Defaults: records of the last 24 hours, origin the connection user,
    /// relevance the connection default, 100 results without extra data.
    pub fn query(&self, query: Query, options: QueryOptions) -> Pending<Vec<LogRecord>> {
        // Origin is filled from the user at dispatch time
        let query = query.resolve(self.default_relevance(), Utc::now());
        self.request(
            Command::Query(QueryRequest::new(query, options)),
            |reply| match reply {
                Reply::Logs(logs) => Ok(logs),
                other => Err(other.unexpected("query")),
            },
        )
    }

    /// Origins this user may read
    pub fn get_permissions(&self) -> Pending<Vec<String>> {
        self.request(Command::GetPermissions, |reply| match reply {
            Reply::Permissions(permissions) => Ok(permissions),
            other => Err(other.unexpected("getPermissions")),
        })
    }

    // =========================================================================
    // Loggers and settings
    // =========================================================================

    /// Logger bound to `name`, using the connection's default relevance
    pub fn bind(&self, name: impl Into<String>) -> BoundLogger {
        BoundLogger::new(self.clone(), name.into(), None, None)
    }

    /// Logger bound to `name`, `relevance` and extra data merged into every
    /// record
    pub fn logger(
        &self,
        name: impl Into<String>,
        relevance: Relevance,
        extra: Option<Data>,
    ) -> BoundLogger {
        let extra = extra.and_then(|e| self.shared.cloner.clone_extra(&e));
        BoundLogger::new(self.clone(), name.into(), Some(relevance), extra)
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.inner.lock().state
    }

    /// User given to the last `connect` (empty before)
    pub fn user(&self) -> String {
        self.shared.inner.lock().user.clone()
    }

    pub fn default_relevance(&self) -> Relevance {
        self.shared.inner.lock().defaults.relevance
    }

    pub fn set_default_relevance(&self, relevance: Relevance) {
        self.shared.inner.lock().defaults.relevance = relevance;
    }

    pub fn default_commit(&self) -> Option<Vec<u8>> {
        self.shared.inner.lock().defaults.commit.clone()
    }

    /// Commit attached to records that do not set one
    pub fn set_default_commit(&self, commit: Option<Vec<u8>>) {
        self.shared.inner.lock().defaults.commit = commit;
    }

    pub fn events(&self) -> &ConnectionEvents {
        &self.shared.events
    }

    pub fn cloner(&self) -> &StructuralCloner {
        &self.shared.cloner
    }

    pub(crate) fn shared(&self) -> &Arc<Shared> {
        &self.shared
    }
}

fn fail(command: Command, reply: Option<ReplySender>) {
    match reply {
        Some(reply) => {
            let _ = reply.send(Err(SinkError::ConnectionClosed));
        }
        None => debug!("Connection closed, {} dropped", command.action()),
    }
}

// =============================================================================
// Peer events
// =============================================================================

impl Shared {
    fn on_ready(&self) {
        let close_peer = {
            let mut inner = self.inner.lock();
            if inner.state != ConnectionState::Connecting {
                return;
            }
            inner.state = ConnectionState::Connected;

            let buffered = std::mem::take(&mut inner.pending);
            if let Some(peer) = inner.peer.clone() {
                debug!("Flushing {} buffered commands", buffered.len());
                for (command, reply) in buffered {
                    dispatch(peer.as_ref(), &inner.user, command, reply);
                }
            }

            if std::mem::take(&mut inner.close_on_ready) {
                inner.peer.clone()
            } else {
                None
            }
        };

        info!("Connected");
        self.events.connect.emit(&());

        if let Some(peer) = close_peer {
            debug!("Running deferred close");
            peer.close();
        }
    }

    fn on_error(&self, error: SinkError) {
        warn!("Connection error: {}", error);
        self.events.error.emit(&Arc::new(error));
    }

    pub(crate) fn on_closed(&self) {
        let buffered = {
            let mut inner = self.inner.lock();
            if inner.state == ConnectionState::Closed {
                return;
            }
            inner.state = ConnectionState::Closed;
            inner.peer = None;
            inner.close_on_ready = false;
            std::mem::take(&mut inner.pending)
        };

        if !buffered.is_empty() {
            warn!("Connection closed with {} buffered commands", buffered.len());
        }
        for (command, reply) in buffered {
            fail(command, reply);
        }

        info!("Connection closed");
        self.events.close.emit(&());
    }
}

async fn pump(shared: Weak<Shared>, mut events: mpsc::UnboundedReceiver<PeerEvent>) {
    while let Some(event) = events.recv().await {
        let Some(conn) = shared.upgrade() else {
            return;
        };
        match event {
            PeerEvent::Ready => conn.on_ready(),
            PeerEvent::Error(e) => conn.on_error(e),
            PeerEvent::Push(push) => {
                conn.events.push.emit(&push);
            }
            PeerEvent::Closed => {
                conn.on_closed();
                return;
            }
        }
    }

    // Channel ended without an explicit close
    if let Some(conn) = shared.upgrade() {
        conn.on_closed();
    }
}
