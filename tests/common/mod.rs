//! Mock transports shared by the integration tests
//!
//! - `MockRemote`: records every command, the test drives ready/close/push
//!   and answers calls by hand
//! - `Loopback`: in-process server that stores logs, serves streams,
//!   queries and permissions, and is ready as soon as it opens

#![allow(dead_code)]

use log_sink::error::{Result, SinkError};
use log_sink::record::{LogRecord, SetStream};
use log_sink::transport::{
    Command, Connector, Credentials, PeerChannels, PeerEvent, PeerOptions, Reply, ReplySender,
    StreamPush, TransportPeer,
};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Upper bound for anything a test waits on
pub const WAIT: Duration = Duration::from_secs(2);

/// Await `future` or fail the test after `WAIT`
pub async fn within<F: Future>(future: F) -> F::Output {
    tokio::time::timeout(WAIT, future)
        .await
        .expect("timed out")
}

// =============================================================================
// Scripted remote
// =============================================================================

/// How a command reached the peer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Via {
    Send,
    Call,
}

#[derive(Default)]
pub struct MockRemote {
    dispatched: Mutex<Vec<(Via, Command)>>,
    replies: Mutex<VecDeque<(Command, ReplySender)>>,
    events: Mutex<Option<mpsc::UnboundedSender<PeerEvent>>>,
    credentials: Mutex<Option<Credentials>>,
    opened: AtomicUsize,
    close_requests: AtomicUsize,
}

impl MockRemote {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn connector(self: &Arc<Self>) -> MockConnector {
        MockConnector(self.clone())
    }

    fn emit(&self, event: PeerEvent) {
        let events = self.events.lock();
        events
            .as_ref()
            .expect("peer not opened")
            .send(event)
            .expect("pump gone");
    }

    pub fn ready(&self) {
        self.emit(PeerEvent::Ready);
    }

    pub fn closed(&self) {
        self.emit(PeerEvent::Closed);
    }

    pub fn error(&self, message: &str) {
        self.emit(PeerEvent::Error(SinkError::Remote {
            message: message.to_string(),
        }));
    }

    pub fn push(&self, id: &str, log: LogRecord) {
        self.emit(PeerEvent::Push(StreamPush {
            id: id.to_string(),
            include_extra: false,
            log,
        }));
    }

    /// Drop the event channel without a close event
    pub fn hang_up(&self) {
        self.events.lock().take();
    }

    pub fn dispatched(&self) -> Vec<(Via, Command)> {
        self.dispatched.lock().clone()
    }

    pub fn actions(&self) -> Vec<&'static str> {
        self.dispatched
            .lock()
            .iter()
            .map(|(_, c)| c.action())
            .collect()
    }

    /// Messages of the dispatched logs, in dispatch order
    pub fn log_messages(&self) -> Vec<String> {
        self.dispatched
            .lock()
            .iter()
            .filter_map(|(_, c)| match c {
                Command::Log(record) => record.message.clone(),
                _ => None,
            })
            .collect()
    }

    /// Answer the oldest unanswered call
    pub fn answer(&self, result: Result<Reply>) -> Command {
        let (command, reply) = self
            .replies
            .lock()
            .pop_front()
            .expect("no call waiting for a reply");
        let _ = reply.send(result);
        command
    }

    pub fn waiting_calls(&self) -> usize {
        self.replies.lock().len()
    }

    pub fn credentials(&self) -> Option<Credentials> {
        self.credentials.lock().clone()
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn close_requests(&self) -> usize {
        self.close_requests.load(Ordering::SeqCst)
    }
}

#[derive(Clone)]
pub struct MockConnector(Arc<MockRemote>);

impl Connector for MockConnector {
    fn open(&self, _options: &PeerOptions, credentials: Credentials) -> Result<PeerChannels> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.0.events.lock() = Some(tx);
        *self.0.credentials.lock() = Some(credentials);
        self.0.opened.fetch_add(1, Ordering::SeqCst);
        Ok(PeerChannels {
            peer: Box::new(MockPeer(self.0.clone())),
            events: rx,
        })
    }
}

struct MockPeer(Arc<MockRemote>);

impl TransportPeer for MockPeer {
    fn send(&self, command: Command) {
        self.0.dispatched.lock().push((Via::Send, command));
    }

    fn call(&self, command: Command, reply: ReplySender) {
        self.0.dispatched.lock().push((Via::Call, command.clone()));
        self.0.replies.lock().push_back((command, reply));
    }

    fn close(&self) {
        self.0.close_requests.fetch_add(1, Ordering::SeqCst);
    }
}

// =============================================================================
// Loopback server
// =============================================================================

struct LoopbackState {
    logs: Vec<LogRecord>,
    streams: Vec<SetStream>,
}

/// In-process server shared by every peer it opens
#[derive(Clone)]
pub struct Loopback {
    state: Arc<Mutex<LoopbackState>>,
    peers: Arc<Mutex<Vec<mpsc::UnboundedSender<PeerEvent>>>>,
}

impl Loopback {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(LoopbackState {
                logs: Vec::new(),
                streams: Vec::new(),
            })),
            peers: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn stored(&self) -> Vec<LogRecord> {
        self.state.lock().logs.clone()
    }

    pub fn stream_count(&self) -> usize {
        self.state.lock().streams.len()
    }
}

impl Connector for Loopback {
    fn open(&self, _options: &PeerOptions, credentials: Credentials) -> Result<PeerChannels> {
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(PeerEvent::Ready).expect("receiver alive");
        self.peers.lock().push(tx.clone());
        Ok(PeerChannels {
            peer: Box::new(LoopbackPeer {
                server: self.clone(),
                user: credentials.user,
                events: tx,
            }),
            events: rx,
        })
    }
}

struct LoopbackPeer {
    server: Loopback,
    user: String,
    events: mpsc::UnboundedSender<PeerEvent>,
}

impl LoopbackPeer {
    fn store(&self, mut record: LogRecord) {
        record.origin = Some(self.user.clone());
        let mut state = self.server.state.lock();
        for set in &state.streams {
            if matches(set, &record) {
                let mut log = record.clone();
                if !set.include_extra {
                    log.extra = None;
                }
                let push = StreamPush {
                    id: set.id.clone(),
                    include_extra: set.include_extra,
                    log,
                };
                for peer in self.server.peers.lock().iter() {
                    let _ = peer.send(PeerEvent::Push(push.clone()));
                }
            }
        }
        state.logs.push(record);
    }

    fn execute(&self, command: Command) -> Result<Reply> {
        match command {
            Command::Log(record) => {
                self.store(record);
                Ok(Reply::Done)
            }
            Command::SetStream(set) => {
                self.server.state.lock().streams.push(set);
                Ok(Reply::Done)
            }
            Command::UnsetStream(id) => {
                let mut state = self.server.state.lock();
                let before = state.streams.len();
                state.streams.retain(|s| s.id != id);
                Ok(Reply::Unset(state.streams.len() != before))
            }
            Command::UnsetAllStreams => {
                self.server.state.lock().streams.clear();
                Ok(Reply::Done)
            }
            Command::Query(request) => {
                let state = self.server.state.lock();
                let query = &request.query;
                let logs = state
                    .logs
                    .iter()
                    .filter(|r| query.origin.is_none() || r.origin == query.origin)
                    .filter(|r| query.name.as_ref().map_or(true, |n| &r.name == n))
                    .filter(|r| query.date.min.map_or(true, |min| r.date >= min))
                    .filter(|r| query.relevance.map_or(true, |rel| r.relevance >= rel))
                    .take(request.limit as usize)
                    .cloned()
                    .map(|mut r| {
                        if !request.include_extra {
                            r.extra = None;
                        }
                        r
                    })
                    .collect();
                Ok(Reply::Logs(logs))
            }
            Command::GetPermissions => Ok(Reply::Permissions(vec![
                self.user.clone(),
                "test2".to_string(),
            ])),
        }
    }
}

fn matches(set: &SetStream, record: &LogRecord) -> bool {
    let filter = &set.filter;
    (filter.origin.is_none() || filter.origin == record.origin)
        && filter.name.as_ref().map_or(true, |n| &record.name == n)
        && filter
            .level
            .map_or(true, |range| range.contains(u8::from(record.level).into()))
}

impl TransportPeer for LoopbackPeer {
    fn send(&self, command: Command) {
        let _ = self.execute(command);
    }

    fn call(&self, command: Command, reply: ReplySender) {
        let _ = reply.send(self.execute(command));
    }

    fn close(&self) {
        let _ = self.events.send(PeerEvent::Closed);
    }
}
