//! WebSocket peer
//!
//! Connects to the log-sink server, authenticates with the first frame and
//! relays commands and server frames:
//!
//! ```text
//! Connection ──Outbound──► peer task ──JSON frames──► log-sink server
//!     ▲                        │
//!     └──────PeerEvent─────────┘
//! ```
//!
//! One connect attempt per peer. A failed attempt reports `Error` then
//! `Closed`. Calls still in flight when the socket ends fail with
//! `ConnectionClosed`.

use super::protocol::{decode_reply, ClientFrame, ServerFrame};
use super::{
    Command, Connector, Credentials, PeerChannels, PeerEvent, PeerOptions, ReplySender,
    TransportPeer,
};
use crate::error::{Result, SinkError};
use futures_util::{SinkExt, StreamExt};
use std::collections::HashMap;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

/// Opens `WebSocketPeer`s
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketConnector;

impl WebSocketConnector {
    pub fn new() -> Self {
        Self
    }
}

impl Connector for WebSocketConnector {
    fn open(&self, options: &PeerOptions, credentials: Credentials) -> Result<PeerChannels> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| SinkError::NoRuntime)?;

        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        runtime.spawn(run_peer(options.url.clone(), credentials, out_rx, event_tx));

        Ok(PeerChannels {
            peer: Box::new(WebSocketPeer { tx: out_tx }),
            events: event_rx,
        })
    }
}

/// Work handed to the peer task
enum Outbound {
    Send(Command),
    Call(Command, ReplySender),
    Close,
}

/// Handle to a running peer task
pub struct WebSocketPeer {
    tx: mpsc::UnboundedSender<Outbound>,
}

impl TransportPeer for WebSocketPeer {
    fn send(&self, command: Command) {
        if self.tx.send(Outbound::Send(command)).is_err() {
            debug!("WebSocket peer gone, message dropped");
        }
    }

    fn call(&self, command: Command, reply: ReplySender) {
        // A dropped reply sender surfaces as ConnectionClosed to the caller
        let _ = self.tx.send(Outbound::Call(command, reply));
    }

    fn close(&self) {
        let _ = self.tx.send(Outbound::Close);
    }
}

/// Calls awaiting a reply, keyed by call id
type PendingCalls = HashMap<u64, (&'static str, ReplySender)>;

async fn run_peer(
    url: String,
    credentials: Credentials,
    mut out_rx: mpsc::UnboundedReceiver<Outbound>,
    events: mpsc::UnboundedSender<PeerEvent>,
) {
    let mut pending = PendingCalls::new();

    match session(&url, credentials, &mut out_rx, &events, &mut pending).await {
        Ok(()) => info!("Disconnected from {}", url),
        Err(e) => {
            warn!("WebSocket peer for {} failed: {}", url, e);
            let _ = events.send(PeerEvent::Error(e));
        }
    }

    for (_, (_, reply)) in pending.drain() {
        let _ = reply.send(Err(SinkError::ConnectionClosed));
    }
    // Commands queued after the socket ended are dropped with their senders
    out_rx.close();
    let _ = events.send(PeerEvent::Closed);
}

async fn session(
    url: &str,
    credentials: Credentials,
    out_rx: &mut mpsc::UnboundedReceiver<Outbound>,
    events: &mpsc::UnboundedSender<PeerEvent>,
    pending: &mut PendingCalls,
) -> Result<()> {
    let (ws, _) = connect_async(url).await.map_err(|e| SinkError::Transport {
        message: format!("cannot connect to {}: {}", url, e),
    })?;
    info!("Connected to {}", url);

    let (mut ws_sink, mut ws_stream) = ws.split();

    let auth = ClientFrame::Auth {
        user: credentials.user,
        password: credentials.password,
    };
    ws_sink
        .send(Message::Binary(auth.encode()?))
        .await
        .map_err(transport_error)?;

    let mut next_id: u64 = 1;

    loop {
        tokio::select! {
            outbound = out_rx.recv() => match outbound {
                Some(Outbound::Send(command)) => {
                    let frame = ClientFrame::message(&command)?.encode()?;
                    ws_sink.send(Message::Binary(frame)).await.map_err(transport_error)?;
                }
                Some(Outbound::Call(command, reply)) => {
                    let id = next_id;
                    next_id += 1;
                    match ClientFrame::call(id, &command).and_then(|f| f.encode()) {
                        Ok(frame) => {
                            pending.insert(id, (command.action(), reply));
                            ws_sink.send(Message::Binary(frame)).await.map_err(transport_error)?;
                        }
                        Err(e) => {
                            let _ = reply.send(Err(e));
                        }
                    }
                }
                Some(Outbound::Close) | None => {
                    debug!("Closing WebSocket");
                    let _ = ws_sink.close().await;
                    return Ok(());
                }
            },
            inbound = ws_stream.next() => match inbound {
                Some(Ok(Message::Binary(data))) => handle_frame(&data, events, pending),
                Some(Ok(Message::Text(text))) => handle_frame(text.as_bytes(), events, pending),
                Some(Ok(Message::Close(_))) | None => return Ok(()),
                Some(Ok(_)) => {} // ping/pong handled by tungstenite
                Some(Err(e)) => return Err(transport_error(e)),
            },
        }
    }
}

fn handle_frame(data: &[u8], events: &mpsc::UnboundedSender<PeerEvent>, pending: &mut PendingCalls) {
    let frame = match ServerFrame::decode(data) {
        Ok(frame) => frame,
        Err(e) => {
            let _ = events.send(PeerEvent::Error(e));
            return;
        }
    };

    match frame {
        ServerFrame::Ready => {
            let _ = events.send(PeerEvent::Ready);
        }
        ServerFrame::Reply { id, data, error } => match pending.remove(&id) {
            Some((action, reply)) => {
                let result = match error {
                    Some(message) => Err(SinkError::Remote { message }),
                    None => decode_reply(action, data),
                };
                let _ = reply.send(result);
            }
            None => warn!("Reply to unknown call {}", id),
        },
        ServerFrame::Stream { data } => {
            let _ = events.send(PeerEvent::Push(data));
        }
        ServerFrame::Error { message } => {
            let _ = events.send(PeerEvent::Error(SinkError::Remote { message }));
        }
    }
}

fn transport_error(e: tokio_tungstenite::tungstenite::Error) -> SinkError {
    SinkError::Transport {
        message: e.to_string(),
    }
}
