//! Live log streams
//!
//! Every live `LogStream` listens to the connection's push notifier and keeps
//! only the pushes carrying its own id, so any number of streams share one
//! peer. Records queue in an unbounded channel until read.

use crate::connection::Connection;
use crate::error::SinkError;
use crate::events::{ListenerId, Notifier};
use crate::record::LogRecord;
use crate::transport::{Command, StreamPush};
use futures_util::Stream;
use parking_lot::Mutex;
use std::fmt;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};
use ulid::Ulid;

struct StreamShared {
    id: String,
    stopped: AtomicBool,
    tx: Mutex<Option<mpsc::UnboundedSender<LogRecord>>>,
    push_listener: Mutex<Option<ListenerId>>,
    close_listener: Mutex<Option<ListenerId>>,
    errors: Notifier<Arc<SinkError>>,
}

impl StreamShared {
    fn on_push(&self, push: &StreamPush) {
        if push.id != self.id || self.stopped.load(Ordering::Acquire) {
            return;
        }
        if let Some(tx) = self.tx.lock().as_ref() {
            let _ = tx.send(push.log.clone());
        }
    }

    /// Local teardown. Returns false if the stream was already stopped.
    fn halt(&self, connection: &Connection) -> bool {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return false;
        }
        // Ends the sequence once queued records are read
        self.tx.lock().take();

        let events = &connection.shared().events;
        if let Some(id) = self.push_listener.lock().take() {
            events.push.unsubscribe(id);
        }
        if let Some(id) = self.close_listener.lock().take() {
            events.close.unsubscribe(id);
        }
        true
    }
}

/// Live sequence of the records matching a stream filter
///
/// Obtained from `Connection::stream`. Read with `recv` or as a
/// `futures::Stream`. Dropping it stops the stream.
pub struct LogStream {
    connection: Connection,
    include_extra: bool,
    shared: Arc<StreamShared>,
    rx: mpsc::UnboundedReceiver<LogRecord>,
}

impl LogStream {
    /// Register a stream with a fresh id on `connection`'s push notifier
    pub(crate) fn open(connection: Connection, include_extra: bool) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(StreamShared {
            id: Ulid::new().to_string(),
            stopped: AtomicBool::new(false),
            tx: Mutex::new(Some(tx)),
            push_listener: Mutex::new(None),
            close_listener: Mutex::new(None),
            errors: Notifier::new(),
        });

        let events = &connection.shared().events;

        let on_push = shared.clone();
        let push_id = events.push.subscribe(move |push| on_push.on_push(push));
        *shared.push_listener.lock() = Some(push_id);

        // The connection closing ends every stream, without unset-stream
        let on_close = shared.clone();
        let weak = Arc::downgrade(connection.shared());
        let close_id = events.close.once(move |_| {
            if on_close.stopped.swap(true, Ordering::AcqRel) {
                return;
            }
            on_close.tx.lock().take();
            on_close.close_listener.lock().take();
            if let (Some(conn), Some(id)) = (weak.upgrade(), on_close.push_listener.lock().take()) {
                conn.events.push.unsubscribe(id);
            }
        });
        *shared.close_listener.lock() = Some(close_id);

        debug!("Stream {} registered", shared.id);
        Self {
            connection,
            include_extra,
            shared,
            rx,
        }
    }

    /// Client-generated subscription id
    pub fn id(&self) -> &str {
        &self.shared.id
    }

    pub fn include_extra(&self) -> bool {
        self.include_extra
    }

    pub fn is_stopped(&self) -> bool {
        self.shared.stopped.load(Ordering::Acquire)
    }

    /// Failures of the server-side teardown
    pub fn errors(&self) -> &Notifier<Arc<SinkError>> {
        &self.shared.errors
    }

    /// Next record; `None` once stopped and drained
    pub async fn recv(&mut self) -> Option<LogRecord> {
        self.rx.recv().await
    }

    /// Stop the stream and remove it on the server.
    ///
    /// Idempotent. Records already queued stay readable. A failed removal is
    /// reported through `errors`.
    pub fn stop(&self) {
        if !self.shared.halt(&self.connection) {
            return;
        }
        debug!("Stopping stream {}", self.shared.id);

        let (tx, rx) = oneshot::channel();
        self.connection
            .submit(Command::UnsetStream(self.shared.id.clone()), Some(tx));

        let shared = self.shared.clone();
        let report = async move {
            let error = match rx.await {
                Ok(Ok(_)) => return,
                Ok(Err(e)) => e,
                Err(_) => SinkError::ConnectionClosed,
            };
            if shared.errors.emit(&Arc::new(error)) == 0 {
                warn!("Stream {} teardown failed unobserved", shared.id);
            }
        };
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(report);
            }
            Err(_) => debug!("No runtime, stream {} teardown unobserved", self.shared.id),
        }
    }

    /// Forget the stream locally without telling the server
    pub(crate) fn abandon(&self) {
        self.shared.halt(&self.connection);
    }
}

impl Drop for LogStream {
    fn drop(&mut self) {
        self.stop();
    }
}

impl Stream for LogStream {
    type Item = LogRecord;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().rx.poll_recv(cx)
    }
}

impl fmt::Debug for LogStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogStream")
            .field("id", &self.shared.id)
            .field("include_extra", &self.include_extra)
            .field("stopped", &self.is_stopped())
            .finish()
    }
}
