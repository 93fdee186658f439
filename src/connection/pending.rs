//! Result of a request/response command

use crate::error::{Result, SinkError};
use crate::transport::Reply;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::oneshot;

type Convert<T> = Box<dyn FnOnce(Result<Reply>) -> Result<T> + Send>;

/// Future of a command's typed result.
///
/// The command is already submitted when a `Pending` is returned; awaiting
/// only observes the outcome. A reply slot dropped without an answer
/// (connection gone) resolves to `ConnectionClosed`.
#[must_use = "the command is sent either way, but its result is only seen when awaited"]
pub struct Pending<T> {
    rx: oneshot::Receiver<Result<Reply>>,
    convert: Option<Convert<T>>,
}

impl<T> Pending<T> {
    pub(crate) fn new<F>(rx: oneshot::Receiver<Result<Reply>>, convert: F) -> Self
    where
        F: FnOnce(Result<Reply>) -> Result<T> + Send + 'static,
    {
        Self {
            rx,
            convert: Some(Box::new(convert)),
        }
    }
}

impl<T> Future for Pending<T> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let result = match Pin::new(&mut this.rx).poll(cx) {
            Poll::Pending => return Poll::Pending,
            Poll::Ready(Ok(result)) => result,
            Poll::Ready(Err(_)) => Err(SinkError::ConnectionClosed),
        };

        match this.convert.take() {
            Some(convert) => Poll::Ready(convert(result)),
            None => Poll::Ready(Err(SinkError::InvalidState {
                message: "result already taken",
            })),
        }
    }
}

impl<T> fmt::Debug for Pending<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pending")
            .field("done", &self.convert.is_none())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_converts_reply() {
        let (tx, rx) = oneshot::channel();
        let pending = Pending::new(rx, |result| match result? {
            Reply::Unset(existed) => Ok(existed),
            other => Err(other.unexpected("unsetStream")),
        });

        tx.send(Ok(Reply::Unset(true))).unwrap();
        assert!(pending.await.unwrap());
    }

    #[tokio::test]
    async fn test_dropped_sender_is_closed() {
        let (tx, rx) = oneshot::channel::<Result<Reply>>();
        let pending = Pending::new(rx, |result| result.map(|_| ()));

        drop(tx);
        assert!(pending.await.unwrap_err().is_closed());
    }

    #[tokio::test]
    async fn test_error_passes_through_convert() {
        let (tx, rx) = oneshot::channel();
        let pending = Pending::new(rx, |result| result.map(|_| ()));

        tx.send(Err(SinkError::Remote {
            message: "denied".into(),
        }))
        .unwrap();
        assert!(matches!(pending.await, Err(SinkError::Remote { .. })));
    }
}
