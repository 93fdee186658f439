//! Typed notification channels
//!
//! A `Notifier<T>` is a multi-subscriber callback list for one kind of
//! notification. The connection exposes one per notification (`connecting`,
//! `connect`, `error`, `close`) and keeps a private one for stream pushes,
//! which every live `LogStream` listens to and filters by id.
//!
//! Listeners are always invoked outside the internal lock, so a listener may
//! subscribe, unsubscribe or emit on the same notifier.

use parking_lot::Mutex;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};
use tokio::sync::oneshot;

/// Handle returned by `subscribe`/`once`, used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Listener<T> {
    id: u64,
    once: bool,
    callback: Callback<T>,
}

struct Registry<T> {
    next_id: u64,
    listeners: Vec<Listener<T>>,
}

/// Multi-subscriber notification channel
pub struct Notifier<T> {
    registry: Arc<Mutex<Registry<T>>>,
}

impl<T> Default for Notifier<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Notifier<T> {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry {
                next_id: 0,
                listeners: Vec::new(),
            })),
        }
    }

    /// Register a listener called on every emission
    pub fn subscribe<F>(&self, callback: F) -> ListenerId
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.add(Arc::new(callback), false)
    }

    /// Register a listener removed after its first emission
    pub fn once<F>(&self, callback: F) -> ListenerId
    where
        F: FnOnce(&T) + Send + 'static,
    {
        let slot = Mutex::new(Some(callback));
        self.add(
            Arc::new(move |value: &T| {
                if let Some(callback) = slot.lock().take() {
                    callback(value);
                }
            }),
            true,
        )
    }

    /// Remove a listener. Returns false if it was already gone.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.registry.lock().remove(id.0)
    }

    /// Invoke every listener with `value`, dropping one-shot listeners.
    ///
    /// Returns how many listeners were called.
    pub fn emit(&self, value: &T) -> usize {
        let snapshot: Vec<Callback<T>> = {
            let mut registry = self.registry.lock();
            let snapshot = registry
                .listeners
                .iter()
                .map(|l| l.callback.clone())
                .collect();
            registry.listeners.retain(|l| !l.once);
            snapshot
        };

        for callback in &snapshot {
            callback(value);
        }
        snapshot.len()
    }

    /// Number of registered listeners
    pub fn listener_count(&self) -> usize {
        self.registry.lock().listeners.len()
    }

    /// Future resolving with the next emitted value.
    ///
    /// The listener is registered immediately, not on first poll, and removed
    /// again if the future is dropped before it resolves. Resolves to `None`
    /// if the notifier is dropped first.
    pub fn wait(&self) -> Wait<T>
    where
        T: Clone + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let id = self.once(move |value: &T| {
            let _ = tx.send(value.clone());
        });
        Wait {
            rx,
            registry: Arc::downgrade(&self.registry),
            id: id.0,
            done: false,
        }
    }

    fn add(&self, callback: Callback<T>, once: bool) -> ListenerId {
        let mut registry = self.registry.lock();
        let id = registry.next_id;
        registry.next_id += 1;
        registry.listeners.push(Listener { id, once, callback });
        ListenerId(id)
    }
}

impl<T> Registry<T> {
    fn remove(&mut self, id: u64) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|l| l.id != id);
        self.listeners.len() != before
    }
}

/// Next value of a `Notifier`, see `Notifier::wait`
#[must_use = "futures do nothing unless polled"]
pub struct Wait<T> {
    rx: oneshot::Receiver<T>,
    registry: Weak<Mutex<Registry<T>>>,
    id: u64,
    done: bool,
}

impl<T> Future for Wait<T> {
    type Output = Option<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match Pin::new(&mut this.rx).poll(cx) {
            Poll::Ready(value) => {
                this.done = true;
                Poll::Ready(value.ok())
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<T> Drop for Wait<T> {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        if let Some(registry) = self.registry.upgrade() {
            registry.lock().remove(self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_subscribe_receives_every_emission() {
        let notifier = Notifier::<u32>::new();
        let total = Arc::new(AtomicUsize::new(0));
        let total_clone = total.clone();
        notifier.subscribe(move |v| {
            total_clone.fetch_add(*v as usize, Ordering::SeqCst);
        });

        assert_eq!(notifier.emit(&2), 1);
        assert_eq!(notifier.emit(&3), 1);
        assert_eq!(total.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn test_once_fires_a_single_time() {
        let notifier = Notifier::<()>::new();
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();
        notifier.once(move |_| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(notifier.listener_count(), 1);
        notifier.emit(&());
        notifier.emit(&());
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(notifier.listener_count(), 0);
    }

    #[test]
    fn test_unsubscribe() {
        let notifier = Notifier::<()>::new();
        let id = notifier.subscribe(|_| panic!("must not be called"));

        assert!(notifier.unsubscribe(id));
        assert!(!notifier.unsubscribe(id));
        assert_eq!(notifier.emit(&()), 0);
    }

    #[test]
    fn test_listener_can_reenter_notifier() {
        let notifier = Arc::new(Notifier::<()>::new());
        let inner = notifier.clone();
        notifier.once(move |_| {
            // Registering from inside a listener must not deadlock
            inner.subscribe(|_| {});
        });

        notifier.emit(&());
        assert_eq!(notifier.listener_count(), 1);
    }

    #[tokio::test]
    async fn test_wait_resolves_with_value() {
        let notifier = Notifier::<String>::new();
        let waiter = notifier.wait();
        notifier.emit(&"hello".to_string());
        assert_eq!(waiter.await, Some("hello".to_string()));
    }

    #[test]
    fn test_dropped_wait_unsubscribes() {
        let notifier = Notifier::<()>::new();
        for _ in 0..10 {
            let waiter = notifier.wait();
            assert_eq!(notifier.listener_count(), 1);
            drop(waiter);
        }
        assert_eq!(notifier.listener_count(), 0);
        assert_eq!(notifier.emit(&()), 0);
    }

    #[tokio::test]
    async fn test_wait_resolves_none_when_dropped() {
        let notifier = Notifier::<()>::new();
        let waiter = notifier.wait();
        drop(notifier);
        assert_eq!(waiter.await, None);
    }
}
