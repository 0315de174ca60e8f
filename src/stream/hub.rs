//! Multi-subscriber publish/subscribe hub.
//!
//! Every subscriber owns an unbounded queue, so publishing never waits on a
//! slow consumer. Subscribers only see values published after they subscribed.
//! A filtered subscriber's queue only ever holds values its filter accepted.

use futures::Stream;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};
use tokio::sync::mpsc;

/// Fan-out of cloned values to every live subscriber, in publish order.
pub struct Broadcast<T> {
    inner: Arc<Mutex<Senders<T>>>,
}

type Filter<T> = Box<dyn Fn(&T) -> bool + Send + Sync>;

struct Subscriber<T> {
    tx: mpsc::UnboundedSender<T>,
    filter: Option<Filter<T>>,
}

struct Senders<T> {
    senders: Vec<Subscriber<T>>,
    closed: bool,
}

impl<T: Clone + Send + 'static> Broadcast<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Senders {
                senders: Vec::new(),
                closed: false,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Senders<T>> {
        // The sender list stays valid across a poisoned lock.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Start receiving values published from now on. After [`close`](Self::close)
    /// the subscription ends immediately.
    pub fn subscribe(&self) -> Subscription<T> {
        self.attach(None)
    }

    /// Like [`subscribe`](Self::subscribe), but only values accepted by `filter`
    /// are queued. The filter runs on the publishing side.
    pub fn subscribe_filtered<F>(&self, filter: F) -> Subscription<T>
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.attach(Some(Box::new(filter)))
    }

    fn attach(&self, filter: Option<Filter<T>>) -> Subscription<T> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.lock();
        if !inner.closed {
            inner.senders.push(Subscriber { tx, filter });
        }
        Subscription { rx }
    }

    /// Deliver `value` to every subscriber whose filter accepts it. Dropped
    /// subscribers are pruned. Returns the number of subscribers reached.
    pub fn publish(&self, value: T) -> usize {
        let mut inner = self.lock();
        let mut reached = 0;
        inner.senders.retain(|sub| match &sub.filter {
            Some(accepts) if !accepts(&value) => !sub.tx.is_closed(),
            _ => {
                let sent = sub.tx.send(value.clone()).is_ok();
                reached += usize::from(sent);
                sent
            }
        });
        reached
    }

    pub fn subscriber_count(&self) -> usize {
        let mut inner = self.lock();
        inner.senders.retain(|sub| !sub.tx.is_closed());
        inner.senders.len()
    }

    /// End every subscription once its queued values are drained.
    pub fn close(&self) {
        let mut inner = self.lock();
        inner.closed = true;
        inner.senders.clear();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }
}

impl<T: Clone + Send + 'static> Default for Broadcast<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for Broadcast<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> std::fmt::Debug for Broadcast<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Broadcast").finish_non_exhaustive()
    }
}

/// Receiving side of one [`Broadcast`] subscription.
#[derive(Debug)]
pub struct Subscription<T> {
    rx: mpsc::UnboundedReceiver<T>,
}

impl<T> Subscription<T> {
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Take a queued value without waiting.
    pub fn try_recv(&mut self) -> Option<T> {
        self.rx.try_recv().ok()
    }
}

impl<T> Stream for Subscription<T> {
    type Item = T;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        self.rx.poll_recv(cx)
    }
}
