//! Demultiplexing of the inbound update sequence into per-kind streams.

use super::hub::{Broadcast, Subscription};
use crate::types::events::{ConversationUpdate, UpdateKind, UpdateVariant};
use futures::Stream;
use std::marker::PhantomData;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Splits one upstream update sequence into filtered projections.
///
/// Subscribing is cheap and never affects other subscribers; each one sees
/// every matching update published after it subscribed, in upstream order.
/// Kind filters run at publish time, so a subscriber never queues updates of
/// other kinds.
#[derive(Debug, Clone, Default)]
pub struct UpdateDemultiplexer {
    upstream: Broadcast<ConversationUpdate>,
}

impl UpdateDemultiplexer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push an update to every matching subscriber. Returns how many were reached.
    pub fn publish(&self, update: ConversationUpdate) -> usize {
        self.upstream.publish(update)
    }

    /// Every update, including unrecognized ones.
    pub fn all(&self) -> UpdateStream {
        UpdateStream {
            inner: self.upstream.subscribe(),
            kind: None,
        }
    }

    /// Updates of one kind.
    pub fn subscribe(&self, kind: UpdateKind) -> UpdateStream {
        UpdateStream {
            inner: self.upstream.subscribe_filtered(move |u| u.kind() == kind),
            kind: Some(kind),
        }
    }

    /// Payloads of one kind, typed.
    pub fn stream<P: UpdateVariant>(&self) -> TypedUpdateStream<P> {
        TypedUpdateStream {
            inner: self.upstream.subscribe_filtered(|u| u.kind() == P::KIND),
            _payload: PhantomData,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.upstream.subscriber_count()
    }

    /// End every stream after its queued updates.
    pub fn close(&self) {
        self.upstream.close();
    }
}

/// Updates filtered by kind.
#[derive(Debug)]
pub struct UpdateStream {
    inner: Subscription<ConversationUpdate>,
    kind: Option<UpdateKind>,
}

impl UpdateStream {
    pub fn kind(&self) -> Option<UpdateKind> {
        self.kind
    }
}

impl Stream for UpdateStream {
    type Item = ConversationUpdate;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

/// Payloads of type `P`.
pub struct TypedUpdateStream<P> {
    inner: Subscription<ConversationUpdate>,
    _payload: PhantomData<fn() -> P>,
}

impl<P: UpdateVariant> Stream for TypedUpdateStream<P> {
    type Item = P;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<P>> {
        loop {
            match Pin::new(&mut self.inner).poll_next(cx) {
                Poll::Ready(Some(update)) => {
                    if let Some(payload) = P::from_update(&update) {
                        return Poll::Ready(Some(payload));
                    }
                }
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

impl<P> std::fmt::Debug for TypedUpdateStream<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypedUpdateStream")
            .field("payload", &std::any::type_name::<P>())
            .finish()
    }
}
