//! Per-endpoint live event fan-out
//!
//! A [`FanoutHub`] keeps, for every endpoint slug, the set of currently
//! registered subscriber channels. Publishing clones the event into each of
//! them. There is no replay buffer: a subscriber sees only events published
//! while it is registered.

use dashmap::DashMap;
use futures::Stream;
use hookwire_proto::LiveEvent;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tracing::{debug, trace};

struct Subscriber {
    id: u64,
    tx: mpsc::UnboundedSender<LiveEvent>,
}

#[derive(Default)]
struct HubInner {
    endpoints: DashMap<String, Vec<Subscriber>>,
    next_id: AtomicU64,
}

impl HubInner {
    fn unregister(&self, slug: &str, id: u64) {
        let now_empty = match self.endpoints.get_mut(slug) {
            Some(mut subscribers) => {
                subscribers.retain(|s| s.id != id);
                subscribers.is_empty()
            }
            None => return,
        };
        if now_empty {
            self.endpoints.remove_if(slug, |_, subscribers| subscribers.is_empty());
        }
    }
}

/// Broadcast hub keyed by endpoint slug. Cheap to clone.
#[derive(Clone, Default)]
pub struct FanoutHub {
    inner: Arc<HubInner>,
}

impl FanoutHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new subscriber for `slug`
    pub fn subscribe(&self, slug: &str) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();

        self.inner
            .endpoints
            .entry(slug.to_string())
            .or_default()
            .push(Subscriber { id, tx });

        debug!(slug = %slug, subscriber = id, "Subscriber registered");

        Subscription {
            slug: slug.to_string(),
            id,
            rx,
            hub: Arc::downgrade(&self.inner),
        }
    }

    /// Deliver `event` to every current subscriber of `slug`.
    ///
    /// Never waits on a subscriber. Closed subscribers are pruned. Returns
    /// how many subscribers received the event.
    pub fn publish(&self, slug: &str, event: LiveEvent) -> usize {
        // The entry stays locked for the whole fan-out so concurrent
        // publishers to one slug are serialized and order is kept.
        let (delivered, now_empty) = match self.inner.endpoints.get_mut(slug) {
            Some(mut subscribers) => {
                subscribers.retain(|s| s.tx.send(event.clone()).is_ok());
                (subscribers.len(), subscribers.is_empty())
            }
            None => return 0,
        };
        if now_empty {
            self.inner
                .endpoints
                .remove_if(slug, |_, subscribers| subscribers.is_empty());
        }

        trace!(slug = %slug, kind = event.kind(), delivered, "Published live event");
        delivered
    }

    /// Publish `EndpointDeleted` and drop every subscriber of `slug`.
    ///
    /// Subscriptions drain what they already received and then end.
    pub fn close_endpoint(&self, slug: &str) -> usize {
        let Some((_, subscribers)) = self.inner.endpoints.remove(slug) else {
            return 0;
        };
        let event = LiveEvent::EndpointDeleted {
            slug: slug.to_string(),
        };
        let delivered = subscribers
            .iter()
            .filter(|s| s.tx.send(event.clone()).is_ok())
            .count();
        debug!(slug = %slug, delivered, "Endpoint closed, subscribers released");
        delivered
    }

    pub fn subscriber_count(&self, slug: &str) -> usize {
        self.inner
            .endpoints
            .get(slug)
            .map(|subscribers| subscribers.iter().filter(|s| !s.tx.is_closed()).count())
            .unwrap_or(0)
    }

    /// Number of endpoints with at least one registered subscriber
    pub fn endpoint_count(&self) -> usize {
        self.inner.endpoints.len()
    }
}

/// A registered subscriber. Dropping it unregisters.
pub struct Subscription {
    slug: String,
    id: u64,
    rx: mpsc::UnboundedReceiver<LiveEvent>,
    hub: Weak<HubInner>,
}

impl Subscription {
    pub fn slug(&self) -> &str {
        &self.slug
    }

    /// Next event, or `None` once the endpoint has been closed and drained
    pub async fn recv(&mut self) -> Option<LiveEvent> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<LiveEvent> {
        self.rx.try_recv().ok()
    }
}

impl Stream for Subscription {
    type Item = LiveEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<LiveEvent>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(hub) = self.hub.upgrade() {
            hub.unregister(&self.slug, self.id);
            debug!(slug = %self.slug, subscriber = self.id, "Subscriber released");
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("slug", &self.slug)
            .field("id", &self.id)
            .finish()
    }
}
