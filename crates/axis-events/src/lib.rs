use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};

use futures_util::Stream;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

/// Queue depth of one subscriber. A subscriber that falls this far behind
/// misses events until it drains.
pub const SUBSCRIBER_CAPACITY: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Snapshot,
    Tick,
    StatusChanged,
    Automation,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Snapshot => "snapshot",
            EventKind::Tick => "tick",
            EventKind::StatusChanged => "statusChanged",
            EventKind::Automation => "automation",
        }
    }

    /// Name carried on the `event:` line. Snapshots go out unnamed.
    pub fn sse_name(&self) -> Option<&'static str> {
        match self {
            EventKind::Snapshot => None,
            EventKind::Tick => Some("tick"),
            EventKind::StatusChanged => Some("status"),
            EventKind::Automation => Some("automation"),
        }
    }
}

/// One published event; the payload is serialized once and shared by every
/// subscriber queue.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub kind: EventKind,
    pub data: Arc<str>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HubStats {
    pub published: u64,
    pub delivered: u64,
    pub dropped: u64,
    pub subscribers: usize,
}

#[derive(Default)]
struct Counters {
    published: AtomicU64,
    delivered: AtomicU64,
    dropped: AtomicU64,
}

struct HubInner {
    subscribers: Mutex<HashMap<u64, mpsc::Sender<Envelope>>>,
    next_id: AtomicU64,
    capacity: usize,
    counters: Counters,
}

impl HubInner {
    fn remove(&self, id: u64) -> bool {
        self.subscribers.lock().remove(&id).is_some()
    }
}

/// Lossy fan-out broadcaster. Publishing never waits on a subscriber.
#[derive(Clone)]
pub struct Hub {
    inner: Arc<HubInner>,
}

impl Default for Hub {
    fn default() -> Self {
        Self::new()
    }
}

impl Hub {
    pub fn new() -> Self {
        Self::with_capacity(SUBSCRIBER_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::new(HubInner {
                subscribers: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                capacity: capacity.max(1),
                counters: Counters::default(),
            }),
        }
    }

    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::channel(self.inner.capacity);
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.subscribers.lock().insert(id, tx);
        debug!(target: "axis::events", subscriber = id, "subscriber registered");
        Subscription {
            id,
            rx,
            hub: Arc::downgrade(&self.inner),
        }
    }

    /// Deregister and discard the subscriber's queue.
    pub fn unsubscribe(&self, subscription: Subscription) {
        drop(subscription);
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.lock().len()
    }

    /// Serialize `payload` once and offer it to every subscriber. Returns the
    /// number of queues that accepted it.
    pub fn publish<T: Serialize + ?Sized>(&self, kind: EventKind, payload: &T) -> usize {
        match serde_json::to_string(payload) {
            Ok(data) => self.publish_raw(kind, Arc::from(data)),
            Err(err) => {
                warn!(target: "axis::events", kind = kind.as_str(), %err, "event payload serialization failed; broadcast skipped");
                0
            }
        }
    }

    pub fn publish_raw(&self, kind: EventKind, data: Arc<str>) -> usize {
        let env = Envelope { kind, data };
        let mut delivered = 0usize;
        let mut dropped = 0u64;
        let mut closed = Vec::new();
        {
            let subs = self.inner.subscribers.lock();
            for (id, tx) in subs.iter() {
                match tx.try_send(env.clone()) {
                    Ok(()) => delivered += 1,
                    Err(TrySendError::Full(_)) => dropped += 1,
                    Err(TrySendError::Closed(_)) => closed.push(*id),
                }
            }
        }
        for id in closed {
            self.inner.remove(id);
        }
        let c = &self.inner.counters;
        c.published.fetch_add(1, Ordering::Relaxed);
        c.delivered.fetch_add(delivered as u64, Ordering::Relaxed);
        c.dropped.fetch_add(dropped, Ordering::Relaxed);
        if dropped > 0 {
            debug!(target: "axis::events", kind = kind.as_str(), dropped, "slow subscribers missed event");
        }
        delivered
    }

    pub fn stats(&self) -> HubStats {
        let c = &self.inner.counters;
        HubStats {
            published: c.published.load(Ordering::Relaxed),
            delivered: c.delivered.load(Ordering::Relaxed),
            dropped: c.dropped.load(Ordering::Relaxed),
            subscribers: self.subscriber_count(),
        }
    }
}

/// Receiving end of one subscriber. Dropping it deregisters the queue.
pub struct Subscription {
    id: u64,
    rx: mpsc::Receiver<Envelope>,
    hub: Weak<HubInner>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub async fn recv(&mut self) -> Option<Envelope> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Envelope> {
        self.rx.try_recv().ok()
    }
}

impl Stream for Subscription {
    type Item = Envelope;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(hub) = self.hub.upgrade() {
            if hub.remove(self.id) {
                debug!(target: "axis::events", subscriber = self.id, "subscriber removed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axis_protocol::TickPayload;
    use std::collections::BTreeMap;
    use std::time::Duration;

    #[test]
    fn only_snapshots_go_out_unnamed() {
        assert_eq!(EventKind::Snapshot.sse_name(), None);
        assert_eq!(EventKind::Tick.sse_name(), Some("tick"));
        assert_eq!(EventKind::StatusChanged.sse_name(), Some("status"));
        assert_eq!(EventKind::Automation.sse_name(), Some("automation"));
    }

    #[tokio::test]
    async fn publish_reaches_every_subscriber() {
        let hub = Hub::new();
        let mut a = hub.subscribe();
        let mut b = hub.subscribe();
        let n = hub.publish(
            EventKind::Tick,
            &TickPayload {
                seconds_remaining: 59,
            },
        );
        assert_eq!(n, 2);
        for sub in [&mut a, &mut b] {
            let env = sub.recv().await.expect("event");
            assert_eq!(env.kind, EventKind::Tick);
            assert_eq!(&*env.data, r#"{"seconds_remaining":59}"#);
        }
    }

    #[tokio::test]
    async fn saturated_subscriber_does_not_block_others() {
        let hub = Hub::new();
        let stalled = hub.subscribe();
        let mut live = hub.subscribe();
        for i in 0..SUBSCRIBER_CAPACITY {
            hub.publish(EventKind::Tick, &TickPayload { seconds_remaining: i as u32 });
            live.recv().await.expect("drain");
        }
        let publisher = hub.clone();
        let delivered = tokio::time::timeout(Duration::from_secs(1), async move {
            tokio::task::spawn_blocking(move || {
                publisher.publish(EventKind::Tick, &TickPayload { seconds_remaining: 0 })
            })
            .await
            .expect("join")
        })
        .await
        .expect("publish must not block on a full queue");
        assert_eq!(delivered, 1);
        let env = live.recv().await.expect("live subscriber still receives");
        assert_eq!(&*env.data, r#"{"seconds_remaining":0}"#);
        assert_eq!(hub.stats().dropped, 1);
        drop(stalled);
    }

    #[test]
    fn dropping_subscription_deregisters() {
        let hub = Hub::new();
        let a = hub.subscribe();
        let b = hub.subscribe();
        assert_eq!(hub.subscriber_count(), 2);
        hub.unsubscribe(a);
        assert_eq!(hub.subscriber_count(), 1);
        drop(b);
        assert_eq!(hub.subscriber_count(), 0);
        assert_eq!(hub.publish(EventKind::Snapshot, &Vec::<u8>::new()), 0);
    }

    #[test]
    fn unserializable_payload_is_skipped() {
        let hub = Hub::new();
        let mut sub = hub.subscribe();
        let mut bad: BTreeMap<Vec<u8>, u8> = BTreeMap::new();
        bad.insert(vec![1, 2], 3);
        assert_eq!(hub.publish(EventKind::Automation, &bad), 0);
        assert!(sub.try_recv().is_none());
        assert_eq!(hub.stats().published, 0);
        hub.publish(EventKind::Automation, &"ok");
        assert!(sub.try_recv().is_some());
    }
}
