use std::sync::Arc;
use std::time::Duration;

use axis_events::{EventKind, Hub};
use axis_protocol::{Mode, TickPayload};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::snapshot_cache::SnapshotCache;
use crate::status_store::StatusStore;
use crate::tasks::{spawn_supervised, TaskHandle};

pub(crate) const DEFAULT_REFRESH_TICKS: u32 = 60;
const TICK: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Step {
    /// Manual mode: countdown held at the full period.
    Held,
    Tick(u32),
    /// Countdown reached zero; the caller refreshes and rebroadcasts.
    Refresh,
}

/// Seconds left until the next automatic refresh.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Countdown {
    remaining: u32,
    period: u32,
}

impl Countdown {
    pub fn new(period: u32) -> Self {
        let period = period.max(1);
        Self {
            remaining: period,
            period,
        }
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn advance(&mut self, mode: Mode) -> Step {
        if mode.is_manual() {
            self.remaining = self.period;
            return Step::Held;
        }
        self.remaining = self.remaining.saturating_sub(1);
        if self.remaining == 0 {
            self.remaining = self.period;
            Step::Refresh
        } else {
            Step::Tick(self.remaining)
        }
    }
}

/// Once-a-second loop driving the countdown and the periodic refresh.
pub(crate) struct Poller {
    statuses: Arc<StatusStore>,
    cache: Arc<SnapshotCache>,
    hub: Hub,
    period: u32,
}

impl Poller {
    pub fn new(statuses: Arc<StatusStore>, cache: Arc<SnapshotCache>, hub: Hub, period: u32) -> Self {
        Self {
            statuses,
            cache,
            hub,
            period,
        }
    }

    pub async fn run(&self, cancel: CancellationToken) {
        let mut countdown = Countdown::new(self.period);
        let mut interval = interval_at(Instant::now() + TICK, TICK);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(target: "axis::poller", period = countdown.remaining(), "poller started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {}
            }
            match countdown.advance(self.statuses.mode()) {
                Step::Held => {}
                Step::Tick(seconds_remaining) => {
                    self.hub
                        .publish(EventKind::Tick, &TickPayload { seconds_remaining });
                }
                Step::Refresh => {
                    self.hub.publish(
                        EventKind::Tick,
                        &TickPayload {
                            seconds_remaining: 0,
                        },
                    );
                    // A failed refresh is logged by the cache; the stale
                    // snapshot still goes out.
                    let _ = self.cache.refresh().await;
                    let delivered = self.cache.publish_snapshot().await;
                    debug!(target: "axis::poller", delivered, "periodic snapshot published");
                }
            }
        }
        info!(target: "axis::poller", "poller stopped");
    }
}

pub(crate) fn start(poller: Arc<Poller>, cancel: CancellationToken) -> TaskHandle {
    spawn_supervised("axis.poller", move || {
        let poller = poller.clone();
        let cancel = cancel.clone();
        async move { poller.run(cancel).await }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::{InitialState, PersistenceGateway};
    use crate::snapshot_cache::DEFAULT_TTL;
    use crate::test_support::{FailingStore, FakeProvider};
    use axis_protocol::RegistryItem;

    #[test]
    fn countdown_ticks_then_refreshes() {
        let mut c = Countdown::new(3);
        assert_eq!(c.advance(Mode::Auto), Step::Tick(2));
        assert_eq!(c.advance(Mode::Auto), Step::Tick(1));
        assert_eq!(c.advance(Mode::Auto), Step::Refresh);
        assert_eq!(c.remaining(), 3);
    }

    #[test]
    fn manual_mode_holds_the_countdown() {
        let mut c = Countdown::new(5);
        c.advance(Mode::Auto);
        c.advance(Mode::Auto);
        assert_eq!(c.remaining(), 3);
        assert_eq!(c.advance(Mode::Manual), Step::Held);
        assert_eq!(c.remaining(), 5);
    }

    fn poller(period: u32, mode: Mode) -> (Arc<Poller>, Arc<FakeProvider>, Hub) {
        let dir = std::env::temp_dir();
        let gw = Arc::new(PersistenceGateway::new(Arc::new(FailingStore), dir));
        let statuses = Arc::new(StatusStore::new(
            InitialState {
                mode,
                ..InitialState::default()
            },
            gw,
        ));
        let provider = Arc::new(FakeProvider::with_items(vec![RegistryItem::note("a", "A")]));
        let hub = Hub::new();
        let cache = Arc::new(SnapshotCache::new(
            provider.clone(),
            statuses.clone(),
            hub.clone(),
            DEFAULT_TTL,
        ));
        (
            Arc::new(Poller::new(statuses, cache, hub.clone(), period)),
            provider,
            hub,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn auto_mode_publishes_ticks_and_a_snapshot_at_zero() {
        let (poller, provider, hub) = poller(3, Mode::Auto);
        let mut sub = hub.subscribe();
        let cancel = CancellationToken::new();
        let task = tokio::spawn({
            let cancel = cancel.clone();
            async move { poller.run(cancel).await }
        });

        let mut kinds = Vec::new();
        while kinds.len() < 5 {
            let env = sub.recv().await.expect("hub open");
            if env.kind == EventKind::StatusChanged {
                continue;
            }
            kinds.push((env.kind, env.data.to_string()));
        }
        assert_eq!(kinds[0], (EventKind::Tick, r#"{"seconds_remaining":2}"#.into()));
        assert_eq!(kinds[1], (EventKind::Tick, r#"{"seconds_remaining":1}"#.into()));
        assert_eq!(kinds[2], (EventKind::Tick, r#"{"seconds_remaining":0}"#.into()));
        assert_eq!(kinds[3].0, EventKind::Snapshot);
        assert_eq!(kinds[4], (EventKind::Tick, r#"{"seconds_remaining":2}"#.into()));
        assert_eq!(provider.list_calls(), 1);

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn failed_refresh_still_publishes_snapshot() {
        let (poller, provider, hub) = poller(1, Mode::Auto);
        provider.fail_next(true);
        let mut sub = hub.subscribe();
        let cancel = CancellationToken::new();
        let task = tokio::spawn({
            let cancel = cancel.clone();
            async move { poller.run(cancel).await }
        });
        let snapshot = loop {
            let env = sub.recv().await.expect("hub open");
            if env.kind == EventKind::Snapshot {
                break env;
            }
        };
        // The failed tick-driven refresh is followed by the cold-cache fill
        // inside publish_snapshot, which succeeds.
        assert!(snapshot.data.contains("\"id\":\"a\""));
        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn manual_mode_is_silent() {
        let (poller, provider, hub) = poller(2, Mode::Manual);
        let mut sub = hub.subscribe();
        let cancel = CancellationToken::new();
        let task = tokio::spawn({
            let cancel = cancel.clone();
            async move { poller.run(cancel).await }
        });
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(sub.try_recv().is_none());
        assert_eq!(provider.list_calls(), 0);
        cancel.cancel();
        task.await.unwrap();
    }
}
