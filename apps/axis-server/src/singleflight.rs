use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;

/// Coalesces concurrent callers of the same keyed operation: the first caller
/// leads and does the work, later callers wait for the leader to finish.
#[derive(Default)]
pub(crate) struct Singleflight {
    flights: Mutex<HashMap<String, Arc<FlightState>>>,
}

impl Singleflight {
    pub(crate) fn begin(&self, key: &str) -> FlightGuard<'_> {
        let mut map = self.flights.lock();
        if let Some(state) = map.get(key) {
            state.add_ref();
            FlightGuard::new(self, key.to_string(), Arc::clone(state), false)
        } else {
            let state = Arc::new(FlightState::new());
            map.insert(key.to_string(), Arc::clone(&state));
            FlightGuard::new(self, key.to_string(), state, true)
        }
    }

    fn release(&self, key: &str, flight: &Arc<FlightState>) {
        let mut map = self.flights.lock();
        if flight.release() == 0 {
            if let Some(existing) = map.get(key) {
                if Arc::ptr_eq(existing, flight) {
                    map.remove(key);
                }
            }
        }
    }

    #[cfg(test)]
    fn in_flight(&self) -> usize {
        self.flights.lock().len()
    }
}

struct FlightState {
    notify: Notify,
    done: AtomicBool,
    refs: AtomicUsize,
}

impl FlightState {
    fn new() -> Self {
        Self {
            notify: Notify::new(),
            done: AtomicBool::new(false),
            refs: AtomicUsize::new(1),
        }
    }

    fn add_ref(&self) {
        self.refs.fetch_add(1, Ordering::Relaxed);
    }

    fn release(&self) -> usize {
        self.refs.fetch_sub(1, Ordering::AcqRel) - 1
    }

    async fn wait(&self) {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register before checking the flag so a completion between the
            // check and the await is not missed.
            notified.as_mut().enable();
            if self.done.load(Ordering::Acquire) {
                return;
            }
            notified.await;
        }
    }

    fn complete(&self) {
        self.done.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }
}

pub(crate) struct FlightGuard<'a> {
    singleflight: &'a Singleflight,
    key: String,
    flight: Arc<FlightState>,
    is_leader: bool,
}

impl<'a> FlightGuard<'a> {
    fn new(
        singleflight: &'a Singleflight,
        key: String,
        flight: Arc<FlightState>,
        is_leader: bool,
    ) -> Self {
        Self {
            singleflight,
            key,
            flight,
            is_leader,
        }
    }

    pub(crate) fn is_leader(&self) -> bool {
        self.is_leader
    }

    pub(crate) async fn wait(&self) {
        self.flight.wait().await;
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        // A leader that is dropped early (cancelled) still releases followers.
        if self.is_leader {
            self.flight.complete();
        }
        self.singleflight.release(&self.key, &self.flight);
    }
}
