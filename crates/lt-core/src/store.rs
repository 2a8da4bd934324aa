//! Bounded in-memory sample store.
//!
//! Samples wait here between observation and the next flush. The store
//! retains no more than its capacity: once full, excess samples are purged
//! in the order they were offered. Removal only ever happens by explicit
//! acknowledgement (`remove`) or FIFO eviction, never by reporting alone,
//! which is what gives the tracer its at-least-once delivery contract.
//!
//! `offer` is called from the observation-delivery context while `snapshot`
//! and `remove` arrive from timer and completion contexts, so the store
//! carries its own lock, independent of the tracer's session lock.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::clock::{Clock, MonotonicClock, Timestamp};

/// Called with each sample purged to keep the store within capacity.
pub type EvictionHook<S> = Box<dyn Fn(&S) + Send + Sync>;

/// Storage for observed samples in between flushes.
pub trait LocationStore<S>: Send + Sync {
    /// Accept a sample. Always succeeds; may evict older samples.
    fn offer(&self, sample: S);

    /// Number of samples currently held.
    fn count(&self) -> usize;

    /// Point-in-time ordered copy of all samples, oldest first. Not a live
    /// view; the store may continue to mutate while the caller iterates.
    fn snapshot(&self) -> Vec<S>;

    /// Remove every held sample equal to any element of `samples`.
    /// Duplicates are all removed. Does not affect `last_accepted_at`.
    fn remove(&self, samples: &[S]);

    /// Timestamp of the most recent successful `offer`, or `None` if no
    /// sample has ever been accepted. Unaffected by `remove`.
    fn last_accepted_at(&self) -> Option<Timestamp>;
}

struct StoreInner<S> {
    samples: VecDeque<S>,
    capacity: usize,
    last_accepted_at: Option<Timestamp>,
}

/// A [`LocationStore`] that retains no more than a given number of samples.
///
/// Once capacity is reached, excess samples are removed oldest-first. A
/// capacity of zero still accepts every offer (updating the acceptance
/// timestamp) and immediately evicts it.
pub struct InMemoryLocationStore<S: 'static> {
    inner: Mutex<StoreInner<S>>,
    clock: Arc<dyn Clock>,
    on_evicted: Option<EvictionHook<S>>,
}

impl<S: 'static> InMemoryLocationStore<S> {
    /// Create an empty store holding at most `capacity` samples.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(StoreInner {
                samples: VecDeque::new(),
                capacity,
                last_accepted_at: None,
            }),
            clock: Arc::new(MonotonicClock::new()),
            on_evicted: None,
        }
    }

    /// Replace the clock used to stamp acceptances. Share one clock between
    /// the store and any alarm reading it.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Install a hook invoked once per evicted sample. The hook runs after
    /// the store lock is released.
    pub fn with_eviction_hook(mut self, hook: impl Fn(&S) + Send + Sync + 'static) -> Self {
        self.on_evicted = Some(Box::new(hook));
        self
    }

    /// Current capacity limit.
    pub fn capacity(&self) -> usize {
        self.inner.lock().unwrap().capacity
    }

    /// Adjust the capacity limit. Shrinking below the current length evicts
    /// oldest-first down to the new limit, invoking the eviction hook.
    pub fn set_capacity(&self, capacity: usize) {
        let evicted = {
            let mut inner = self.inner.lock().unwrap();
            inner.capacity = capacity;
            drain_over_capacity(&mut inner)
        };
        self.notify_evicted(evicted);
    }

    fn notify_evicted(&self, evicted: Vec<S>) {
        if evicted.is_empty() {
            return;
        }
        tracing::debug!(count = evicted.len(), "evicted oldest samples over capacity");
        if let Some(hook) = &self.on_evicted {
            for sample in &evicted {
                hook(sample);
            }
        }
    }
}

fn drain_over_capacity<S>(inner: &mut StoreInner<S>) -> Vec<S> {
    let mut evicted = Vec::new();
    while inner.samples.len() > inner.capacity {
        if let Some(oldest) = inner.samples.pop_front() {
            evicted.push(oldest);
        }
    }
    evicted
}

impl<S: Clone + PartialEq + Send + 'static> LocationStore<S> for InMemoryLocationStore<S> {
    fn offer(&self, sample: S) {
        let evicted = {
            let mut inner = self.inner.lock().unwrap();
            inner.samples.push_back(sample);
            inner.last_accepted_at = Some(self.clock.now());
            drain_over_capacity(&mut inner)
        };
        self.notify_evicted(evicted);
    }

    fn count(&self) -> usize {
        self.inner.lock().unwrap().samples.len()
    }

    fn snapshot(&self) -> Vec<S> {
        self.inner.lock().unwrap().samples.iter().cloned().collect()
    }

    fn remove(&self, samples: &[S]) {
        if samples.is_empty() {
            return;
        }
        let mut inner = self.inner.lock().unwrap();
        inner.samples.retain(|held| !samples.contains(held));
    }

    fn last_accepted_at(&self) -> Option<Timestamp> {
        self.inner.lock().unwrap().last_accepted_at
    }
}
