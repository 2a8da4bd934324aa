//! Deterministic mock capabilities for integration tests.
//!
//! Nothing here spawns threads or sleeps: timers fire when the test pumps
//! them, observations arrive when the test delivers them, and the reporter
//! acknowledges according to a scripted mode.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use lt_common::{AlarmId, Error, Result};
use lt_core::capabilities::{
    FireCallback, ObservationCapability, ObservationSink, ReportCompletion, ReportingCapability,
    TimerCapability,
};
use lt_core::clock::Timestamp;

// ---------------------------------------------------------------------------
// Timers
// ---------------------------------------------------------------------------

struct TimerRegistration {
    wake: bool,
    on_fire: Arc<Mutex<FireCallback>>,
    pending: Option<Duration>,
}

/// Hand-pumped timer capability.
#[derive(Default)]
pub struct MockTimers {
    inner: Mutex<HashMap<AlarmId, TimerRegistration>>,
    fail_register: AtomicBool,
}

impl MockTimers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `register` calls fail, for rollback tests.
    pub fn set_fail_register(&self, fail: bool) {
        self.fail_register.store(fail, Ordering::SeqCst);
    }

    pub fn registered(&self) -> Vec<AlarmId> {
        self.inner.lock().unwrap().keys().cloned().collect()
    }

    /// The single registered alarm id. Panics unless exactly one exists.
    pub fn sole_id(&self) -> AlarmId {
        let ids = self.registered();
        assert_eq!(ids.len(), 1, "expected exactly one registered alarm");
        ids.into_iter().next().unwrap()
    }

    pub fn pending_delay(&self, id: &AlarmId) -> Option<Duration> {
        self.inner.lock().unwrap().get(id).and_then(|r| r.pending)
    }

    pub fn wake_flag(&self, id: &AlarmId) -> Option<bool> {
        self.inner.lock().unwrap().get(id).map(|r| r.wake)
    }

    /// Deliver the pending fire for `id` at monotonic time `now`. No-op if
    /// the id is deregistered or has nothing scheduled, matching a platform
    /// that never delivers canceled wake-ups.
    pub fn fire(&self, id: &AlarmId, now: Timestamp) {
        let callback = {
            let mut inner = self.inner.lock().unwrap();
            match inner.get_mut(id) {
                Some(reg) if reg.pending.is_some() => {
                    reg.pending = None;
                    Some(Arc::clone(&reg.on_fire))
                }
                _ => None,
            }
        };
        // Invoke outside the map lock: callbacks reschedule.
        if let Some(callback) = callback {
            (callback.lock().unwrap())(now);
        }
    }
}

impl TimerCapability for MockTimers {
    fn register(&self, id: AlarmId, wake: bool, on_fire: FireCallback) -> Result<()> {
        if self.fail_register.load(Ordering::SeqCst) {
            return Err(Error::capability_unavailable(
                "timer",
                "register failure injected",
            ));
        }
        let mut inner = self.inner.lock().unwrap();
        if inner.contains_key(&id) {
            return Err(Error::capability_unavailable(
                "timer",
                "identity already registered",
            ));
        }
        inner.insert(
            id,
            TimerRegistration {
                wake,
                on_fire: Arc::new(Mutex::new(on_fire)),
                pending: None,
            },
        );
        Ok(())
    }

    fn schedule(&self, id: &AlarmId, delay: Duration) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        match inner.get_mut(id) {
            Some(reg) => {
                reg.pending = Some(delay);
                Ok(())
            }
            None => Err(Error::capability_unavailable(
                "timer",
                "identity not registered",
            )),
        }
    }

    fn cancel(&self, id: &AlarmId) {
        if let Some(reg) = self.inner.lock().unwrap().get_mut(id) {
            reg.pending = None;
        }
    }

    fn deregister(&self, id: &AlarmId) {
        self.inner.lock().unwrap().remove(id);
    }
}

// ---------------------------------------------------------------------------
// Observations
// ---------------------------------------------------------------------------

struct ObservationLog<R: 'static> {
    active_sink: Option<ObservationSink<R>>,
    passive_sink: Option<ObservationSink<R>>,
    active_starts: Vec<(String, Duration, f32)>,
    passive_starts: Vec<(Duration, f32)>,
    single_requests: Vec<String>,
    stops: usize,
}

impl<R: 'static> Default for ObservationLog<R> {
    fn default() -> Self {
        Self {
            active_sink: None,
            passive_sink: None,
            active_starts: Vec::new(),
            passive_starts: Vec::new(),
            single_requests: Vec::new(),
            stops: 0,
        }
    }
}

/// Recording observation capability; the test plays the platform.
pub struct MockObservations<R: 'static> {
    providers: Vec<String>,
    log: Mutex<ObservationLog<R>>,
}

impl<R: 'static> MockObservations<R> {
    pub fn new(providers: &[&str]) -> Self {
        Self {
            providers: providers.iter().map(|p| p.to_string()).collect(),
            log: Mutex::new(ObservationLog::default()),
        }
    }

    pub fn active_starts(&self) -> Vec<(String, Duration, f32)> {
        self.log.lock().unwrap().active_starts.clone()
    }

    pub fn passive_starts(&self) -> Vec<(Duration, f32)> {
        self.log.lock().unwrap().passive_starts.clone()
    }

    pub fn single_requests(&self) -> Vec<String> {
        self.log.lock().unwrap().single_requests.clone()
    }

    pub fn stop_count(&self) -> usize {
        self.log.lock().unwrap().stops
    }

    /// Deliver a raw observation through the active subscription.
    pub fn deliver_active(&self, raw: R) {
        let sink = self
            .log
            .lock()
            .unwrap()
            .active_sink
            .clone()
            .expect("active delivery not started");
        sink(raw);
    }

    /// Deliver a raw observation through the passive subscription.
    pub fn deliver_passive(&self, raw: R) {
        let sink = self
            .log
            .lock()
            .unwrap()
            .passive_sink
            .clone()
            .expect("passive delivery not started");
        sink(raw);
    }
}

impl<R: Send + 'static> ObservationCapability<R> for MockObservations<R> {
    fn available_providers(&self) -> Vec<String> {
        self.providers.clone()
    }

    fn start_updates(
        &self,
        provider: &str,
        interval: Duration,
        min_displacement_m: f32,
        sink: ObservationSink<R>,
    ) -> Result<()> {
        let mut log = self.log.lock().unwrap();
        log.active_starts
            .push((provider.to_string(), interval, min_displacement_m));
        log.active_sink = Some(sink);
        Ok(())
    }

    fn start_passive_updates(
        &self,
        interval: Duration,
        min_displacement_m: f32,
        sink: ObservationSink<R>,
    ) -> Result<()> {
        let mut log = self.log.lock().unwrap();
        log.passive_starts.push((interval, min_displacement_m));
        log.passive_sink = Some(sink);
        Ok(())
    }

    fn request_single_update(&self, provider: &str, _sink: ObservationSink<R>) -> Result<()> {
        self.log
            .lock()
            .unwrap()
            .single_requests
            .push(provider.to_string());
        Ok(())
    }

    fn stop_updates(&self) -> Result<()> {
        let mut log = self.log.lock().unwrap();
        log.active_sink = None;
        log.passive_sink = None;
        log.stops += 1;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Reporter
// ---------------------------------------------------------------------------

/// How the mock reporter acknowledges each batch.
#[derive(Debug, Clone, Copy)]
pub enum AckMode {
    /// Acknowledge everything immediately.
    All,
    /// Acknowledge nothing immediately (empty completion).
    Nothing,
    /// Acknowledge only the first `n` samples of the batch.
    First(usize),
    /// Keep the completion for the test to release later.
    Hold,
}

/// Scripted reporting capability.
pub struct MockReporter<S: 'static> {
    mode: Mutex<AckMode>,
    batches: Mutex<Vec<Vec<S>>>,
    held: Mutex<Vec<(Vec<S>, ReportCompletion<S>)>>,
}

impl<S: 'static> MockReporter<S> {
    pub fn new(mode: AckMode) -> Self {
        Self {
            mode: Mutex::new(mode),
            batches: Mutex::new(Vec::new()),
            held: Mutex::new(Vec::new()),
        }
    }

    pub fn set_mode(&self, mode: AckMode) {
        *self.mode.lock().unwrap() = mode;
    }

    pub fn batch_count(&self) -> usize {
        self.batches.lock().unwrap().len()
    }

    /// Take any held batch/completion pairs.
    pub fn release_held(&self) -> Vec<(Vec<S>, ReportCompletion<S>)> {
        std::mem::take(&mut *self.held.lock().unwrap())
    }
}

impl<S: Clone + Send + 'static> MockReporter<S> {
    pub fn batches(&self) -> Vec<Vec<S>> {
        self.batches.lock().unwrap().clone()
    }
}

impl<S: Clone + Send + 'static> ReportingCapability<S> for MockReporter<S> {
    fn report_locations(&self, samples: Vec<S>, completion: ReportCompletion<S>) {
        self.batches.lock().unwrap().push(samples.clone());
        let mode = *self.mode.lock().unwrap();
        match mode {
            AckMode::All => completion.complete(samples),
            AckMode::Nothing => completion.complete(Vec::new()),
            AckMode::First(n) => completion.complete(samples.into_iter().take(n).collect()),
            AckMode::Hold => self.held.lock().unwrap().push((samples, completion)),
        }
    }
}
