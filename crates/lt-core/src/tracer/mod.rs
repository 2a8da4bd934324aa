//! The tracer facade: one bounded store, two session state machines.
//!
//! A [`LocationTracer`] owns at most one listening session (is observation
//! active, and how) and at most one reporting session (is the periodic
//! flush running). Session start/stop calls and alarm fire handling are
//! serialized on a single session lock; the store carries its own lock so
//! observation delivery never contends with session mutation.
//!
//! All platform effects go through the injected capabilities; alarm fire
//! callbacks and report completions hold only weak references back into the
//! tracer, so dropping it (or its store) is never prevented by in-flight
//! work.

mod listening;
mod reporting;

pub use listening::{ActiveListeningOptions, PassiveListeningOptions};
pub use reporting::ReportingOptions;

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use lt_common::AlarmIdSource;

use crate::alarm::{IrregularAlarm, RecurringAlarm};
use crate::capabilities::{
    FixedProvider, ObservationCapability, ObservationSink, ProviderStrategy, ReportingCapability,
    TimerCapability,
};
use crate::clock::{Clock, MonotonicClock, Timestamp};
use crate::store::LocationStore;
use crate::transform::{passthrough, LocationTransformer};

/// Provider requested when no strategy is injected, for both active
/// listening and freshness requests.
pub const DEFAULT_PROVIDER: &str = "gps";

/// Minimum interval requested between observation updates when the caller
/// does not specify one.
pub const DEFAULT_UPDATE_INTERVAL: Duration = Duration::from_millis(1000);

/// Whether, and how, observation is currently active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListeningState {
    Idle,
    ActivePolling,
    PassiveOnly,
    PassiveWithFreshnessAlarm,
}

/// Whether the periodic flush is currently active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportingState {
    Idle,
    Reporting,
}

pub(crate) struct ListeningSession {
    pub(crate) mode: ListeningState,
    pub(crate) freshness_alarm: Option<IrregularAlarm>,
    pub(crate) started_at: DateTime<Utc>,
}

pub(crate) struct ReportingSession {
    pub(crate) alarm: RecurringAlarm,
    pub(crate) started_at: DateTime<Utc>,
}

#[derive(Default)]
pub(crate) struct SessionSlots {
    pub(crate) listening: Option<ListeningSession>,
    pub(crate) reporting: Option<ReportingSession>,
}

pub(crate) struct TracerShared<R: 'static, S: 'static> {
    pub(crate) store: Arc<dyn LocationStore<S>>,
    pub(crate) observations: Arc<dyn ObservationCapability<R>>,
    pub(crate) timers: Arc<dyn TimerCapability>,
    pub(crate) reporter: Arc<dyn ReportingCapability<S>>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) ids: AlarmIdSource,
    pub(crate) sink: ObservationSink<R>,
    pub(crate) active_provider: Arc<dyn ProviderStrategy>,
    pub(crate) passive_provider: Arc<dyn ProviderStrategy>,
    pub(crate) sessions: Mutex<SessionSlots>,
}

impl<R: 'static, S: 'static> TracerShared<R, S> {
    pub(crate) fn lock_sessions(&self) -> MutexGuard<'_, SessionSlots> {
        self.sessions.lock().unwrap()
    }
}

/// Buffers observed position samples and reports them on a schedule.
pub struct LocationTracer<R: 'static, S: 'static> {
    pub(crate) shared: Arc<TracerShared<R, S>>,
}

impl<R: 'static, S: 'static> Clone for LocationTracer<R, S> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<R, S> LocationTracer<R, S>
where
    R: Send + 'static,
    S: Clone + PartialEq + Send + 'static,
{
    /// Build a tracer with default clock, id source, and provider
    /// strategies. Use [`LocationTracer::builder`] to override any of them.
    pub fn new(
        store: Arc<dyn LocationStore<S>>,
        observations: Arc<dyn ObservationCapability<R>>,
        timers: Arc<dyn TimerCapability>,
        reporter: Arc<dyn ReportingCapability<S>>,
        transformer: impl LocationTransformer<R, S> + 'static,
    ) -> Self {
        Self::builder(store, observations, timers, reporter, transformer).build()
    }

    pub fn builder(
        store: Arc<dyn LocationStore<S>>,
        observations: Arc<dyn ObservationCapability<R>>,
        timers: Arc<dyn TimerCapability>,
        reporter: Arc<dyn ReportingCapability<S>>,
        transformer: impl LocationTransformer<R, S> + 'static,
    ) -> TracerBuilder<R, S> {
        TracerBuilder {
            store,
            observations,
            timers,
            reporter,
            transformer: Box::new(transformer),
            clock: Arc::new(MonotonicClock::new()),
            ids: AlarmIdSource::new(),
            active_provider: Arc::new(FixedProvider::new(DEFAULT_PROVIDER)),
            passive_provider: Arc::new(FixedProvider::new(DEFAULT_PROVIDER)),
        }
    }

    // ------------------------------------------------------------------
    // Store delegation
    // ------------------------------------------------------------------

    /// Offer a sample directly to the store, bypassing the transform stage.
    pub fn offer_location(&self, sample: S) {
        self.shared.store.offer(sample);
    }

    /// Number of samples currently buffered.
    pub fn location_count(&self) -> usize {
        self.shared.store.count()
    }

    /// Point-in-time ordered copy of the buffered samples.
    pub fn locations(&self) -> Vec<S> {
        self.shared.store.snapshot()
    }

    /// Remove every buffered sample equal to any of `samples`.
    pub fn remove_locations(&self, samples: &[S]) {
        self.shared.store.remove(samples);
    }

    /// Monotonic timestamp of the most recent accepted sample, if any.
    pub fn last_location_acceptance_time(&self) -> Option<Timestamp> {
        self.shared.store.last_accepted_at()
    }

    /// The store this tracer feeds and drains.
    pub fn store(&self) -> &Arc<dyn LocationStore<S>> {
        &self.shared.store
    }

    // ------------------------------------------------------------------
    // State inspection
    // ------------------------------------------------------------------

    pub fn listening_state(&self) -> ListeningState {
        match &self.shared.lock_sessions().listening {
            Some(session) => session.mode,
            None => ListeningState::Idle,
        }
    }

    pub fn reporting_state(&self) -> ReportingState {
        match self.shared.lock_sessions().reporting {
            Some(_) => ReportingState::Reporting,
            None => ReportingState::Idle,
        }
    }

    /// Wall-clock time the current listening session began, if one exists.
    pub fn listening_since(&self) -> Option<DateTime<Utc>> {
        self.shared
            .lock_sessions()
            .listening
            .as_ref()
            .map(|session| session.started_at)
    }

    /// Wall-clock time the current reporting session began, if one exists.
    pub fn reporting_since(&self) -> Option<DateTime<Utc>> {
        self.shared
            .lock_sessions()
            .reporting
            .as_ref()
            .map(|session| session.started_at)
    }
}

impl<R> LocationTracer<R, R>
where
    R: Clone + PartialEq + Send + 'static,
{
    /// Convenience constructor storing observations as-is.
    pub fn passthrough(
        store: Arc<dyn LocationStore<R>>,
        observations: Arc<dyn ObservationCapability<R>>,
        timers: Arc<dyn TimerCapability>,
        reporter: Arc<dyn ReportingCapability<R>>,
    ) -> Self {
        Self::new(store, observations, timers, reporter, passthrough())
    }
}

/// Assembles a [`LocationTracer`], with overridable clock, identity source,
/// and provider strategies.
pub struct TracerBuilder<R: 'static, S: 'static> {
    store: Arc<dyn LocationStore<S>>,
    observations: Arc<dyn ObservationCapability<R>>,
    timers: Arc<dyn TimerCapability>,
    reporter: Arc<dyn ReportingCapability<S>>,
    transformer: Box<dyn LocationTransformer<R, S>>,
    clock: Arc<dyn Clock>,
    ids: AlarmIdSource,
    active_provider: Arc<dyn ProviderStrategy>,
    passive_provider: Arc<dyn ProviderStrategy>,
}

impl<R, S> TracerBuilder<R, S>
where
    R: Send + 'static,
    S: Clone + PartialEq + Send + 'static,
{
    /// Clock used for acceptance timestamps and freshness arithmetic.
    /// Share one clock with the store when injecting a test clock.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Source of alarm identities.
    pub fn id_source(mut self, ids: AlarmIdSource) -> Self {
        self.ids = ids;
        self
    }

    /// Strategy choosing the provider for active listening.
    pub fn active_provider_strategy(mut self, strategy: impl ProviderStrategy + 'static) -> Self {
        self.active_provider = Arc::new(strategy);
        self
    }

    /// Strategy choosing the provider for single-shot freshness requests
    /// issued during passive listening.
    pub fn passive_provider_strategy(mut self, strategy: impl ProviderStrategy + 'static) -> Self {
        self.passive_provider = Arc::new(strategy);
        self
    }

    pub fn build(self) -> LocationTracer<R, S> {
        let sink: ObservationSink<R> = {
            let store = Arc::clone(&self.store);
            let transformer = self.transformer;
            Arc::new(move |raw: R| store.offer(transformer.transform(raw)))
        };
        LocationTracer {
            shared: Arc::new(TracerShared {
                store: self.store,
                observations: self.observations,
                timers: self.timers,
                reporter: self.reporter,
                clock: self.clock,
                ids: self.ids,
                sink,
                active_provider: self.active_provider,
                passive_provider: self.passive_provider,
                sessions: Mutex::new(SessionSlots::default()),
            }),
        }
    }
}
