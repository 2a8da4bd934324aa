//! Consumed platform capabilities.
//!
//! The tracer core owns no platform integration of its own. Position
//! sensing, deferred execution, and the reporting sink are all injected
//! behind the traits in this module:
//!
//! - [`ObservationCapability`]: emits raw observations (push model) and
//!   honors active/passive/single-shot delivery requests.
//! - [`TimerCapability`]: registers fire callbacks under unique identities
//!   and wakes the process after a requested delay.
//! - [`ReportingCapability`]: persists flushed samples and acknowledges the
//!   subset it durably handled via a [`ReportCompletion`] handle.

use std::sync::{Arc, Weak};
use std::time::Duration;

use lt_common::{AlarmId, Result};

use crate::clock::Timestamp;
use crate::store::LocationStore;

/// Sink receiving raw observations from the platform.
pub type ObservationSink<R> = Arc<dyn Fn(R) + Send + Sync>;

/// A sink that drops every observation it is given.
///
/// Used for single-shot freshness requests: the passive subscription is
/// already listening for the update the request hopes to cause, so feeding
/// the sample through a second channel would offer it to the store twice.
pub fn discarding_sink<R: 'static>() -> ObservationSink<R> {
    Arc::new(|_| {})
}

/// Source of position observations.
pub trait ObservationCapability<R: 'static>: Send + Sync {
    /// Names of the providers currently available for active requests.
    fn available_providers(&self) -> Vec<String>;

    /// Begin continuous delivery from `provider` into `sink`, at no less
    /// than `interval` between updates and `min_displacement_m` meters
    /// between positions.
    fn start_updates(
        &self,
        provider: &str,
        interval: Duration,
        min_displacement_m: f32,
        sink: ObservationSink<R>,
    ) -> Result<()>;

    /// Begin passive delivery: observations produced at the request of
    /// other consumers are copied into `sink`.
    fn start_passive_updates(
        &self,
        interval: Duration,
        min_displacement_m: f32,
        sink: ObservationSink<R>,
    ) -> Result<()>;

    /// Request exactly one observation from `provider`, delivered to `sink`.
    fn request_single_update(&self, provider: &str, sink: ObservationSink<R>) -> Result<()>;

    /// Stop all deliveries previously started through this capability.
    fn stop_updates(&self) -> Result<()>;
}

/// Callback invoked when a scheduled alarm fires, with the monotonic fire
/// time.
pub type FireCallback = Box<dyn FnMut(Timestamp) + Send>;

/// Deferred-execution capability.
///
/// Contract required of implementations:
/// - Fires are delivered asynchronously: never from inside `register` or
///   `schedule`. Callers hold locks across those calls.
/// - A fire may arrive later than requested (the platform may coalesce or
///   delay), never earlier.
/// - After `deregister`, the identity never delivers again; `schedule`
///   against it fails.
pub trait TimerCapability: Send + Sync {
    /// Register `on_fire` under `id`. `wake` asks the platform to deliver
    /// even from a low-power state.
    fn register(&self, id: AlarmId, wake: bool, on_fire: FireCallback) -> Result<()>;

    /// Request one delivery of `id` after `delay`.
    fn schedule(&self, id: &AlarmId, delay: Duration) -> Result<()>;

    /// Drop any pending delivery of `id`. Deliveries already in flight are
    /// not recalled.
    fn cancel(&self, id: &AlarmId);

    /// Remove the registration for `id`.
    fn deregister(&self, id: &AlarmId);
}

/// Chooses which provider to request observations from.
pub trait ProviderStrategy: Send + Sync {
    /// Choose a provider, given those the capability advertises.
    fn select_provider(&self, available: &[String]) -> Option<String>;
}

/// A [`ProviderStrategy`] that always names the provider it was built with,
/// regardless of what the capability advertises.
#[derive(Debug, Clone)]
pub struct FixedProvider(pub String);

impl FixedProvider {
    pub fn new(provider: impl Into<String>) -> Self {
        FixedProvider(provider.into())
    }
}

impl ProviderStrategy for FixedProvider {
    fn select_provider(&self, _available: &[String]) -> Option<String> {
        Some(self.0.clone())
    }
}

/// A [`ProviderStrategy`] that takes whatever the capability advertises
/// first, selecting nothing when nothing is advertised.
#[derive(Debug, Clone, Copy, Default)]
pub struct FirstAvailable;

impl ProviderStrategy for FirstAvailable {
    fn select_provider(&self, available: &[String]) -> Option<String> {
        available.first().cloned()
    }
}

/// Sink that persists flushed samples.
pub trait ReportingCapability<S: 'static>: Send + Sync {
    /// Attempt to report the given samples. The implementation must
    /// eventually consume `completion` exactly once, naming the subset it
    /// durably handled (possibly a strict subset, possibly empty). Samples
    /// it does not name stay buffered and ride the next flush, so repeated
    /// delivery of the same sample must be acceptable to the sink.
    fn report_locations(&self, samples: Vec<S>, completion: ReportCompletion<S>);
}

/// One-shot acknowledgement handle for a reported batch.
///
/// Holds only a non-owning reference to the store: completing after the
/// store is gone is a warn-logged no-op, and an outstanding handle never
/// keeps the store alive. Consuming `self` makes a second completion of the
/// same batch unrepresentable.
pub struct ReportCompletion<S: 'static> {
    store: Weak<dyn LocationStore<S>>,
}

impl<S: 'static> ReportCompletion<S> {
    pub(crate) fn new(store: Weak<dyn LocationStore<S>>) -> Self {
        Self { store }
    }

    /// Acknowledge `reported` as durably handled, removing exactly those
    /// samples from the store.
    pub fn complete(self, reported: Vec<S>) {
        match self.store.upgrade() {
            Some(store) => {
                if !reported.is_empty() {
                    tracing::debug!(count = reported.len(), "removing reported samples");
                    store.remove(&reported);
                }
            }
            None => {
                tracing::warn!("location store no longer exists; ignoring report completion");
            }
        }
    }
}
