//! Listening session: when and how observation is active.
//!
//! Active listening polls a provider directly at a fixed rate. Passive
//! listening rides updates other consumers cause, optionally topped up by a
//! freshness alarm: an irregular alarm that wakes exactly when the newest
//! accepted sample would go stale and, if nothing arrived in the meantime,
//! requests a single observation through a discarding sink. The passive
//! subscription is what actually records the resulting sample, so the store
//! is never fed twice for one observation.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use lt_common::{Error, Result};

use crate::alarm::IrregularAlarm;
use crate::capabilities::{discarding_sink, ObservationCapability, ProviderStrategy};
use crate::clock::Timestamp;
use crate::tracer::{ListeningSession, ListeningState, LocationTracer, DEFAULT_UPDATE_INTERVAL};

/// Options for [`LocationTracer::start_listening_actively`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveListeningOptions {
    /// Minimum interval requested between observation updates.
    pub update_interval: Duration,
    /// Minimum displacement, in meters, between an observation and the one
    /// preceding it.
    pub min_displacement_m: f32,
}

impl Default for ActiveListeningOptions {
    fn default() -> Self {
        Self {
            update_interval: DEFAULT_UPDATE_INTERVAL,
            min_displacement_m: 0.0,
        }
    }
}

/// Options for [`LocationTracer::start_listening_passively`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PassiveListeningOptions {
    /// Minimum interval requested between passively delivered updates.
    pub update_interval: Duration,
    /// Minimum displacement, in meters, between updates.
    pub min_displacement_m: f32,
    /// How long to wait since the last accepted sample before actively
    /// requesting one. `None` disables the freshness alarm.
    pub freshness_interval: Option<Duration>,
    /// Whether freshness requests may wake the device from a low-power
    /// state.
    pub wake: bool,
}

impl Default for PassiveListeningOptions {
    fn default() -> Self {
        Self {
            update_interval: DEFAULT_UPDATE_INTERVAL,
            min_displacement_m: 0.0,
            freshness_interval: None,
            wake: false,
        }
    }
}

impl PassiveListeningOptions {
    /// Enable the freshness alarm with the given interval.
    pub fn with_freshness_interval(mut self, interval: Duration) -> Self {
        self.freshness_interval = Some(interval);
        self
    }
}

impl<R, S> LocationTracer<R, S>
where
    R: Send + 'static,
    S: Clone + PartialEq + Send + 'static,
{
    /// Start actively requesting observations at the rate in `options`.
    ///
    /// Fails with an invalid-state error if any listening session exists.
    pub fn start_listening_actively(&self, options: ActiveListeningOptions) -> Result<()> {
        let mut slots = self.shared.lock_sessions();
        if slots.listening.is_some() {
            return Err(Error::ListeningInProgress);
        }

        let provider = select_provider(
            self.shared.active_provider.as_ref(),
            self.shared.observations.as_ref(),
        )?;
        self.shared.observations.start_updates(
            &provider,
            options.update_interval,
            options.min_displacement_m,
            Arc::clone(&self.shared.sink),
        )?;

        tracing::debug!(provider = %provider, "started active listening");
        slots.listening = Some(ListeningSession {
            mode: ListeningState::ActivePolling,
            freshness_alarm: None,
            started_at: Utc::now(),
        });
        Ok(())
    }

    /// Start listening for observations that happen at the request of other
    /// consumers. If `options.freshness_interval` is set, a freshness alarm
    /// tops up the store whenever no sample has arrived within it.
    ///
    /// Fails with an invalid-state error if any listening session exists.
    pub fn start_listening_passively(&self, options: PassiveListeningOptions) -> Result<()> {
        let mut slots = self.shared.lock_sessions();
        if slots.listening.is_some() {
            return Err(Error::ListeningInProgress);
        }

        self.shared.observations.start_passive_updates(
            options.update_interval,
            options.min_displacement_m,
            Arc::clone(&self.shared.sink),
        )?;

        let freshness_alarm = match options.freshness_interval {
            None => None,
            Some(interval) => match self.start_freshness_alarm(interval, options.wake) {
                Ok(alarm) => Some(alarm),
                Err(err) => {
                    // Roll back the subscription so a failed start leaves
                    // the tracer idle.
                    if let Err(stop_err) = self.shared.observations.stop_updates() {
                        tracing::warn!(error = %stop_err, "failed to unsubscribe after alarm start failure");
                    }
                    return Err(err);
                }
            },
        };

        let mode = if freshness_alarm.is_some() {
            ListeningState::PassiveWithFreshnessAlarm
        } else {
            ListeningState::PassiveOnly
        };
        tracing::debug!(?mode, "started passive listening");
        slots.listening = Some(ListeningSession {
            mode,
            freshness_alarm,
            started_at: Utc::now(),
        });
        Ok(())
    }

    /// Stop observation delivery and any freshness alarm.
    ///
    /// Fails with an invalid-state error if no listening session exists.
    pub fn stop_listening(&self) -> Result<()> {
        let mut slots = self.shared.lock_sessions();
        let mut session = slots
            .listening
            .take()
            .ok_or(Error::ListeningNotInProgress)?;

        let stop_result = self.shared.observations.stop_updates();
        if let Some(mut alarm) = session.freshness_alarm.take() {
            if let Err(err) = alarm.stop() {
                tracing::warn!(error = %err, "freshness alarm was not running at stop");
            }
        }
        tracing::debug!("stopped listening");
        stop_result
    }

    fn start_freshness_alarm(&self, interval: Duration, wake: bool) -> Result<IrregularAlarm> {
        let mut alarm = IrregularAlarm::new(
            Arc::clone(&self.shared.timers),
            self.shared.ids.next_id(),
            Arc::clone(&self.shared.clock),
            wake,
        );

        let delay_store = Arc::downgrade(&self.shared.store);
        let next_delay = move |now: Timestamp| match delay_store.upgrade() {
            Some(store) => freshness_delay(store.last_accepted_at(), interval, now),
            None => interval,
        };

        let shared = Arc::downgrade(&self.shared);
        let on_fire = move |fired_at: Timestamp| {
            let Some(shared) = shared.upgrade() else {
                return;
            };
            let slots = shared.lock_sessions();
            // A fire that lost the race with stop_listening observes the
            // empty slot and does nothing.
            if slots.listening.is_none() {
                return;
            }
            if !is_stale(shared.store.last_accepted_at(), interval, fired_at) {
                return;
            }
            match select_provider(
                shared.passive_provider.as_ref(),
                shared.observations.as_ref(),
            ) {
                Ok(provider) => {
                    tracing::debug!(provider = %provider, "requesting one observation to refresh stale store");
                    if let Err(err) = shared
                        .observations
                        .request_single_update(&provider, discarding_sink())
                    {
                        tracing::warn!(error = %err, "single observation request failed");
                    }
                }
                Err(err) => {
                    tracing::warn!(error = %err, "no provider available for freshness request");
                }
            }
        };

        alarm.start(on_fire, next_delay)?;
        Ok(alarm)
    }
}

fn select_provider<R: 'static>(
    strategy: &dyn ProviderStrategy,
    observations: &dyn ObservationCapability<R>,
) -> Result<String> {
    let available = observations.available_providers();
    strategy
        .select_provider(&available)
        .ok_or_else(|| Error::NoProvider(format!("strategy selected none of {:?}", available)))
}

/// Milliseconds since the last accepted sample, or `None` if no sample has
/// ever been accepted.
fn elapsed_since_acceptance(last_accepted_at: Option<Timestamp>, now: Timestamp) -> Option<u64> {
    last_accepted_at.map(|at| now.saturating_sub(at))
}

/// The newest sample has expired (or none was ever accepted). The boundary
/// is inclusive: a sample exactly `interval` old is stale.
fn is_stale(last_accepted_at: Option<Timestamp>, interval: Duration, now: Timestamp) -> bool {
    match elapsed_since_acceptance(last_accepted_at, now) {
        None => true,
        Some(elapsed) => elapsed >= interval.as_millis() as u64,
    }
}

/// Delay until the next freshness check: a full interval when already stale
/// or never fed, otherwise just long enough for the newest sample to expire.
fn freshness_delay(
    last_accepted_at: Option<Timestamp>,
    interval: Duration,
    now: Timestamp,
) -> Duration {
    let interval_ms = interval.as_millis() as u64;
    match elapsed_since_acceptance(last_accepted_at, now) {
        Some(elapsed) if elapsed < interval_ms => Duration::from_millis(interval_ms - elapsed),
        _ => interval,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INTERVAL: Duration = Duration::from_millis(2000);

    #[test]
    fn test_never_fed_store_is_stale() {
        assert!(is_stale(None, INTERVAL, 0));
        assert!(is_stale(None, INTERVAL, 10_000));
        assert_eq!(freshness_delay(None, INTERVAL, 10_000), INTERVAL);
    }

    #[test]
    fn test_expiry_boundary_is_inclusive() {
        // Sample accepted at t=1000; at t=3000 it is exactly interval old.
        assert!(is_stale(Some(1000), INTERVAL, 3000));
        assert!(!is_stale(Some(1000), INTERVAL, 2999));
    }

    #[test]
    fn test_fresh_sample_waits_out_the_remainder() {
        // Accepted 500ms ago: wake when the remaining 1500ms have passed.
        assert_eq!(
            freshness_delay(Some(1000), INTERVAL, 1500),
            Duration::from_millis(1500)
        );
    }

    #[test]
    fn test_stale_sample_gets_a_full_interval() {
        assert_eq!(freshness_delay(Some(1000), INTERVAL, 3000), INTERVAL);
        assert_eq!(freshness_delay(Some(1000), INTERVAL, 9999), INTERVAL);
    }

    #[test]
    fn test_clock_skew_does_not_underflow() {
        // A fire delivered with a timestamp before the acceptance time
        // (coalesced delivery) reads as zero elapsed, not a huge value.
        assert!(!is_stale(Some(5000), INTERVAL, 4000));
        assert_eq!(freshness_delay(Some(5000), INTERVAL, 4000), INTERVAL);
    }

    #[test]
    fn test_default_options_match_documented_defaults() {
        let active = ActiveListeningOptions::default();
        assert_eq!(active.update_interval, DEFAULT_UPDATE_INTERVAL);
        assert_eq!(active.min_displacement_m, 0.0);

        let passive = PassiveListeningOptions::default();
        assert!(passive.freshness_interval.is_none());
        assert!(!passive.wake);
    }

    #[test]
    fn test_with_freshness_interval() {
        let options = PassiveListeningOptions::default().with_freshness_interval(INTERVAL);
        assert_eq!(options.freshness_interval, Some(INTERVAL));
    }
}
