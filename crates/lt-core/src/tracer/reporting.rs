//! Reporting session: the periodic flush.
//!
//! Every alarm fire drains the store through the reporting capability.
//! Samples leave the store only when the capability's completion names them
//! as durably handled; anything unacknowledged stays buffered, in order,
//! and rides the next flush. A crash, a dropped completion, or a partial
//! acknowledgement therefore leads to redelivery, never loss.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use lt_common::{Error, Result};

use crate::alarm::RecurringAlarm;
use crate::capabilities::ReportCompletion;
use crate::tracer::{LocationTracer, ReportingSession, TracerShared};

/// Options for [`LocationTracer::start_reporting`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportingOptions {
    /// Interval between flushes.
    pub interval: Duration,
    /// Whether flush alarms may wake the device from a low-power state.
    pub wake: bool,
}

impl ReportingOptions {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            wake: false,
        }
    }

    pub fn with_wake(mut self, wake: bool) -> Self {
        self.wake = wake;
        self
    }
}

impl<R, S> LocationTracer<R, S>
where
    R: Send + 'static,
    S: Clone + PartialEq + Send + 'static,
{
    /// Start flushing buffered samples every `options.interval`.
    ///
    /// Fails with an invalid-state error if reporting is already in
    /// progress.
    pub fn start_reporting(&self, options: ReportingOptions) -> Result<()> {
        let mut slots = self.shared.lock_sessions();
        if slots.reporting.is_some() {
            return Err(Error::ReportingInProgress);
        }

        let mut alarm = RecurringAlarm::new(
            Arc::clone(&self.shared.timers),
            self.shared.ids.next_id(),
            options.interval,
            options.wake,
        );
        let shared = Arc::downgrade(&self.shared);
        alarm.start(move |_fired_at| {
            let Some(shared) = shared.upgrade() else {
                return;
            };
            let slots = shared.lock_sessions();
            // A fire that lost the race with stop_reporting observes the
            // empty slot and does nothing.
            if slots.reporting.is_none() {
                return;
            }
            drain_and_report(&shared);
        })?;

        tracing::debug!(interval_ms = options.interval.as_millis() as u64, "started reporting");
        slots.reporting = Some(ReportingSession {
            alarm,
            started_at: Utc::now(),
        });
        Ok(())
    }

    /// Stop the periodic flush. With `flush_remaining`, performs one final
    /// drain-and-report synchronously before returning.
    ///
    /// Fails with an invalid-state error if reporting is not in progress.
    /// Reports already handed to the capability are unaffected; their
    /// completions may still arrive and remove samples after this returns.
    pub fn stop_reporting(&self, flush_remaining: bool) -> Result<()> {
        let mut slots = self.shared.lock_sessions();
        let mut session = slots
            .reporting
            .take()
            .ok_or(Error::ReportingNotInProgress)?;

        if let Err(err) = session.alarm.stop() {
            tracing::warn!(error = %err, "reporting alarm was not running at stop");
        }
        if flush_remaining {
            drain_and_report(&self.shared);
        }
        tracing::debug!("stopped reporting");
        Ok(())
    }
}

/// Snapshot the store and hand the batch to the reporting capability. No-op
/// when the store is empty, so an idle tracer never invokes the reporter.
pub(crate) fn drain_and_report<R, S>(shared: &TracerShared<R, S>)
where
    R: Send + 'static,
    S: Clone + PartialEq + Send + 'static,
{
    if shared.store.count() == 0 {
        return;
    }
    let batch = shared.store.snapshot();
    tracing::debug!(count = batch.len(), "flushing buffered samples");
    let completion = ReportCompletion::new(Arc::downgrade(&shared.store));
    shared.reporter.report_locations(batch, completion);
}
