//! Fixed-period repeating alarm.

use std::sync::Arc;
use std::time::Duration;

use lt_common::{AlarmId, Result};

use super::AlarmCore;
use crate::capabilities::{FireCallback, TimerCapability};
use crate::clock::Timestamp;

/// An alarm that fires every `period`, best-effort.
///
/// The platform may coalesce or delay fires; each reschedule is one full
/// period from the fire that just ran, so drift accumulates rather than
/// causing catch-up bursts.
pub struct RecurringAlarm {
    core: AlarmCore,
    period: Duration,
}

impl RecurringAlarm {
    pub fn new(
        timers: Arc<dyn TimerCapability>,
        id: AlarmId,
        period: Duration,
        wake: bool,
    ) -> Self {
        Self {
            core: AlarmCore::new(timers, id, wake),
            period,
        }
    }

    pub fn id(&self) -> &AlarmId {
        self.core.id()
    }

    pub fn is_started(&self) -> bool {
        self.core.is_started()
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Register and schedule the first fire one period out. Each fire runs
    /// `on_fire`, then reschedules.
    pub fn start<F>(&mut self, mut on_fire: F) -> Result<()>
    where
        F: FnMut(Timestamp) + Send + 'static,
    {
        let timers = Arc::clone(self.core.timers());
        let id = self.core.id().clone();
        let period = self.period;
        let callback: FireCallback = Box::new(move |fired_at| {
            on_fire(fired_at);
            if let Err(err) = timers.schedule(&id, period) {
                tracing::warn!(alarm = %id, error = %err, "failed to reschedule recurring alarm");
            }
        });
        self.core.begin(callback, self.period)
    }

    /// Cancel the pending fire and deregister.
    pub fn stop(&mut self) -> Result<()> {
        self.core.end()
    }
}
