//! Self-correcting alarm with a state-dependent delay.

use std::sync::Arc;
use std::time::Duration;

use lt_common::{AlarmId, Result};

use super::AlarmCore;
use crate::capabilities::{FireCallback, TimerCapability};
use crate::clock::{Clock, Timestamp};

/// An alarm whose next delay is recomputed every time it is scheduled.
///
/// A fixed-period re-check would either over-fire (polling while state is
/// already fresh) or under-fire (missing the moment state goes stale);
/// recomputing the delay from actual state at fire time is self-correcting.
/// Used for the freshness alarm, where the delay derives from how recently
/// the store last accepted a sample.
pub struct IrregularAlarm {
    core: AlarmCore,
    clock: Arc<dyn Clock>,
}

impl IrregularAlarm {
    pub fn new(
        timers: Arc<dyn TimerCapability>,
        id: AlarmId,
        clock: Arc<dyn Clock>,
        wake: bool,
    ) -> Self {
        Self {
            core: AlarmCore::new(timers, id, wake),
            clock,
        }
    }

    pub fn id(&self) -> &AlarmId {
        self.core.id()
    }

    pub fn is_started(&self) -> bool {
        self.core.is_started()
    }

    /// Register and schedule the first fire at `next_delay(now)`. Each fire
    /// runs `on_fire(t)` first, then reschedules at `next_delay(t)`.
    pub fn start<F, D>(&mut self, mut on_fire: F, mut next_delay: D) -> Result<()>
    where
        F: FnMut(Timestamp) + Send + 'static,
        D: FnMut(Timestamp) -> Duration + Send + 'static,
    {
        if self.core.is_started() {
            return Err(lt_common::Error::AlarmAlreadyStarted);
        }
        let initial_delay = next_delay(self.clock.now());
        let timers = Arc::clone(self.core.timers());
        let id = self.core.id().clone();
        let callback: FireCallback = Box::new(move |fired_at| {
            on_fire(fired_at);
            let delay = next_delay(fired_at);
            if let Err(err) = timers.schedule(&id, delay) {
                tracing::warn!(alarm = %id, error = %err, "failed to reschedule irregular alarm");
            }
        });
        self.core.begin(callback, initial_delay)
    }

    /// Cancel the pending fire and deregister.
    pub fn stop(&mut self) -> Result<()> {
        self.core.end()
    }
}
