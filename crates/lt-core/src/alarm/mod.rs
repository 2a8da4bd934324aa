//! Recurring alarm primitives.
//!
//! Both alarm flavors share one lifecycle against the timer capability:
//! `start` registers a fire callback under a fresh identity and requests the
//! first wake-up; `stop` cancels the pending wake-up and deregisters. What
//! differs is how the next delay is chosen:
//!
//! - [`RecurringAlarm`]: a fixed period, rescheduled after every fire.
//! - [`IrregularAlarm`]: the next delay is recomputed from system state at
//!   fire time.
//!
//! An alarm is exclusively owned by the session that created it. Starting a
//! started alarm, or stopping a stopped one, is an invalid-state error.

mod irregular;
mod recurring;

pub use irregular::IrregularAlarm;
pub use recurring::RecurringAlarm;

use std::sync::Arc;
use std::time::Duration;

use lt_common::{AlarmId, Error, Result};

use crate::capabilities::{FireCallback, TimerCapability};

/// Shared register/schedule/cancel/deregister lifecycle.
pub(crate) struct AlarmCore {
    timers: Arc<dyn TimerCapability>,
    id: AlarmId,
    wake: bool,
    started: bool,
}

impl AlarmCore {
    pub(crate) fn new(timers: Arc<dyn TimerCapability>, id: AlarmId, wake: bool) -> Self {
        Self {
            timers,
            id,
            wake,
            started: false,
        }
    }

    pub(crate) fn timers(&self) -> &Arc<dyn TimerCapability> {
        &self.timers
    }

    pub(crate) fn id(&self) -> &AlarmId {
        &self.id
    }

    pub(crate) fn is_started(&self) -> bool {
        self.started
    }

    /// Register the callback and request the first fire. On a scheduling
    /// failure the registration is rolled back so the identity is reusable.
    pub(crate) fn begin(&mut self, on_fire: FireCallback, initial_delay: Duration) -> Result<()> {
        if self.started {
            return Err(Error::AlarmAlreadyStarted);
        }
        self.timers.register(self.id.clone(), self.wake, on_fire)?;
        if let Err(err) = self.timers.schedule(&self.id, initial_delay) {
            self.timers.deregister(&self.id);
            return Err(err);
        }
        self.started = true;
        Ok(())
    }

    /// Cancel the pending fire and deregister. Fires already in flight are
    /// not recalled, but a deregistered identity never delivers.
    pub(crate) fn end(&mut self) -> Result<()> {
        if !self.started {
            return Err(Error::AlarmNotStarted);
        }
        self.timers.cancel(&self.id);
        self.timers.deregister(&self.id);
        self.started = false;
        Ok(())
    }
}
