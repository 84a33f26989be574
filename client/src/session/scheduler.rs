use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::SessionConfig;

use super::state::ExpiryReason;

/// A timer firing, tagged with the epoch it was scheduled under so the
/// consumer can discard stale ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TimeoutEvent {
    pub reason: ExpiryReason,
    pub epoch: u64,
}

/// Two timer slots: inactivity and dormancy. At most one live timer per
/// slot; scheduling a new one always aborts the previous. Firings become
/// messages on the event channel, consumed by the session manager.
pub(crate) struct TimeoutScheduler {
    inactivity_timeout: Duration,
    dormancy_timeout: Duration,
    activity_throttle: Duration,
    events: mpsc::UnboundedSender<TimeoutEvent>,
    slots: Mutex<TimerSlots>,
}

#[derive(Default)]
struct TimerSlots {
    inactivity: Option<JoinHandle<()>>,
    dormancy: Option<JoinHandle<()>>,
    last_reschedule: Option<Instant>,
}

impl TimeoutScheduler {
    pub fn new(config: &SessionConfig, events: mpsc::UnboundedSender<TimeoutEvent>) -> Self {
        Self {
            inactivity_timeout: config.inactivity_timeout,
            dormancy_timeout: config.dormancy_timeout,
            activity_throttle: config.activity_throttle,
            events,
            slots: Mutex::new(TimerSlots::default()),
        }
    }

    /// Starts the inactivity timer for a freshly authenticated session. The
    /// first activity signal after arming is never throttled.
    pub fn arm(&self, epoch: u64) {
        let mut slots = self.lock();
        abort(&mut slots.inactivity);
        abort(&mut slots.dormancy);
        slots.last_reschedule = None;
        slots.inactivity =
            Some(self.spawn(self.inactivity_timeout, ExpiryReason::Inactivity, epoch));
    }

    /// Reschedules the inactivity timer. Throttled, and ignored while the
    /// dormancy slot is armed (backgrounded) or nothing is armed at all.
    pub fn on_activity(&self, epoch: u64) {
        let mut slots = self.lock();
        if slots.dormancy.is_some() || slots.inactivity.is_none() {
            return;
        }
        let now = Instant::now();
        if let Some(last) = slots.last_reschedule {
            if now.duration_since(last) < self.activity_throttle {
                return;
            }
        }
        slots.last_reschedule = Some(now);
        abort(&mut slots.inactivity);
        slots.inactivity =
            Some(self.spawn(self.inactivity_timeout, ExpiryReason::Inactivity, epoch));
    }

    /// Arms the dormancy timer and cancels the inactivity timer: while
    /// backgrounded, dormancy is the only expiry that can fire.
    pub fn on_background(&self, epoch: u64) {
        let mut slots = self.lock();
        abort(&mut slots.inactivity);
        abort(&mut slots.dormancy);
        slots.dormancy = Some(self.spawn(self.dormancy_timeout, ExpiryReason::Dormancy, epoch));
    }

    /// Cancels the dormancy timer and restarts the inactivity timer fresh;
    /// returning to the foreground counts as activity.
    pub fn on_foreground(&self, epoch: u64) {
        let mut slots = self.lock();
        abort(&mut slots.dormancy);
        abort(&mut slots.inactivity);
        slots.last_reschedule = None;
        slots.inactivity =
            Some(self.spawn(self.inactivity_timeout, ExpiryReason::Inactivity, epoch));
    }

    /// Cancels both timers. Called on every terminal transition.
    pub fn disarm(&self) {
        let mut slots = self.lock();
        abort(&mut slots.inactivity);
        abort(&mut slots.dormancy);
        slots.last_reschedule = None;
    }

    fn lock(&self) -> MutexGuard<'_, TimerSlots> {
        self.slots.lock().expect("lock poisoned")
    }

    fn spawn(&self, after: Duration, reason: ExpiryReason, epoch: u64) -> JoinHandle<()> {
        let events = self.events.clone();
        // Deadline is fixed at scheduling time; computing it inside the task
        // would shift it by the spawn-to-first-poll latency (a whole advance
        // quantum under the paused test clock).
        let deadline = Instant::now() + after;
        tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            let _ = events.send(TimeoutEvent { reason, epoch });
        })
    }
}

impl Drop for TimeoutScheduler {
    fn drop(&mut self) {
        if let Ok(mut slots) = self.slots.lock() {
            abort(&mut slots.inactivity);
            abort(&mut slots.dormancy);
        }
    }
}

fn abort(slot: &mut Option<JoinHandle<()>>) {
    if let Some(handle) = slot.take() {
        handle.abort();
    }
}
