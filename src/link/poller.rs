//! Telemetry poll schedule.
//!
//! The poller holds no timer of its own: the supervisor sleeps until
//! [`TelemetryPoller::next_deadline`] and then asks [`TelemetryPoller::is_due`].
//! Disarming clears the deadline, so a wakeup that races a disconnect finds
//! nothing due and produces no sample.

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TelemetryPoller {
    interval_ms: u64,
    next_due_ms: Option<u64>,
}

impl TelemetryPoller {
    /// Created disarmed.
    pub const fn new(interval_ms: u64) -> Self {
        Self {
            interval_ms,
            next_due_ms: None,
        }
    }

    /// First firing one interval after `now_ms`.
    pub fn arm(&mut self, now_ms: u64) {
        self.next_due_ms = Some(now_ms + self.interval_ms);
    }

    pub fn disarm(&mut self) {
        self.next_due_ms = None;
    }

    pub fn is_armed(&self) -> bool {
        self.next_due_ms.is_some()
    }

    pub fn is_due(&self, now_ms: u64) -> bool {
        matches!(self.next_due_ms, Some(due) if now_ms >= due)
    }

    /// Advance to the next firing after one fired at `now_ms`.
    ///
    /// Deadlines advance by whole intervals from the previous deadline so a
    /// late wakeup does not shift the cadence; if a full interval was missed
    /// the schedule restarts from `now_ms` instead of firing a burst.
    pub fn reschedule(&mut self, now_ms: u64) {
        if let Some(due) = self.next_due_ms {
            let next = due + self.interval_ms;
            self.next_due_ms = Some(if next > now_ms {
                next
            } else {
                now_ms + self.interval_ms
            });
        }
    }

    pub fn next_deadline(&self) -> Option<u64> {
        self.next_due_ms
    }

    pub fn interval_ms(&self) -> u64 {
        self.interval_ms
    }
}
