//! Cooperative fixed-interval sync scheduler.
//!
//! The host loop polls the timer with the current time; a `true` result
//! means one `tick` is due. Missed intervals are dropped, never queued.

/// Fixed-interval timer polled by the host loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncTimer {
    interval_ms: i64,
    next_due_ms: Option<i64>,
}

impl SyncTimer {
    pub fn new(interval_ms: u64) -> Self {
        Self {
            interval_ms: i64::try_from(interval_ms.max(1)).unwrap_or(i64::MAX),
            next_due_ms: None,
        }
    }

    pub fn interval_ms(&self) -> i64 {
        self.interval_ms
    }

    /// Starts the timer; the first tick is due one interval after `now_ms`.
    pub fn start(&mut self, now_ms: i64) {
        self.next_due_ms = Some(now_ms.saturating_add(self.interval_ms));
    }

    /// Stops the timer. Polls return `false` until restarted.
    pub fn stop(&mut self) {
        self.next_due_ms = None;
    }

    pub fn is_running(&self) -> bool {
        self.next_due_ms.is_some()
    }

    pub fn next_due_ms(&self) -> Option<i64> {
        self.next_due_ms
    }

    /// Returns whether a tick is due at `now_ms` and reschedules if so.
    pub fn poll(&mut self, now_ms: i64) -> bool {
        match self.next_due_ms {
            Some(due) if now_ms >= due => {
                self.next_due_ms = Some(now_ms.saturating_add(self.interval_ms));
                true
            }
            _ => false,
        }
    }
}
