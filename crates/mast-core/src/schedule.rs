//! Run gates for the cooperative station loop.
//!
//! The loop polls each gate with the current time and runs the guarded job
//! when the gate opens. Gates never sleep themselves, so they work the same
//! under an embassy executor, a bare `loop {}` or a simulated clock.

use embassy_time::{Duration, Instant};

use crate::sample::Timestamp;

/// Wall-clock source in milliseconds since the Unix epoch.
///
/// Synchronizing the clock (NTP, RTC) is the board's business; the station
/// only reads it.
pub trait Clock {
    fn now_millis(&self) -> u64;

    fn now(&self) -> Instant {
        Instant::from_millis(self.now_millis())
    }

    /// Whole seconds, as stored in samples
    fn now_secs(&self) -> Timestamp {
        (self.now_millis() / 1000) as Timestamp
    }
}

/// Opens on the first poll, then at most once per interval.
///
/// Missed deadlines are not caught up: after a late run the next deadline is
/// one interval after that run.
#[derive(Debug, Clone)]
pub struct Periodic {
    interval: Duration,
    next: Option<Instant>,
}

impl Periodic {
    pub const fn new(interval: Duration) -> Self {
        Self {
            interval,
            next: None,
        }
    }

    pub fn set_interval(&mut self, interval: Duration) {
        self.interval = interval;
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.next
    }

    pub fn ready(&mut self, now: Instant) -> bool {
        match self.next {
            Some(next) if now < next => false,
            _ => {
                self.next = Some(now + self.interval);
                true
            }
        }
    }
}

/// Opens on multiples of the interval since the epoch.
///
/// The first poll only arms the gate at the next boundary. After a run the
/// following boundary strictly after `now` is armed.
#[derive(Debug, Clone)]
pub struct Bound {
    interval: Duration,
    next: Option<Instant>,
}

impl Bound {
    pub const fn new(interval: Duration) -> Self {
        Self {
            interval,
            next: None,
        }
    }

    pub fn set_interval(&mut self, interval: Duration) {
        if interval != self.interval {
            self.interval = interval;
            self.next = None;
        }
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.next
    }

    /// Latest boundary at or before `now`
    pub fn slot(&self, now: Instant) -> Instant {
        let step = self.interval.as_millis().max(1);
        Instant::from_millis(now.as_millis() / step * step)
    }

    pub fn ready(&mut self, now: Instant) -> bool {
        let step = self.interval.as_millis().max(1);
        let now_ms = now.as_millis();

        match self.next {
            None => {
                self.next = Some(Instant::from_millis(now_ms.div_ceil(step) * step));
                false
            }
            Some(next) if now < next => false,
            Some(_) => {
                self.next = Some(Instant::from_millis((now_ms / step + 1) * step));
                true
            }
        }
    }
}
