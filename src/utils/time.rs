//! Fixed-rate tick pacing.

use std::thread;
use std::time::{Duration, Instant};

/// Granularity of the coarse sleep phase.
const SLEEP_STEP: Duration = Duration::from_millis(1);

/// Paces a loop to a fixed period.
///
/// Waiting is hybrid: short sleeps until the deadline is within `margin`,
/// then `yield_now` until it passes. Overruns are not made up; the next
/// deadline is measured from whenever [`TickTimer::wait`] returned.
#[derive(Debug, Clone)]
pub struct TickTimer {
    interval: Duration,
    margin: Duration,
    last: Instant,
}

impl TickTimer {
    pub fn new(interval: Duration, margin: Duration) -> Self {
        Self {
            interval,
            margin: margin.min(interval),
            last: Instant::now(),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Blocks until one interval has passed since the previous tick.
    ///
    /// Returns how long the caller's work took.
    pub fn wait(&mut self) -> Duration {
        let busy = self.last.elapsed();
        let deadline = self.last + self.interval;

        loop {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            if deadline - now > self.margin {
                thread::sleep(SLEEP_STEP);
            } else {
                thread::yield_now();
            }
        }

        self.last = Instant::now();
        busy
    }
}
