use std::time::{Duration, Instant};

/// Monotonic microsecond time source for the flight loop
///
/// Timestamps are relative to an arbitrary origin and never go backwards.
pub trait CycleClock {
    /// Microseconds since the clock's origin
    fn now_us(&self) -> u64;

    /// Block until `now_us() >= deadline_us`; return at once if already past
    fn sleep_until_us(&self, deadline_us: u64);

    /// Microseconds elapsed since an earlier `now_us()` reading
    fn elapsed_since_us(&self, start_us: u64) -> u64 {
        self.now_us().saturating_sub(start_us)
    }
}

/// Spin this close to a deadline instead of trusting the OS sleep granularity.
const DEFAULT_SPIN_THRESHOLD: Duration = Duration::from_micros(200);

/// `CycleClock` backed by `std::time::Instant`
///
/// Sleeps coarse with `thread::sleep`, then busy-waits the last stretch so the
/// wake-up lands on the tick rather than wherever the kernel timer slack puts it.
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    origin: Instant,
    spin_threshold: Duration,
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            spin_threshold: DEFAULT_SPIN_THRESHOLD,
        }
    }

    /// Set how long before a deadline the clock switches from sleeping to spinning
    ///
    /// `Duration::ZERO` disables spinning entirely (lower CPU, more wake-up jitter).
    pub fn with_spin_threshold(mut self, threshold: Duration) -> Self {
        self.spin_threshold = threshold;
        self
    }
}

impl CycleClock for MonotonicClock {
    fn now_us(&self) -> u64 {
        self.origin.elapsed().as_micros() as u64
    }

    fn sleep_until_us(&self, deadline_us: u64) {
        let deadline = self.origin + Duration::from_micros(deadline_us);

        let now = Instant::now();
        if deadline <= now {
            return;
        }

        let remaining = deadline - now;
        if remaining > self.spin_threshold {
            std::thread::sleep(remaining - self.spin_threshold);
        }

        while Instant::now() < deadline {
            std::hint::spin_loop();
        }
    }
}
