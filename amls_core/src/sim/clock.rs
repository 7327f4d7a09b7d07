use crate::core::CycleClock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Manually driven microsecond clock
///
/// Time only moves when a test calls `advance_us`, or when the loop sleeps:
/// `sleep_until_us` jumps straight to the deadline. That makes cycle durations
/// exact, so timing-sensitive assertions do not depend on the host.
#[derive(Debug, Clone, Default)]
pub struct SimulatedClock {
    now_us: Arc<AtomicU64>,
    slept_us: Arc<AtomicU64>,
    sleeps: Arc<AtomicU64>,
}

impl SimulatedClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start the clock at `start_us`
    pub fn starting_at(start_us: u64) -> Self {
        let clock = Self::default();
        clock.now_us.store(start_us, Ordering::SeqCst);
        clock
    }

    /// Move time forward, e.g. to model work done inside a control step
    pub fn advance_us(&self, us: u64) {
        self.now_us.fetch_add(us, Ordering::SeqCst);
    }

    /// Total time spent in `sleep_until_us`
    pub fn slept_us(&self) -> u64 {
        self.slept_us.load(Ordering::SeqCst)
    }

    /// Number of `sleep_until_us` calls that actually waited
    pub fn sleep_count(&self) -> u64 {
        self.sleeps.load(Ordering::SeqCst)
    }
}

impl CycleClock for SimulatedClock {
    fn now_us(&self) -> u64 {
        self.now_us.load(Ordering::SeqCst)
    }

    fn sleep_until_us(&self, deadline_us: u64) {
        let previous = self.now_us.fetch_max(deadline_us, Ordering::SeqCst);
        if deadline_us > previous {
            self.slept_us
                .fetch_add(deadline_us - previous, Ordering::SeqCst);
            self.sleeps.fetch_add(1, Ordering::SeqCst);
        }
    }
}
