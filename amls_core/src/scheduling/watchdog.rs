use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug)]
struct WatchdogInner {
    origin: Instant,
    timeout_us: u64,
    last_feed_us: AtomicU64,
    feeds: AtomicU64,
}

/// Loop heartbeat for an external supervisor
///
/// The scheduler feeds it at the start of every cycle. A supervisor thread
/// holding a clone checks `is_expired` to detect a control step that never
/// returned. Nothing in the loop reacts to expiry; enforcing a failsafe is the
/// supervisor's decision.
#[derive(Debug, Clone)]
pub struct Watchdog {
    inner: Arc<WatchdogInner>,
}

impl Watchdog {
    /// Create a watchdog that counts as fed right now
    pub fn new(timeout: Duration) -> Self {
        Self {
            inner: Arc::new(WatchdogInner {
                origin: Instant::now(),
                timeout_us: timeout.as_micros() as u64,
                last_feed_us: AtomicU64::new(0),
                feeds: AtomicU64::new(0),
            }),
        }
    }

    pub fn feed(&self) {
        let now = self.now_us();
        self.inner.last_feed_us.store(now, Ordering::Release);
        self.inner.feeds.fetch_add(1, Ordering::Relaxed);
    }

    pub fn time_since_feed_us(&self) -> u64 {
        self.now_us()
            .saturating_sub(self.inner.last_feed_us.load(Ordering::Acquire))
    }

    pub fn time_since_feed(&self) -> Duration {
        Duration::from_micros(self.time_since_feed_us())
    }

    /// True once the loop has gone longer than the timeout without a feed
    pub fn is_expired(&self) -> bool {
        self.time_since_feed_us() > self.inner.timeout_us
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_micros(self.inner.timeout_us)
    }

    /// Number of feeds so far
    pub fn feeds(&self) -> u64 {
        self.inner.feeds.load(Ordering::Relaxed)
    }

    fn now_us(&self) -> u64 {
        self.inner.origin.elapsed().as_micros() as u64
    }
}
