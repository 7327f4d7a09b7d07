use serde::Serialize;

/// Running timing and fault counters for the flight loop
///
/// Updated once per cycle in O(1) without allocating.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CycleStats {
    pub cycles: u64,
    pub last_cycle_us: u64,
    min_cycle_us: u64,
    pub max_cycle_us: u64,
    sum_cycle_us: u128,
    sum_sq_cycle_us: u128,
    /// Cycles longer than the allowed maximum
    pub overruns: u64,
    /// Largest delay between a cycle's scheduled and actual start
    pub max_start_lag_us: u64,
    pub sensor_timeouts: u64,
    /// Invalid samples other than timeouts (bus errors, short reads, busy bus)
    pub sensor_faults: u64,
    pub rx_overflow_cycles: u64,
    pub tx_overflow_cycles: u64,
    pub transport_error_cycles: u64,
}

impl Default for CycleStats {
    fn default() -> Self {
        Self::new()
    }
}

impl CycleStats {
    pub const fn new() -> Self {
        Self {
            cycles: 0,
            last_cycle_us: 0,
            min_cycle_us: u64::MAX,
            max_cycle_us: 0,
            sum_cycle_us: 0,
            sum_sq_cycle_us: 0,
            overruns: 0,
            max_start_lag_us: 0,
            sensor_timeouts: 0,
            sensor_faults: 0,
            rx_overflow_cycles: 0,
            tx_overflow_cycles: 0,
            transport_error_cycles: 0,
        }
    }

    /// Record one cycle's measured duration
    #[inline]
    pub fn record(&mut self, duration_us: u64, overrun: bool) {
        self.cycles += 1;
        self.last_cycle_us = duration_us;
        self.min_cycle_us = self.min_cycle_us.min(duration_us);
        self.max_cycle_us = self.max_cycle_us.max(duration_us);
        self.sum_cycle_us += duration_us as u128;
        self.sum_sq_cycle_us += (duration_us as u128) * (duration_us as u128);
        if overrun {
            self.overruns += 1;
        }
    }

    #[inline]
    pub fn record_start_lag(&mut self, lag_us: u64) {
        self.max_start_lag_us = self.max_start_lag_us.max(lag_us);
    }

    /// Shortest cycle seen (0 before the first cycle)
    pub fn min_cycle_us(&self) -> u64 {
        if self.cycles == 0 {
            0
        } else {
            self.min_cycle_us
        }
    }

    pub fn mean_cycle_us(&self) -> f64 {
        if self.cycles == 0 {
            0.0
        } else {
            self.sum_cycle_us as f64 / self.cycles as f64
        }
    }

    /// Standard deviation of the cycle duration
    pub fn jitter_us(&self) -> f64 {
        if self.cycles < 2 {
            return 0.0;
        }
        let n = self.cycles as f64;
        let mean = self.sum_cycle_us as f64 / n;
        let variance = (self.sum_sq_cycle_us as f64 / n) - mean * mean;
        if variance > 0.0 {
            variance.sqrt()
        } else {
            0.0
        }
    }

    /// Share of cycles that overran, in percent
    pub fn overrun_percent(&self) -> f64 {
        if self.cycles == 0 {
            0.0
        } else {
            self.overruns as f64 * 100.0 / self.cycles as f64
        }
    }

    pub fn summary(&self) -> CycleSummary {
        CycleSummary {
            cycles: self.cycles,
            last_cycle_us: self.last_cycle_us,
            min_cycle_us: self.min_cycle_us(),
            max_cycle_us: self.max_cycle_us,
            mean_cycle_us: self.mean_cycle_us(),
            jitter_us: self.jitter_us(),
            overruns: self.overruns,
            max_start_lag_us: self.max_start_lag_us,
            sensor_timeouts: self.sensor_timeouts,
            sensor_faults: self.sensor_faults,
            rx_overflow_cycles: self.rx_overflow_cycles,
            tx_overflow_cycles: self.tx_overflow_cycles,
            transport_error_cycles: self.transport_error_cycles,
        }
    }
}

/// Derived, serialisable view of [`CycleStats`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CycleSummary {
    pub cycles: u64,
    pub last_cycle_us: u64,
    pub min_cycle_us: u64,
    pub max_cycle_us: u64,
    pub mean_cycle_us: f64,
    pub jitter_us: f64,
    pub overruns: u64,
    pub max_start_lag_us: u64,
    pub sensor_timeouts: u64,
    pub sensor_faults: u64,
    pub rx_overflow_cycles: u64,
    pub tx_overflow_cycles: u64,
    pub transport_error_cycles: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_stats_are_zero() {
        let stats = CycleStats::new();
        assert_eq!(stats.min_cycle_us(), 0);
        assert_eq!(stats.mean_cycle_us(), 0.0);
        assert_eq!(stats.jitter_us(), 0.0);
        assert_eq!(stats.overrun_percent(), 0.0);
    }

    #[test]
    fn min_max_mean_and_overruns() {
        let mut stats = CycleStats::new();
        stats.record(25_000, false);
        stats.record(27_000, true);
        stats.record(23_000, false);

        assert_eq!(stats.cycles, 3);
        assert_eq!(stats.last_cycle_us, 23_000);
        assert_eq!(stats.min_cycle_us(), 23_000);
        assert_eq!(stats.max_cycle_us, 27_000);
        assert!((stats.mean_cycle_us() - 25_000.0).abs() < 1e-6);
        assert_eq!(stats.overruns, 1);
    }

    #[test]
    fn constant_cycles_have_no_jitter() {
        let mut stats = CycleStats::new();
        for _ in 0..100 {
            stats.record(25_000, false);
        }
        assert!(stats.jitter_us() < 1e-6);
    }

    #[test]
    fn jitter_is_standard_deviation() {
        let mut stats = CycleStats::new();
        stats.record(24_000, false);
        stats.record(26_000, false);
        assert!((stats.jitter_us() - 1_000.0).abs() < 1e-6);
    }
}
