//! Loop timing and addressing configuration
//!
//! The flight loop runs at 40 Hz. These values are fixed at build time; the
//! `LoopConfig` struct carries them into the scheduler so tests and bench rigs
//! can inject synthetic timings without touching global state. There is no API
//! to change a config once a scheduler has been built from it.

use crate::error::{AmlsError, AmlsResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Nominal loop period (40 Hz). Changing it may break the system or injure someone.
pub const NOMINAL_PERIOD_US: u32 = 25_000;

/// Longest cycle that still counts as on time.
pub const MAX_ALLOWED_PERIOD_US: u32 = 26_000;

/// I2C address of the inertial sensor.
pub const SENSOR_BUS_ADDRESS: u8 = 0x68;

/// Capacity of each serial ring (RX and TX).
pub const SERIAL_BUFFER_CAPACITY: usize = 512;

/// Largest serial ring a config may ask for. Rings are allocated up front.
pub const MAX_SERIAL_BUFFER_CAPACITY: usize = 64 * 1024;

/// Sub-budget for one sensor transaction: a tenth of the nominal period.
pub const SENSOR_READ_BUDGET_US: u32 = NOMINAL_PERIOD_US / 10;

/// Consecutive overruns that escalate a warning into a fault.
pub const OVERRUN_STRIKES: u32 = 2;

/// Time without a loop heartbeat before an external supervisor should act.
pub const WATCHDOG_TIMEOUT_US: u64 = 100_000;

/// Immutable loop configuration injected at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopConfig {
    /// Target cadence between iteration starts
    pub nominal_period_us: u32,
    /// Overrun threshold; must be strictly greater than the nominal period
    pub max_allowed_period_us: u32,
    /// Fixed bus address of the IMU
    pub sensor_bus_address: u8,
    /// Bytes per serial ring
    pub serial_buffer_capacity: usize,
    /// Longest the loop waits for one bus transaction
    pub sensor_read_budget_us: u32,
    /// Consecutive breaches before OVERRUN_FAULT (1 = zero tolerance)
    pub overrun_strikes: u32,
    /// Heartbeat age after which the loop is considered stalled
    pub watchdog_timeout_us: u64,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            nominal_period_us: NOMINAL_PERIOD_US,
            max_allowed_period_us: MAX_ALLOWED_PERIOD_US,
            sensor_bus_address: SENSOR_BUS_ADDRESS,
            serial_buffer_capacity: SERIAL_BUFFER_CAPACITY,
            sensor_read_budget_us: SENSOR_READ_BUDGET_US,
            overrun_strikes: OVERRUN_STRIKES,
            watchdog_timeout_us: WATCHDOG_TIMEOUT_US,
        }
    }
}

impl LoopConfig {
    /// Zero-tolerance preset: the first overrun is already a fault
    pub fn zero_tolerance() -> Self {
        Self {
            overrun_strikes: 1,
            ..Self::default()
        }
    }

    /// Synthetic timing for bench rigs and tests
    ///
    /// The sensor budget scales with the period the same way the default does.
    pub fn synthetic(nominal_period_us: u32, max_allowed_period_us: u32) -> Self {
        Self {
            nominal_period_us,
            max_allowed_period_us,
            sensor_read_budget_us: (nominal_period_us / 10).max(1),
            ..Self::default()
        }
    }

    /// Check the invariants the scheduler relies on
    pub fn validate(&self) -> AmlsResult<()> {
        if self.nominal_period_us == 0 {
            return Err(AmlsError::config("nominal_period_us must be non-zero"));
        }
        if self.max_allowed_period_us <= self.nominal_period_us {
            return Err(AmlsError::config(format!(
                "max_allowed_period_us ({}) must exceed nominal_period_us ({})",
                self.max_allowed_period_us, self.nominal_period_us
            )));
        }
        if self.sensor_read_budget_us == 0 || self.sensor_read_budget_us >= self.nominal_period_us
        {
            return Err(AmlsError::config(format!(
                "sensor_read_budget_us ({}) must be within (0, {})",
                self.sensor_read_budget_us, self.nominal_period_us
            )));
        }
        if self.serial_buffer_capacity == 0
            || self.serial_buffer_capacity > MAX_SERIAL_BUFFER_CAPACITY
        {
            return Err(AmlsError::config(format!(
                "serial_buffer_capacity ({}) must be within [1, {}]",
                self.serial_buffer_capacity, MAX_SERIAL_BUFFER_CAPACITY
            )));
        }
        if self.watchdog_timeout_us == 0 {
            return Err(AmlsError::config("watchdog_timeout_us must be non-zero"));
        }
        if self.overrun_strikes == 0 {
            return Err(AmlsError::config("overrun_strikes must be at least 1"));
        }
        Ok(())
    }

    /// Slack between the nominal and maximum period, in percent
    pub fn slack_percent(&self) -> f64 {
        let slack = self.max_allowed_period_us.saturating_sub(self.nominal_period_us);
        slack as f64 * 100.0 / self.nominal_period_us as f64
    }

    /// Loop frequency in Hz
    pub fn rate_hz(&self) -> f64 {
        1_000_000.0 / self.nominal_period_us as f64
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(content: &str) -> AmlsResult<Self> {
        let config: LoopConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file
    pub fn load(path: &Path) -> AmlsResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn to_toml_string(&self) -> AmlsResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_build_constants() {
        let config = LoopConfig::default();
        assert_eq!(config.nominal_period_us, 25_000);
        assert_eq!(config.max_allowed_period_us, 26_000);
        assert_eq!(config.sensor_bus_address, 0x68);
        assert_eq!(config.serial_buffer_capacity, 512);
        assert_eq!(config.overrun_strikes, 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn default_slack_is_four_percent() {
        let config = LoopConfig::default();
        assert!((config.slack_percent() - 4.0).abs() < 1e-9);
        assert!((config.rate_hz() - 40.0).abs() < 1e-9);
    }

    #[test]
    fn max_must_exceed_nominal() {
        let config = LoopConfig::synthetic(25_000, 25_000);
        assert!(matches!(config.validate(), Err(AmlsError::Config(_))));
    }

    #[test]
    fn sensor_budget_must_fit_in_period() {
        let config = LoopConfig {
            sensor_read_budget_us: 25_000,
            ..LoopConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_strikes_rejected() {
        let config = LoopConfig {
            overrun_strikes: 0,
            ..LoopConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn oversized_serial_capacity_rejected() {
        let err = LoopConfig::from_toml_str("serial_buffer_capacity = 9223372036854775807\n")
            .unwrap_err();
        assert!(matches!(err, AmlsError::Config(_)));

        let at_limit = LoopConfig {
            serial_buffer_capacity: MAX_SERIAL_BUFFER_CAPACITY,
            ..LoopConfig::default()
        };
        assert!(at_limit.validate().is_ok());
        let over = LoopConfig {
            serial_buffer_capacity: MAX_SERIAL_BUFFER_CAPACITY + 1,
            ..LoopConfig::default()
        };
        assert!(over.validate().is_err());
    }

    #[test]
    fn zero_watchdog_timeout_rejected() {
        let config = LoopConfig {
            watchdog_timeout_us: 0,
            ..LoopConfig::default()
        };
        assert!(matches!(config.validate(), Err(AmlsError::Config(_))));
        assert!(LoopConfig::from_toml_str("watchdog_timeout_us = 0\n").is_err());
    }

    #[test]
    fn partial_toml_falls_back_to_defaults() {
        let config = LoopConfig::from_toml_str("overrun_strikes = 3\n").unwrap();
        assert_eq!(config.overrun_strikes, 3);
        assert_eq!(config.nominal_period_us, NOMINAL_PERIOD_US);
    }

    #[test]
    fn invalid_toml_values_rejected() {
        let err = LoopConfig::from_toml_str(
            "nominal_period_us = 10000\nmax_allowed_period_us = 9000\n",
        )
        .unwrap_err();
        assert!(matches!(err, AmlsError::Config(_)));
    }

    #[test]
    fn toml_round_trip() {
        let config = LoopConfig::zero_tolerance();
        let text = config.to_toml_string().unwrap();
        assert_eq!(LoopConfig::from_toml_str(&text).unwrap(), config);
    }
}
