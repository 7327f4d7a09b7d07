use crate::config::LoopConfig;
use log::{error, info, warn};
use serde::Serialize;
use std::fmt;

/// Overrun safety state of the loop
///
/// `OverrunFault` is the degraded signal: external control logic must hand
/// over to its failsafe behaviour while it is asserted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum SafetyState {
    #[default]
    Nominal,
    OverrunWarning,
    OverrunFault,
}

impl SafetyState {
    pub fn is_degraded(&self) -> bool {
        matches!(self, SafetyState::OverrunFault)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SafetyState::Nominal => "NOMINAL",
            SafetyState::OverrunWarning => "OVERRUN_WARNING",
            SafetyState::OverrunFault => "OVERRUN_FAULT",
        }
    }
}

impl fmt::Display for SafetyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A state change caused by a timing report or a reset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SafetyTransition {
    pub from: SafetyState,
    pub to: SafetyState,
}

/// Timing record of the loop
///
/// The periods come from the config; the last duration and the overrun count
/// change once per cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LoopTiming {
    pub nominal_period_us: u32,
    pub max_allowed_period_us: u32,
    pub last_cycle_us: u64,
    pub overrun_count: u64,
}

/// Overrun state machine
///
/// Fed one measured cycle duration per iteration:
///
/// - a breach (`last > max_allowed`) moves Nominal to OverrunWarning
/// - `overrun_strikes` consecutive breaches move to OverrunFault
/// - a cycle at or under the nominal period clears OverrunWarning
/// - OverrunFault holds until `reset`
///
/// A cycle between nominal and max is not a breach, so it breaks a run of
/// consecutive breaches, but it is not clean enough to clear a warning either.
#[derive(Debug, Clone)]
pub struct SafetyMonitor {
    timing: LoopTiming,
    state: SafetyState,
    strikes: u32,
    consecutive_breaches: u32,
}

impl SafetyMonitor {
    pub fn new(config: &LoopConfig) -> Self {
        Self {
            timing: LoopTiming {
                nominal_period_us: config.nominal_period_us,
                max_allowed_period_us: config.max_allowed_period_us,
                last_cycle_us: 0,
                overrun_count: 0,
            },
            state: SafetyState::Nominal,
            strikes: config.overrun_strikes.max(1),
            consecutive_breaches: 0,
        }
    }

    /// Report one measured cycle duration
    ///
    /// Returns the transition if the state changed.
    pub fn report(&mut self, last_cycle_us: u64) -> Option<SafetyTransition> {
        self.timing.last_cycle_us = last_cycle_us;

        let breach = last_cycle_us > self.timing.max_allowed_period_us as u64;
        if breach {
            self.timing.overrun_count += 1;
            self.consecutive_breaches = self.consecutive_breaches.saturating_add(1);
        } else {
            self.consecutive_breaches = 0;
        }

        let clean = last_cycle_us <= self.timing.nominal_period_us as u64;
        let next = match self.state {
            SafetyState::OverrunFault => SafetyState::OverrunFault,
            _ if breach && self.consecutive_breaches >= self.strikes => SafetyState::OverrunFault,
            _ if breach => SafetyState::OverrunWarning,
            SafetyState::OverrunWarning if clean => SafetyState::Nominal,
            current => current,
        };

        if breach && self.state == SafetyState::OverrunFault {
            warn!(
                "Cycle overran again while in fault: {} us (overrun #{})",
                last_cycle_us, self.timing.overrun_count
            );
        }

        self.transition_to(next, last_cycle_us)
    }

    /// Clear OverrunWarning or OverrunFault back to Nominal
    ///
    /// A no-op when already Nominal. The overrun count is not cleared.
    pub fn reset(&mut self) -> Option<SafetyTransition> {
        self.consecutive_breaches = 0;
        if self.state == SafetyState::Nominal {
            return None;
        }

        let transition = SafetyTransition {
            from: self.state,
            to: SafetyState::Nominal,
        };
        self.state = SafetyState::Nominal;
        info!("Safety state reset: {} -> {}", transition.from, transition.to);
        Some(transition)
    }

    pub fn state(&self) -> SafetyState {
        self.state
    }

    pub fn is_degraded(&self) -> bool {
        self.state.is_degraded()
    }

    /// Breaches since construction, across every state and reset
    pub fn overrun_count(&self) -> u64 {
        self.timing.overrun_count
    }

    pub fn last_cycle_us(&self) -> u64 {
        self.timing.last_cycle_us
    }

    pub fn timing(&self) -> LoopTiming {
        self.timing
    }

    pub fn strikes(&self) -> u32 {
        self.strikes
    }

    fn transition_to(&mut self, next: SafetyState, last_cycle_us: u64) -> Option<SafetyTransition> {
        if next == self.state {
            return None;
        }

        let transition = SafetyTransition {
            from: self.state,
            to: next,
        };
        self.state = next;

        match next {
            SafetyState::OverrunFault => error!(
                "OVERRUN FAULT: {} consecutive cycles over {} us (last {} us), degraded mode asserted",
                self.consecutive_breaches, self.timing.max_allowed_period_us, last_cycle_us
            ),
            SafetyState::OverrunWarning => warn!(
                "Cycle overrun: {} us > {} us allowed",
                last_cycle_us, self.timing.max_allowed_period_us
            ),
            SafetyState::Nominal => info!(
                "Overrun warning cleared after {} us cycle",
                last_cycle_us
            ),
        }

        Some(transition)
    }
}
