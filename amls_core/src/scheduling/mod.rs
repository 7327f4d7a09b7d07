//! # Loop scheduling and overrun safety
//!
//! - [`LoopScheduler`]: the 40 Hz loop itself
//! - [`SafetyMonitor`]: two-strikes overrun state machine
//! - [`CycleStats`]: running timing and fault counters
//! - [`Watchdog`]: heartbeat for an external supervisor
//! - [`realtime`]: SCHED_FIFO, CPU pinning and memory locking for the loop thread

pub mod realtime;
pub mod safety_monitor;
pub mod scheduler;
pub mod stats;
pub mod watchdog;

pub use safety_monitor::{LoopTiming, SafetyMonitor, SafetyState, SafetyTransition};
pub use scheduler::{
    ControlStep, CycleContext, CycleFaults, CycleReport, LoopScheduler, StepOutput, StopHandle,
};
pub use stats::{CycleStats, CycleSummary};
pub use watchdog::Watchdog;
