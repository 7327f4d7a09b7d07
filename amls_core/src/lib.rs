//! # AMLS Core
//!
//! The fixed-rate flight loop of the Autonomous Multirotor Landing System.
//!
//! The control algorithms (attitude estimation, landing guidance, mixing) live
//! outside this crate. What lives here is the loop that runs them on time:
//!
//! - **CycleClock**: Monotonic microsecond time source
//! - **SensorPort**: Bounded, non-blocking IMU read at a fixed bus address
//! - **SerialChannel**: Fixed-capacity RX/TX byte rings for telemetry and commands
//! - **LoopScheduler**: Ticks the control step at 40 Hz and measures every cycle
//! - **SafetyMonitor**: Two-strikes overrun state machine driving failsafe
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use amls_core::prelude::*;
//! use amls_core::sim::{LoopbackTransport, SimulatedImuBus};
//!
//! # fn main() -> AmlsResult<()> {
//! let config = LoopConfig::default();
//! let mut scheduler = LoopScheduler::new(
//!     config,
//!     MonotonicClock::new(),
//!     SensorPort::new(SimulatedImuBus::new(), &config)?,
//!     SerialChannel::new(LoopbackTransport::new(), config.serial_buffer_capacity),
//! )?;
//!
//! let mut control = |ctx: &mut CycleContext<'_>| {
//!     if ctx.safety.is_degraded() {
//!         // hand over to the failsafe descent
//!     }
//!     StepOutput::telemetry(vec![ctx.cycle as u8])
//! };
//! scheduler.run_for(&mut control, 40)?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod hal;
pub mod hardware;
pub mod scheduling;
pub mod sim;

/// Crate version, for diagnostics and telemetry headers
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// Re-export commonly used types for easy access
pub use crate::core::{CycleClock, MonotonicClock};
pub use config::LoopConfig;
pub use error::{AmlsError, AmlsResult};
pub use hal::{BusDriver, SerialTransport};
pub use hardware::{SensorPort, SensorSample, SerialChannel};
pub use scheduling::{
    ControlStep, CycleContext, CycleReport, LoopScheduler, SafetyMonitor, SafetyState,
    StepOutput,
};

/// Everything a flight application needs to drive the loop
pub mod prelude {
    pub use crate::config::LoopConfig;
    pub use crate::core::{CycleClock, MonotonicClock};
    pub use crate::error::{AmlsError, AmlsResult};
    pub use crate::hal::{BusDriver, SerialTransport};
    pub use crate::hardware::{SensorPort, SensorSample, SerialChannel};
    pub use crate::scheduling::{
        ControlStep, CycleContext, CycleFaults, CycleReport, LoopScheduler, SafetyMonitor,
        SafetyState, StepOutput, StopHandle, Watchdog,
    };
}
