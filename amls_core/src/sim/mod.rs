//! # Simulated hardware
//!
//! Stand-ins for the clock, IMU bus and serial transport so the loop can run
//! without a flight controller attached: in unit and integration tests, and
//! from the `amls run` command. All of them are cheap to clone; clones share
//! state, so a test keeps one handle and gives the other to the loop.

mod clock;
mod imu_bus;
mod transport;

pub use clock::SimulatedClock;
pub use imu_bus::SimulatedImuBus;
pub use transport::LoopbackTransport;
