//! # Loop-side hardware access
//!
//! Both components here are polled exactly once per cycle and return in
//! bounded time no matter what the hardware underneath is doing:
//!
//! - [`SensorPort`]: one IMU transaction per cycle, invalid sample on timeout
//! - [`SerialChannel`]: RX/TX byte rings between the loop and the UART

pub mod ring_buffer;
pub mod sensor_port;
pub mod serial_channel;

pub use ring_buffer::ByteRing;
pub use sensor_port::{SensorFault, SensorPort, SensorSample, SensorStats, SENSOR_FRAME_LEN};
pub use serial_channel::{SerialChannel, SerialFaults, SerialStats};
