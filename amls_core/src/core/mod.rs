//! # Time base for the flight loop
//!
//! Every duration the scheduler reasons about is an integer number of
//! microseconds read from a [`CycleClock`]. Production code uses
//! [`MonotonicClock`]; tests substitute [`crate::sim::SimulatedClock`] so cycle
//! durations can be dictated exactly.

pub mod clock;

pub use clock::{CycleClock, MonotonicClock};
