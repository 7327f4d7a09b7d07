//! AMLS Manager Library
//!
//! Command implementations behind the `amls` binary.

pub mod commands;
