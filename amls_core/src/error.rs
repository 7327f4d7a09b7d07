//! Error types for the AMLS loop core
//!
//! Transient sensor faults and serial overflow are *not* errors here: they are
//! reported as per-cycle flags and never leave the loop. `AmlsError` covers
//! the conditions that stop something from being built or started at all.

use thiserror::Error;

/// Result alias used across the crate
pub type AmlsResult<T> = Result<T, AmlsError>;

#[derive(Debug, Error)]
pub enum AmlsError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Bus fault at address {address:#04x}: {message}")]
    Bus { address: u8, message: String },

    #[error("Serial transport error: {0}")]
    Transport(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Failed to serialize configuration: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Unsupported: {0}")]
    Unsupported(String),
}

impl AmlsError {
    pub fn config(msg: impl Into<String>) -> Self {
        AmlsError::Config(msg.into())
    }

    pub fn bus(address: u8, msg: impl Into<String>) -> Self {
        AmlsError::Bus {
            address,
            message: msg.into(),
        }
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        AmlsError::Transport(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bus_error_formats_address_as_hex() {
        let err = AmlsError::bus(0x68, "NACK");
        assert_eq!(err.to_string(), "Bus fault at address 0x68: NACK");
    }

    #[test]
    fn io_errors_convert() {
        fn open() -> AmlsResult<()> {
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "missing"))?;
            Ok(())
        }
        assert!(matches!(open(), Err(AmlsError::Io(_))));
    }
}
