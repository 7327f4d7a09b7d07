//! Hardware abstraction for the two external drivers the loop talks to
//!
//! Neither trait defines a wire protocol. The bus driver moves raw register
//! bytes; the serial transport moves raw bytes in and out of the UART.

use crate::error::AmlsResult;

/// Bus transaction driver (I2C/SPI) for the inertial sensor
///
/// Implementations run on the sensor port's worker thread, so they must be
/// `Send`. A call should complete in bounded time, but the loop does not rely
/// on that: a call that never returns only costs the sample.
pub trait BusDriver: Send {
    /// Read a burst starting at the sensor's data registers into `buf`
    ///
    /// Returns the number of bytes read. Short reads are treated as faults.
    fn read(&mut self, address: u8, buf: &mut [u8]) -> AmlsResult<usize>;

    /// Driver name for diagnostics
    fn name(&self) -> &str {
        "bus"
    }
}

impl<T: BusDriver + ?Sized> BusDriver for Box<T> {
    fn read(&mut self, address: u8, buf: &mut [u8]) -> AmlsResult<usize> {
        (**self).read(address, buf)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Serial byte transport (UART, USB CDC, radio modem)
///
/// Both calls are non-blocking: they move whatever the hardware can take or
/// has pending right now and return the byte count, which may be zero.
pub trait SerialTransport {
    /// Pull pending inbound bytes into `buf`
    fn read(&mut self, buf: &mut [u8]) -> AmlsResult<usize>;

    /// Push as much of `data` as the hardware accepts
    fn write(&mut self, data: &[u8]) -> AmlsResult<usize>;
}

impl<T: SerialTransport + ?Sized> SerialTransport for Box<T> {
    fn read(&mut self, buf: &mut [u8]) -> AmlsResult<usize> {
        (**self).read(buf)
    }

    fn write(&mut self, data: &[u8]) -> AmlsResult<usize> {
        (**self).write(data)
    }
}
