use crate::config::LoopConfig;
use crate::core::CycleClock;
use crate::error::{AmlsError, AmlsResult};
use crate::hal::BusDriver;
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TryRecvError, TrySendError};
use log::{debug, info, warn};
use serde::Serialize;
use std::thread::JoinHandle;
use std::time::Duration;

/// Bytes in one IMU burst read: accel XYZ, temperature, gyro XYZ (big-endian i16)
pub const SENSOR_FRAME_LEN: usize = 14;

/// Why a sample came back invalid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SensorFault {
    /// The transaction did not finish inside the read budget
    Timeout,
    /// An earlier transaction is still stuck on the bus; no new one was issued
    Busy,
    /// The driver reported a bus-level error (NACK, arbitration loss, ...)
    Bus,
    /// The driver returned fewer bytes than a full frame
    ShortRead,
    /// The bus worker thread is gone
    Disconnected,
}

/// One cycle's IMU reading
///
/// Lives for one cycle only. When `valid` is false the raw bytes are zeroed and
/// `fault` says why; extrapolating over the gap is the estimator's job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorSample {
    pub address: u8,
    pub timestamp_us: u64,
    pub raw_bytes: [u8; SENSOR_FRAME_LEN],
    pub valid: bool,
    pub fault: Option<SensorFault>,
}

impl SensorSample {
    fn valid(address: u8, timestamp_us: u64, raw_bytes: [u8; SENSOR_FRAME_LEN]) -> Self {
        Self {
            address,
            timestamp_us,
            raw_bytes,
            valid: true,
            fault: None,
        }
    }

    fn invalid(address: u8, timestamp_us: u64, fault: SensorFault) -> Self {
        Self {
            address,
            timestamp_us,
            raw_bytes: [0; SENSOR_FRAME_LEN],
            valid: false,
            fault: Some(fault),
        }
    }

    /// Raw accelerometer counts (X, Y, Z)
    pub fn accel_raw(&self) -> [i16; 3] {
        self.axis_triplet(0)
    }

    /// Raw die temperature counts
    pub fn temperature_raw(&self) -> i16 {
        i16::from_be_bytes([self.raw_bytes[6], self.raw_bytes[7]])
    }

    /// Raw gyroscope counts (X, Y, Z)
    pub fn gyro_raw(&self) -> [i16; 3] {
        self.axis_triplet(8)
    }

    fn axis_triplet(&self, offset: usize) -> [i16; 3] {
        let b = &self.raw_bytes[offset..offset + 6];
        [
            i16::from_be_bytes([b[0], b[1]]),
            i16::from_be_bytes([b[2], b[3]]),
            i16::from_be_bytes([b[4], b[5]]),
        ]
    }
}

/// Acquisition counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SensorStats {
    pub reads: u64,
    pub valid: u64,
    pub timeouts: u64,
    pub busy_skips: u64,
    pub bus_faults: u64,
    pub late_responses: u64,
}

type BusResponse = AmlsResult<(usize, [u8; SENSOR_FRAME_LEN])>;

/// Bounded-time IMU acquisition at a fixed bus address
///
/// The bus driver lives on a dedicated worker thread. `read` issues one
/// transaction and waits at most the configured budget for the answer, so a
/// driver that hangs costs a sample and never the cycle deadline. At most one
/// transaction is outstanding; while a hung one is still on the bus, further
/// reads report `Busy` instead of queueing behind it.
pub struct SensorPort {
    address: u8,
    budget: Duration,
    driver_name: String,
    request_tx: Option<Sender<()>>,
    response_rx: Receiver<BusResponse>,
    in_flight: bool,
    worker: Option<JoinHandle<()>>,
    stats: SensorStats,
}

impl SensorPort {
    /// Start the bus worker for `driver` at the configured address and budget
    pub fn new(driver: impl BusDriver + 'static, config: &LoopConfig) -> AmlsResult<Self> {
        Self::with_budget(
            driver,
            config.sensor_bus_address,
            Duration::from_micros(config.sensor_read_budget_us as u64),
        )
    }

    pub fn with_budget(
        mut driver: impl BusDriver + 'static,
        address: u8,
        budget: Duration,
    ) -> AmlsResult<Self> {
        if budget.is_zero() {
            return Err(AmlsError::config("sensor read budget must be non-zero"));
        }

        let (request_tx, request_rx) = channel::bounded::<()>(1);
        let (response_tx, response_rx) = channel::bounded::<BusResponse>(1);
        let driver_name = driver.name().to_string();

        let worker = std::thread::Builder::new()
            .name(format!("amls-bus-{:#04x}", address))
            .spawn(move || {
                while request_rx.recv().is_ok() {
                    let mut frame = [0u8; SENSOR_FRAME_LEN];
                    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                        driver.read(address, &mut frame)
                    }))
                    .unwrap_or_else(|_| Err(AmlsError::bus(address, "bus driver panicked")));

                    if response_tx.send(result.map(|n| (n, frame))).is_err() {
                        break;
                    }
                }
            })?;

        info!(
            "Sensor port on {} at {:#04x} (budget {:?})",
            driver_name, address, budget
        );

        Ok(Self {
            address,
            budget,
            driver_name,
            request_tx: Some(request_tx),
            response_rx,
            in_flight: false,
            worker: Some(worker),
            stats: SensorStats::default(),
        })
    }

    /// Perform one bounded transaction and stamp the result with `clock`
    ///
    /// Always returns within the read budget (plus scheduling noise).
    pub fn read<C: CycleClock + ?Sized>(&mut self, clock: &C) -> SensorSample {
        self.stats.reads += 1;

        if self.in_flight && !self.reclaim_stale() {
            self.stats.busy_skips += 1;
            debug!("Bus {:#04x} still busy, skipping sample", self.address);
            return SensorSample::invalid(self.address, clock.now_us(), SensorFault::Busy);
        }

        let Some(request_tx) = self.request_tx.as_ref() else {
            return SensorSample::invalid(self.address, clock.now_us(), SensorFault::Disconnected);
        };

        match request_tx.try_send(()) {
            Ok(()) => self.in_flight = true,
            Err(TrySendError::Full(())) => {
                self.stats.busy_skips += 1;
                return SensorSample::invalid(self.address, clock.now_us(), SensorFault::Busy);
            }
            Err(TrySendError::Disconnected(())) => {
                return SensorSample::invalid(
                    self.address,
                    clock.now_us(),
                    SensorFault::Disconnected,
                );
            }
        }

        let response = self.response_rx.recv_timeout(self.budget);
        let now = clock.now_us();

        match response {
            Ok(result) => {
                self.in_flight = false;
                self.accept(result, now)
            }
            Err(RecvTimeoutError::Timeout) => {
                self.stats.timeouts += 1;
                warn!(
                    "Sensor read at {:#04x} exceeded {:?} budget",
                    self.address, self.budget
                );
                SensorSample::invalid(self.address, now, SensorFault::Timeout)
            }
            Err(RecvTimeoutError::Disconnected) => {
                self.in_flight = false;
                warn!("Bus worker for {:#04x} disconnected", self.address);
                SensorSample::invalid(self.address, now, SensorFault::Disconnected)
            }
        }
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    pub fn driver_name(&self) -> &str {
        &self.driver_name
    }

    /// True while a timed-out transaction has not yet come back
    pub fn is_busy(&self) -> bool {
        self.in_flight
    }

    pub fn stats(&self) -> SensorStats {
        self.stats
    }

    /// Drain a late answer to a transaction that already timed out
    ///
    /// The data is stale by now and is thrown away. Returns true once the bus
    /// is free for a new request.
    fn reclaim_stale(&mut self) -> bool {
        match self.response_rx.try_recv() {
            Ok(_) => {
                self.stats.late_responses += 1;
                self.in_flight = false;
                true
            }
            Err(TryRecvError::Empty) => false,
            Err(TryRecvError::Disconnected) => {
                self.in_flight = false;
                true
            }
        }
    }

    fn accept(&mut self, result: BusResponse, now: u64) -> SensorSample {
        match result {
            Ok((n, frame)) if n >= SENSOR_FRAME_LEN => {
                self.stats.valid += 1;
                SensorSample::valid(self.address, now, frame)
            }
            Ok((n, _)) => {
                self.stats.bus_faults += 1;
                debug!("Short read at {:#04x}: {} bytes", self.address, n);
                SensorSample::invalid(self.address, now, SensorFault::ShortRead)
            }
            Err(e) => {
                self.stats.bus_faults += 1;
                debug!("Bus fault: {}", e);
                SensorSample::invalid(self.address, now, SensorFault::Bus)
            }
        }
    }
}

impl Drop for SensorPort {
    fn drop(&mut self) {
        // Closing the request channel stops the worker after its current call.
        self.request_tx.take();
        if let Some(worker) = self.worker.take() {
            // A worker stuck inside the driver is left detached.
            if !self.in_flight {
                let _ = worker.join();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{SimulatedClock, SimulatedImuBus};
    use std::time::Instant;

    fn port(bus: SimulatedImuBus) -> SensorPort {
        SensorPort::with_budget(bus, 0x68, Duration::from_millis(5)).unwrap()
    }

    #[test]
    fn healthy_bus_yields_valid_sample() {
        let clock = SimulatedClock::new();
        clock.advance_us(1_234);
        let mut port = port(SimulatedImuBus::new());

        let sample = port.read(&clock);
        assert!(sample.valid);
        assert_eq!(sample.fault, None);
        assert_eq!(sample.address, 0x68);
        assert_eq!(sample.timestamp_us, 1_234);
        // Gravity on Z at the default +-2g scale
        assert_eq!(sample.accel_raw()[2], 16_384);
    }

    #[test]
    fn bus_fault_yields_invalid_zeroed_sample() {
        let clock = SimulatedClock::new();
        let bus = SimulatedImuBus::new();
        let mut port = port(bus.clone());

        bus.fail_next(1);
        let sample = port.read(&clock);
        assert!(!sample.valid);
        assert_eq!(sample.fault, Some(SensorFault::Bus));
        assert_eq!(sample.raw_bytes, [0; SENSOR_FRAME_LEN]);

        assert!(port.read(&clock).valid);
        assert_eq!(port.stats().bus_faults, 1);
    }

    #[test]
    fn hung_bus_returns_within_budget() {
        let clock = SimulatedClock::new();
        let bus = SimulatedImuBus::new();
        let mut port = port(bus.clone());

        bus.hang();
        let start = Instant::now();
        let sample = port.read(&clock);
        let waited = start.elapsed();

        assert!(!sample.valid);
        assert_eq!(sample.fault, Some(SensorFault::Timeout));
        assert!(waited >= Duration::from_millis(5));
        assert!(waited < Duration::from_millis(250), "waited {:?}", waited);

        // The stuck transaction is not queued behind.
        let start = Instant::now();
        assert_eq!(port.read(&clock).fault, Some(SensorFault::Busy));
        assert!(start.elapsed() < Duration::from_millis(250));
        assert!(port.is_busy());

        bus.release();
        // The late answer is discarded and the bus is usable again.
        let mut recovered = false;
        for _ in 0..50 {
            if port.read(&clock).valid {
                recovered = true;
                break;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        assert!(recovered);
        assert!(port.stats().late_responses >= 1);
    }

    #[test]
    fn short_read_is_a_fault() {
        let clock = SimulatedClock::new();
        let bus = SimulatedImuBus::new();
        bus.short_read_next(1);
        let mut port = port(bus);
        assert_eq!(port.read(&clock).fault, Some(SensorFault::ShortRead));
    }

    #[test]
    fn zero_budget_rejected() {
        let result = SensorPort::with_budget(SimulatedImuBus::new(), 0x68, Duration::ZERO);
        assert!(matches!(result, Err(AmlsError::Config(_))));
    }
}
