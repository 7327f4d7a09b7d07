use crate::config::SENSOR_BUS_ADDRESS;
use crate::error::{AmlsError, AmlsResult};
use crate::hal::BusDriver;
use crate::hardware::SENSOR_FRAME_LEN;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::Duration;

/// 1 g at the +-2 g accelerometer range
const ACCEL_ONE_G: i16 = 16_384;

#[derive(Debug, Default)]
struct BusState {
    reads: u64,
    fail_remaining: u32,
    short_remaining: u32,
    hanging: bool,
    latency: Duration,
}

/// MPU-6050 style IMU on a simulated I2C bus
///
/// Answers only at its configured address, producing a level, slowly rocking
/// airframe: gravity on Z and a small oscillating roll rate. Tests can make it
/// NACK, return short frames, or hang until released.
#[derive(Debug, Clone)]
pub struct SimulatedImuBus {
    address: u8,
    state: Arc<(Mutex<BusState>, Condvar)>,
}

impl Default for SimulatedImuBus {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedImuBus {
    pub fn new() -> Self {
        Self::with_address(SENSOR_BUS_ADDRESS)
    }

    pub fn with_address(address: u8) -> Self {
        Self {
            address,
            state: Arc::new((Mutex::new(BusState::default()), Condvar::new())),
        }
    }

    /// Make every transaction take `latency` before answering
    pub fn with_latency(self, latency: Duration) -> Self {
        self.state.0.lock().latency = latency;
        self
    }

    /// NACK the next `count` transactions
    pub fn fail_next(&self, count: u32) {
        self.state.0.lock().fail_remaining = count;
    }

    /// Return a truncated frame for the next `count` transactions
    pub fn short_read_next(&self, count: u32) {
        self.state.0.lock().short_remaining = count;
    }

    /// Block every transaction until `release` is called
    pub fn hang(&self) {
        self.state.0.lock().hanging = true;
    }

    pub fn release(&self) {
        let (lock, cvar) = &*self.state;
        lock.lock().hanging = false;
        cvar.notify_all();
    }

    /// Transactions started so far
    pub fn reads(&self) -> u64 {
        self.state.0.lock().reads
    }

    fn synth_frame(reads: u64, buf: &mut [u8]) {
        let phase = reads as f32 * 0.05;
        let roll_rate = (phase.sin() * 131.0) as i16; // ~1 deg/s at 131 LSB/(deg/s)
        let temp_raw: i16 = 2_000; // ~42 C

        let words: [i16; 7] = [0, 0, ACCEL_ONE_G, temp_raw, roll_rate, 0, 0];
        for (i, word) in words.iter().enumerate() {
            let [hi, lo] = word.to_be_bytes();
            if let Some(pair) = buf.get_mut(i * 2..i * 2 + 2) {
                pair[0] = hi;
                pair[1] = lo;
            }
        }
    }
}

impl BusDriver for SimulatedImuBus {
    fn read(&mut self, address: u8, buf: &mut [u8]) -> AmlsResult<usize> {
        let (lock, cvar) = &*self.state;
        let mut state = lock.lock();
        state.reads += 1;

        while state.hanging {
            cvar.wait(&mut state);
        }

        let latency = state.latency;
        if !latency.is_zero() {
            drop(state);
            std::thread::sleep(latency);
            state = lock.lock();
        }

        if address != self.address {
            return Err(AmlsError::bus(address, "no device acknowledged"));
        }

        if state.fail_remaining > 0 {
            state.fail_remaining -= 1;
            return Err(AmlsError::bus(address, "simulated NACK"));
        }

        let frame_len = buf.len().min(SENSOR_FRAME_LEN);
        Self::synth_frame(state.reads, &mut buf[..frame_len]);

        if state.short_remaining > 0 {
            state.short_remaining -= 1;
            return Ok(frame_len / 2);
        }

        Ok(frame_len)
    }

    fn name(&self) -> &str {
        "simulated-mpu6050"
    }
}
