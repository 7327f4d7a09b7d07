use super::safety_monitor::{SafetyMonitor, SafetyState, SafetyTransition};
use super::stats::CycleStats;
use super::watchdog::Watchdog;
use crate::config::LoopConfig;
use crate::core::CycleClock;
use crate::error::{AmlsError, AmlsResult};
use crate::hardware::{SensorFault, SensorPort, SensorSample, SerialChannel, SerialFaults};
use log::{debug, error, info};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Fault flags collected during one cycle
///
/// None of these stop the loop; they are information for the control step
/// and for whoever watches the cycle reports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CycleFaults {
    pub sensor: Option<SensorFault>,
    pub serial: SerialFaults,
}

impl CycleFaults {
    pub fn any(&self) -> bool {
        self.sensor.is_some() || self.serial.any()
    }
}

/// What the control step sees each cycle
///
/// Everything here is lent for the duration of one `step` call.
pub struct CycleContext<'a> {
    /// Index of this cycle, starting at 0
    pub cycle: u64,
    pub sample: &'a SensorSample,
    /// Safety state as of the end of the previous cycle
    pub safety: SafetyState,
    /// Faults observed so far in this cycle
    pub faults: CycleFaults,
    /// Inbound commands and outbound telemetry
    pub serial: &'a mut SerialChannel,
}

/// What the control step hands back to the loop
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepOutput {
    /// Bytes to queue on the TX ring after the step returns
    pub telemetry: Vec<u8>,
}

impl StepOutput {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn telemetry(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            telemetry: bytes.into(),
        }
    }
}

/// Per-cycle control logic: estimation, guidance, actuator output
///
/// Called once per cycle on the loop thread. Actuator commands are issued by
/// the implementation itself; the loop only handles sensing, serial traffic
/// and timing. The loop never interrupts a step, so an implementation that
/// runs long shows up as an overrun.
pub trait ControlStep {
    fn step(&mut self, ctx: &mut CycleContext<'_>) -> StepOutput;
}

impl<F> ControlStep for F
where
    F: FnMut(&mut CycleContext<'_>) -> StepOutput,
{
    fn step(&mut self, ctx: &mut CycleContext<'_>) -> StepOutput {
        self(ctx)
    }
}

/// Outcome of one loop iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub cycle: u64,
    pub started_us: u64,
    /// Measured duration from start to the end of the safety report
    pub elapsed_us: u64,
    /// Safety state after this cycle's report
    pub safety: SafetyState,
    pub transition: Option<SafetyTransition>,
    pub overrun: bool,
    pub sample_valid: bool,
    pub faults: CycleFaults,
}

/// Shared run flag for `run_forever`
///
/// Clone it into a signal handler or a supervisor thread and call `stop`.
#[derive(Debug, Clone)]
pub struct StopHandle {
    running: Arc<AtomicBool>,
}

impl Default for StopHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl StopHandle {
    pub fn new() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// Fixed-rate flight loop
///
/// Each iteration reads one sensor sample, drains inbound serial bytes, runs
/// the control step, queues and flushes its telemetry, reports the measured
/// duration to the safety monitor and then sleeps until one nominal period
/// after the iteration started. A late iteration is followed immediately by
/// the next one; the loop never tries to catch up on missed periods.
pub struct LoopScheduler<K: CycleClock> {
    config: LoopConfig,
    clock: K,
    sensor: SensorPort,
    serial: SerialChannel,
    monitor: SafetyMonitor,
    stats: CycleStats,
    watchdog: Watchdog,
    stop: StopHandle,
    cycle: u64,
    /// Scheduled start of the next iteration
    next_start_us: Option<u64>,
}

impl<K: CycleClock> LoopScheduler<K> {
    /// Build a loop from a validated config and its hardware
    ///
    /// The sensor port and serial channel must agree with the config's bus
    /// address and buffer capacity.
    pub fn new(
        config: LoopConfig,
        clock: K,
        sensor: SensorPort,
        serial: SerialChannel,
    ) -> AmlsResult<Self> {
        config.validate()?;

        if sensor.address() != config.sensor_bus_address {
            return Err(AmlsError::config(format!(
                "sensor port is bound to {:#04x} but config expects {:#04x}",
                sensor.address(),
                config.sensor_bus_address
            )));
        }
        if serial.capacity() != config.serial_buffer_capacity {
            return Err(AmlsError::config(format!(
                "serial channel holds {} bytes per ring but config expects {}",
                serial.capacity(),
                config.serial_buffer_capacity
            )));
        }

        info!(
            "Loop scheduler: {:.1} Hz, nominal {} us, max {} us, {} strike(s)",
            config.rate_hz(),
            config.nominal_period_us,
            config.max_allowed_period_us,
            config.overrun_strikes
        );

        Ok(Self {
            monitor: SafetyMonitor::new(&config),
            watchdog: Watchdog::new(Duration::from_micros(config.watchdog_timeout_us)),
            config,
            clock,
            sensor,
            serial,
            stats: CycleStats::new(),
            stop: StopHandle::new(),
            cycle: 0,
            next_start_us: None,
        })
    }

    /// Run one full iteration, including the end-of-cycle sleep
    ///
    /// Fails only if the control step panics. Timing is still measured and
    /// reported for that cycle before the error is returned.
    pub fn run_cycle<C>(&mut self, control: &mut C) -> AmlsResult<CycleReport>
    where
        C: ControlStep + ?Sized,
    {
        let started_us = self.clock.now_us();
        if let Some(scheduled) = self.next_start_us {
            self.stats.record_start_lag(started_us.saturating_sub(scheduled));
        }
        self.watchdog.feed();

        let sample = self.sensor.read(&self.clock);
        self.serial.poll_inbound();

        let mut faults = CycleFaults {
            sensor: sample.fault,
            serial: self.serial.faults(),
        };

        let output = {
            let mut ctx = CycleContext {
                cycle: self.cycle,
                sample: &sample,
                safety: self.monitor.state(),
                faults,
                serial: &mut self.serial,
            };
            std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| control.step(&mut ctx)))
        };

        let panicked = match &output {
            Ok(output) => {
                if !output.telemetry.is_empty() {
                    self.serial.write(&output.telemetry);
                }
                false
            }
            Err(_) => true,
        };
        self.serial.flush_outbound();
        faults.serial = self.serial.take_faults();

        let elapsed_us = self.clock.elapsed_since_us(started_us);
        let transition = self.monitor.report(elapsed_us);
        let overrun = elapsed_us > self.config.max_allowed_period_us as u64;
        self.record(elapsed_us, overrun, &faults);

        let report = CycleReport {
            cycle: self.cycle,
            started_us,
            elapsed_us,
            safety: self.monitor.state(),
            transition,
            overrun,
            sample_valid: sample.valid,
            faults,
        };

        if faults.any() {
            debug!("Cycle {} faults: {:?}", self.cycle, faults);
        }

        let deadline = started_us + self.config.nominal_period_us as u64;
        self.next_start_us = Some(deadline);
        self.cycle += 1;

        if panicked {
            error!("Control step panicked in cycle {}", report.cycle);
            return Err(AmlsError::Internal(format!(
                "control step panicked in cycle {}",
                report.cycle
            )));
        }

        self.clock.sleep_until_us(deadline);
        Ok(report)
    }

    /// Run up to `cycles` iterations, stopping early if the stop handle fires
    ///
    /// Returns the number of cycles executed.
    pub fn run_for<C>(&mut self, control: &mut C, cycles: u64) -> AmlsResult<u64>
    where
        C: ControlStep + ?Sized,
    {
        let mut executed = 0;
        while executed < cycles && self.stop.is_running() {
            self.run_cycle(control)?;
            executed += 1;
        }
        Ok(executed)
    }

    /// Run until the stop handle fires
    pub fn run_forever<C>(&mut self, control: &mut C) -> AmlsResult<()>
    where
        C: ControlStep + ?Sized,
    {
        info!("Flight loop started");
        while self.stop.is_running() {
            self.run_cycle(control)?;
        }
        info!(
            "Flight loop stopped after {} cycles ({} overruns, state {})",
            self.stats.cycles,
            self.stats.overruns,
            self.monitor.state()
        );
        Ok(())
    }

    /// Clear an overrun warning or fault; a no-op when nominal
    pub fn reset_safety(&mut self) -> Option<SafetyTransition> {
        self.monitor.reset()
    }

    pub fn safety_state(&self) -> SafetyState {
        self.monitor.state()
    }

    pub fn safety(&self) -> &SafetyMonitor {
        &self.monitor
    }

    pub fn stats(&self) -> &CycleStats {
        &self.stats
    }

    pub fn config(&self) -> &LoopConfig {
        &self.config
    }

    pub fn clock(&self) -> &K {
        &self.clock
    }

    pub fn sensor(&self) -> &SensorPort {
        &self.sensor
    }

    pub fn serial(&self) -> &SerialChannel {
        &self.serial
    }

    pub fn serial_mut(&mut self) -> &mut SerialChannel {
        &mut self.serial
    }

    /// Heartbeat handle for an external supervisor
    pub fn watchdog(&self) -> Watchdog {
        self.watchdog.clone()
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Cycles started so far
    pub fn cycle_count(&self) -> u64 {
        self.cycle
    }

    fn record(&mut self, elapsed_us: u64, overrun: bool, faults: &CycleFaults) {
        self.stats.record(elapsed_us, overrun);

        match faults.sensor {
            Some(SensorFault::Timeout) => self.stats.sensor_timeouts += 1,
            Some(_) => self.stats.sensor_faults += 1,
            None => {}
        }
        if faults.serial.rx_overflow {
            self.stats.rx_overflow_cycles += 1;
        }
        if faults.serial.tx_overflow {
            self.stats.tx_overflow_cycles += 1;
        }
        if faults.serial.transport_error {
            self.stats.transport_error_cycles += 1;
        }
    }
}
