use amls_core::hardware::{SensorStats, SerialStats};
use amls_core::prelude::*;
use amls_core::scheduling::{realtime, CycleSummary, SafetyTransition};
use amls_core::sim::{LoopbackTransport, SimulatedImuBus};
use anyhow::{Context, Result};
use colored::*;
use serde::Serialize;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Stack touched up front when memory locking is requested
const PREFAULT_STACK_BYTES: usize = 512 * 1024;

/// A simulated ground station command arrives once a second
const GROUND_COMMAND_EVERY: u64 = 40;
const GROUND_COMMAND: &[u8] = b"HOLD\n";

/// Options for `amls run`
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Stop after this many cycles; run until Ctrl-C when `None`
    pub cycles: Option<u64>,
    pub config: Option<PathBuf>,
    /// Busy time spent in every control step
    pub simulated_load_us: u64,
    /// Every Nth cycle takes `spike_us` instead
    pub spike_every: Option<u64>,
    pub spike_us: u64,
    pub realtime_priority: Option<i32>,
    pub cpu: Option<usize>,
    pub lock_memory: bool,
    pub json: bool,
}

/// Control step that burns a configurable amount of CPU and reports attitude telemetry
struct SyntheticLoad {
    load: Duration,
    spike_every: Option<u64>,
    spike: Duration,
    commands_received: u64,
}

impl SyntheticLoad {
    fn new(options: &RunOptions) -> Self {
        Self {
            load: Duration::from_micros(options.simulated_load_us),
            spike_every: options.spike_every.filter(|n| *n > 0),
            spike: Duration::from_micros(options.spike_us),
            commands_received: 0,
        }
    }

    fn busy_wait(duration: Duration) {
        let until = Instant::now() + duration;
        while Instant::now() < until {
            std::hint::spin_loop();
        }
    }
}

impl ControlStep for SyntheticLoad {
    fn step(&mut self, ctx: &mut CycleContext<'_>) -> StepOutput {
        let inbound = ctx.serial.read_available();
        self.commands_received += inbound.iter().filter(|b| **b == b'\n').count() as u64;

        let spiking = self
            .spike_every
            .is_some_and(|n| ctx.cycle > 0 && ctx.cycle % n == 0);
        Self::busy_wait(if spiking { self.spike } else { self.load });

        if ctx.safety.is_degraded() {
            return StepOutput::telemetry(format!("FAILSAFE {}\n", ctx.cycle));
        }

        if !ctx.sample.valid {
            return StepOutput::telemetry(format!("NOSAMPLE {}\n", ctx.cycle));
        }

        let [_, _, az] = ctx.sample.accel_raw();
        let [gx, _, _] = ctx.sample.gyro_raw();
        StepOutput::telemetry(format!("ATT {} {} {} {}\n", ctx.cycle, ctx.safety, az, gx))
    }
}

#[derive(Debug, Serialize)]
struct RunSummary {
    config: LoopConfig,
    final_state: SafetyState,
    overrun_count: u64,
    timing: CycleSummary,
    sensor: SensorStats,
    serial: SerialStats,
    telemetry_bytes: u64,
    commands_received: u64,
    wall_time_ms: u128,
}

/// Run the flight loop against simulated hardware
pub fn execute_run(options: RunOptions) -> Result<()> {
    let summary = run_loop(&options)?;

    if options.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
    }
    Ok(())
}

fn run_loop(options: &RunOptions) -> Result<RunSummary> {
    let config = match &options.config {
        Some(path) => super::config::load(path)?,
        None => LoopConfig::default(),
    };

    apply_realtime(options);

    let link = LoopbackTransport::new();
    let bus = SimulatedImuBus::with_address(config.sensor_bus_address);
    let sensor = SensorPort::new(bus, &config)
        .context("failed to start the sensor port")?;
    let serial = SerialChannel::new(link.clone(), config.serial_buffer_capacity);
    let mut scheduler = LoopScheduler::new(config, MonotonicClock::new(), sensor, serial)
        .context("failed to build the loop scheduler")?;

    let stop = scheduler.stop_handle();
    let handler_stop = stop.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        eprintln!("\n{} Stopping flight loop...", "!".yellow());
        handler_stop.stop();
    }) {
        warn!("Ctrl-C handler not installed: {}", e);
    }

    if !options.json {
        println!(
            "{} Running flight loop at {:.1} Hz ({})",
            "→".cyan(),
            config.rate_hz(),
            match options.cycles {
                Some(n) => format!("{} cycles", n),
                None => "Ctrl-C to stop".to_string(),
            }
        );
    }

    let mut control = SyntheticLoad::new(options);
    let mut telemetry_bytes = 0u64;
    let mut executed = 0u64;
    let started = Instant::now();

    while stop.is_running() && options.cycles.map_or(true, |n| executed < n) {
        if executed % GROUND_COMMAND_EVERY == 0 {
            link.inject(GROUND_COMMAND);
        }
        let report = scheduler.run_cycle(&mut control)?;
        executed += 1;
        telemetry_bytes += link.take_transmitted().len() as u64;

        if let Some(transition) = report.transition {
            if !options.json {
                print_transition(&report, transition);
            }
        }
    }

    info!("Flight loop finished after {} cycles", executed);

    Ok(RunSummary {
        config,
        final_state: scheduler.safety_state(),
        overrun_count: scheduler.safety().overrun_count(),
        timing: scheduler.stats().summary(),
        sensor: scheduler.sensor().stats(),
        serial: scheduler.serial().stats(),
        telemetry_bytes,
        commands_received: control.commands_received,
        wall_time_ms: started.elapsed().as_millis(),
    })
}

fn apply_realtime(options: &RunOptions) {
    if let Some(priority) = options.realtime_priority {
        if let Err(e) = realtime::set_realtime_priority(priority) {
            warn!("Continuing without real-time priority: {}", e);
        }
    }
    if let Some(cpu) = options.cpu {
        if let Err(e) = realtime::pin_to_cpu(cpu) {
            warn!("Continuing without CPU pinning: {}", e);
        }
    }
    if options.lock_memory {
        match realtime::lock_memory() {
            Ok(()) => {
                if let Err(e) = realtime::prefault_stack(PREFAULT_STACK_BYTES) {
                    warn!("Stack prefault failed: {}", e);
                }
            }
            Err(e) => warn!("Continuing without memory locking: {}", e),
        }
    }
}

fn colored_state(state: SafetyState) -> ColoredString {
    match state {
        SafetyState::Nominal => state.as_str().green(),
        SafetyState::OverrunWarning => state.as_str().yellow(),
        SafetyState::OverrunFault => state.as_str().red().bold(),
    }
}

fn print_transition(report: &CycleReport, transition: SafetyTransition) {
    println!(
        "  [cycle {:>6}] {} -> {} ({} us)",
        report.cycle,
        colored_state(transition.from),
        colored_state(transition.to),
        report.elapsed_us
    );
}

fn print_summary(summary: &RunSummary) {
    let timing = &summary.timing;

    println!("\n{}", "Flight loop summary".bold());
    println!("  {:<18} {}", "cycles:".dimmed(), timing.cycles);
    println!("  {:<18} {}", "final state:".dimmed(), colored_state(summary.final_state));
    println!(
        "  {:<18} min {} / mean {:.0} / max {} us",
        "cycle time:".dimmed(),
        timing.min_cycle_us,
        timing.mean_cycle_us,
        timing.max_cycle_us
    );
    println!("  {:<18} {:.1} us", "jitter (stddev):".dimmed(), timing.jitter_us);

    let overruns = format!("{}", summary.overrun_count);
    println!(
        "  {:<18} {}",
        "overruns:".dimmed(),
        if summary.overrun_count == 0 {
            overruns.green()
        } else {
            overruns.yellow()
        }
    );
    println!("  {:<18} {} us", "max start lag:".dimmed(), timing.max_start_lag_us);
    println!(
        "  {:<18} {} valid / {} reads ({} timeouts, {} faults)",
        "sensor:".dimmed(),
        summary.sensor.valid,
        summary.sensor.reads,
        timing.sensor_timeouts,
        timing.sensor_faults
    );
    println!(
        "  {:<18} {} bytes out, {} commands in, {} TX bytes rejected",
        "serial:".dimmed(),
        summary.telemetry_bytes,
        summary.commands_received,
        summary.serial.tx_rejected
    );
    println!("  {:<18} {} ms", "wall time:".dimmed(), summary.wall_time_ms);
}
