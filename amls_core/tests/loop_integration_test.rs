//! End-to-end loop behaviour against simulated hardware
//!
//! These use the real monotonic clock where the point is wall-clock bounds
//! (hung bus, cadence) and the simulated clock everywhere else.

use amls_core::hardware::SensorFault;
use amls_core::prelude::*;
use amls_core::sim::{LoopbackTransport, SimulatedClock, SimulatedImuBus};
use std::time::{Duration, Instant};

fn sim_loop(
    config: LoopConfig,
    bus: SimulatedImuBus,
    link: LoopbackTransport,
) -> (LoopScheduler<SimulatedClock>, SimulatedClock) {
    let clock = SimulatedClock::new();
    let sensor = SensorPort::new(bus, &config).unwrap();
    let serial = SerialChannel::new(link, config.serial_buffer_capacity);
    let scheduler = LoopScheduler::new(config, clock.clone(), sensor, serial).unwrap();
    (scheduler, clock)
}

#[test]
fn test_hung_bus_costs_samples_not_cycles() {
    let config = LoopConfig::synthetic(20_000, 21_000);
    let bus = SimulatedImuBus::new();
    let sensor = SensorPort::new(bus.clone(), &config).unwrap();
    let serial = SerialChannel::new(LoopbackTransport::new(), config.serial_buffer_capacity);
    let mut scheduler = LoopScheduler::new(config, MonotonicClock::new(), sensor, serial).unwrap();

    bus.hang();
    let mut faults = Vec::new();
    let mut control = |ctx: &mut CycleContext<'_>| {
        faults.push(ctx.faults.sensor);
        StepOutput::none()
    };

    let start = Instant::now();
    let ran = scheduler.run_for(&mut control, 5).unwrap();
    let wall = start.elapsed();

    assert_eq!(ran, 5);
    assert_eq!(faults[0], Some(SensorFault::Timeout));
    assert!(faults[1..].iter().all(|f| *f == Some(SensorFault::Busy)));
    // Five 20 ms cycles, with generous headroom for a loaded host
    assert!(wall < Duration::from_millis(400), "loop took {:?}", wall);
    assert_eq!(scheduler.stats().sensor_timeouts, 1);
    assert_eq!(scheduler.stats().sensor_faults, 4);

    bus.release();
}

#[test]
fn test_monotonic_cadence_is_close_to_nominal() {
    let config = LoopConfig::synthetic(10_000, 30_000);
    let sensor = SensorPort::new(SimulatedImuBus::new(), &config).unwrap();
    let serial = SerialChannel::new(LoopbackTransport::new(), config.serial_buffer_capacity);
    let mut scheduler = LoopScheduler::new(config, MonotonicClock::new(), sensor, serial).unwrap();
    let mut control = |_ctx: &mut CycleContext<'_>| StepOutput::none();

    let start = Instant::now();
    scheduler.run_for(&mut control, 10).unwrap();
    let wall = start.elapsed();

    // Ten periods of 10 ms: never shorter, and not wildly longer
    assert!(wall >= Duration::from_millis(100), "loop took {:?}", wall);
    assert!(wall < Duration::from_millis(500), "loop took {:?}", wall);
}

#[test]
fn test_serial_flood_never_corrupts_rings() {
    let link = LoopbackTransport::new();
    let (mut scheduler, _clock) = sim_loop(
        LoopConfig {
            sensor_read_budget_us: 20_000,
            ..LoopConfig::default()
        },
        SimulatedImuBus::new(),
        link.clone(),
    );

    // 3 KB arrive before the first cycle; nobody reads for the first cycles
    let flood: Vec<u8> = (0..3_000u32).map(|i| (i % 256) as u8).collect();
    link.inject(&flood);

    let mut idle = |_ctx: &mut CycleContext<'_>| StepOutput::telemetry(vec![0xEE; 700]);
    let mut reports = Vec::new();
    for _ in 0..6 {
        reports.push(scheduler.run_cycle(&mut idle).unwrap());
    }
    assert!(reports.iter().any(|r| r.faults.serial.rx_overflow));
    assert!(reports.iter().all(|r| r.faults.serial.tx_overflow));
    assert_eq!(link.pending_inbound(), 0);

    // The ring holds exactly the newest 512 bytes, in arrival order
    let retained = scheduler.serial_mut().read_available();
    assert_eq!(retained, flood[flood.len() - 512..].to_vec());

    // Every transmitted byte is one of ours; the TX ring never overflowed into garbage
    let sent = link.take_transmitted();
    assert!(!sent.is_empty());
    assert!(sent.iter().all(|b| *b == 0xEE));

    // Safety state is untouched by serial trouble
    assert_eq!(scheduler.safety_state(), SafetyState::Nominal);
}

#[test]
fn test_reports_follow_cycle_index_and_clock() {
    let (mut scheduler, clock) = sim_loop(
        LoopConfig {
            sensor_read_budget_us: 20_000,
            ..LoopConfig::default()
        },
        SimulatedImuBus::new(),
        LoopbackTransport::new(),
    );
    let work = clock.clone();
    let mut control = move |_ctx: &mut CycleContext<'_>| {
        work.advance_us(1_000);
        StepOutput::none()
    };

    for expected in 0..4u64 {
        let report = scheduler.run_cycle(&mut control).unwrap();
        assert_eq!(report.cycle, expected);
        assert_eq!(report.started_us, expected * 25_000);
        assert_eq!(report.elapsed_us, 1_000);
        assert!(report.sample_valid);
        assert!(report.transition.is_none());
    }

    let stats = scheduler.stats();
    assert_eq!(stats.cycles, 4);
    assert_eq!(stats.max_cycle_us, 1_000);
    assert_eq!(stats.max_start_lag_us, 0);
}

#[test]
fn test_supervisor_sees_stalled_loop_via_watchdog() {
    let config = LoopConfig {
        watchdog_timeout_us: 5_000,
        sensor_read_budget_us: 20_000,
        ..LoopConfig::default()
    };
    let (mut scheduler, _clock) = sim_loop(config, SimulatedImuBus::new(), LoopbackTransport::new());
    let watchdog = scheduler.watchdog();

    let supervisor = watchdog.clone();
    let mut control = move |_ctx: &mut CycleContext<'_>| {
        // A step that stalls in wall-clock time
        std::thread::sleep(Duration::from_millis(20));
        assert!(supervisor.is_expired());
        StepOutput::none()
    };

    scheduler.run_cycle(&mut control).unwrap();
    assert_eq!(watchdog.feeds(), 1);
}
