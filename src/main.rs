//! OTV DAQ host driver.
//!
//! Wires every component around one [`Station`] and talks to the ground
//! station over stdin/stdout.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │  stdin ──▶ FrameDecoder ──▶ Station::handle_frame ──▶ stdout     │
//! │                                  │                               │
//! │          ┌───────────────────────┼──────────────────────┐        │
//! │          ▼                       ▼                      ▼        │
//! │  "sampler" thread          "sequence" thread     "events" thread │
//! │  PeriodicScheduler         CommandSequencer      PriorityEvent-  │
//! │  PT · LC · RTD             fire · abort · pulse  Queue  ◀─ timer │
//! │                                                  (flow meters)   │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every log line is prefixed with `log: ` so the ground station can tell
//! it apart from telemetry.

use std::io::{BufWriter, Read, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use log::{info, warn};

use otv_daq::adapters::sim::SimInput;
use otv_daq::adapters::time::SystemClock;
use otv_daq::app::ports::{SharedClock, SharedSink};
use otv_daq::app::service::{Station, sample_job, sample_once};
use otv_daq::config::SystemConfig;
use otv_daq::datalog::DataLog;
use otv_daq::drivers::task_pin;
use otv_daq::drivers::valves::{ChannelBank, MemoryDriver};
use otv_daq::events::PriorityEventQueue;
use otv_daq::rpc::codec::FrameDecoder;
use otv_daq::scheduler::PeriodicScheduler;
use otv_daq::sensors::flow::{FlowInput, PulseCounter};
use otv_daq::sensors::guarded::{GuardedSensor, TareSettings};
use otv_daq::sensors::transfer::{AdcVolts, Identity, LoadCellBridge, Rtd};
use otv_daq::sensors::{Averaged, Sensor, SensorRegistry};

/// Deferred flow-meter jobs posted by the timer context.
const EVENT_QUEUE_CAPACITY: usize = 16;

/// Stack for the long-lived loops (KiB).
const LOOP_STACK_KB: usize = 64;

/// Samples averaged per built-in ADC conversion.
const ADC_OVERSAMPLE: u16 = 8;

fn init_logging() {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .format(|buf, record| writeln!(buf, "log: [{}] {}", record.level(), record.args()))
        .init();
}

fn load_config() -> Result<SystemConfig> {
    let Some(path) = std::env::args().nth(1) else {
        info!("Config: defaults");
        return Ok(SystemConfig::default());
    };
    let json = std::fs::read_to_string(&path).with_context(|| format!("reading {path}"))?;
    let config = SystemConfig::from_json(&json).with_context(|| format!("parsing {path}"))?;
    info!("Config: loaded {}", path);
    Ok(config)
}

/// Simulated stand hardware the host run samples from.
struct SimRig {
    he_flow: Arc<PulseCounter>,
    ox_flow: Arc<PulseCounter>,
}

/// Sensors sampled by the periodic scheduler, and the flow meters sampled
/// through the event queue.
struct Sensors {
    registry: SensorRegistry,
    periodic: Vec<(Arc<dyn Sensor>, u32)>,
    flow: Vec<Arc<dyn Sensor>>,
}

fn build_sensors(config: &SystemConfig, clock: &SharedClock, sink: &SharedSink) -> (Sensors, SimRig) {
    let tare = TareSettings::from_config(config);
    let mut registry = SensorRegistry::new();
    let mut periodic: Vec<(Arc<dyn Sensor>, u32)> = Vec::new();
    let mut flow: Vec<Arc<dyn Sensor>> = Vec::new();

    for (name, raw) in [("PT1", 0.12f32), ("PT2", 0.31), ("PT3", 0.27)] {
        let input = Averaged::new(SimInput::new(raw).with_wobble(0.002), ADC_OVERSAMPLE);
        let sensor: Arc<dyn Sensor> = Arc::new(
            GuardedSensor::new(name, input, AdcVolts::default(), clock.clone())
                .with_sink(sink.clone())
                .with_tare_settings(tare),
        );
        sensor.set_gain(250.0);
        periodic.push((sensor, config.pressure_period_ms));
    }

    let load_cell: Arc<dyn Sensor> = Arc::new(
        GuardedSensor::new(
            "LC1",
            SimInput::new(0.05).with_wobble(0.01),
            LoadCellBridge::default(),
            clock.clone(),
        )
        .with_sink(sink.clone())
        .with_tare_settings(tare),
    );
    periodic.push((load_cell, config.load_cell_period_ms));

    // ~21 °C on a PT100 / 430 Ω reference.
    let rtd: Arc<dyn Sensor> = Arc::new(
        GuardedSensor::new("RTD1", SimInput::new(8_250.0), Rtd::default(), clock.clone())
            .with_sink(sink.clone())
            .with_tare_settings(tare),
    );
    periodic.push((rtd, config.rtd_period_ms));

    let he_flow = Arc::new(PulseCounter::new());
    let ox_flow = Arc::new(PulseCounter::new());
    for (name, counter) in [("HE_MFR", &he_flow), ("OX_MFR", &ox_flow)] {
        let sensor: Arc<dyn Sensor> = Arc::new(
            GuardedSensor::new(
                name,
                FlowInput::new(counter.clone(), clock.clone()),
                Identity,
                clock.clone(),
            )
            .with_sink(sink.clone())
            .with_tare_settings(tare),
        );
        // 450 pulses per litre -> L/min.
        sensor.set_gain(60.0 / 450.0);
        flow.push(sensor);
    }

    for sensor in periodic.iter().map(|(s, _)| s).chain(flow.iter()) {
        registry.add(sensor.clone());
    }

    (
        Sensors {
            registry,
            periodic,
            flow,
        },
        SimRig { he_flow, ox_flow },
    )
}

fn main() -> Result<()> {
    init_logging();
    info!("OTV DAQ v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config()?;
    let clock: SharedClock = Arc::new(SystemClock::new(config.idle_pause_ms));
    let datalog = Arc::new(DataLog::new());
    let sink: SharedSink = datalog.clone();

    let (sensors, rig) = build_sensors(&config, &clock, &sink);
    let channels = Arc::new(ChannelBank::new(MemoryDriver::new()));
    let station = Arc::new(Station::new(
        config.clone(),
        sensors.registry,
        channels,
        datalog,
        clock.clone(),
    )?);

    // ── Periodic sampling ─────────────────────────────────────
    let scheduler = Arc::new(PeriodicScheduler::new(clock.clone()));
    for (sensor, period_ms) in sensors.periodic {
        scheduler.register("sample", period_ms, sample_job(sensor));
    }
    let sampler = {
        let scheduler = scheduler.clone();
        task_pin::spawn_named("sampler", LOOP_STACK_KB, move || scheduler.run())?
    };

    // ── Deferred flow sampling through the event queue ────────
    let queue: Arc<PriorityEventQueue<usize, EVENT_QUEUE_CAPACITY>> =
        Arc::new(PriorityEventQueue::new());
    let flow = sensors.flow;
    let events = {
        let queue = queue.clone();
        let clock = clock.clone();
        task_pin::spawn_named("events", LOOP_STACK_KB, move || {
            queue.run_with(clock.as_ref(), |index| {
                if let Some(sensor) = flow.get(index) {
                    sample_once(sensor.as_ref());
                }
            });
        })?
    };

    let running = Arc::new(AtomicBool::new(true));
    let timer = {
        let queue = queue.clone();
        let clock = clock.clone();
        let running = running.clone();
        let period_ms = config.flow_period_ms;
        task_pin::spawn_named("timer", LOOP_STACK_KB, move || {
            let mut dropped = 0u32;
            while running.load(Ordering::Acquire) {
                clock.sleep_ms(period_ms);
                // Simulated turbine edges.
                for _ in 0..(period_ms * 15 / 1000) {
                    rig.he_flow.on_edge();
                }
                for _ in 0..(period_ms * 15 / 2000) {
                    rig.ox_flow.on_edge();
                }
                for (index, priority) in [(0usize, 0i32), (1, 1)] {
                    if !queue.post(index, priority) {
                        dropped += 1;
                        warn!("Timer: event queue full, {} jobs dropped", dropped);
                    }
                }
            }
        })?
    };

    // ── Operator link ─────────────────────────────────────────
    info!("Ready: reading frames from stdin");
    let mut decoder = FrameDecoder::new();
    let mut stdin = std::io::stdin().lock();
    let mut stdout = BufWriter::new(std::io::stdout().lock());
    let mut buf = [0u8; 256];
    loop {
        let n = stdin.read(&mut buf).context("reading stdin")?;
        if n == 0 {
            break;
        }
        let mut replies = Vec::new();
        decoder.feed(&buf[..n], |body| {
            if let Some(reply) = station.handle_frame(body) {
                replies.push(reply);
            }
        });
        for reply in replies {
            writeln!(stdout, "{reply}").context("writing stdout")?;
        }
        stdout.flush().context("flushing stdout")?;
    }

    info!("Operator link closed, shutting down");
    station.shutdown();
    running.store(false, Ordering::Release);
    scheduler.stop();
    queue.stop();
    for handle in [sampler, events, timer] {
        if handle.join().is_err() {
            warn!("Shutdown: a loop panicked");
        }
    }
    if station.datalog().is_mounted() {
        let _ = station.datalog().eject();
    }
    Ok(())
}
