//! Mock hardware for integration tests.
//!
//! Records every channel write (with the simulated time it happened at)
//! and every persisted sample, so tests can assert on full histories.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use otv_daq::adapters::sim::SimInput;
use otv_daq::adapters::time::ManualClock;
use otv_daq::app::ports::{ChannelDriver, Clock, Record, RecordSink, SharedClock};
use otv_daq::app::service::Station;
use otv_daq::config::SystemConfig;
use otv_daq::datalog::DataLog;
use otv_daq::drivers::valves::{Channel, ChannelBank};
use otv_daq::error::StorageError;
use otv_daq::sensors::SensorRegistry;
use otv_daq::sensors::guarded::GuardedSensor;
use otv_daq::sensors::transfer::Identity;

// ── Channel write record ──────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Write {
    pub at_ms: u64,
    pub index: usize,
    pub on: bool,
}

impl Write {
    pub fn new(at_ms: u64, channel: Channel, on: bool) -> Self {
        Self {
            at_ms,
            index: channel.index(),
            on,
        }
    }
}

/// Channel driver stamping each write with the simulated clock.
#[derive(Clone)]
pub struct RecordingDriver {
    clock: ManualClock,
    writes: Arc<Mutex<Vec<Write>>>,
}

#[allow(dead_code)]
impl RecordingDriver {
    pub fn new(clock: ManualClock) -> Self {
        Self {
            clock,
            writes: Arc::default(),
        }
    }

    pub fn writes(&self) -> Vec<Write> {
        self.writes.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.writes.lock().unwrap().len()
    }
}

impl ChannelDriver for RecordingDriver {
    fn write(&mut self, index: usize, on: bool) {
        let at_ms = self.clock.now_ms();
        self.writes.lock().unwrap().push(Write { at_ms, index, on });
    }
}

// ── Record sink ───────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct OwnedRecord {
    pub name: String,
    pub value: f32,
    pub raw: f32,
    pub time_ms: u64,
}

/// Sink keeping every record in memory.
#[derive(Default)]
pub struct MemorySink {
    pub records: Mutex<Vec<OwnedRecord>>,
}

#[allow(dead_code)]
impl MemorySink {
    pub fn records(&self) -> Vec<OwnedRecord> {
        self.records.lock().unwrap().clone()
    }
}

impl RecordSink for MemorySink {
    fn append(&self, record: &Record<'_>) -> Result<(), StorageError> {
        self.records.lock().unwrap().push(OwnedRecord {
            name: record.name.to_owned(),
            value: record.value,
            raw: record.raw,
            time_ms: record.time_ms,
        });
        Ok(())
    }
}

// ── Station rig ───────────────────────────────────────────────

/// A station with two simulated sensors on a manual clock.
#[allow(dead_code)]
pub struct Rig {
    pub clock: ManualClock,
    pub driver: RecordingDriver,
    pub pt1: SimInput,
    pub lc1: SimInput,
    pub station: Arc<Station>,
}

#[allow(dead_code)]
impl Rig {
    pub fn new(clock: ManualClock) -> Self {
        let shared: SharedClock = Arc::new(clock.clone());
        let datalog = Arc::new(DataLog::new());
        let pt1 = SimInput::new(1.0);
        let lc1 = SimInput::new(0.0);

        let mut sensors = SensorRegistry::new();
        sensors.add(Arc::new(
            GuardedSensor::new("PT1", pt1.clone(), Identity, shared.clone())
                .with_sink(datalog.clone()),
        ));
        sensors.add(Arc::new(
            GuardedSensor::new("LC1", lc1.clone(), Identity, shared.clone())
                .with_sink(datalog.clone()),
        ));

        let driver = RecordingDriver::new(clock.clone());
        let channels = Arc::new(ChannelBank::new(driver.clone()));
        let station = Arc::new(Station::new(
            SystemConfig::default(),
            sensors,
            channels,
            datalog,
            shared,
        )
        .unwrap());
        Self {
            clock,
            driver,
            pt1,
            lc1,
            station,
        }
    }
}

/// Spin (in real time) until `cond` holds, failing after ten seconds.
pub fn wait_for(mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !cond() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        std::thread::sleep(Duration::from_millis(1));
    }
}
