//! Per-sensor guarded state.
//!
//! Each sensor has two locks, always taken in this order:
//!
//! - `state` covers the hardware acquisition and the calibration pair.
//!   `sample()` holds it across the read, and a `tare` holds it for its
//!   whole averaging window so nothing else touches the device while the
//!   offset is being derived.
//! - `published` covers the snapshot.  `sample()` replaces the whole
//!   `(value, raw, time)` triple under it while still holding `state`, so a
//!   reader sees the triple from exactly one `sample()` call.  Readers take
//!   only this lock and never wait behind an acquisition or a tare.
//!
//! The persisted-log append happens after both locks are released: storage
//! latency never stalls the next acquisition, and a failing sink never
//! fails a sample.

use std::sync::{Mutex, MutexGuard, PoisonError};

use log::{info, trace, warn};

use super::transfer::Transfer;
use super::{Delta, Reading, Sensor};
use crate::app::ports::{Acquisition, Record, SharedClock, SharedSink};
use crate::config::SystemConfig;
use crate::error::SensorError;

/// Linear calibration applied after the transfer function.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Calibration {
    pub gain: f32,
    pub offset: f32,
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            gain: 1.0,
            offset: 0.0,
        }
    }
}

/// How a tare collects its samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TareSettings {
    pub samples: u16,
    pub interval_ms: u32,
    pub timeout_ms: u32,
}

impl TareSettings {
    pub fn from_config(cfg: &SystemConfig) -> Self {
        Self {
            samples: cfg.tare_samples,
            interval_ms: cfg.tare_interval_ms,
            timeout_ms: cfg.tare_timeout_ms,
        }
    }
}

impl Default for TareSettings {
    fn default() -> Self {
        Self::from_config(&SystemConfig::default())
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Snapshot {
    current: Reading,
    previous: Reading,
}

struct State<A, X> {
    acquisition: A,
    transfer: X,
    calibration: Calibration,
}

impl<A, X: Transfer> State<A, X> {
    fn calibrated(&self, raw: f32) -> f32 {
        self.transfer.physical(raw) * self.calibration.gain + self.calibration.offset
    }
}

/// A sensor whose mutable state sits behind its own locks.
pub struct GuardedSensor<A, X> {
    name: &'static str,
    state: Mutex<State<A, X>>,
    published: Mutex<Snapshot>,
    clock: SharedClock,
    sink: Option<SharedSink>,
    tare: TareSettings,
}

impl<A: Acquisition, X: Transfer> GuardedSensor<A, X> {
    pub fn new(name: &'static str, acquisition: A, transfer: X, clock: SharedClock) -> Self {
        Self {
            name,
            state: Mutex::new(State {
                acquisition,
                transfer,
                calibration: Calibration::default(),
            }),
            published: Mutex::new(Snapshot::default()),
            clock,
            sink: None,
            tare: TareSettings::default(),
        }
    }

    /// Append every sample to `sink`.
    pub fn with_sink(mut self, sink: SharedSink) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn with_calibration(self, calibration: Calibration) -> Self {
        self.lock().calibration = calibration;
        self
    }

    pub fn with_tare_settings(mut self, tare: TareSettings) -> Self {
        self.tare = tare;
        self
    }

    pub fn calibration(&self) -> Calibration {
        self.lock().calibration
    }

    fn lock(&self) -> MutexGuard<'_, State<A, X>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn snapshot(&self) -> Snapshot {
        *self.published.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn persist(&self, reading: &Reading) {
        let Some(sink) = &self.sink else { return };
        let record = Record {
            name: self.name,
            value: reading.value,
            raw: reading.raw,
            time_ms: reading.time_ms,
        };
        if let Err(e) = sink.append(&record) {
            trace!("Sensors: '{}' not persisted: {}", self.name, e);
        }
    }
}

impl<A: Acquisition, X: Transfer> Sensor for GuardedSensor<A, X> {
    fn name(&self) -> &str {
        self.name
    }

    fn sample(&self) -> Result<Reading, SensorError> {
        let reading = {
            let mut state = self.lock();
            if !state.acquisition.is_ready() {
                return Err(SensorError::NotReady);
            }
            let raw = state.acquisition.read_raw()?;
            let reading = Reading {
                value: state.calibrated(raw),
                raw,
                time_ms: self.clock.now_ms(),
            };
            let mut published = self.published.lock().unwrap_or_else(PoisonError::into_inner);
            published.previous = published.current;
            published.current = reading;
            reading
        };
        self.persist(&reading);
        Ok(reading)
    }

    fn last_data(&self) -> Reading {
        self.snapshot().current
    }

    fn deltas(&self) -> Delta {
        let Snapshot { current, previous } = self.snapshot();
        Delta {
            value: current.value - previous.value,
            time_ms: current.time_ms as i64 - previous.time_ms as i64,
        }
    }

    fn set_gain(&self, gain: f32) {
        self.lock().calibration.gain = gain;
        info!("Sensors: '{}' gain = {}", self.name, gain);
    }

    fn set_offset(&self, offset: f32) {
        self.lock().calibration.offset = offset;
        info!("Sensors: '{}' offset = {}", self.name, offset);
    }

    fn tare(&self, expected: f32) -> Result<f32, SensorError> {
        let mut state = self.lock();
        let started = self.clock.now_ms();
        let wanted = self.tare.samples.max(1);
        let mut sum = 0.0f64;
        let mut taken = 0u16;

        while taken < wanted {
            if state.acquisition.is_ready() {
                sum += f64::from(state.acquisition.read_raw()?);
                taken += 1;
                if taken < wanted {
                    self.clock.sleep_ms(self.tare.interval_ms);
                }
            } else if self.clock.now_ms().saturating_sub(started) >= u64::from(self.tare.timeout_ms)
            {
                warn!(
                    "Sensors: '{}' tare timed out after {}/{} samples",
                    self.name, taken, wanted
                );
                return Err(SensorError::NotReady);
            } else {
                self.clock.yield_now();
            }
        }

        let average = (sum / f64::from(taken)) as f32;
        let physical = state.transfer.physical(average);
        let offset = expected - physical * state.calibration.gain;
        state.calibration.offset = offset;
        info!(
            "Sensors: '{}' tared to {} (avg raw {}, offset {})",
            self.name, expected, average, offset
        );
        Ok(offset)
    }
}
