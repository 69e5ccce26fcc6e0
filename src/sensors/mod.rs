//! Sensor subsystem: guarded per-sensor state and the [`SensorRegistry`].
//!
//! Every physical sensor is a [`GuardedSensor`](guarded::GuardedSensor):
//! hardware acquisition, calibration and the published snapshot all live
//! behind that sensor's own lock.  The core treats any concrete sensor
//! through the object-safe [`Sensor`] capability trait.

pub mod flow;
pub mod guarded;
pub mod transfer;

use std::sync::Arc;

use crate::app::ports::Acquisition;
use crate::error::SensorError;

/// The triple published by one `sample()` call.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Reading {
    pub value: f32,
    pub raw: f32,
    pub time_ms: u64,
}

/// Change since the previous sample.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Delta {
    pub value: f32,
    pub time_ms: i64,
}

/// Capability set every sensor exposes to the core.
pub trait Sensor: Send + Sync {
    fn name(&self) -> &str;

    /// Acquire, calibrate and publish a new reading.
    fn sample(&self) -> Result<Reading, SensorError>;

    /// Latest published reading.  Never torn across `sample()` calls.
    fn last_data(&self) -> Reading;

    /// Latest reading minus the one before it.
    fn deltas(&self) -> Delta;

    fn set_gain(&self, gain: f32);

    fn set_offset(&self, offset: f32);

    /// Derive an offset so the current physical input reads `expected`.
    /// Returns the new offset.
    fn tare(&self, expected: f32) -> Result<f32, SensorError>;
}

/// Fixed set of sensors, in registration order.
#[derive(Default, Clone)]
pub struct SensorRegistry {
    sensors: Vec<Arc<dyn Sensor>>,
}

impl SensorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a sensor.  Names are expected to be unique.
    pub fn add(&mut self, sensor: Arc<dyn Sensor>) {
        log::info!("Sensors: registered '{}'", sensor.name());
        self.sensors.push(sensor);
    }

    pub fn find(&self, name: &str) -> Option<&Arc<dyn Sensor>> {
        self.sensors.iter().find(|s| s.name() == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Sensor>> {
        self.sensors.iter()
    }

    pub fn len(&self) -> usize {
        self.sensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sensors.is_empty()
    }
}

/// Wraps an [`Acquisition`] and averages
/// `samples` back-to-back reads into one raw value.
pub struct Averaged<A> {
    inner: A,
    samples: u16,
}

impl<A> Averaged<A> {
    pub fn new(inner: A, samples: u16) -> Self {
        Self {
            inner,
            samples: samples.max(1),
        }
    }
}

impl<A: Acquisition> Acquisition for Averaged<A> {
    fn is_ready(&mut self) -> bool {
        self.inner.is_ready()
    }

    fn read_raw(&mut self) -> Result<f32, SensorError> {
        let mut sum = 0.0f64;
        for _ in 0..self.samples {
            sum += f64::from(self.inner.read_raw()?);
        }
        Ok((sum / f64::from(self.samples)) as f32)
    }
}
