//! Simulated acquisitions for host runs.
//!
//! Each [`SimInput`] holds an injectable raw value (stored as `f32` bits
//! in an atomic) plus a ready flag.  Clones share state, so a test or the
//! host binary keeps one handle and gives the other to a sensor.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use crate::app::ports::Acquisition;
use crate::error::SensorError;

#[derive(Debug)]
struct SimState {
    raw_bits: AtomicU32,
    ready: AtomicBool,
    fail: AtomicBool,
}

/// Injectable raw input.
#[derive(Debug, Clone)]
pub struct SimInput {
    state: Arc<SimState>,
    /// Peak deviation of the triangle wobble added to each read.
    wobble: f32,
    phase: u8,
}

impl SimInput {
    pub fn new(raw: f32) -> Self {
        Self {
            state: Arc::new(SimState {
                raw_bits: AtomicU32::new(raw.to_bits()),
                ready: AtomicBool::new(true),
                fail: AtomicBool::new(false),
            }),
            wobble: 0.0,
            phase: 0,
        }
    }

    /// Add a small deterministic wobble so plotted traces look alive.
    pub fn with_wobble(mut self, amplitude: f32) -> Self {
        self.wobble = amplitude;
        self
    }

    pub fn set(&self, raw: f32) {
        self.state.raw_bits.store(raw.to_bits(), Ordering::Relaxed);
    }

    pub fn get(&self) -> f32 {
        f32::from_bits(self.state.raw_bits.load(Ordering::Relaxed))
    }

    pub fn set_ready(&self, ready: bool) {
        self.state.ready.store(ready, Ordering::Relaxed);
    }

    /// Make every read fail until cleared.
    pub fn set_failing(&self, fail: bool) {
        self.state.fail.store(fail, Ordering::Relaxed);
    }
}

impl Acquisition for SimInput {
    fn is_ready(&mut self) -> bool {
        self.state.ready.load(Ordering::Relaxed)
    }

    fn read_raw(&mut self) -> Result<f32, SensorError> {
        if self.state.fail.load(Ordering::Relaxed) {
            return Err(SensorError::AcquisitionFailed);
        }
        self.phase = (self.phase + 1) % 8;
        let tri = f32::from(self.phase.min(8 - self.phase)) / 4.0 - 0.5;
        Ok(self.get() + self.wobble * tri * 2.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_injected_value() {
        let handle = SimInput::new(1.0);
        let mut input = handle.clone();
        handle.set(4.5);
        assert_eq!(input.read_raw(), Ok(4.5));
        handle.set_ready(false);
        assert!(!input.is_ready());
        handle.set_failing(true);
        assert_eq!(input.read_raw(), Err(SensorError::AcquisitionFailed));
    }

    #[test]
    fn wobble_stays_within_amplitude() {
        let mut input = SimInput::new(10.0).with_wobble(0.5);
        for _ in 0..32 {
            let raw = input.read_raw().unwrap();
            assert!((raw - 10.0).abs() <= 0.5 + 1e-6);
        }
    }
}
