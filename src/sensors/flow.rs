//! Hall-effect turbine flow meter input.
//!
//! The meter emits one pulse per fixed volume of fluid.  The edge ISR
//! increments an atomic counter; the acquisition swaps it to zero and
//! divides by the elapsed window to get a pulse rate.  Rate is the raw
//! value, so the sensor's gain converts pulses/s into the flow unit.
//!
//! One [`PulseCounter`] per meter, shared with the ISR through an `Arc`.
//! The counter is the only state the ISR touches, so it stays lock-free.

use core::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crate::app::ports::{Acquisition, SharedClock};
use crate::error::SensorError;

/// Edge counter incremented from interrupt context.
#[derive(Debug, Default)]
pub struct PulseCounter {
    count: AtomicU32,
}

impl PulseCounter {
    pub const fn new() -> Self {
        Self {
            count: AtomicU32::new(0),
        }
    }

    /// Rising-edge handler.  Lock-free, safe from an ISR.
    pub fn on_edge(&self) {
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    /// Read and reset.
    pub fn take(&self) -> u32 {
        self.count.swap(0, Ordering::Relaxed)
    }
}

/// [`Acquisition`] yielding pulses per second since the previous read.
pub struct FlowInput {
    counter: Arc<PulseCounter>,
    clock: SharedClock,
    last_ms: u64,
}

impl FlowInput {
    pub fn new(counter: Arc<PulseCounter>, clock: SharedClock) -> Self {
        let last_ms = clock.now_ms();
        Self {
            counter,
            clock,
            last_ms,
        }
    }
}

impl Acquisition for FlowInput {
    /// Not ready until at least one millisecond of window has elapsed.
    fn is_ready(&mut self) -> bool {
        self.clock.now_ms() > self.last_ms
    }

    fn read_raw(&mut self) -> Result<f32, SensorError> {
        let now = self.clock.now_ms();
        let window_ms = now.saturating_sub(self.last_ms);
        if window_ms == 0 {
            return Err(SensorError::NotReady);
        }
        let pulses = self.counter.take();
        self.last_ms = now;
        Ok(pulses as f32 * 1000.0 / window_ms as f32)
    }
}
