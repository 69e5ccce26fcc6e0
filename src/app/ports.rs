//! Port traits: the hexagonal boundary between the core and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ core (queue · scheduler · sensors · sequencer)
//! ```
//!
//! Driven adapters (clock, sensor hardware, valve drivers, log storage)
//! implement these traits.  The core consumes them via generics or shared
//! trait objects, so it never touches a register directly.

use std::sync::Arc;

use crate::error::{SensorError, StorageError};

// ───────────────────────────────────────────────────────────────
// Clock port (monotonic time + cooperative suspension)
// ───────────────────────────────────────────────────────────────

/// Monotonic millisecond clock plus the two suspension points the core uses.
///
/// `now_ms` must never regress.
pub trait Clock: Send + Sync {
    /// Milliseconds since the clock was created.
    fn now_ms(&self) -> u64;

    /// Cooperative yield between loop iterations.
    fn yield_now(&self);

    /// Block the calling execution context for `ms`.
    fn sleep_ms(&self, ms: u32);
}

/// Clock shared between execution contexts.
pub type SharedClock = Arc<dyn Clock>;

// ───────────────────────────────────────────────────────────────
// Acquisition port (driven adapter: hardware → sensor guard)
// ───────────────────────────────────────────────────────────────

/// Raw hardware acquisition for one physical sensor.
///
/// Called only while the owning sensor's lock is held.
pub trait Acquisition: Send {
    /// Whether a conversion is available right now.
    fn is_ready(&mut self) -> bool {
        true
    }

    /// Read one raw value.
    fn read_raw(&mut self) -> Result<f32, SensorError>;
}

impl<F> Acquisition for F
where
    F: FnMut() -> Result<f32, SensorError> + Send,
{
    fn read_raw(&mut self) -> Result<f32, SensorError> {
        self()
    }
}

// ───────────────────────────────────────────────────────────────
// Channel driver port (driven adapter: core → valve/igniter outputs)
// ───────────────────────────────────────────────────────────────

/// Writes one boolean actuation output.
pub trait ChannelDriver: Send {
    fn write(&mut self, index: usize, on: bool);
}

// ───────────────────────────────────────────────────────────────
// Record sink port (driven adapter: core → persisted log)
// ───────────────────────────────────────────────────────────────

/// One persisted sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Record<'a> {
    pub name: &'a str,
    pub value: f32,
    pub raw: f32,
    pub time_ms: u64,
}

/// Best-effort persisted log.
///
/// Callers swallow every error: logging never blocks or aborts sampling.
pub trait RecordSink: Send + Sync {
    fn append(&self, record: &Record<'_>) -> Result<(), StorageError>;
}

/// Record sink shared between every sensor.
pub type SharedSink = Arc<dyn RecordSink>;
