//! Unified error types for the DAQ firmware.
//!
//! A single `Error` enum that every subsystem can convert into, keeping the
//! command loop's error handling uniform.  All variants are `Copy` so they
//! can be passed through the sampling loop and the sequencer without
//! allocation.
//!
//! None of these ever unwind through the periodic loop or the sequencer:
//! each is handled (and logged) where it occurs.

use core::fmt;

// ---------------------------------------------------------------------------
// Top-level firmware error
// ---------------------------------------------------------------------------

/// Every fallible operation in the firmware funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// A bounded queue had no room; the job was dropped.
    CapacityExceeded,
    /// A sensor could not produce a reading this tick.
    Sensor(SensorError),
    /// Sequence parameters fell outside the safety envelope.
    Safety(SafetyViolation),
    /// An operator command could not be decoded or routed.
    Command(CommandError),
    /// The persisted log could not be written.
    Storage(StorageError),
    /// An execution context could not be started.
    Spawn,
    /// The execution context a job was handed to has exited.
    Stopped,
    /// Configuration is invalid or could not be loaded.
    Config(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CapacityExceeded => write!(f, "queue full, job dropped"),
            Self::Sensor(e) => write!(f, "sensor: {e}"),
            Self::Safety(e) => write!(f, "safety: {e}"),
            Self::Command(e) => write!(f, "command: {e}"),
            Self::Storage(e) => write!(f, "storage: {e}"),
            Self::Spawn => write!(f, "failed to start execution context"),
            Self::Stopped => write!(f, "execution context stopped"),
            Self::Config(msg) => write!(f, "config: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

// ---------------------------------------------------------------------------
// Sensor errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    /// Hardware has no conversion ready this tick.
    NotReady,
    /// The bus transaction or conversion failed.
    AcquisitionFailed,
}

impl fmt::Display for SensorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotReady => write!(f, "sensor not ready"),
            Self::AcquisitionFailed => write!(f, "acquisition failed"),
        }
    }
}

impl From<SensorError> for Error {
    fn from(e: SensorError) -> Self {
        Self::Sensor(e)
    }
}

// ---------------------------------------------------------------------------
// Safety envelope violations
// ---------------------------------------------------------------------------

/// Rejections raised before a sequence touches any channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SafetyViolation {
    /// Total fire time does not leave the igniter margin.
    FireTooShort { fire_time_ms: u32, minimum_ms: u32 },
    /// Fuel lead exceeds the igniter burn time.
    ValveDelayTooLong { valve_delay_ms: u32, igniter_time_ms: u32 },
    /// Pulse length of zero.
    PulseZero,
    /// Pulse length beyond the configured ceiling.
    PulseTooLong { pulse_ms: u32, max_ms: u32 },
}

impl fmt::Display for SafetyViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FireTooShort {
                fire_time_ms,
                minimum_ms,
            } => write!(f, "fire time {fire_time_ms}ms below minimum {minimum_ms}ms"),
            Self::ValveDelayTooLong {
                valve_delay_ms,
                igniter_time_ms,
            } => write!(
                f,
                "valve delay {valve_delay_ms}ms exceeds igniter time {igniter_time_ms}ms"
            ),
            Self::PulseZero => write!(f, "pulse length is zero"),
            Self::PulseTooLong { pulse_ms, max_ms } => {
                write!(f, "pulse {pulse_ms}ms exceeds {max_ms}ms")
            }
        }
    }
}

impl From<SafetyViolation> for Error {
    fn from(e: SafetyViolation) -> Self {
        Self::Safety(e)
    }
}

// ---------------------------------------------------------------------------
// Command errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandError {
    /// The frame did not match any known command.
    NotRecognized,
    /// A numeric argument failed to parse.
    BadArgument,
    /// The named sensor is not registered.
    UnknownSensor,
    /// A channel command carried the wrong number of states.
    BadChannelCount { expected: usize, got: usize },
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotRecognized => write!(f, "command not recognized"),
            Self::BadArgument => write!(f, "bad argument"),
            Self::UnknownSensor => write!(f, "unknown sensor"),
            Self::BadChannelCount { expected, got } => {
                write!(f, "expected {expected} channel states, got {got}")
            }
        }
    }
}

impl From<CommandError> for Error {
    fn from(e: CommandError) -> Self {
        Self::Command(e)
    }
}

// ---------------------------------------------------------------------------
// Storage errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    /// No storage is mounted.
    Unavailable,
    /// The underlying write or open failed.
    Io,
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable => write!(f, "storage unavailable"),
            Self::Io => write!(f, "I/O error"),
        }
    }
}

impl From<StorageError> for Error {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}
