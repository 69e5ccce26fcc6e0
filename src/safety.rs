//! Safety envelope.
//!
//! Every actuation sequence is checked here **before** the sequencer
//! touches a channel or cancels what is already running.  A rejected
//! request changes nothing.
//!
//! ## Fire envelope
//!
//! - `fire_time_ms >= igniter_time_ms + fire_margin_ms`: the burn must
//!   outlast the igniter by at least the margin.
//! - `valve_delay_ms <= igniter_time_ms`: the oxidizer must open while the
//!   igniter is still lit.
//!
//! ## Pulse envelope
//!
//! `0 < pulse_ms <= max_pulse_ms`.

use log::error;

use crate::config::SystemConfig;
use crate::error::SafetyViolation;

/// Limits derived from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SafetyEnvelope {
    igniter_time_ms: u32,
    fire_margin_ms: u32,
    max_pulse_ms: u32,
}

impl SafetyEnvelope {
    pub fn new(config: &SystemConfig) -> Self {
        Self {
            igniter_time_ms: config.igniter_time_ms,
            fire_margin_ms: config.fire_margin_ms,
            max_pulse_ms: config.max_pulse_ms,
        }
    }

    /// Shortest accepted fire time.
    pub fn minimum_fire_ms(&self) -> u32 {
        self.igniter_time_ms.saturating_add(self.fire_margin_ms)
    }

    pub fn igniter_time_ms(&self) -> u32 {
        self.igniter_time_ms
    }

    pub fn check_fire(&self, fire_time_ms: u32, valve_delay_ms: u32) -> Result<(), SafetyViolation> {
        let minimum_ms = self.minimum_fire_ms();
        if fire_time_ms < minimum_ms {
            return Err(reject(SafetyViolation::FireTooShort {
                fire_time_ms,
                minimum_ms,
            }));
        }
        if valve_delay_ms > self.igniter_time_ms {
            return Err(reject(SafetyViolation::ValveDelayTooLong {
                valve_delay_ms,
                igniter_time_ms: self.igniter_time_ms,
            }));
        }
        Ok(())
    }

    pub fn check_pulse(&self, pulse_ms: u32) -> Result<(), SafetyViolation> {
        if pulse_ms == 0 {
            return Err(reject(SafetyViolation::PulseZero));
        }
        if pulse_ms > self.max_pulse_ms {
            return Err(reject(SafetyViolation::PulseTooLong {
                pulse_ms,
                max_ms: self.max_pulse_ms,
            }));
        }
        Ok(())
    }
}

fn reject(violation: SafetyViolation) -> SafetyViolation {
    error!("SAFETY: rejected: {violation}");
    violation
}
