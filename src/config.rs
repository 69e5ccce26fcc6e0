//! System configuration parameters
//!
//! All tunable parameters for the test-stand DAQ.
//! Values can be overridden by a JSON file handed to the host binary.

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Core system configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    // --- Fire sequence envelope ---
    /// Igniter cutoff, measured from the start of the fire sequence (ms)
    pub igniter_time_ms: u32,
    /// Minimum burn beyond igniter cutoff (ms)
    pub fire_margin_ms: u32,
    /// Each of the two post-fire holds (ms)
    pub post_fire_hold_ms: u32,
    /// Fire time used when `{CFI}` carries no arguments (ms)
    pub default_fire_time_ms: u32,
    /// Fuel lead used when `{CFI}` carries no arguments (ms)
    pub default_valve_delay_ms: u32,

    // --- Pulses ---
    /// Pulse length used when a pulse command carries no argument (ms)
    pub default_pulse_ms: u32,
    /// Longest pulse the envelope accepts (ms)
    pub max_pulse_ms: u32,

    // --- Sequencer ---
    /// Cancellation poll interval inside sequence waits (ms)
    pub cancel_poll_ms: u32,

    // --- Tare ---
    /// Raw readings averaged by a tare
    pub tare_samples: u16,
    /// Pause between tare readings (ms)
    pub tare_interval_ms: u32,
    /// Give up on a tare whose sensor never becomes ready (ms)
    pub tare_timeout_ms: u32,

    // --- Timing ---
    /// Host pause standing in for a cooperative yield (ms)
    pub idle_pause_ms: u32,
    /// Pressure transducer sampling period (ms)
    pub pressure_period_ms: u32,
    /// RTD sampling period (ms)
    pub rtd_period_ms: u32,
    /// Load cell sampling period (ms)
    pub load_cell_period_ms: u32,
    /// Flow meter sampling period (ms)
    pub flow_period_ms: u32,

    // --- Storage ---
    /// Log path used by `{DM}` without an explicit path
    pub default_log_path: heapless::String<64>,
}

impl Default for SystemConfig {
    fn default() -> Self {
        let mut default_log_path = heapless::String::new();
        let _ = default_log_path.push_str("/sd/log.txt");

        Self {
            // Fire envelope
            igniter_time_ms: 2800,
            fire_margin_ms: 200,
            post_fire_hold_ms: 30_000,
            default_fire_time_ms: 15_000,
            default_valve_delay_ms: 480,

            // Pulses
            default_pulse_ms: 500,
            max_pulse_ms: 10_000,

            // Sequencer
            cancel_poll_ms: 1,

            // Tare
            tare_samples: 40,
            tare_interval_ms: 25,
            tare_timeout_ms: 5_000,

            // Timing
            idle_pause_ms: 1,
            pressure_period_ms: 20,
            rtd_period_ms: 90,
            load_cell_period_ms: 14,
            flow_period_ms: 100,

            default_log_path,
        }
    }
}

impl SystemConfig {
    /// Reject values that would make the firmware unsafe or unable to run.
    pub fn validate(&self) -> Result<(), Error> {
        if self.igniter_time_ms == 0 {
            return Err(Error::Config("igniter_time_ms must be non-zero"));
        }
        if self.default_valve_delay_ms > self.igniter_time_ms {
            return Err(Error::Config("default valve delay exceeds igniter time"));
        }
        if self.default_fire_time_ms < self.igniter_time_ms.saturating_add(self.fire_margin_ms) {
            return Err(Error::Config("default fire time inside igniter margin"));
        }
        if self.default_pulse_ms == 0 || self.default_pulse_ms > self.max_pulse_ms {
            return Err(Error::Config("default pulse outside envelope"));
        }
        if self.cancel_poll_ms == 0 {
            return Err(Error::Config("cancel_poll_ms must be non-zero"));
        }
        if self.tare_samples == 0 {
            return Err(Error::Config("tare_samples must be non-zero"));
        }
        let periods = [
            self.pressure_period_ms,
            self.rtd_period_ms,
            self.load_cell_period_ms,
            self.flow_period_ms,
        ];
        if periods.contains(&0) {
            return Err(Error::Config("sampling periods must be non-zero"));
        }
        Ok(())
    }

    /// Parse a JSON document; missing fields keep their defaults.
    pub fn from_json(json: &str) -> Result<Self, Error> {
        let config: Self =
            serde_json::from_str(json).map_err(|_| Error::Config("malformed JSON"))?;
        config.validate()?;
        Ok(config)
    }
}
