//! Built-in actuation sequences.
//!
//! ## Fire
//!
//! ```text
//!  t=0            FMV open
//!  t=valve_delay  IGN open, OMV open
//!  t=igniter_time IGN close                 ┐ one wait loop,
//!  t=fire_time    OMV close, FMV close      ┘ two deadlines
//!  ── shutdown ──
//!  HBV open, hold, HBV close
//!  FVV open, OVV open, hold, FVV close, OVV close
//! ```
//!
//! All times are measured from the start of the sequence.
//!
//! ## Abort
//!
//! Closes every propellant and ignition channel.  Vents keep their state.
//!
//! ## Pulses
//!
//! Open one valve, wait, close it.

use log::info;

use super::{Cancelled, SequenceContext};
use crate::config::SystemConfig;
use crate::drivers::valves::Channel;
use crate::error::SafetyViolation;
use crate::safety::SafetyEnvelope;

/// Channels closed by [`Sequence::Abort`].
pub const ABORT_CLOSES: [Channel; 6] = [
    Channel::FuelMain,
    Channel::OxidizerMain,
    Channel::Igniter,
    Channel::HeliumBottle,
    Channel::OxidizerPress,
    Channel::OxidizerBleed,
];

/// A dispatchable sequence with its parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sequence {
    Fire {
        fire_time_ms: u32,
        valve_delay_ms: u32,
    },
    Abort,
    PulseFuel {
        pulse_ms: u32,
    },
    PulseOxidizer {
        pulse_ms: u32,
    },
    PulseHelium {
        pulse_ms: u32,
    },
}

/// Fixed timing shared by every run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceTiming {
    pub igniter_time_ms: u32,
    pub post_fire_hold_ms: u32,
    pub poll_ms: u32,
}

impl SequenceTiming {
    pub fn from_config(cfg: &SystemConfig) -> Self {
        Self {
            igniter_time_ms: cfg.igniter_time_ms,
            post_fire_hold_ms: cfg.post_fire_hold_ms,
            poll_ms: cfg.cancel_poll_ms,
        }
    }
}

impl Sequence {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Fire { .. } => "fire",
            Self::Abort => "abort",
            Self::PulseFuel { .. } => "pulse_fuel",
            Self::PulseOxidizer { .. } => "pulse_oxidizer",
            Self::PulseHelium { .. } => "pulse_helium",
        }
    }

    /// Check parameters against the envelope.  Abort always passes.
    pub fn validate(&self, envelope: &SafetyEnvelope) -> Result<(), SafetyViolation> {
        match *self {
            Self::Fire {
                fire_time_ms,
                valve_delay_ms,
            } => envelope.check_fire(fire_time_ms, valve_delay_ms),
            Self::Abort => Ok(()),
            Self::PulseFuel { pulse_ms }
            | Self::PulseOxidizer { pulse_ms }
            | Self::PulseHelium { pulse_ms } => envelope.check_pulse(pulse_ms),
        }
    }

    pub(super) fn run(&self, ctx: &SequenceContext, timing: &SequenceTiming) -> Result<(), Cancelled> {
        match *self {
            Self::Fire {
                fire_time_ms,
                valve_delay_ms,
            } => fire(ctx, timing, fire_time_ms, valve_delay_ms),
            Self::Abort => abort(ctx),
            Self::PulseFuel { pulse_ms } => pulse(ctx, Channel::FuelMain, pulse_ms),
            Self::PulseOxidizer { pulse_ms } => pulse(ctx, Channel::OxidizerMain, pulse_ms),
            Self::PulseHelium { pulse_ms } => pulse(ctx, Channel::HeliumBottle, pulse_ms),
        }
    }
}

fn fire(
    ctx: &SequenceContext,
    timing: &SequenceTiming,
    fire_time_ms: u32,
    valve_delay_ms: u32,
) -> Result<(), Cancelled> {
    let fire_time_ms = u64::from(fire_time_ms);
    let igniter_time_ms = u64::from(timing.igniter_time_ms);

    ctx.set(Channel::FuelMain, true)?;
    ctx.wait_until(u64::from(valve_delay_ms))?;
    ctx.set(Channel::Igniter, true)?;
    ctx.set(Channel::OxidizerMain, true)?;

    let mut igniter_lit = true;
    loop {
        let elapsed = ctx.elapsed_ms();
        if igniter_lit && elapsed >= igniter_time_ms {
            ctx.set(Channel::Igniter, false)?;
            igniter_lit = false;
        }
        if elapsed >= fire_time_ms {
            break;
        }
        let next = if igniter_lit {
            igniter_time_ms.min(fire_time_ms)
        } else {
            fire_time_ms
        };
        ctx.pause_toward(next)?;
    }
    if igniter_lit {
        ctx.set(Channel::Igniter, false)?;
    }
    info!("Sequencer: burn complete at {}ms", ctx.elapsed_ms());

    ctx.set(Channel::OxidizerMain, false)?;
    ctx.set(Channel::FuelMain, false)?;

    ctx.set(Channel::HeliumBottle, true)?;
    ctx.wait_ms(timing.post_fire_hold_ms)?;
    ctx.set(Channel::HeliumBottle, false)?;

    ctx.set(Channel::FuelVent, true)?;
    ctx.set(Channel::OxidizerVent, true)?;
    ctx.wait_ms(timing.post_fire_hold_ms)?;
    ctx.set(Channel::FuelVent, false)?;
    ctx.set(Channel::OxidizerVent, false)?;
    Ok(())
}

fn abort(ctx: &SequenceContext) -> Result<(), Cancelled> {
    for channel in ABORT_CLOSES {
        ctx.set(channel, false)?;
    }
    Ok(())
}

fn pulse(ctx: &SequenceContext, channel: Channel, pulse_ms: u32) -> Result<(), Cancelled> {
    ctx.set(channel, true)?;
    ctx.wait_ms(pulse_ms)?;
    ctx.set(channel, false)
}
