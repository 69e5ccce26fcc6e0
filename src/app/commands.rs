//! Operator commands.
//!
//! A frame body (braces already stripped by the codec) parses into one
//! [`Command`], which the [`Station`](super::service::Station) routes:
//!
//! | Body                  | Command                                   |
//! |-----------------------|-------------------------------------------|
//! | *(empty)*             | `Query`                                   |
//! | `CFI` / `CFI<f>,<d>`  | fire (config defaults when bare)          |
//! | `CAB`                 | abort                                     |
//! | `CFP` / `COP` / `CHP` | fuel / oxidizer / helium pulse, `[<ms>]`  |
//! | `S<bits>`             | one `0`/`1` per channel                   |
//! | `DM[<path>]` / `DE`   | mount / eject the data log                |
//! | `T<name>,<expected>`  | tare                                      |
//! | `G<name>,<gain>`      | set gain                                  |
//! | `O<name>,<offset>`    | set offset                                |

use core::str::FromStr;

use crate::config::SystemConfig;
use crate::drivers::valves::CHANNEL_COUNT;
use crate::error::CommandError;
use crate::sequencer::Sequence;

/// Longest sensor name accepted in a command.
pub const MAX_NAME_LEN: usize = 16;

/// Longest mount path accepted in a command.
pub const MAX_PATH_LEN: usize = 64;

pub type SensorName = heapless::String<MAX_NAME_LEN>;

/// Calibration operations on one named sensor.
#[derive(Debug, Clone, PartialEq)]
pub enum Calibration {
    Tare { expected: f32 },
    Gain(f32),
    Offset(f32),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageCommand {
    Mount(heapless::String<MAX_PATH_LEN>),
    Eject,
}

/// Commands the operator link can send into the station.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Report every sensor snapshot and channel state.
    Query,
    Calibrate {
        sensor: SensorName,
        op: Calibration,
    },
    /// Write every channel directly.
    SetChannels([bool; CHANNEL_COUNT]),
    Sequence(Sequence),
    Storage(StorageCommand),
}

/// Parse one frame body.
pub fn parse(body: &str, config: &SystemConfig) -> Result<Command, CommandError> {
    let body = body.trim();
    if body.is_empty() {
        return Ok(Command::Query);
    }

    if let Some(args) = body.strip_prefix("CFI") {
        let (fire_time_ms, valve_delay_ms) = if args.is_empty() {
            (config.default_fire_time_ms, config.default_valve_delay_ms)
        } else {
            let (fire, delay) = args.split_once(',').ok_or(CommandError::BadArgument)?;
            (number(fire)?, number(delay)?)
        };
        return Ok(Command::Sequence(Sequence::Fire {
            fire_time_ms,
            valve_delay_ms,
        }));
    }
    if body == "CAB" {
        return Ok(Command::Sequence(Sequence::Abort));
    }
    if let Some(args) = body.strip_prefix("CFP") {
        let pulse_ms = pulse_length(args, config)?;
        return Ok(Command::Sequence(Sequence::PulseFuel { pulse_ms }));
    }
    if let Some(args) = body.strip_prefix("COP") {
        let pulse_ms = pulse_length(args, config)?;
        return Ok(Command::Sequence(Sequence::PulseOxidizer { pulse_ms }));
    }
    if let Some(args) = body.strip_prefix("CHP") {
        let pulse_ms = pulse_length(args, config)?;
        return Ok(Command::Sequence(Sequence::PulseHelium { pulse_ms }));
    }
    if body == "DE" {
        return Ok(Command::Storage(StorageCommand::Eject));
    }
    if let Some(path) = body.strip_prefix("DM") {
        let path = if path.is_empty() {
            config.default_log_path.clone()
        } else {
            heapless::String::from_str(path).map_err(|_| CommandError::BadArgument)?
        };
        return Ok(Command::Storage(StorageCommand::Mount(path)));
    }
    if let Some(bits) = body.strip_prefix('S') {
        return channel_states(bits).map(Command::SetChannels);
    }

    let mut chars = body.chars();
    let op = chars.next();
    let (name, arg) = chars
        .as_str()
        .split_once(',')
        .ok_or(CommandError::NotRecognized)?;
    let op = match op {
        Some('T') => Calibration::Tare {
            expected: number(arg)?,
        },
        Some('G') => Calibration::Gain(number(arg)?),
        Some('O') => Calibration::Offset(number(arg)?),
        _ => return Err(CommandError::NotRecognized),
    };
    let sensor = SensorName::from_str(name.trim()).map_err(|_| CommandError::UnknownSensor)?;
    if sensor.is_empty() {
        return Err(CommandError::UnknownSensor);
    }
    Ok(Command::Calibrate { sensor, op })
}

fn number<T: FromStr>(text: &str) -> Result<T, CommandError> {
    text.trim().parse().map_err(|_| CommandError::BadArgument)
}

fn pulse_length(args: &str, config: &SystemConfig) -> Result<u32, CommandError> {
    if args.is_empty() {
        Ok(config.default_pulse_ms)
    } else {
        number(args)
    }
}

fn channel_states(bits: &str) -> Result<[bool; CHANNEL_COUNT], CommandError> {
    let got = bits.chars().count();
    if got != CHANNEL_COUNT {
        return Err(CommandError::BadChannelCount {
            expected: CHANNEL_COUNT,
            got,
        });
    }
    let mut states = [false; CHANNEL_COUNT];
    for (state, c) in states.iter_mut().zip(bits.chars()) {
        *state = match c {
            '0' => false,
            '1' => true,
            _ => return Err(CommandError::BadArgument),
        };
    }
    Ok(states)
}
