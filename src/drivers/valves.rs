//! Valve and igniter output bank.
//!
//! Eight boolean channels at fixed indices.  The bank remembers the last
//! commanded state of each channel so telemetry can report it without
//! touching hardware, and forwards every write to a [`ChannelDriver`].
//!
//! ## Dual-target design
//!
//! On hardware: [`PinBank`] drives eight `embedded-hal` output pins.
//! On host/test: [`MemoryDriver`] records writes in memory only.

use core::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use embedded_hal::digital::OutputPin;
use log::{debug, warn};

use crate::app::ports::ChannelDriver;

/// Number of actuation channels.
pub const CHANNEL_COUNT: usize = 8;

/// Channel indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum Channel {
    /// Fuel main valve.
    FuelMain = 0,
    /// Oxidizer main valve.
    OxidizerMain = 1,
    Igniter = 2,
    FuelVent = 3,
    /// Helium bottle valve.
    HeliumBottle = 4,
    OxidizerPress = 5,
    OxidizerBleed = 6,
    OxidizerVent = 7,
}

impl Channel {
    pub const ALL: [Channel; CHANNEL_COUNT] = [
        Channel::FuelMain,
        Channel::OxidizerMain,
        Channel::Igniter,
        Channel::FuelVent,
        Channel::HeliumBottle,
        Channel::OxidizerPress,
        Channel::OxidizerBleed,
        Channel::OxidizerVent,
    ];

    pub const fn index(self) -> usize {
        self as usize
    }

    pub const fn label(self) -> &'static str {
        match self {
            Channel::FuelMain => "FMV",
            Channel::OxidizerMain => "OMV",
            Channel::Igniter => "IGN",
            Channel::FuelVent => "FVV",
            Channel::HeliumBottle => "HBV",
            Channel::OxidizerPress => "OPV",
            Channel::OxidizerBleed => "OBV",
            Channel::OxidizerVent => "OVV",
        }
    }
}

/// Shared output bank.
///
/// States are atomics so readers never block; the driver sits behind a
/// short lock because both the sequencer and direct channel commands may
/// write.
pub struct ChannelBank {
    states: [AtomicBool; CHANNEL_COUNT],
    driver: Mutex<Box<dyn ChannelDriver>>,
}

impl ChannelBank {
    pub fn new(driver: impl ChannelDriver + 'static) -> Self {
        Self {
            states: Default::default(),
            driver: Mutex::new(Box::new(driver)),
        }
    }

    pub fn set(&self, channel: Channel, on: bool) {
        self.write(channel.index(), on);
    }

    pub fn get(&self, channel: Channel) -> bool {
        self.states[channel.index()].load(Ordering::Acquire)
    }

    /// Write every channel in index order.
    pub fn set_all(&self, states: &[bool; CHANNEL_COUNT]) {
        for (index, on) in states.iter().enumerate() {
            self.write(index, *on);
        }
    }

    /// Last commanded state of every channel.
    pub fn snapshot(&self) -> [bool; CHANNEL_COUNT] {
        core::array::from_fn(|i| self.states[i].load(Ordering::Acquire))
    }

    fn write(&self, index: usize, on: bool) {
        let mut driver = self.driver.lock().unwrap_or_else(PoisonError::into_inner);
        driver.write(index, on);
        self.states[index].store(on, Ordering::Release);
        debug!("Channels: {} -> {}", Channel::ALL[index].label(), on);
    }
}

// ───────────────────────────────────────────────────────────────
// Drivers
// ───────────────────────────────────────────────────────────────

/// Eight GPIO outputs.  Pin `i` drives channel `i`.
pub struct PinBank<P> {
    pins: [P; CHANNEL_COUNT],
}

impl<P: OutputPin> PinBank<P> {
    pub fn new(pins: [P; CHANNEL_COUNT]) -> Self {
        Self { pins }
    }
}

impl<P: OutputPin + Send> ChannelDriver for PinBank<P> {
    fn write(&mut self, index: usize, on: bool) {
        let pin = &mut self.pins[index];
        let result = if on { pin.set_high() } else { pin.set_low() };
        if result.is_err() {
            warn!("Channels: GPIO write failed on channel {}", index);
        }
    }
}

/// One recorded driver write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelWrite {
    pub index: usize,
    pub on: bool,
}

/// In-memory driver for host runs and tests.
///
/// Clones share the same write history.
#[derive(Clone, Default)]
pub struct MemoryDriver {
    writes: Arc<Mutex<Vec<ChannelWrite>>>,
}

impl MemoryDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every write so far, oldest first.
    pub fn writes(&self) -> Vec<ChannelWrite> {
        self.writes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn clear(&self) {
        self.writes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl ChannelDriver for MemoryDriver {
    fn write(&mut self, index: usize, on: bool) {
        self.writes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(ChannelWrite { index, on });
    }
}
