//! Driven adapters: clocks and simulated hardware.

pub mod sim;
pub mod time;
