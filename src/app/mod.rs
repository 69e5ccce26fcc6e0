//! Application core: command parsing, the station context and telemetry.
//!
//! Everything here talks to hardware through the **port traits** in
//! [`ports`], so the whole layer runs on host against simulated inputs
//! and a manual clock.

pub mod commands;
pub mod ports;
pub mod service;
pub mod telemetry;
