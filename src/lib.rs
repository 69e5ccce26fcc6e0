//! OTV test-stand DAQ firmware library.
//!
//! Exposes the concurrency core (event queue, periodic scheduler, guarded
//! sensors, command sequencer) and the adapters around it for the host
//! binary and integration tests.

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod config;
pub mod datalog;
pub mod drivers;
pub mod error;
pub mod events;
pub mod rpc;
pub mod safety;
pub mod scheduler;
pub mod sensors;
pub mod sequencer;
