//! Actuator drivers and execution-context helpers.

pub mod task_pin;
pub mod valves;
