//! Integration test driver for `tests/integration/` submodule.
//!
//! Each `mod` below maps to a file that exercises a subsystem against the
//! mock adapters in `mock_hw`.  All tests run on the host with simulated
//! time and no real hardware.

mod mock_hw;
mod sampling_tests;
mod sequencer_tests;
mod station_tests;
