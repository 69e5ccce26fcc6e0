//! Operator link.
//!
//! ```text
//!   serial bytes ──▶ codec (frames) ──▶ app::commands::parse ──▶ Station
//! ```

pub mod codec;
