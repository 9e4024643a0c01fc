//! Playout engine
//!
//! **Module Structure:**
//! - `core.rs`: engine struct, channel slots, accessors, state transitions
//! - `lifecycle.rs`: load / play / pause / stop / seek / unload / update
//! - `ticks.rs`: tick pump, gain, thresholds and end-of-track events

mod core;
mod lifecycle;
mod ticks;

pub use self::core::PlayoutEngine;
pub use lifecycle::PlayOutcome;
