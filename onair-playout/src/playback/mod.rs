//! Playout engine, prebuffer cache and threshold scheduling

pub mod engine;
pub mod prebuffer;
pub mod thresholds;

pub use engine::{PlayOutcome, PlayoutEngine};
pub use prebuffer::{PrebufferCache, PrebufferPurpose, PrebufferStatus};
pub use thresholds::ThresholdScheduler;
