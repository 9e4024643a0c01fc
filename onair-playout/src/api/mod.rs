//! HTTP control surface
//!
//! Lifecycle commands per channel, a gesture relay for hosts that block
//! autoplay, and an SSE stream of published playout events.

pub mod handlers;
pub mod server;
pub mod sse;

pub use server::{router, run, AppContext};
