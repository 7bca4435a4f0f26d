//! dreamytales-core — Pure types and playback state machines.
//!
//! No async runtime, no I/O, no platform dependencies.

pub mod driver;
pub mod narration;
pub mod queue;
pub mod session;
pub mod types;
