//! dreamytales-lib — Story engine.
//!
//! Text generation and speech synthesis clients, the generation pipeline,
//! narration playback, profile storage, and the HTTP API.
//! Depends on dreamytales-core for the data model and state machines.

pub mod assets;
pub mod error;
pub mod output;
pub mod player;
pub mod profile;
pub mod server;
pub mod speech;
pub mod studio;
pub mod writer;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{Error, Result};

// Re-export dreamytales-core for convenience
pub use dreamytales_core;
