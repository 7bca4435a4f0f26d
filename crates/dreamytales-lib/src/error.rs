//! Errors surfaced by the generation path and the HTTP API.

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    /// Credentials or deployment names are not configured.
    #[error("Missing server configuration. Set {0}.")]
    Config(String),

    #[error("{0}")]
    InvalidRequest(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Upstream error (status {status}): {message}")]
    Upstream { status: u16, message: String },

    /// The vendor answered, but not with what was asked for.
    #[error("{0}")]
    Malformed(String),

    #[error("Undecodable audio: {0}")]
    Undecodable(String),

    #[error("A story is already being generated")]
    Busy,

    #[error("Story not found: {0}")]
    NotFound(String),

    #[error("Player is not running")]
    PlayerGone,

    #[error("Profile storage failed: {0}")]
    Storage(String),
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Network(e.to_string())
    }
}
