//! Crate-level error type.
//!
//! Every fallible operation in the library returns [`Result<T>`]. The variants
//! line up with how the front end reacts to a failure:
//!
//! - [`PitchError::Validation`] blocks the action locally with an inline message.
//! - [`PitchError::Auth`] keeps the user on the current view.
//! - [`PitchError::Persistence`] is a database read or write failure.
//! - [`PitchError::Service`] ends a comparison run in `failed`.
//! - [`PitchError::Playback`] is never fatal; it is logged and swallowed.

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, PitchError>;

#[derive(Debug, Error)]
pub enum PitchError {
    /// Missing or malformed user input (empty URL, incomplete range, ...).
    #[error("{0}")]
    Validation(String),

    /// Sign-in, sign-up or session lookup failed.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Database read or write failure.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// The analysis endpoint replied with a failure or an unexpected shape.
    /// The message is the endpoint's own detail text when it sent one.
    #[error("{0}")]
    Service(String),

    /// Audio preview could not be played.
    #[error("playback error: {0}")]
    Playback(String),

    /// A submission is already in flight on this workflow.
    #[error("a comparison is already running")]
    Busy,

    /// Configuration could not be read or is invalid.
    #[error("configuration error: {0}")]
    Config(String),
}

impl PitchError {
    pub fn validation(msg: impl Into<String>) -> Self {
        PitchError::Validation(msg.into())
    }

    pub fn auth(msg: impl Into<String>) -> Self {
        PitchError::Auth(msg.into())
    }

    pub fn persistence(msg: impl Into<String>) -> Self {
        PitchError::Persistence(msg.into())
    }

    pub fn service(msg: impl Into<String>) -> Self {
        PitchError::Service(msg.into())
    }

    /// Playback failures never end the user's action.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, PitchError::Playback(_))
    }
}

impl From<rusqlite::Error> for PitchError {
    fn from(err: rusqlite::Error) -> Self {
        PitchError::Persistence(err.to_string())
    }
}

impl From<reqwest::Error> for PitchError {
    fn from(err: reqwest::Error) -> Self {
        PitchError::Service(err.to_string())
    }
}

impl From<std::io::Error> for PitchError {
    fn from(err: std::io::Error) -> Self {
        PitchError::Config(err.to_string())
    }
}

impl From<toml::de::Error> for PitchError {
    fn from(err: toml::de::Error) -> Self {
        PitchError::Config(err.to_string())
    }
}
