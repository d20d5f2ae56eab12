//! Error types used across this crate.

use thiserror::Error;

/// Catch-all error for this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// The integrator configuration failed validation.
    #[error("invalid configuration: {0}")]
    Config(String),
    /// Error that does not originate from this crate.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Shorthand for results with this crate's [`Error`] type.
pub type Result<T> = std::result::Result<T, Error>;
