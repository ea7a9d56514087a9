//! Common error types for dlab

use std::path::PathBuf;
use thiserror::Error;

/// Common result type for dlab operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across dlab crates
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// TOML file could not be parsed
    #[error("Invalid TOML in {path}: {message}")]
    Toml { path: PathBuf, message: String },

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}
