//! # DLAB Common Library
//!
//! Shared code for the dlab workspace:
//! - Error type used across crates
//! - Bootstrap configuration loading and root folder resolution
//! - Logging initialization

pub mod config;
pub mod error;
pub mod logging;

pub use error::{Error, Result};
