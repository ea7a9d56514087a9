//! Error types for dlab-catalog
//!
//! Validation and not-found errors reject a request before or instead of any
//! work. Decode failures never appear here: they are recorded per item (see
//! `frames`). Malformed persisted rows are skipped while loading and never
//! surface either.

use thiserror::Error;

/// Catalog operation error type
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Invalid request (empty user, bad source tag, missing root path)
    #[error("Invalid request: {0}")]
    Validation(String),

    /// No catalog entries for the requested resource
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Persisted state could not be read or written
    #[error("Storage error: {0}")]
    Storage(String),

    /// Internal error (e.g. a blocking task panicked)
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// dlab-common error
    #[error("Common error: {0}")]
    Common(#[from] dlab_common::Error),
}

impl CatalogError {
    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            CatalogError::Validation(_) => "BAD_REQUEST",
            CatalogError::NotFound(_) => "NOT_FOUND",
            CatalogError::Storage(_) => "STORAGE_ERROR",
            CatalogError::Internal(_) => "INTERNAL_ERROR",
            CatalogError::Io(_) => "IO_ERROR",
            CatalogError::Common(_) => "COMMON_ERROR",
        }
    }

    /// Process exit status for the command-line front end
    pub fn exit_code(&self) -> i32 {
        match self {
            CatalogError::Validation(_) => 2,
            CatalogError::NotFound(_) => 3,
            _ => 1,
        }
    }
}

/// Result type for catalog operations
pub type CatalogResult<T> = Result<T, CatalogError>;
