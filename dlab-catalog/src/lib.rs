//! dlab-catalog library interface
//!
//! Exposes the catalog engine for the binary and for integration tests.

pub mod config;
pub mod error;
pub mod frames;
pub mod models;
pub mod services;
pub mod store;

pub use crate::error::{CatalogError, CatalogResult};
pub use crate::frames::{FrameExtractor, FrameOptions};
pub use crate::services::CatalogService;
pub use crate::store::{CatalogStorage, FileStorage, InMemoryStorage, StoreTarget};
