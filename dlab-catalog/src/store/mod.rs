//! Persistence of the identity mapping and the catalog stores

pub mod catalog_store;
pub mod schema;
pub mod storage;

pub use catalog_store::{CatalogStore, LabelUpdate};
pub use schema::{SchemaVersion, CURRENT_HEADER};
pub use storage::{CatalogStorage, FileStorage, InMemoryStorage, StoreTarget};
