//! Data models for dlab-catalog

pub mod api;
pub mod media;
pub mod patient;

pub use api::{CatalogItem, CatalogPatient, Frame, ItemFrames, PatientFrames};
pub use media::{MediaItem, MediaKind, MediaSet, Source};
pub use patient::{identity_key, DiscoveredPatient, PatientRecord};
