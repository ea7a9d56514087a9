//! Catalog engine services
//!
//! Scanner and probes discover media; the identity mapper and reconciler
//! turn a scan into persisted catalogs; `CatalogService` is the async
//! entry point tying them to storage and frame extraction.

pub mod catalog_service;
pub mod file_scanner;
pub mod identity_mapper;
pub mod probe;
pub mod reconciler;

pub use catalog_service::CatalogService;
pub use file_scanner::{FileScanner, ScanBatch, ScanError, ScanResult, ScanStats};
pub use identity_mapper::{compare_patient_ids, patient_number, IdentityMapper, IdentityMapping};
pub use probe::{probe_apng, probe_dicom, ApngHeader, DicomHeader, ProbeError};
pub use reconciler::{reconcile, reconcile_and_persist, ReconcileStats};
