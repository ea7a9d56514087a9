//! Catalog operations
//!
//! Each operation validates its input, takes the locks it needs and runs its
//! synchronous work on a blocking thread.
//!
//! Lock order: catalog (read, or write for a full reset) → identity mapping →
//! Main store → user store. Locks only serialize writers inside this process;
//! two processes sharing a root folder can still race.

use crate::error::{CatalogError, CatalogResult};
use crate::frames::{FrameExtractor, FrameOptions};
use crate::models::{CatalogPatient, ItemFrames, MediaItem, PatientFrames, PatientRecord, Source};
use crate::services::file_scanner::FileScanner;
use crate::services::identity_mapper::{compare_patient_ids, IdentityMapper};
use crate::services::reconciler::reconcile_and_persist;
use crate::store::{CatalogStorage, CatalogStore, FileStorage, LabelUpdate, StoreTarget};
use rayon::prelude::*;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::{debug, info};

fn join_error(e: tokio::task::JoinError) -> CatalogError {
    CatalogError::Internal(format!("Task join error: {}", e))
}

/// Reject a source tag that cannot be part of an identity key
fn validate_source(source: &Source) -> CatalogResult<()> {
    if source.as_str().trim().is_empty() {
        return Err(CatalogError::Validation("source tag must not be empty".to_string()));
    }
    if source.as_str().contains(':') {
        return Err(CatalogError::Validation(format!(
            "source tag '{}' must not contain ':'",
            source
        )));
    }
    Ok(())
}

fn validate_root(root: &Path) -> CatalogResult<()> {
    if !root.exists() {
        return Err(CatalogError::Validation(format!(
            "source directory not found: {}",
            root.display()
        )));
    }
    if !root.is_dir() {
        return Err(CatalogError::Validation(format!(
            "source path is not a directory: {}",
            root.display()
        )));
    }
    Ok(())
}

fn require(value: &str, what: &str) -> CatalogResult<()> {
    if value.trim().is_empty() {
        return Err(CatalogError::Validation(format!("{} must not be empty", what)));
    }
    Ok(())
}

/// Records of the user's overlay, seeding it from Main when absent
fn load_or_seed(store: &CatalogStore<'_>, target: &StoreTarget) -> CatalogResult<Vec<PatientRecord>> {
    if let Some(records) = store.load(target)? {
        return Ok(records);
    }

    let main: Vec<PatientRecord> = store
        .load(&StoreTarget::Main)?
        .unwrap_or_default()
        .iter()
        .map(PatientRecord::with_labels_cleared)
        .collect();

    if !main.is_empty() {
        store.save(target, &main)?;
        info!(target_store = %target, patients = main.len(), "Seeded user catalog from main");
    }
    Ok(main)
}

fn extract_all(extractor: &FrameExtractor, items: Vec<&MediaItem>) -> Vec<ItemFrames> {
    items.par_iter().map(|item| extractor.extract(item)).collect()
}

/// Entry point for every catalog operation
pub struct CatalogService {
    storage: Arc<dyn CatalogStorage>,
    scanner: Arc<FileScanner>,
    extractor: Arc<FrameExtractor>,
    catalog_lock: RwLock<()>,
    mapping_lock: Mutex<()>,
    store_locks: std::sync::Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl CatalogService {
    pub fn new(storage: Arc<dyn CatalogStorage>, options: &FrameOptions) -> Self {
        Self {
            storage,
            scanner: Arc::new(FileScanner::new()),
            extractor: Arc::new(FrameExtractor::new(options)),
            catalog_lock: RwLock::new(()),
            mapping_lock: Mutex::new(()),
            store_locks: std::sync::Mutex::new(HashMap::new()),
        }
    }

    /// Service persisting into files under `root`
    pub fn with_root(root: impl Into<PathBuf>, options: &FrameOptions) -> Self {
        Self::new(Arc::new(FileStorage::new(root)), options)
    }

    /// Serialize writers of one persisted store, keyed by its file name
    async fn lock_store(&self, target: &StoreTarget) -> CatalogResult<OwnedMutexGuard<()>> {
        let lock = {
            let mut locks = self
                .store_locks
                .lock()
                .map_err(|_| CatalogError::Internal("store lock registry poisoned".to_string()))?;
            Arc::clone(locks.entry(target.file_name()).or_default())
        };
        Ok(lock.lock_owned().await)
    }

    /// Scan source trees and rebuild Main plus the user's catalog
    ///
    /// Labels the user set on items that are still present carry over.
    pub async fn scan(&self, user: &str, roots: Vec<(PathBuf, Source)>) -> CatalogResult<Vec<CatalogPatient>> {
        let target = StoreTarget::user(user)?;
        if roots.is_empty() {
            return Err(CatalogError::Validation("no source directories given".to_string()));
        }
        for (root, source) in &roots {
            validate_source(source)?;
            validate_root(root)?;
        }

        let _catalog = self.catalog_lock.read().await;
        let _mapping = self.mapping_lock.lock().await;
        let _main = self.lock_store(&StoreTarget::Main).await?;
        let _user = self.lock_store(&target).await?;

        let started = Instant::now();
        let source_count = roots.len();
        let storage = Arc::clone(&self.storage);
        let scanner = Arc::clone(&self.scanner);

        let (patients, scan_stats, reconcile_stats) = tokio::task::spawn_blocking(move || {
            let scan = scanner
                .scan_sources(&roots)
                .map_err(|e| CatalogError::Validation(e.to_string()))?;
            let mapping =
                IdentityMapper::new(storage.as_ref()).resolve(scan.patients.keys().map(String::as_str))?;
            let (patients, stats) = reconcile_and_persist(storage.as_ref(), &target, &scan.patients, &mapping)?;
            Ok::<_, CatalogError>((patients, scan.stats, stats))
        })
        .await
        .map_err(join_error)??;

        info!(
            user,
            sources = source_count,
            patients = reconcile_stats.patients,
            dicoms = scan_stats.dicoms,
            apngs = scan_stats.apngs,
            skipped = scan_stats.skipped,
            unattributed = scan_stats.unattributed,
            carried_labels = reconcile_stats.carried,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Scan complete"
        );

        Ok(patients)
    }

    /// The user's catalog, sorted by patient number
    pub async fn load_catalog(&self, user: &str) -> CatalogResult<Vec<CatalogPatient>> {
        let target = StoreTarget::user(user)?;

        let _catalog = self.catalog_lock.read().await;
        let _main = self.lock_store(&StoreTarget::Main).await?;
        let _user = self.lock_store(&target).await?;

        let storage = Arc::clone(&self.storage);
        let mut records = tokio::task::spawn_blocking(move || load_or_seed(&CatalogStore::new(storage.as_ref()), &target))
            .await
            .map_err(join_error)??;

        records.sort_by(|a, b| compare_patient_ids(&a.anonymized_id, &b.anonymized_id));
        Ok(records.iter().map(CatalogPatient::from).collect())
    }

    /// Decoded frames of every item of one patient in the user's catalog
    pub async fn fetch_patient_frames(&self, user: &str, patient_id: &str) -> CatalogResult<PatientFrames> {
        let target = StoreTarget::user(user)?;
        require(patient_id, "patient id")?;

        let _catalog = self.catalog_lock.read().await;
        let records = {
            let _main = self.lock_store(&StoreTarget::Main).await?;
            let _user = self.lock_store(&target).await?;
            let storage = Arc::clone(&self.storage);
            tokio::task::spawn_blocking(move || load_or_seed(&CatalogStore::new(storage.as_ref()), &target))
                .await
                .map_err(join_error)??
        };

        let record = records
            .into_iter()
            .find(|r| r.anonymized_id == patient_id)
            .filter(|r| !r.media.is_empty())
            .ok_or_else(|| CatalogError::NotFound(format!("no catalog entries for {}", patient_id)))?;

        debug!(patient = %patient_id, items = record.media.len(), "Extracting frames");

        let extractor = Arc::clone(&self.extractor);
        tokio::task::spawn_blocking(move || PatientFrames {
            dicoms: extract_all(&extractor, record.media.dicoms.values().collect()),
            apngs: extract_all(&extractor, record.media.apngs.values().collect()),
            patient_name: record.anonymized_id,
            original_name: record.original_name,
        })
        .await
        .map_err(join_error)
    }

    /// Set one item's label in the user's catalog; Main is never touched
    pub async fn update_label(
        &self,
        user: &str,
        patient_id: &str,
        item_name: &str,
        label: i64,
    ) -> CatalogResult<LabelUpdate> {
        let target = StoreTarget::user(user)?;
        require(patient_id, "patient id")?;
        require(item_name, "item name")?;

        let _catalog = self.catalog_lock.read().await;
        let _user = self.lock_store(&target).await?;

        let storage = Arc::clone(&self.storage);
        let (patient, item) = (patient_id.to_string(), item_name.to_string());
        let log_target = target.clone();
        let outcome = tokio::task::spawn_blocking(move || {
            CatalogStore::new(storage.as_ref()).update_label(&target, &patient, &item, label)
        })
        .await
        .map_err(join_error)??;

        info!(target_store = %log_target, patient = %patient_id, item = %item_name, label, ?outcome, "Label updated");
        Ok(outcome)
    }

    /// Set every label in the user's catalog back to 0
    pub async fn reset_labels(&self, user: &str) -> CatalogResult<usize> {
        let target = StoreTarget::user(user)?;

        let _catalog = self.catalog_lock.read().await;
        let _user = self.lock_store(&target).await?;

        let storage = Arc::clone(&self.storage);
        let log_target = target.clone();
        let cleared = tokio::task::spawn_blocking(move || CatalogStore::new(storage.as_ref()).clear_labels(&target))
            .await
            .map_err(join_error)??;

        info!(target_store = %log_target, cleared, "Labels reset");
        Ok(cleared)
    }

    /// Delete the identity mapping and every store
    ///
    /// Not transactional: a failure part-way leaves the remaining files.
    pub async fn reset_all(&self) -> CatalogResult<Vec<String>> {
        let _catalog = self.catalog_lock.write().await;

        let storage = Arc::clone(&self.storage);
        let removed = tokio::task::spawn_blocking(move || storage.clear_all())
            .await
            .map_err(join_error)?
            .map_err(|e| CatalogError::Storage(format!("Reset failed: {}", e)))?;

        info!(files = removed.len(), "Catalog reset");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStorage;
    use tempfile::TempDir;

    fn service() -> CatalogService {
        CatalogService::new(Arc::new(InMemoryStorage::new()), &FrameOptions::default())
    }

    #[tokio::test]
    async fn test_scan_rejects_bad_input() {
        let dir = TempDir::new().unwrap();
        let svc = service();

        let ok_root = vec![(dir.path().to_path_buf(), Source::new("A"))];
        assert!(matches!(svc.scan(" ", ok_root.clone()).await, Err(CatalogError::Validation(_))));
        assert!(matches!(svc.scan("alice", vec![]).await, Err(CatalogError::Validation(_))));
        assert!(matches!(
            svc.scan("alice", vec![(dir.path().to_path_buf(), Source::new("a:b"))]).await,
            Err(CatalogError::Validation(_))
        ));
        assert!(matches!(
            svc.scan("alice", vec![(dir.path().to_path_buf(), Source::new(""))]).await,
            Err(CatalogError::Validation(_))
        ));
        assert!(matches!(
            svc.scan("alice", vec![(dir.path().join("missing"), Source::new("A"))]).await,
            Err(CatalogError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_empty_tree_scans_to_empty_catalog() {
        let dir = TempDir::new().unwrap();
        let svc = service();
        let patients = svc
            .scan("alice", vec![(dir.path().to_path_buf(), Source::new("A"))])
            .await
            .unwrap();
        assert!(patients.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_patient_is_not_found() {
        let svc = service();
        let err = svc.fetch_patient_frames("alice", "Patient 1").await.unwrap_err();
        assert!(matches!(err, CatalogError::NotFound(_)));
        assert_eq!(err.exit_code(), 3);
    }

    #[tokio::test]
    async fn test_new_user_is_seeded_from_main() {
        let storage = Arc::new(InMemoryStorage::new());
        storage
            .write_store(
                &StoreTarget::Main,
                "patientName,itemName,label\nPatient 2,b.dcm,0\nPatient 10,c.dcm,0\n",
            )
            .unwrap();
        let svc = CatalogService::new(storage.clone(), &FrameOptions::default());

        let catalog = svc.load_catalog("bob").await.unwrap();
        let ids: Vec<&str> = catalog.iter().map(|p| p.patient_name.as_str()).collect();
        assert_eq!(ids, vec!["Patient 2", "Patient 10"]);
        assert!(storage.store_exists(&StoreTarget::User("bob".into())).unwrap());
    }

    #[tokio::test]
    async fn test_update_label_touches_only_the_user_store() {
        let storage = Arc::new(InMemoryStorage::new());
        let main = "patientName,itemName,label\nPatient 1,a.dcm,0\n";
        storage.write_store(&StoreTarget::Main, main).unwrap();
        let svc = CatalogService::new(storage.clone(), &FrameOptions::default());

        svc.load_catalog("alice").await.unwrap();
        let outcome = svc.update_label("alice", "Patient 1", "a.dcm", 5).await.unwrap();
        assert_eq!(outcome, LabelUpdate::Updated(1));

        assert_eq!(storage.read_store(&StoreTarget::Main).unwrap().as_deref(), Some(main));
        let catalog = svc.load_catalog("alice").await.unwrap();
        assert_eq!(catalog[0].dicoms[0].label, 5);

        assert_eq!(svc.reset_labels("alice").await.unwrap(), 1);
        let catalog = svc.load_catalog("alice").await.unwrap();
        assert_eq!(catalog[0].dicoms[0].label, 0);
    }

    #[tokio::test]
    async fn test_users_with_similar_names_keep_separate_labels() {
        let storage = Arc::new(InMemoryStorage::new());
        storage
            .write_store(&StoreTarget::Main, "patientName,itemName,label\nPatient 1,a.dcm,0\n")
            .unwrap();
        let svc = CatalogService::new(storage.clone(), &FrameOptions::default());

        svc.load_catalog("dr.x").await.unwrap();
        svc.load_catalog("dr_x").await.unwrap();
        svc.update_label("dr.x", "Patient 1", "a.dcm", 7).await.unwrap();

        let dotted = svc.load_catalog("dr.x").await.unwrap();
        let underscored = svc.load_catalog("dr_x").await.unwrap();
        assert_eq!(dotted[0].dicoms[0].label, 7);
        assert_eq!(underscored[0].dicoms[0].label, 0);
    }

    #[tokio::test]
    async fn test_reset_all_removes_everything() {
        let storage = Arc::new(InMemoryStorage::new());
        storage.write_mapping("{}").unwrap();
        storage.write_store(&StoreTarget::Main, "patientName,itemName,label\n").unwrap();
        let svc = CatalogService::new(storage.clone(), &FrameOptions::default());

        let removed = svc.reset_all().await.unwrap();
        assert_eq!(removed, vec!["catalog_main.csv", "identity_mapping.json"]);
        assert!(storage.read_mapping().unwrap().is_none());
    }
}
