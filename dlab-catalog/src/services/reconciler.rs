//! Reconciliation of a fresh scan against the user's previous overlay
//!
//! Labels carry forward only on an exact match of
//! `(originalPatientName, source, itemName, kind)`. Anything else starts at 0.

use crate::error::CatalogResult;
use crate::models::{CatalogPatient, MediaItem, PatientRecord};
use crate::services::file_scanner::ScanBatch;
use crate::services::identity_mapper::{compare_patient_ids, IdentityMapping};
use crate::store::{CatalogStorage, CatalogStore, StoreTarget};
use tracing::{debug, info};

/// Counters from one reconciliation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    pub patients: usize,
    pub items: usize,
    /// Items whose label came from the previous overlay
    pub carried: usize,
}

/// Label of the matching item in `previous`, if any
///
/// Linear over every previous patient and item.
fn carried_label(item: &MediaItem, previous: &[PatientRecord]) -> Option<i64> {
    for record in previous {
        for old in record.media.iter() {
            if old.same_identity(item) {
                return Some(old.label);
            }
        }
    }
    None
}

/// Build the new records from a scan, previous overlay and mapping
///
/// Only discovered patients appear; patients missing from this scan drop
/// out of the catalog. Records come back sorted by patient number.
pub fn reconcile(
    batch: &ScanBatch,
    previous: &[PatientRecord],
    mapping: &IdentityMapping,
) -> (Vec<PatientRecord>, ReconcileStats) {
    let mut stats = ReconcileStats::default();
    let mut records: Vec<PatientRecord> = Vec::with_capacity(batch.len());

    for (key, anonymized_id) in mapping.iter() {
        let Some(discovered) = batch.get(key) else {
            continue;
        };

        let mut record = PatientRecord::new(
            anonymized_id,
            discovered.original_name.clone(),
            discovered.source.clone(),
        );

        for item in discovered.media.iter() {
            let mut item = item.clone();
            match carried_label(&item, previous) {
                Some(label) => {
                    item.label = label;
                    stats.carried += 1;
                }
                None => item.label = 0,
            }
            record.media.insert(item);
        }

        stats.items += record.media.len();
        records.push(record);
    }

    records.sort_by(|a, b| compare_patient_ids(&a.anonymized_id, &b.anonymized_id));
    stats.patients = records.len();

    (records, stats)
}

/// Reconcile and persist Main plus the user's overlay
pub fn reconcile_and_persist(
    storage: &dyn CatalogStorage,
    user: &StoreTarget,
    batch: &ScanBatch,
    mapping: &IdentityMapping,
) -> CatalogResult<(Vec<CatalogPatient>, ReconcileStats)> {
    let store = CatalogStore::new(storage);
    let previous = store.load(user)?.unwrap_or_default();
    debug!(target_store = %user, previous = previous.len(), "Loaded previous overlay");

    let (records, stats) = reconcile(batch, &previous, mapping);

    store.save(&StoreTarget::Main, &records)?;
    store.save(user, &records)?;

    info!(
        user = %user,
        patients = stats.patients,
        items = stats.items,
        carried = stats.carried,
        "Catalog reconciled"
    );

    Ok((records.iter().map(CatalogPatient::from).collect(), stats))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DiscoveredPatient, MediaKind, Source};
    use crate::services::identity_mapper::IdentityMapper;
    use crate::store::InMemoryStorage;
    use std::path::PathBuf;

    fn discovered(source: &str, patient: &str, items: &[(&str, MediaKind)]) -> DiscoveredPatient {
        let mut p = DiscoveredPatient::new(Source::new(source), patient);
        for (name, kind) in items {
            p.media.insert(MediaItem::new(
                *name,
                *kind,
                Source::new(source),
                patient,
                PathBuf::from(format!("/{}/{}/{}", source, patient, name)),
                1,
            ));
        }
        p
    }

    fn batch(patients: Vec<DiscoveredPatient>) -> ScanBatch {
        patients.into_iter().map(|p| (p.key(), p)).collect()
    }

    #[test]
    fn test_labels_carry_forward_on_exact_match() {
        let storage = InMemoryStorage::new();
        let user = StoreTarget::User("alice".into());
        let scan = batch(vec![discovered(
            "A",
            "PatientA",
            &[("a.dcm", MediaKind::Dicom), ("a.png", MediaKind::AnimatedPng)],
        )]);
        let mapping = IdentityMapper::new(&storage).resolve(scan.keys().map(String::as_str)).unwrap();

        let (first, _) = reconcile_and_persist(&storage, &user, &scan, &mapping).unwrap();
        let id = first[0].patient_name.clone();
        CatalogStore::new(&storage).update_label(&user, &id, "a.dcm", 4).unwrap();

        let (second, stats) = reconcile_and_persist(&storage, &user, &scan, &mapping).unwrap();
        assert_eq!(stats.carried, 2);
        assert_eq!(second[0].dicoms[0].label, 4);
        assert_eq!(second[0].apngs[0].label, 0);

        let main = CatalogStore::new(&storage).load(&StoreTarget::Main).unwrap().unwrap();
        assert!(main[0].media.iter().all(|i| i.label == 0));
    }

    #[test]
    fn test_label_does_not_cross_kinds_or_sources() {
        let mut old = PatientRecord::new("Patient 1", "PatientA", Source::new("A"));
        let mut labeled = MediaItem::new("x", MediaKind::Dicom, Source::new("A"), "PatientA", PathBuf::new(), 1);
        labeled.label = 9;
        old.media.insert(labeled);

        let scan = batch(vec![
            discovered("A", "PatientA", &[("x", MediaKind::AnimatedPng)]),
            discovered("B", "PatientA", &[("x", MediaKind::Dicom)]),
        ]);
        let storage = InMemoryStorage::new();
        let mapping = IdentityMapper::new(&storage).resolve(scan.keys().map(String::as_str)).unwrap();

        let (records, stats) = reconcile(&scan, &[old], &mapping);
        assert_eq!(stats.carried, 0);
        assert!(records.iter().flat_map(|r| r.media.iter()).all(|i| i.label == 0));
    }

    #[test]
    fn test_undiscovered_mapping_keys_are_omitted_and_sorted() {
        let storage = InMemoryStorage::new();
        storage
            .write_mapping(r#"{"A:gone": "Patient 1", "A:p10": "Patient 10", "A:p2": "Patient 2"}"#)
            .unwrap();
        let mapping = IdentityMapper::new(&storage).load().unwrap().unwrap();

        let scan = batch(vec![
            discovered("A", "p10", &[("a.dcm", MediaKind::Dicom)]),
            discovered("A", "p2", &[("b.dcm", MediaKind::Dicom)]),
        ]);
        let (records, _) = reconcile(&scan, &[], &mapping);
        let ids: Vec<&str> = records.iter().map(|r| r.anonymized_id.as_str()).collect();
        assert_eq!(ids, vec!["Patient 2", "Patient 10"]);
    }
}
