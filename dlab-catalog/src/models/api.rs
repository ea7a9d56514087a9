//! API-facing record shapes
//!
//! These are what callers of the catalog see. None of them carries the
//! internal source tag: conversion from the internal records drops it.

use super::media::{MediaItem, MediaSet};
use super::patient::PatientRecord;
use serde::{Deserialize, Serialize};

/// One catalogued item without its frames
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogItem {
    pub item_name: String,
    pub label: i64,
    pub filepath: String,
    pub frame_count: u32,
}

impl From<&MediaItem> for CatalogItem {
    fn from(item: &MediaItem) -> Self {
        Self {
            item_name: item.name.clone(),
            label: item.label,
            filepath: item.filepath.to_string_lossy().into_owned(),
            frame_count: item.declared_frame_count,
        }
    }
}

/// One patient in a catalog listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogPatient {
    /// Anonymized identifier
    pub patient_name: String,
    pub original_name: String,
    pub dicoms: Vec<CatalogItem>,
    pub apngs: Vec<CatalogItem>,
}

impl From<&PatientRecord> for CatalogPatient {
    fn from(record: &PatientRecord) -> Self {
        let MediaSet { dicoms, apngs } = &record.media;
        Self {
            patient_name: record.anonymized_id.clone(),
            original_name: record.original_name.clone(),
            dicoms: dicoms.values().map(CatalogItem::from).collect(),
            apngs: apngs.values().map(CatalogItem::from).collect(),
        }
    }
}

/// One viewable frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Frame {
    /// `{itemName}-{1-based index}`
    pub id: String,
    /// `data:image/png;base64,...`
    pub image: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delay_ms: Option<u32>,
}

/// Frames decoded from one item, or the reason there are none
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemFrames {
    pub item_name: String,
    pub label: i64,
    pub frames: Vec<Frame>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Every item of one patient, decoded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientFrames {
    pub patient_name: String,
    pub original_name: String,
    pub dicoms: Vec<ItemFrames>,
    pub apngs: Vec<ItemFrames>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MediaKind, Source};
    use std::path::PathBuf;

    #[test]
    fn test_catalog_patient_has_no_source() {
        let mut record = PatientRecord::new("Patient 1", "PatientA", Source::new("siteA"));
        record.media.insert(MediaItem::new(
            "img.dcm",
            MediaKind::Dicom,
            Source::new("siteA"),
            "PatientA",
            PathBuf::from("/data/PatientA/img.dcm"),
            3,
        ));

        let json = serde_json::to_value(CatalogPatient::from(&record)).unwrap();
        assert_eq!(json["patientName"], "Patient 1");
        assert_eq!(json["dicoms"][0]["itemName"], "img.dcm");
        assert_eq!(json["dicoms"][0]["frameCount"], 3);
        assert!(!json.to_string().contains("siteA"));
    }

    #[test]
    fn test_frame_delay_omitted_when_absent() {
        let frame = Frame {
            id: "a-1".to_string(),
            image: "data:image/png;base64,".to_string(),
            delay_ms: None,
        };
        let json = serde_json::to_string(&frame).unwrap();
        assert!(!json.contains("delayMs"));
    }
}
