//! Patient records

use super::media::{MediaSet, Source};

/// Key of a patient across sources: `source:originalName`
pub fn identity_key(source: &Source, original_name: &str) -> String {
    format!("{}:{}", source, original_name)
}

/// A patient as found by one or more scans, before anonymization
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredPatient {
    pub source: Source,
    pub original_name: String,
    pub media: MediaSet,
}

impl DiscoveredPatient {
    pub fn new(source: Source, original_name: impl Into<String>) -> Self {
        Self {
            source,
            original_name: original_name.into(),
            media: MediaSet::default(),
        }
    }

    pub fn key(&self) -> String {
        identity_key(&self.source, &self.original_name)
    }
}

/// A catalogued patient under its anonymized identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatientRecord {
    /// Display identifier, e.g. "Patient 7"
    pub anonymized_id: String,
    pub original_name: String,
    pub source: Source,
    pub media: MediaSet,
}

impl PatientRecord {
    pub fn new(anonymized_id: impl Into<String>, original_name: impl Into<String>, source: Source) -> Self {
        Self {
            anonymized_id: anonymized_id.into(),
            original_name: original_name.into(),
            source,
            media: MediaSet::default(),
        }
    }

    /// Copy with every label reset to 0 (the Main store form)
    pub fn with_labels_cleared(&self) -> Self {
        let mut record = self.clone();
        for item in record.media.iter_mut() {
            item.label = 0;
        }
        record
    }
}
