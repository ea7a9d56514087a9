//! Media items: one classified file per item

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// Tag identifying which source tree an item came from
///
/// Persisted on every row of the catalog stores but never returned to API
/// consumers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Source(String);

impl Source {
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Pixel-bearing encoding of a media item
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MediaKind {
    #[default]
    Dicom,
    AnimatedPng,
}

impl MediaKind {
    /// Persisted discriminator
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Dicom => "Dicom",
            MediaKind::AnimatedPng => "AnimatedPng",
        }
    }

    /// Parse a persisted discriminator, accepting the older spellings
    pub fn parse_lenient(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "dicom" | "dcm" => Some(MediaKind::Dicom),
            "animatedpng" | "apng" | "png" => Some(MediaKind::AnimatedPng),
            _ => None,
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One media file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaItem {
    /// File name as found on disk
    pub name: String,
    pub kind: MediaKind,
    pub source: Source,
    /// Name of the patient directory the file was found under
    pub original_patient_name: String,
    pub filepath: PathBuf,
    /// Frame count declared in the file header (not validated)
    pub declared_frame_count: u32,
    /// User decision; only meaningful inside a user overlay
    pub label: i64,
}

impl MediaItem {
    pub fn new(
        name: impl Into<String>,
        kind: MediaKind,
        source: Source,
        original_patient_name: impl Into<String>,
        filepath: PathBuf,
        declared_frame_count: u32,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            source,
            original_patient_name: original_patient_name.into(),
            filepath,
            declared_frame_count,
            label: 0,
        }
    }

    /// Same underlying file across scans: patient, source, name and kind agree
    pub fn same_identity(&self, other: &MediaItem) -> bool {
        self.kind == other.kind
            && self.name == other.name
            && self.source == other.source
            && self.original_patient_name == other.original_patient_name
    }
}

/// A patient's items, keyed by `(name, kind)`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MediaSet {
    pub dicoms: BTreeMap<String, MediaItem>,
    pub apngs: BTreeMap<String, MediaItem>,
}

impl MediaSet {
    /// Insert an item into the map for its kind, replacing any item with
    /// the same name
    pub fn insert(&mut self, item: MediaItem) -> Option<MediaItem> {
        let map = match item.kind {
            MediaKind::Dicom => &mut self.dicoms,
            MediaKind::AnimatedPng => &mut self.apngs,
        };
        map.insert(item.name.clone(), item)
    }

    /// Move every item of `other` into `self`
    pub fn merge(&mut self, other: MediaSet) {
        self.dicoms.extend(other.dicoms);
        self.apngs.extend(other.apngs);
    }

    pub fn get(&self, name: &str, kind: MediaKind) -> Option<&MediaItem> {
        match kind {
            MediaKind::Dicom => self.dicoms.get(name),
            MediaKind::AnimatedPng => self.apngs.get(name),
        }
    }

    /// All items, DICOMs first
    pub fn iter(&self) -> impl Iterator<Item = &MediaItem> {
        self.dicoms.values().chain(self.apngs.values())
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut MediaItem> {
        self.dicoms.values_mut().chain(self.apngs.values_mut())
    }

    pub fn len(&self) -> usize {
        self.dicoms.len() + self.apngs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dicoms.is_empty() && self.apngs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(name: &str, kind: MediaKind) -> MediaItem {
        MediaItem::new(name, kind, Source::new("A"), "PatientA", PathBuf::from(name), 1)
    }

    #[test]
    fn test_kind_parse_lenient() {
        assert_eq!(MediaKind::parse_lenient("Dicom"), Some(MediaKind::Dicom));
        assert_eq!(MediaKind::parse_lenient(" apng "), Some(MediaKind::AnimatedPng));
        assert_eq!(MediaKind::parse_lenient("ANIMATEDPNG"), Some(MediaKind::AnimatedPng));
        assert_eq!(MediaKind::parse_lenient("jpeg"), None);
    }

    #[test]
    fn test_same_name_different_kind_coexist() {
        let mut set = MediaSet::default();
        set.insert(item("scan1", MediaKind::Dicom));
        set.insert(item("scan1", MediaKind::AnimatedPng));
        assert_eq!(set.len(), 2);
        assert!(set.get("scan1", MediaKind::AnimatedPng).is_some());
    }

    #[test]
    fn test_same_identity_ignores_label_and_path() {
        let a = item("x.dcm", MediaKind::Dicom);
        let mut b = a.clone();
        b.label = 3;
        b.filepath = PathBuf::from("/elsewhere/x.dcm");
        assert!(a.same_identity(&b));

        b.source = Source::new("B");
        assert!(!a.same_identity(&b));
    }
}
