//! Media file scanner
//!
//! Walks one source tree and classifies every file below a patient directory
//! as DICOM, animated PNG, or ignorable.
//!
//! Two phases:
//! - Phase 1: sequential directory traversal with symlink loop detection
//! - Phase 2: parallel header probes (no pixel decoding)
//!
//! Files directly under the root belong to no patient and are ignored. Any
//! probe failure excludes that one file; it never aborts the walk.

use crate::models::{identity_key, DiscoveredPatient, MediaItem, MediaKind, Source};
use crate::services::probe::{probe_apng, probe_dicom};
use rayon::prelude::*;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::{DirEntry, WalkDir};

/// Scanner errors
#[derive(Debug, Error)]
pub enum ScanError {
    /// Specified path does not exist
    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    /// Path exists but is not a directory
    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),
}

/// Scan output: `source:originalPatientName` → discovered patient
pub type ScanBatch = BTreeMap<String, DiscoveredPatient>;

/// Per-scan counters, for logging
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanStats {
    pub candidates: usize,
    pub dicoms: usize,
    pub apngs: usize,
    /// Still images, unreadable files, non-DICOM files
    pub skipped: usize,
    /// Files sitting directly under the root
    pub unattributed: usize,
}

/// Scan result with statistics
#[derive(Debug, Clone, Default)]
pub struct ScanResult {
    pub patients: ScanBatch,
    pub stats: ScanStats,
}

/// A file below a patient directory, not yet classified
#[derive(Debug, Clone)]
struct Candidate {
    patient: String,
    path: PathBuf,
}

/// Media file scanner
pub struct FileScanner {
    ignore_patterns: Vec<String>,
}

impl FileScanner {
    /// Create new file scanner with default ignore patterns
    ///
    /// Ignores system files like .DS_Store, Thumbs.db, .git, etc.
    pub fn new() -> Self {
        Self {
            ignore_patterns: vec![
                ".DS_Store".to_string(),
                "Thumbs.db".to_string(),
                ".git".to_string(),
                ".svn".to_string(),
            ],
        }
    }

    /// Scan one source tree
    pub fn scan(&self, root_path: &Path, source: &Source) -> Result<ScanResult, ScanError> {
        if !root_path.exists() {
            return Err(ScanError::PathNotFound(root_path.to_path_buf()));
        }

        if !root_path.is_dir() {
            return Err(ScanError::NotADirectory(root_path.to_path_buf()));
        }

        // Phase 1: Sequential directory traversal + symlink detection
        let mut candidates = Vec::new();
        let mut unattributed = 0usize;
        let mut symlink_visited = HashSet::new();

        let walker = WalkDir::new(root_path)
            .follow_links(false)
            .min_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| self.should_process_entry(e, &mut symlink_visited));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!("Error accessing entry: {}", e);
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }

            match patient_directory(root_path, entry.path()) {
                Some(patient) => candidates.push(Candidate {
                    patient,
                    path: entry.path().to_path_buf(),
                }),
                None => unattributed += 1,
            }
        }

        tracing::debug!(
            root = %root_path.display(),
            candidates = candidates.len(),
            unattributed,
            "Phase 1 complete"
        );

        // Phase 2: Parallel classification (order preserved by collect)
        let classified: Vec<Option<MediaItem>> = candidates
            .par_iter()
            .map(|candidate| classify(candidate, source))
            .collect();

        let mut result = ScanResult::default();
        result.stats.candidates = candidates.len();
        result.stats.unattributed = unattributed;

        for (candidate, item) in candidates.iter().zip(classified) {
            let Some(item) = item else {
                result.stats.skipped += 1;
                continue;
            };

            match item.kind {
                MediaKind::Dicom => result.stats.dicoms += 1,
                MediaKind::AnimatedPng => result.stats.apngs += 1,
            }

            result
                .patients
                .entry(identity_key(source, &candidate.patient))
                .or_insert_with(|| DiscoveredPatient::new(source.clone(), candidate.patient.clone()))
                .media
                .insert(item);
        }

        tracing::debug!(
            root = %root_path.display(),
            source = %source,
            patients = result.patients.len(),
            dicoms = result.stats.dicoms,
            apngs = result.stats.apngs,
            skipped = result.stats.skipped,
            "Phase 2 complete"
        );

        Ok(result)
    }

    /// Scan several source trees into one batch
    ///
    /// Trees sharing a source tag merge their patients.
    pub fn scan_sources(&self, roots: &[(PathBuf, Source)]) -> Result<ScanResult, ScanError> {
        let mut merged = ScanResult::default();

        for (root, source) in roots {
            let result = self.scan(root, source)?;

            for (key, patient) in result.patients {
                match merged.patients.get_mut(&key) {
                    Some(existing) => existing.media.merge(patient.media),
                    None => {
                        merged.patients.insert(key, patient);
                    }
                }
            }

            merged.stats.candidates += result.stats.candidates;
            merged.stats.dicoms += result.stats.dicoms;
            merged.stats.apngs += result.stats.apngs;
            merged.stats.skipped += result.stats.skipped;
            merged.stats.unattributed += result.stats.unattributed;
        }

        Ok(merged)
    }

    /// Check if entry should be processed
    fn should_process_entry(&self, entry: &DirEntry, symlink_visited: &mut HashSet<PathBuf>) -> bool {
        let path = entry.path();
        let file_name = entry.file_name().to_string_lossy();

        // Skip ignored patterns
        for pattern in &self.ignore_patterns {
            if file_name.contains(pattern.as_str()) {
                return false;
            }
        }

        // Detect symlink loops
        if entry.file_type().is_symlink() {
            if let Ok(canonical) = path.canonicalize() {
                if !symlink_visited.insert(canonical) {
                    tracing::warn!("Symlink loop detected: {}", path.display());
                    return false;
                }
            }
        }

        true
    }
}

impl Default for FileScanner {
    fn default() -> Self {
        Self::new()
    }
}

/// First-level directory under `root` containing `path`
fn patient_directory(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let mut components = relative.components();
    let first = components.next()?;
    // A file directly under the root has no further components
    components.next()?;
    Some(first.as_os_str().to_string_lossy().into_owned())
}

/// Image-container extensions probed for animation
fn is_png_extension(path: &Path) -> bool {
    path.extension()
        .map(|ext| {
            let ext = ext.to_string_lossy().to_lowercase();
            ext == "png" || ext == "apng"
        })
        .unwrap_or(false)
}

fn classify(candidate: &Candidate, source: &Source) -> Option<MediaItem> {
    let path = &candidate.path;
    let name = path.file_name()?.to_string_lossy().into_owned();

    if is_png_extension(path) {
        return match probe_apng(path) {
            Ok(Some(header)) => Some(MediaItem::new(
                name,
                MediaKind::AnimatedPng,
                source.clone(),
                candidate.patient.clone(),
                path.clone(),
                header.frame_count,
            )),
            Ok(None) => {
                tracing::debug!(path = %path.display(), "Still image, not ingested");
                None
            }
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "PNG probe failed");
                None
            }
        };
    }

    match probe_dicom(path) {
        Ok(header) => Some(MediaItem::new(
            name,
            MediaKind::Dicom,
            source.clone(),
            candidate.patient.clone(),
            path.clone(),
            header.frame_count,
        )),
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "Not a DICOM file");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_png_extension_detection() {
        assert!(is_png_extension(Path::new("a/b.png")));
        assert!(is_png_extension(Path::new("a/b.APNG")));
        assert!(!is_png_extension(Path::new("a/b.dcm")));
        assert!(!is_png_extension(Path::new("a/IM0001")));
    }

    #[test]
    fn test_patient_directory() {
        let root = Path::new("/data");
        assert_eq!(
            patient_directory(root, Path::new("/data/PatientA/x.dcm")),
            Some("PatientA".to_string())
        );
        assert_eq!(
            patient_directory(root, Path::new("/data/PatientA/series/x.dcm")),
            Some("PatientA".to_string())
        );
        assert_eq!(patient_directory(root, Path::new("/data/x.dcm")), None);
    }

    #[test]
    fn test_scan_nonexistent_path() {
        let scanner = FileScanner::new();
        let result = scanner.scan(Path::new("/nonexistent/path"), &Source::new("A"));
        match result {
            Err(ScanError::PathNotFound(_)) => {}
            other => panic!("Expected PathNotFound error, got {:?}", other.map(|r| r.stats)),
        }
    }

    #[test]
    fn test_scan_file_as_directory() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("file.txt");
        fs::write(&file, b"x").unwrap();

        let result = FileScanner::new().scan(&file, &Source::new("A"));
        assert!(matches!(result, Err(ScanError::NotADirectory(_))));
    }

    #[test]
    fn test_unreadable_files_are_skipped_not_fatal() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("PatientA")).unwrap();
        fs::write(dir.path().join("PatientA").join("notes.txt"), b"hello").unwrap();
        fs::write(dir.path().join("PatientA").join("broken.png"), b"\x89PNG").unwrap();
        fs::write(dir.path().join("loose.dcm"), b"nope").unwrap();

        let result = FileScanner::new().scan(dir.path(), &Source::new("A")).unwrap();
        assert!(result.patients.is_empty());
        assert_eq!(result.stats.candidates, 2);
        assert_eq!(result.stats.skipped, 2);
        assert_eq!(result.stats.unattributed, 1);
    }
}
