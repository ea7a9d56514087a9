//! Test Helper Utilities
//!
//! Shared utilities for testing dlab-catalog

#![allow(dead_code)]

pub mod media_generator;

pub use media_generator::{generate_still_png, generate_test_apng, generate_test_dicom, DicomConfig};

use dlab_catalog::frames::FrameOptions;
use dlab_catalog::models::Source;
use std::path::{Path, PathBuf};

/// Frame options that never find a video decoder
pub fn test_frame_options() -> FrameOptions {
    FrameOptions {
        ffmpeg_path: PathBuf::from("dlab-test-no-such-ffmpeg"),
        ..Default::default()
    }
}

/// `(root, tag)` pair as the scanner takes it
pub fn source(root: &Path, tag: &str) -> (PathBuf, Source) {
    (root.to_path_buf(), Source::new(tag))
}
