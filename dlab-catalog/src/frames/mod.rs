//! Frame extraction
//!
//! One decoder per media kind, behind [`FrameDecoder`]. [`FrameExtractor`]
//! picks the decoder, numbers the frames and turns any failure into the
//! item's `error` field, so one bad file never affects its siblings.

pub mod apng;
pub mod dicom;
pub mod encode;
pub mod video;

pub use apng::ApngFrameDecoder;
pub use dicom::DicomFrameDecoder;
pub use video::VideoDecoder;

use crate::models::{Frame, ItemFrames, MediaItem, MediaKind};
use std::path::PathBuf;
use thiserror::Error;

/// Frame decoding errors
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("file not found: {0}")]
    MissingFile(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("DICOM error: {0}")]
    Dicom(String),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("encode error: {0}")]
    Encode(String),

    #[error("video decode failed: {0}")]
    Video(String),
}

/// A decoded, encoded frame before it is numbered
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedFrame {
    /// `data:image/png;base64,...`
    pub image: String,
    pub delay_ms: Option<u32>,
}

impl RenderedFrame {
    pub fn still(image: String) -> Self {
        Self { image, delay_ms: None }
    }
}

/// Decoder for one media kind
pub trait FrameDecoder: Send + Sync {
    /// All frames of `item`, in decode order
    fn decode(&self, item: &MediaItem) -> Result<Vec<RenderedFrame>, FrameError>;
}

/// Frame extraction settings
#[derive(Debug, Clone)]
pub struct FrameOptions {
    pub ffmpeg_path: PathBuf,
    pub include_apng_delays: bool,
    /// Parent of video temp files; system temp dir when `None`
    pub scratch_dir: Option<PathBuf>,
}

impl Default for FrameOptions {
    fn default() -> Self {
        Self {
            ffmpeg_path: PathBuf::from("ffmpeg"),
            include_apng_delays: true,
            scratch_dir: None,
        }
    }
}

/// `{itemName}-{n}`, n counting from 1
pub fn frame_id(item_name: &str, index: usize) -> String {
    format!("{}-{}", item_name, index + 1)
}

/// Dispatches items to the decoder for their kind
pub struct FrameExtractor {
    dicom: Box<dyn FrameDecoder>,
    apng: Box<dyn FrameDecoder>,
}

impl FrameExtractor {
    pub fn new(options: &FrameOptions) -> Self {
        let video = VideoDecoder::new(options.ffmpeg_path.clone(), options.scratch_dir.clone());
        Self::with_decoders(
            Box::new(DicomFrameDecoder::new(video)),
            Box::new(ApngFrameDecoder::new(options.include_apng_delays)),
        )
    }

    pub fn with_decoders(dicom: Box<dyn FrameDecoder>, apng: Box<dyn FrameDecoder>) -> Self {
        Self { dicom, apng }
    }

    fn decoder_for(&self, kind: MediaKind) -> &dyn FrameDecoder {
        match kind {
            MediaKind::Dicom => self.dicom.as_ref(),
            MediaKind::AnimatedPng => self.apng.as_ref(),
        }
    }

    /// Frames of one item; never fails
    ///
    /// On any error the item comes back with no frames and a message.
    pub fn extract(&self, item: &MediaItem) -> ItemFrames {
        let result = if item.filepath.is_file() {
            self.decoder_for(item.kind).decode(item)
        } else {
            Err(FrameError::MissingFile(item.filepath.clone()))
        };

        match result {
            Ok(rendered) => {
                tracing::debug!(item = %item.name, kind = %item.kind, frames = rendered.len(), "Frames extracted");
                ItemFrames {
                    item_name: item.name.clone(),
                    label: item.label,
                    frames: rendered
                        .into_iter()
                        .enumerate()
                        .map(|(i, f)| Frame {
                            id: frame_id(&item.name, i),
                            image: f.image,
                            delay_ms: f.delay_ms,
                        })
                        .collect(),
                    error: None,
                }
            }
            Err(e) => {
                tracing::warn!(item = %item.name, path = %item.filepath.display(), error = %e, "Frame extraction failed");
                ItemFrames {
                    item_name: item.name.clone(),
                    label: item.label,
                    frames: Vec::new(),
                    error: Some(e.to_string()),
                }
            }
        }
    }
}
