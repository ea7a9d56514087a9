//! Header-only probes used to classify files
//!
//! Neither probe decodes pixels. The PNG probe reads chunks up to the first
//! `IDAT`; the DICOM probe stops reading before Pixel Data.

use dicom_dictionary_std::tags;
use dicom_object::OpenFileOptions;
use std::fs::File;
use std::io::{BufRead, BufReader, Seek};
use std::path::Path;
use thiserror::Error;

/// Probe errors
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("PNG header error: {0}")]
    Png(#[from] png::DecodingError),

    #[error("DICOM parse error: {0}")]
    Dicom(String),

    #[error("not a DICOM instance: {0}")]
    NotDicom(String),
}

/// Animation metadata of an APNG file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApngHeader {
    /// `num_frames` from the `acTL` chunk
    pub frame_count: u32,
}

/// Read the animation header of a PNG stream
///
/// Returns `Ok(None)` for a valid PNG with no `acTL` chunk ahead of its
/// first `IDAT` (a still image).
pub fn read_apng_header<R: BufRead + Seek>(reader: R) -> Result<Option<ApngHeader>, ProbeError> {
    let reader = png::Decoder::new(reader).read_info()?;
    Ok(reader.info().animation_control.map(|control| ApngHeader {
        frame_count: control.num_frames,
    }))
}

/// Read the animation header of a PNG file on disk
pub fn probe_apng(path: &Path) -> Result<Option<ApngHeader>, ProbeError> {
    let file = File::open(path)?;
    read_apng_header(BufReader::new(file))
}

/// Header fields of a DICOM file relevant to cataloguing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DicomHeader {
    /// Number of Frames (0028,0008), or 1 when absent
    pub frame_count: u32,
    pub transfer_syntax: String,
}

/// Parse DICOM header metadata without touching Pixel Data
///
/// Only files carrying a SOP Class UID count as DICOM instances.
pub fn probe_dicom(path: &Path) -> Result<DicomHeader, ProbeError> {
    let obj = OpenFileOptions::new()
        .read_until(tags::PIXEL_DATA)
        .open_file(path)
        .map_err(|e| ProbeError::Dicom(e.to_string()))?;

    if obj.element(tags::SOP_CLASS_UID).is_err() {
        return Err(ProbeError::NotDicom("missing SOP Class UID".to_string()));
    }

    let frame_count = obj
        .element(tags::NUMBER_OF_FRAMES)
        .ok()
        .and_then(|e| e.to_int::<u32>().ok())
        .unwrap_or(1);

    let transfer_syntax = obj
        .meta()
        .transfer_syntax()
        .trim_end_matches(|c: char| c == '\0' || c == ' ')
        .to_string();

    Ok(DicomHeader {
        frame_count,
        transfer_syntax,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn encode_png(frames: Option<u32>) -> Vec<u8> {
        let mut bytes = Vec::new();
        {
            let mut encoder = png::Encoder::new(&mut bytes, 2, 2);
            encoder.set_color(png::ColorType::Grayscale);
            encoder.set_depth(png::BitDepth::Eight);
            if let Some(frames) = frames {
                encoder.set_animated(frames, 0).unwrap();
            }
            let mut writer = encoder.write_header().unwrap();
            for _ in 0..frames.unwrap_or(1) {
                writer.write_image_data(&[0, 64, 128, 255]).unwrap();
            }
            writer.finish().unwrap();
        }
        bytes
    }

    /// Insert a chunk just before `IEND`
    fn insert_before_iend(mut bytes: Vec<u8>, kind: &[u8; 4], data: &[u8]) -> Vec<u8> {
        let iend = bytes.len() - 12;
        let mut chunk = (data.len() as u32).to_be_bytes().to_vec();
        chunk.extend_from_slice(kind);
        chunk.extend_from_slice(data);
        chunk.extend_from_slice(&[0, 0, 0, 0]);
        bytes.splice(iend..iend, chunk);
        bytes
    }

    #[test]
    fn test_still_png_has_no_animation() {
        let bytes = encode_png(None);
        assert_eq!(read_apng_header(Cursor::new(bytes)).unwrap(), None);
    }

    #[test]
    fn test_animated_png_reports_frame_count() {
        let bytes = encode_png(Some(3));
        let header = read_apng_header(Cursor::new(bytes)).unwrap().unwrap();
        assert_eq!(header.frame_count, 3);
    }

    #[test]
    fn test_actl_after_image_data_is_a_still() {
        let mut actl = 4u32.to_be_bytes().to_vec();
        actl.extend_from_slice(&0u32.to_be_bytes());
        let bytes = insert_before_iend(encode_png(None), b"acTL", &actl);
        assert_eq!(read_apng_header(Cursor::new(bytes)).unwrap(), None);
    }

    #[test]
    fn test_non_png_is_rejected() {
        let result = read_apng_header(Cursor::new(b"GIF89a....".to_vec()));
        assert!(matches!(result, Err(ProbeError::Png(_))));
    }

    #[test]
    fn test_truncated_png_is_rejected() {
        let mut bytes = encode_png(Some(2));
        bytes.truncate(20);
        assert!(read_apng_header(Cursor::new(bytes)).is_err());
    }

    #[test]
    fn test_dicom_probe_rejects_text_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "just some notes").unwrap();
        assert!(probe_dicom(&path).is_err());
    }
}
