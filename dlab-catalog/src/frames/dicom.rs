//! DICOM frame decoding

use super::encode::{color_frame_url, gray_frame_url, normalize_frame, rgb_to_luma};
use super::video::{encapsulated_stream, is_video_item, VideoDecoder};
use super::{FrameDecoder, FrameError, RenderedFrame};
use crate::models::MediaItem;
use dicom_object::{open_file, DefaultDicomObject};
use dicom_pixeldata::PixelDecoder;

/// Decodes native, compressed still and video-encapsulated DICOM files
pub struct DicomFrameDecoder {
    video: VideoDecoder,
}

impl DicomFrameDecoder {
    pub fn new(video: VideoDecoder) -> Self {
        Self { video }
    }

    fn decode_video(&self, obj: &DefaultDicomObject) -> Result<Vec<RenderedFrame>, FrameError> {
        let stream = encapsulated_stream(obj)?;
        self.video
            .decode(&stream)?
            .into_iter()
            .map(|frame| Ok(RenderedFrame::still(color_frame_url(frame)?)))
            .collect()
    }
}

/// Every frame of a still-image object, normalized to 8-bit grayscale
fn decode_still(obj: &DefaultDicomObject) -> Result<Vec<RenderedFrame>, FrameError> {
    let pixels = obj
        .decode_pixel_data()
        .map_err(|e| FrameError::Decode(e.to_string()))?;

    let (width, height) = (pixels.columns(), pixels.rows());
    let samples = pixels.samples_per_pixel();
    let count = pixels.number_of_frames().max(1);

    let mut frames = Vec::with_capacity(count as usize);
    for index in 0..count {
        let values: Vec<f32> = pixels
            .to_vec_frame(index)
            .map_err(|e| FrameError::Decode(format!("frame {}: {}", index + 1, e)))?;

        let values = match samples {
            1 => values,
            3 => rgb_to_luma(&values),
            n => return Err(FrameError::Decode(format!("unsupported samples per pixel: {}", n))),
        };

        frames.push(RenderedFrame::still(gray_frame_url(width, height, normalize_frame(&values))?));
    }

    Ok(frames)
}

impl FrameDecoder for DicomFrameDecoder {
    fn decode(&self, item: &MediaItem) -> Result<Vec<RenderedFrame>, FrameError> {
        let obj = open_file(&item.filepath).map_err(|e| FrameError::Dicom(e.to_string()))?;
        let transfer_syntax = obj.meta().transfer_syntax();

        if is_video_item(&item.name, transfer_syntax) {
            tracing::debug!(item = %item.name, transfer_syntax, "Decoding as video");
            self.decode_video(&obj)
        } else {
            decode_still(&obj)
        }
    }
}
