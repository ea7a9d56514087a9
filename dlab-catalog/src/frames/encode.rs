//! Pixel normalization and PNG data-URL encoding

use super::FrameError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::{DynamicImage, GrayImage, ImageFormat};
use std::io::Cursor;

const DATA_URL_PREFIX: &str = "data:image/png;base64,";

/// Scale one frame to 8 bits by its own maximum
///
/// A frame whose maximum is 0 (or that is empty) is clamped into 0..=255
/// without scaling.
pub fn normalize_frame(values: &[f32]) -> Vec<u8> {
    let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);

    if max > 0.0 {
        values
            .iter()
            .map(|&v| (v / max * 255.0).clamp(0.0, 255.0) as u8)
            .collect()
    } else {
        values.iter().map(|&v| v.clamp(0.0, 255.0) as u8).collect()
    }
}

/// Collapse interleaved RGB samples to luma (ITU-R BT.601)
pub fn rgb_to_luma(samples: &[f32]) -> Vec<f32> {
    samples
        .chunks_exact(3)
        .map(|px| 0.299 * px[0] + 0.587 * px[1] + 0.114 * px[2])
        .collect()
}

/// PNG bytes as a `data:` URL
pub fn png_data_url(png: &[u8]) -> String {
    let mut url = String::with_capacity(DATA_URL_PREFIX.len() + png.len() * 4 / 3 + 4);
    url.push_str(DATA_URL_PREFIX);
    STANDARD.encode_string(png, &mut url);
    url
}

fn encode_png(image: &DynamicImage) -> Result<Vec<u8>, FrameError> {
    let mut out = Cursor::new(Vec::new());
    image
        .write_to(&mut out, ImageFormat::Png)
        .map_err(|e| FrameError::Encode(e.to_string()))?;
    Ok(out.into_inner())
}

/// Single-channel 8-bit frame → PNG data URL
pub fn gray_frame_url(width: u32, height: u32, pixels: Vec<u8>) -> Result<String, FrameError> {
    let expected = width as usize * height as usize;
    let actual = pixels.len();
    let buffer = GrayImage::from_raw(width, height, pixels).ok_or_else(|| {
        FrameError::Decode(format!(
            "frame holds {} samples, expected {} ({}x{})",
            actual, expected, width, height
        ))
    })?;
    Ok(png_data_url(&encode_png(&DynamicImage::ImageLuma8(buffer))?))
}

/// Color frame → RGB PNG data URL
pub fn color_frame_url(image: DynamicImage) -> Result<String, FrameError> {
    Ok(png_data_url(&encode_png(&DynamicImage::ImageRgb8(image.to_rgb8()))?))
}

/// Animation frame, alpha kept → PNG data URL
pub fn rgba_frame_url(image: image::RgbaImage) -> Result<String, FrameError> {
    Ok(png_data_url(&encode_png(&DynamicImage::ImageRgba8(image))?))
}
