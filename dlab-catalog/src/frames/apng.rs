//! Animated PNG frame decoding

use super::encode::rgba_frame_url;
use super::{FrameDecoder, FrameError, RenderedFrame};
use crate::models::MediaItem;
use image::codecs::png::PngDecoder;
use image::{AnimationDecoder, Delay};
use std::fs::File;
use std::io::BufReader;

/// Decodes every stored frame of an APNG
pub struct ApngFrameDecoder {
    include_delays: bool,
}

impl ApngFrameDecoder {
    pub fn new(include_delays: bool) -> Self {
        Self { include_delays }
    }

    fn delay_ms(&self, delay: Delay) -> Option<u32> {
        self.include_delays.then(|| delay_millis(delay))
    }
}

/// Frame delay in whole milliseconds, rounded to nearest
fn delay_millis(delay: Delay) -> u32 {
    let (numer, denom) = delay.numer_denom_ms();
    if denom == 0 {
        return 0;
    }
    ((numer as u64 + denom as u64 / 2) / denom as u64) as u32
}

impl FrameDecoder for ApngFrameDecoder {
    fn decode(&self, item: &MediaItem) -> Result<Vec<RenderedFrame>, FrameError> {
        let reader = BufReader::new(File::open(&item.filepath)?);
        let decoder = PngDecoder::new(reader)
            .and_then(|d| d.apng())
            .map_err(|e| FrameError::Decode(e.to_string()))?;

        let frames = decoder
            .into_frames()
            .collect_frames()
            .map_err(|e| FrameError::Decode(e.to_string()))?;

        frames
            .into_iter()
            .map(|frame| {
                let delay_ms = self.delay_ms(frame.delay());
                Ok(RenderedFrame {
                    image: rgba_frame_url(frame.into_buffer())?,
                    delay_ms,
                })
            })
            .collect()
    }
}
