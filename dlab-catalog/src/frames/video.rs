//! Video-encapsulated DICOM frames
//!
//! The encapsulated stream is written to a temp file and handed to the
//! `ffmpeg` CLI, which dumps PNG frames into a temp directory. Both are
//! owned by this module's stack frames and removed on drop, whatever the
//! outcome.

use super::FrameError;
use dicom_core::value::Value;
use dicom_dictionary_std::tags;
use dicom_object::DefaultDicomObject;
use image::DynamicImage;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::{Builder, NamedTempFile, TempDir};

const VIDEO_TS_PREFIX: &str = "1.2.840.10008.1.2.4.";
/// MPEG-2 (100, 101), MPEG-4 AVC/H.264 (102..=106), HEVC/H.265 (107, 108)
const VIDEO_TS_RANGE: std::ops::RangeInclusive<u32> = 100..=108;
const VIDEO_NAME_MARKERS: [&str; 2] = ["h264", "mp4"];

/// Transfer syntax carries a video stream
pub fn is_video_transfer_syntax(uid: &str) -> bool {
    uid.trim_end_matches(|c: char| c == '\0' || c == ' ')
        .strip_prefix(VIDEO_TS_PREFIX)
        .and_then(|suffix| suffix.parse::<u32>().ok())
        .map_or(false, |n| VIDEO_TS_RANGE.contains(&n))
}

/// Video transfer syntax, or a codec marker in the item name
pub fn is_video_item(item_name: &str, transfer_syntax: &str) -> bool {
    let name = item_name.to_lowercase();
    is_video_transfer_syntax(transfer_syntax) || VIDEO_NAME_MARKERS.iter().any(|m| name.contains(m))
}

/// Concatenated Pixel Data fragments (or the raw value when not encapsulated)
pub fn encapsulated_stream(obj: &DefaultDicomObject) -> Result<Vec<u8>, FrameError> {
    let element = obj
        .element(tags::PIXEL_DATA)
        .map_err(|e| FrameError::Dicom(format!("no pixel data: {}", e)))?;

    match element.value() {
        Value::PixelSequence(sequence) => {
            let fragments = sequence.fragments();
            let mut stream = Vec::with_capacity(fragments.iter().map(Vec::len).sum());
            for fragment in fragments {
                stream.extend_from_slice(fragment);
            }
            Ok(stream)
        }
        Value::Primitive(primitive) => Ok(primitive.to_bytes().into_owned()),
        _ => Err(FrameError::Dicom("pixel data is a sequence".to_string())),
    }
}

/// Runs the external video decoder
#[derive(Debug, Clone)]
pub struct VideoDecoder {
    ffmpeg: PathBuf,
    scratch_dir: Option<PathBuf>,
}

impl VideoDecoder {
    pub fn new(ffmpeg: impl Into<PathBuf>, scratch_dir: Option<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            scratch_dir,
        }
    }

    fn temp_file(&self) -> std::io::Result<NamedTempFile> {
        let mut builder = Builder::new();
        builder.prefix("dlab-video-").suffix(".mp4");
        match &self.scratch_dir {
            Some(dir) => builder.tempfile_in(dir),
            None => builder.tempfile(),
        }
    }

    fn temp_dir(&self) -> std::io::Result<TempDir> {
        let mut builder = Builder::new();
        builder.prefix("dlab-frames-");
        match &self.scratch_dir {
            Some(dir) => builder.tempdir_in(dir),
            None => builder.tempdir(),
        }
    }

    /// Decode an encoded video stream into frames, in presentation order
    pub fn decode(&self, stream: &[u8]) -> Result<Vec<DynamicImage>, FrameError> {
        if stream.is_empty() {
            return Err(FrameError::Video("empty video stream".to_string()));
        }

        let mut input = self.temp_file()?;
        input.write_all(stream)?;
        input.flush()?;

        let output_dir = self.temp_dir()?;
        self.run_ffmpeg(input.path(), output_dir.path())?;

        let mut frame_paths: Vec<PathBuf> = std::fs::read_dir(output_dir.path())?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().map_or(false, |ext| ext == "png"))
            .collect();
        frame_paths.sort();

        if frame_paths.is_empty() {
            return Err(FrameError::Video("decoder produced no frames".to_string()));
        }

        let frames = frame_paths
            .iter()
            .map(|p| image::open(p).map_err(|e| FrameError::Decode(format!("{}: {}", p.display(), e))))
            .collect::<Result<Vec<_>, _>>()?;

        tracing::debug!(frames = frames.len(), bytes = stream.len(), "Video decoded");
        Ok(frames)
    }

    fn run_ffmpeg(&self, input: &Path, output_dir: &Path) -> Result<(), FrameError> {
        let output = Command::new(&self.ffmpeg)
            .args(["-v", "error", "-nostdin", "-i"])
            .arg(input)
            .args(["-f", "image2", "-vcodec", "png"])
            .arg(output_dir.join("frame-%06d.png"))
            .output()
            .map_err(|e| FrameError::Video(format!("cannot run {}: {}", self.ffmpeg.display(), e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(FrameError::Video(format!(
                "{} exited with {:?}: {}",
                self.ffmpeg.display(),
                output.status.code(),
                stderr.trim()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_video_transfer_syntaxes() {
        assert!(is_video_transfer_syntax("1.2.840.10008.1.2.4.100"));
        assert!(is_video_transfer_syntax("1.2.840.10008.1.2.4.102\0"));
        assert!(is_video_transfer_syntax("1.2.840.10008.1.2.4.108"));
        assert!(!is_video_transfer_syntax("1.2.840.10008.1.2.4.50"));
        assert!(!is_video_transfer_syntax("1.2.840.10008.1.2.1"));
    }

    #[test]
    fn test_video_name_markers() {
        assert!(is_video_item("Echo_H264.dcm", "1.2.840.10008.1.2.1"));
        assert!(is_video_item("clip.MP4.dcm", ""));
        assert!(!is_video_item("ct_001.dcm", "1.2.840.10008.1.2.1"));
    }

    #[test]
    fn test_failed_decode_leaves_no_temp_files() {
        let scratch = TempDir::new().unwrap();
        let decoder = VideoDecoder::new(
            scratch.path().join("no-such-ffmpeg"),
            Some(scratch.path().to_path_buf()),
        );

        let result = decoder.decode(b"\x00\x00\x00\x18ftypmp42 not really video");
        assert!(matches!(result, Err(FrameError::Video(_))));
        assert_eq!(std::fs::read_dir(scratch.path()).unwrap().count(), 0);
    }

    fn ffmpeg_available() -> bool {
        Command::new("ffmpeg")
            .arg("-version")
            .output()
            .map_or(false, |o| o.status.success())
    }

    #[test]
    fn test_successful_decode_leaves_no_temp_files() {
        if !ffmpeg_available() {
            eprintln!("ffmpeg not on PATH; video decode not exercised");
            return;
        }

        let source = TempDir::new().unwrap();
        let clip = source.path().join("clip.mp4");
        let status = Command::new("ffmpeg")
            .args(["-v", "error", "-nostdin", "-f", "lavfi", "-i", "testsrc=size=32x24:rate=5:duration=1"])
            .args(["-pix_fmt", "yuv420p"])
            .arg(&clip)
            .status()
            .unwrap();
        if !status.success() {
            eprintln!("ffmpeg cannot synthesize a test clip; video decode not exercised");
            return;
        }
        let stream = std::fs::read(&clip).unwrap();

        let scratch = TempDir::new().unwrap();
        let decoder = VideoDecoder::new("ffmpeg", Some(scratch.path().to_path_buf()));
        let frames = decoder.decode(&stream).unwrap();

        assert!(!frames.is_empty());
        assert_eq!((frames[0].width(), frames[0].height()), (32, 24));
        assert_eq!(std::fs::read_dir(scratch.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_empty_stream_rejected() {
        let decoder = VideoDecoder::new("ffmpeg", None);
        assert!(matches!(decoder.decode(&[]), Err(FrameError::Video(_))));
    }
}
