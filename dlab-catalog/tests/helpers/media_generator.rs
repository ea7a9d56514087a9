//! Media Test Fixture Generator
//!
//! Writes small DICOM, animated PNG and still PNG files for scanner and
//! frame-extraction tests

use dicom_core::{DataElement, PrimitiveValue, VR};
use dicom_dictionary_std::{tags, uids};
use dicom_object::{FileMetaTableBuilder, InMemDicomObject};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

/// Configuration for a generated 8-bit MONOCHROME2 DICOM
#[derive(Debug, Clone)]
pub struct DicomConfig {
    pub rows: u16,
    pub columns: u16,
    /// One entry per frame, `rows * columns` samples each
    pub frames: Vec<Vec<u8>>,
    pub sop_instance_uid: String,
}

impl Default for DicomConfig {
    fn default() -> Self {
        Self {
            rows: 2,
            columns: 2,
            frames: vec![vec![0, 50, 100, 200]],
            sop_instance_uid: "1.2.826.0.1.3680043.2.1125.1".to_string(),
        }
    }
}

fn us(tag: dicom_core::Tag, value: u16) -> DataElement<InMemDicomObject> {
    DataElement::new(tag, VR::US, PrimitiveValue::from(value))
}

/// Generate a DICOM file with native (uncompressed) pixel data
pub fn generate_test_dicom(path: &Path, config: &DicomConfig) -> anyhow::Result<PathBuf> {
    let mut obj = InMemDicomObject::new_empty();
    obj.put(DataElement::new(
        tags::SOP_CLASS_UID,
        VR::UI,
        PrimitiveValue::from(uids::SECONDARY_CAPTURE_IMAGE_STORAGE),
    ));
    obj.put(DataElement::new(
        tags::SOP_INSTANCE_UID,
        VR::UI,
        PrimitiveValue::from(config.sop_instance_uid.as_str()),
    ));
    obj.put(us(tags::ROWS, config.rows));
    obj.put(us(tags::COLUMNS, config.columns));
    obj.put(us(tags::SAMPLES_PER_PIXEL, 1));
    obj.put(DataElement::new(
        tags::PHOTOMETRIC_INTERPRETATION,
        VR::CS,
        PrimitiveValue::from("MONOCHROME2"),
    ));
    obj.put(us(tags::BITS_ALLOCATED, 8));
    obj.put(us(tags::BITS_STORED, 8));
    obj.put(us(tags::HIGH_BIT, 7));
    obj.put(us(tags::PIXEL_REPRESENTATION, 0));
    obj.put(DataElement::new(
        tags::NUMBER_OF_FRAMES,
        VR::IS,
        PrimitiveValue::from(config.frames.len().to_string()),
    ));

    let pixels: Vec<u8> = config.frames.concat();
    obj.put(DataElement::new(tags::PIXEL_DATA, VR::OB, PrimitiveValue::from(pixels)));

    let file_obj = obj.with_meta(
        FileMetaTableBuilder::new()
            .transfer_syntax(uids::EXPLICIT_VR_LITTLE_ENDIAN)
            .media_storage_sop_class_uid(uids::SECONDARY_CAPTURE_IMAGE_STORAGE)
            .media_storage_sop_instance_uid(config.sop_instance_uid.as_str()),
    )?;
    file_obj.write_to_file(path)?;
    Ok(path.to_path_buf())
}

/// Generate an animated PNG with solid-color RGBA frames
///
/// Every frame is shown for `delay_num / delay_den` seconds.
pub fn generate_test_apng(
    path: &Path,
    colors: &[[u8; 4]],
    delay_num: u16,
    delay_den: u16,
) -> anyhow::Result<PathBuf> {
    let (width, height) = (3u32, 2u32);
    let writer = BufWriter::new(File::create(path)?);

    let mut encoder = png::Encoder::new(writer, width, height);
    encoder.set_color(png::ColorType::Rgba);
    encoder.set_depth(png::BitDepth::Eight);
    encoder.set_animated(colors.len() as u32, 0)?;
    encoder.set_frame_delay(delay_num, delay_den)?;

    let mut writer = encoder.write_header()?;
    for color in colors {
        let data: Vec<u8> = color.repeat((width * height) as usize);
        writer.write_image_data(&data)?;
    }
    writer.finish()?;
    Ok(path.to_path_buf())
}

/// Generate a single-frame grayscale PNG
pub fn generate_still_png(path: &Path) -> anyhow::Result<PathBuf> {
    image::GrayImage::from_pixel(2, 2, image::Luma([128])).save(path)?;
    Ok(path.to_path_buf())
}
