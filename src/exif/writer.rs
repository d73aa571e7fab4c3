use anyhow::{Context, Result};
use image::ImageFormat;
use image::codecs::jpeg::JpegEncoder;
use img_parts::Bytes;
use img_parts::ImageEXIF;
use img_parts::jpeg::Jpeg;
use little_exif::exif_tag::ExifTag;
use little_exif::filetype::FileExtension;
use little_exif::metadata::Metadata;
use little_exif::rational::uR64;
use serde_json::Value;

use super::editor::{EXIF_DICTIONARY, PhotoMetadata, TIFF_DICTIONARY};

// little_exif as_u8_vec(JPEG) returns: [APP1 marker 2B][length 2B][Exif\0\0 6B][TIFF data]
// img-parts set_exif() expects just the TIFF data (after Exif\0\0)
const JPEG_EXIF_OVERHEAD: usize = 10; // 2 + 2 + 6

// Denominator used when turning a floating exposure time into a rational.
const EXPOSURE_DENOMINATOR: u32 = 1_000_000;

/// Decode a processed payload and re-encode it as JPEG with `metadata` embedded.
///
/// The payload may be any container the `image` crate can decode; the pixels
/// are always written back out as baseline JPEG at `quality`.
pub fn reencode_jpeg(processed: &[u8], quality: u8, metadata: &PhotoMetadata) -> Result<Vec<u8>> {
    let format = image::guess_format(processed).context("Unrecognized processed image format")?;
    if format != ImageFormat::Jpeg {
        log::debug!("Processed payload is {format:?}, re-encoding as JPEG");
    }

    let decoded = image::load_from_memory_with_format(processed, format)
        .context("Failed to decode processed image")?;
    let rgb = decoded.to_rgb8();

    let mut buffer = Vec::new();
    {
        let mut encoder = JpegEncoder::new_with_quality(&mut buffer, quality);
        encoder
            .encode(
                rgb.as_raw(),
                rgb.width(),
                rgb.height(),
                image::ExtendedColorType::Rgb8,
            )
            .context("JPEG encoding failed")?;
    }

    embed_exif(buffer, metadata)
}

/// Embed the EXIF fields of `metadata` into a JPEG byte stream.
///
/// Strategy:
/// 1. Collect the tags we know how to map from the `{Exif}` and `{TIFF}` dictionaries
/// 2. Serialize them with little_exif
/// 3. Replace the APP1 EXIF segment via img-parts (everything else is preserved)
pub fn embed_exif(jpeg_bytes: Vec<u8>, metadata: &PhotoMetadata) -> Result<Vec<u8>> {
    let tags = collect_tags(metadata);
    if tags.is_empty() {
        log::debug!("No EXIF fields to embed");
        return Ok(jpeg_bytes);
    }

    let mut jpeg = Jpeg::from_bytes(Bytes::from(jpeg_bytes))
        .map_err(|e| anyhow::anyhow!("Failed to parse JPEG: {e}"))?;

    let mut exif = Metadata::new();
    for tag in tags {
        exif.set_tag(tag);
    }
    let exif_bytes = exif.as_u8_vec(FileExtension::JPEG);
    if exif_bytes.len() <= JPEG_EXIF_OVERHEAD {
        anyhow::bail!("little_exif produced an empty EXIF block");
    }
    jpeg.set_exif(Some(Bytes::from(exif_bytes[JPEG_EXIF_OVERHEAD..].to_vec())));

    // set_exif() inserts at position 3; EXIF must directly follow APP0 for
    // strict parsers.
    if let Some(pos) = find_exif_segment_pos(&jpeg) {
        let target = usize::from(
            jpeg.segments()
                .first()
                .is_some_and(|s| s.marker() == 0xE0),
        );
        if pos > target {
            let segments = jpeg.segments_mut();
            let seg = segments.remove(pos);
            segments.insert(target, seg);
        }
    }

    Ok(jpeg.encoder().bytes().to_vec())
}

/// Find the position of the EXIF APP1 segment in a JPEG.
fn find_exif_segment_pos(jpeg: &Jpeg) -> Option<usize> {
    const EXIF_PREFIX: &[u8] = b"Exif\0\0";
    jpeg.segments()
        .iter()
        .position(|s| s.marker() == 0xE1 && s.contents().starts_with(EXIF_PREFIX))
}

/// Map dictionary entries to EXIF tags. Unknown keys are skipped.
fn collect_tags(metadata: &PhotoMetadata) -> Vec<ExifTag> {
    let mut tags = Vec::new();

    if let Some(Value::Object(tiff)) = metadata.get(TIFF_DICTIONARY) {
        if let Some(make) = tiff.get("Make").and_then(Value::as_str) {
            tags.push(ExifTag::Make(make.to_string()));
        }
        if let Some(model) = tiff.get("Model").and_then(Value::as_str) {
            tags.push(ExifTag::Model(model.to_string()));
        }
        if let Some(desc) = tiff.get("ImageDescription").and_then(Value::as_str) {
            tags.push(ExifTag::ImageDescription(desc.to_string()));
        }
    }

    if let Some(Value::Object(exif)) = metadata.get(EXIF_DICTIONARY) {
        if let Some(comment) = exif.get("UserComment").and_then(Value::as_str) {
            let mut comment_bytes = b"ASCII\0\0\0".to_vec();
            comment_bytes.extend_from_slice(comment.as_bytes());
            tags.push(ExifTag::UserComment(comment_bytes));
        }
        if let Some(iso) = exif.get("ISOSpeedRatings").and_then(iso_value) {
            tags.push(ExifTag::ISO(vec![iso]));
        }
        if let Some(seconds) = exif.get("ExposureTime").and_then(Value::as_f64) {
            if seconds > 0.0 {
                tags.push(ExifTag::ExposureTime(vec![exposure_rational(seconds)]));
            }
        }
    }

    tags
}

/// ISO may be stored as a number or as a one-element array.
fn iso_value(value: &Value) -> Option<u16> {
    let n = match value {
        Value::Array(values) => values.first()?.as_f64()?,
        other => other.as_f64()?,
    };
    (n > 0.0).then(|| n.round().min(f64::from(u16::MAX)) as u16)
}

/// Exposure time as a reduced rational.
fn exposure_rational(seconds: f64) -> uR64 {
    let numerator = (seconds * f64::from(EXPOSURE_DENOMINATOR)).round().max(1.0) as u32;
    let divisor = gcd(numerator, EXPOSURE_DENOMINATOR);
    uR64 {
        nominator: numerator / divisor,
        denominator: EXPOSURE_DENOMINATOR / divisor,
    }
}

fn gcd(mut a: u32, mut b: u32) -> u32 {
    while b != 0 {
        let t = b;
        b = a % b;
        a = t;
    }
    a
}
