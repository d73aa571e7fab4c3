use anyhow::{Context, Result};
use nom_exif::*;
use std::path::Path;

/// Exposure-related EXIF fields of a written capture.
#[derive(Debug, Clone, Default)]
pub struct CaptureExif {
    pub make: Option<String>,
    pub model: Option<String>,
    pub iso: Option<String>,
    pub exposure_time: Option<String>,
    pub user_comment: Option<String>,
}

impl CaptureExif {
    pub fn is_empty(&self) -> bool {
        self.make.is_none()
            && self.model.is_none()
            && self.iso.is_none()
            && self.exposure_time.is_none()
            && self.user_comment.is_none()
    }
}

/// Read the exposure fields back from a capture file.
pub fn read_capture_exif(path: &Path) -> Result<CaptureExif> {
    let mut parser = MediaParser::new();
    let ms = MediaSource::file_path(path).context("Failed to open image file")?;

    let iter: ExifIter = match parser.parse(ms) {
        Ok(iter) => iter,
        Err(_) => {
            log::debug!("No EXIF data found in {}", path.display());
            return Ok(CaptureExif::default());
        }
    };
    let exif: Exif = iter.into();

    Ok(CaptureExif {
        make: exif.get(ExifTag::Make).and_then(entry_to_string),
        model: exif.get(ExifTag::Model).and_then(entry_to_string),
        iso: exif.get(ExifTag::ISOSpeedRatings).and_then(entry_to_string),
        exposure_time: exif.get(ExifTag::ExposureTime).and_then(entry_to_string),
        user_comment: exif.get(ExifTag::UserComment).and_then(entry_to_string),
    })
}

/// Convert an EntryValue to an Option<String>.
fn entry_to_string(val: &EntryValue) -> Option<String> {
    let s = val.to_string();
    let s = s.trim().trim_matches('"').to_string();
    if s.is_empty() { None } else { Some(s) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn file_without_exif_reads_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("plain.jpg");
        image::RgbImage::from_pixel(4, 4, image::Rgb([1, 2, 3]))
            .save(&path)
            .unwrap();

        let exif = read_capture_exif(&path).unwrap();
        assert!(exif.is_empty());
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(read_capture_exif(Path::new("/nonexistent/a.jpg")).is_err());
    }
}
