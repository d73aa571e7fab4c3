use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

use crate::store::FileStore;

/// Timestamp layout used in directory names.
const TIMESTAMP_FORMAT: &str = "%Y%m%d-%H%M%S";

/// The two files written per shot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    /// Processed image, re-encoded with patched EXIF.
    Jpeg,
    /// Sensor data, written verbatim.
    Raw,
}

impl FileKind {
    /// Tag used in directory and file names.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Jpeg => "JPG",
            Self::Raw => "DNG",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Raw => "dng",
        }
    }
}

/// `"Scene-" + zero-padded(n)` where `n` is one more than the completed scenes.
///
/// Each completed scene leaves two directories in the output root, so the
/// number of completed scenes is the entry count halved.
pub fn scene_name(existing_entry_count: usize) -> String {
    format!("Scene-{:03}", existing_entry_count / 2 + 1)
}

/// `yyyyMMdd-HHmmss` in UTC.
pub fn timestamp(now: DateTime<Utc>) -> String {
    now.format(TIMESTAMP_FORMAT).to_string()
}

/// Zero-pad a shot ordinal to at least three digits.
pub fn ordinal_tag(n: u32) -> String {
    format!("{n:03}")
}

/// Round an exposure time to its reciprocal ("1/x" shutter notation).
///
/// Exposures of a second or longer all land on 1 or 0 (2s is `1`, 3s is `0`);
/// file names stay unique through the ordinal.
fn exposure_reciprocal(exposure_seconds: f64) -> u64 {
    if exposure_seconds > 0.0 {
        (1.0 / exposure_seconds).round() as u64
    } else {
        0
    }
}

/// Derives per-sequence naming state from the output root.
#[derive(Debug, Clone)]
pub struct NamingScheme {
    device_id: String,
    output_root: PathBuf,
}

impl NamingScheme {
    pub fn new(device_id: impl Into<String>, output_root: impl Into<PathBuf>) -> Self {
        Self {
            device_id: device_id.into(),
            output_root: output_root.into(),
        }
    }

    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    /// Freeze the scene name and timestamp for a new sequence.
    pub fn begin_scene(&self, store: &dyn FileStore, now: DateTime<Utc>) -> SequenceContext {
        let existing = store.entry_count(&self.output_root);
        if existing % 2 != 0 {
            log::warn!(
                "Output root {} holds an odd number of entries ({existing}); scene numbering may repeat",
                self.output_root.display()
            );
        }

        let context = SequenceContext {
            device_id: self.device_id.clone(),
            scene_name: scene_name(existing),
            timestamp: timestamp(now),
            output_root: self.output_root.clone(),
        };
        log::info!("Scene {} ({})", context.scene_name, context.timestamp);
        context
    }
}

/// Naming state frozen for the duration of one sequence.
///
/// Every capture of the sequence writes into two sibling directories under
/// the output root:
///
/// ```text
/// <root>/Scene-004_JPG_20240301-120000/<deviceId>Scene-004_JPG-001_I100_E10_o.jpg
/// <root>/Scene-004_DNG_20240301-120000/<deviceId>Scene-004_DNG-001_I100_E10_o.dng
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SequenceContext {
    pub device_id: String,
    pub scene_name: String,
    pub timestamp: String,
    pub output_root: PathBuf,
}

impl SequenceContext {
    /// Rebuild a context from one of a scene's directories.
    ///
    /// Accepts either `<scene>_JPG_<ts>` or `<scene>_DNG_<ts>`.
    pub fn from_directory(dir: &Path, device_id: impl Into<String>) -> Option<Self> {
        let name = dir.file_name()?.to_str()?;
        let (scene_name, timestamp) = [FileKind::Jpeg, FileKind::Raw]
            .iter()
            .find_map(|kind| name.split_once(&format!("_{}_", kind.tag())))?;
        if scene_name.is_empty() || timestamp.is_empty() {
            return None;
        }

        Some(Self {
            device_id: device_id.into(),
            scene_name: scene_name.to_string(),
            timestamp: timestamp.to_string(),
            output_root: dir.parent().map(Path::to_path_buf).unwrap_or_default(),
        })
    }

    /// `<root>/<scene>_<JPG|DNG>_<timestamp>`
    pub fn directory(&self, kind: FileKind) -> PathBuf {
        self.output_root.join(format!(
            "{}_{}_{}",
            self.scene_name,
            kind.tag(),
            self.timestamp
        ))
    }

    /// `<root>/<scene>-<label>_<JPG|DNG>_<timestamp>`
    pub fn labeled_directory(&self, kind: FileKind, label: &str) -> PathBuf {
        self.output_root.join(format!(
            "{}-{}_{}_{}",
            self.scene_name,
            label,
            kind.tag(),
            self.timestamp
        ))
    }

    /// `<deviceId><scene>_<JPG|DNG>-<ordinal>_I<iso>_E<1/exposure>_o.<ext>`
    ///
    /// ISO and the exposure reciprocal are rounded to integers.
    pub fn file_name(&self, kind: FileKind, ordinal: u32, iso: f32, exposure_seconds: f64) -> String {
        format!(
            "{}{}_{}-{}_I{}_E{}_o.{}",
            self.device_id,
            self.scene_name,
            kind.tag(),
            ordinal_tag(ordinal),
            iso.round() as u32,
            exposure_reciprocal(exposure_seconds),
            kind.extension()
        )
    }

    /// Full path of a shot's file inside its scene directory.
    pub fn file_path(&self, kind: FileKind, ordinal: u32, iso: f32, exposure_seconds: f64) -> PathBuf {
        self.directory(kind)
            .join(self.file_name(kind, ordinal, iso, exposure_seconds))
    }
}
