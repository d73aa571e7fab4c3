//! Capture metadata: patching, embedding, and reading back.
//!
//! Capture payloads arrive with a metadata dictionary keyed by container
//! (`{Exif}`, `{TIFF}`, ...), represented here as a JSON object:
//!
//! - [`MetadataEditor`] — Stamps the fixed user comment into a copy of the dictionary
//! - [`reencode_jpeg`] — Re-encodes a processed payload as JPEG with the patched EXIF embedded
//! - [`read_capture_exif`] — Reads the exposure fields back from a written JPEG

mod editor;
mod reader;
mod writer;

pub use editor::{
    DEFAULT_USER_COMMENT, EXIF_DICTIONARY, MetadataEditor, PhotoMetadata, TIFF_DICTIONARY,
};
pub use reader::{CaptureExif, read_capture_exif};
pub use writer::{embed_exif, reencode_jpeg};
