//! One in-flight capture: payload accumulation and persistence.
//!
//! A [`CaptureTask`] is created when a shot is requested, fed the events the
//! [`PhotoOutput`](crate::device::PhotoOutput) streams back, and finalized
//! once the device reports the request finished:
//!
//! ```text
//! AwaitingPayloads ──both payloads──▶ ReadyToFinalize ──finalize──▶ Written | WriteFailed
//!        └──────finalize after a device error or with a payload missing──────▶ NoOutput
//! ```

use std::fmt;
use std::path::PathBuf;

use crate::device::DeviceSnapshot;
use crate::error::BracketError;
use crate::exif::{MetadataEditor, PhotoMetadata, reencode_jpeg};
use crate::naming::{FileKind, SequenceContext};
use crate::sequencer::ShotKind;
use crate::store::FileStore;

/// Key of the in-flight registry.
pub type RequestId = u64;

/// Parameters of one requested shot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CaptureRequest {
    pub id: RequestId,
    /// 1-based position within the sequence.
    pub ordinal: u32,
    pub shot: ShotKind,
    /// Device readings when the request was issued.
    pub snapshot: DeviceSnapshot,
}

/// Events streamed back by the photo output for one request.
#[derive(Debug, Clone)]
pub enum CaptureEvent {
    RawPayload {
        data: Vec<u8>,
        metadata: PhotoMetadata,
    },
    ProcessedPayload {
        data: Vec<u8>,
        metadata: PhotoMetadata,
    },
    Error(String),
    /// No more events follow for this request.
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    AwaitingPayloads,
    ReadyToFinalize,
    Written,
    WriteFailed,
    NoOutput,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Written | Self::WriteFailed | Self::NoOutput)
    }
}

/// Terminal result of a capture.
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureOutcome {
    /// Both files are on disk.
    Written { jpeg: PathBuf, raw: PathBuf },
    /// Nothing was written: a payload never arrived or could not be encoded.
    NoOutput { reason: String },
    /// Writing failed. A file written before the failure is left in place.
    WriteFailed { error: String },
}

impl CaptureOutcome {
    pub fn is_written(&self) -> bool {
        matches!(self, Self::Written { .. })
    }
}

impl fmt::Display for CaptureOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Written { jpeg, .. } => write!(f, "written ({})", jpeg.display()),
            Self::NoOutput { reason } => write!(f, "no output ({reason})"),
            Self::WriteFailed { error } => write!(f, "write failed ({error})"),
        }
    }
}

#[derive(Debug)]
struct Payload {
    data: Vec<u8>,
    metadata: PhotoMetadata,
}

/// Accumulates the RAW and processed payloads of one request.
#[derive(Debug)]
pub struct CaptureTask {
    request: CaptureRequest,
    context: SequenceContext,
    raw: Option<Payload>,
    processed: Option<Payload>,
    errors: Vec<String>,
    state: TaskState,
}

impl CaptureTask {
    pub fn new(request: CaptureRequest, context: SequenceContext) -> Self {
        Self {
            request,
            context,
            raw: None,
            processed: None,
            errors: Vec::new(),
            state: TaskState::AwaitingPayloads,
        }
    }

    pub fn request(&self) -> &CaptureRequest {
        &self.request
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    /// Patched metadata of the RAW payload, once it arrived.
    pub fn raw_metadata(&self) -> Option<&PhotoMetadata> {
        self.raw.as_ref().map(|p| &p.metadata)
    }

    pub fn on_raw_payload(&mut self, data: Vec<u8>, metadata: &PhotoMetadata, editor: &MetadataEditor) {
        log::debug!("Shot {}: RAW payload, {} bytes", self.request.ordinal, data.len());
        self.raw = Some(Payload {
            data,
            metadata: editor.patch(metadata),
        });
        self.update_state();
    }

    pub fn on_processed_payload(
        &mut self,
        data: Vec<u8>,
        metadata: &PhotoMetadata,
        editor: &MetadataEditor,
    ) {
        log::debug!(
            "Shot {}: processed payload, {} bytes",
            self.request.ordinal,
            data.len()
        );
        self.processed = Some(Payload {
            data,
            metadata: editor.patch(metadata),
        });
        self.update_state();
    }

    /// Record a device-side error. The shot then yields no output, even if
    /// both payloads arrive.
    pub fn record_error(&mut self, message: impl Into<String>) {
        let message = message.into();
        log::warn!("Shot {}: {message}", self.request.ordinal);
        self.errors.push(message);
    }

    /// Feed one event from the photo output.
    pub fn handle(&mut self, event: CaptureEvent, editor: &MetadataEditor) {
        match event {
            CaptureEvent::RawPayload { data, metadata } => self.on_raw_payload(data, &metadata, editor),
            CaptureEvent::ProcessedPayload { data, metadata } => {
                self.on_processed_payload(data, &metadata, editor)
            }
            CaptureEvent::Error(message) => self.record_error(message),
            CaptureEvent::Finished => {}
        }
    }

    /// Give up on the payloads, e.g. when the device never finished the request.
    pub fn abandon(&mut self, reason: impl Into<String>) -> CaptureOutcome {
        self.raw = None;
        self.processed = None;
        self.state = TaskState::NoOutput;
        CaptureOutcome::NoOutput {
            reason: reason.into(),
        }
    }

    /// Encode and write both files.
    ///
    /// Both files share the shot's ordinal and the ISO/exposure the device
    /// reported when the shot was requested.
    pub fn finalize(&mut self, store: &dyn FileStore, jpeg_quality: u8) -> CaptureOutcome {
        if self.state.is_terminal() {
            return CaptureOutcome::NoOutput {
                reason: "already finalized".to_string(),
            };
        }

        if let Some(reason) = self.errors.last().cloned() {
            self.raw = None;
            self.processed = None;
            log::warn!("Shot {}: no output, {reason}", self.request.ordinal);
            self.state = TaskState::NoOutput;
            return CaptureOutcome::NoOutput { reason };
        }

        let (Some(raw), Some(processed)) = (self.raw.take(), self.processed.take()) else {
            let reason = "a payload is missing".to_string();
            log::warn!("Shot {}: no output, {reason}", self.request.ordinal);
            self.state = TaskState::NoOutput;
            return CaptureOutcome::NoOutput { reason };
        };

        let jpeg_bytes = match reencode_jpeg(&processed.data, jpeg_quality, &processed.metadata) {
            Ok(bytes) => bytes,
            Err(e) => {
                let err = BracketError::Capture(format!("{e:#}"));
                log::warn!("Shot {}: {err}", self.request.ordinal);
                self.state = TaskState::NoOutput;
                return CaptureOutcome::NoOutput {
                    reason: err.to_string(),
                };
            }
        };

        let snapshot = &self.request.snapshot;
        let jpeg_path = self.context.file_path(
            FileKind::Jpeg,
            self.request.ordinal,
            snapshot.iso,
            snapshot.exposure_seconds,
        );
        let raw_path = self.context.file_path(
            FileKind::Raw,
            self.request.ordinal,
            snapshot.iso,
            snapshot.exposure_seconds,
        );

        let written = write_file(store, &jpeg_path, &jpeg_bytes)
            .and_then(|_| write_file(store, &raw_path, &raw.data));
        if let Err(err) = written {
            log::warn!("Shot {}: {err}", self.request.ordinal);
            self.state = TaskState::WriteFailed;
            return CaptureOutcome::WriteFailed {
                error: err.to_string(),
            };
        }

        if !store.exists(&jpeg_path) || !store.exists(&raw_path) {
            self.state = TaskState::WriteFailed;
            return CaptureOutcome::WriteFailed {
                error: "written file not found on disk".to_string(),
            };
        }

        log::debug!("Shot {}: wrote {}", self.request.ordinal, jpeg_path.display());
        self.state = TaskState::Written;
        CaptureOutcome::Written {
            jpeg: jpeg_path,
            raw: raw_path,
        }
    }

    fn update_state(&mut self) {
        if self.raw.is_some() && self.processed.is_some() {
            self.state = TaskState::ReadyToFinalize;
        }
    }
}

/// Create the file's directory on first use, then write atomically.
fn write_file(store: &dyn FileStore, path: &std::path::Path, bytes: &[u8]) -> Result<(), BracketError> {
    if let Some(dir) = path.parent() {
        if !store.exists(dir) {
            store
                .create_dir(dir)
                .map_err(|e| BracketError::persistence(dir, e))?;
        }
    }
    store
        .write_atomic(path, bytes)
        .map_err(|e| BracketError::persistence(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{ExposureMode, FocusMode};
    use crate::exif::EXIF_DICTIONARY;
    use crate::store::LocalStore;
    use image::{ImageFormat, Rgb, RgbImage};
    use serde_json::json;
    use std::path::Path;
    use tempfile::TempDir;

    fn request(ordinal: u32) -> CaptureRequest {
        CaptureRequest {
            id: 7,
            ordinal,
            shot: ShotKind::Manual {
                iso: 100.0,
                exposure_seconds: 0.1,
            },
            snapshot: DeviceSnapshot {
                iso: 100.0,
                exposure_seconds: 0.1,
                focus_mode: FocusMode::Locked,
                exposure_mode: ExposureMode::Custom,
            },
        }
    }

    fn context(root: &Path) -> SequenceContext {
        SequenceContext {
            device_id: "dev1".into(),
            scene_name: "Scene-001".into(),
            timestamp: "20240301-120000".into(),
            output_root: root.to_path_buf(),
        }
    }

    fn metadata() -> PhotoMetadata {
        let mut md = PhotoMetadata::new();
        md.insert(EXIF_DICTIONARY.into(), json!({ "ISOSpeedRatings": [100] }));
        md
    }

    fn png_bytes() -> Vec<u8> {
        let mut buf = Vec::new();
        image::DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 8, Rgb([90, 90, 90])))
            .write_to(&mut std::io::Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        buf
    }

    /// A store whose writes always fail.
    struct ReadOnlyStore;

    impl FileStore for ReadOnlyStore {
        fn create_dir(&self, _: &Path) -> std::io::Result<()> {
            Ok(())
        }
        fn write_atomic(&self, _: &Path, _: &[u8]) -> std::io::Result<()> {
            Err(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "read-only",
            ))
        }
        fn exists(&self, _: &Path) -> bool {
            false
        }
        fn entry_count(&self, _: &Path) -> usize {
            0
        }
    }

    fn ready_task(root: &Path) -> CaptureTask {
        let editor = MetadataEditor::default();
        let mut task = CaptureTask::new(request(1), context(root));
        task.on_raw_payload(b"raw sensor data".to_vec(), &metadata(), &editor);
        task.on_processed_payload(png_bytes(), &metadata(), &editor);
        task
    }

    #[test]
    fn both_payloads_are_written() {
        let dir = TempDir::new().unwrap();
        let mut task = ready_task(dir.path());
        assert_eq!(task.state(), TaskState::ReadyToFinalize);

        let outcome = task.finalize(&LocalStore, 90);
        let CaptureOutcome::Written { jpeg, raw } = outcome else {
            panic!("expected written, got {outcome:?}");
        };
        assert_eq!(task.state(), TaskState::Written);
        assert!(jpeg.ends_with("Scene-001_JPG_20240301-120000/dev1Scene-001_JPG-001_I100_E10_o.jpg"));
        assert!(raw.ends_with("Scene-001_DNG_20240301-120000/dev1Scene-001_DNG-001_I100_E10_o.dng"));
        assert_eq!(std::fs::read(&raw).unwrap(), b"raw sensor data");

        let written = std::fs::read(&jpeg).unwrap();
        assert_eq!(image::guess_format(&written).unwrap(), ImageFormat::Jpeg);
    }

    #[test]
    fn raw_metadata_is_patched() {
        let dir = TempDir::new().unwrap();
        let task = ready_task(dir.path());
        let md = task.raw_metadata().unwrap();
        assert_eq!(
            md[EXIF_DICTIONARY]["UserComment"],
            crate::exif::DEFAULT_USER_COMMENT
        );
    }

    #[test]
    fn missing_raw_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let mut task = CaptureTask::new(request(1), context(dir.path()));
        task.on_processed_payload(png_bytes(), &metadata(), &MetadataEditor::default());
        assert_eq!(task.state(), TaskState::AwaitingPayloads);

        let outcome = task.finalize(&LocalStore, 90);
        assert!(matches!(outcome, CaptureOutcome::NoOutput { .. }));
        assert_eq!(task.state(), TaskState::NoOutput);
        assert_eq!(LocalStore.entry_count(dir.path()), 0);
    }

    #[test]
    fn device_error_becomes_no_output_reason() {
        let dir = TempDir::new().unwrap();
        let mut task = CaptureTask::new(request(2), context(dir.path()));
        task.handle(CaptureEvent::Error("sensor fault".into()), &MetadataEditor::default());
        task.handle(CaptureEvent::Finished, &MetadataEditor::default());

        let outcome = task.finalize(&LocalStore, 90);
        assert_eq!(
            outcome,
            CaptureOutcome::NoOutput {
                reason: "sensor fault".into()
            }
        );
    }

    #[test]
    fn error_with_both_payloads_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let editor = MetadataEditor::default();
        let mut task = CaptureTask::new(request(1), context(dir.path()));
        task.handle(
            CaptureEvent::RawPayload {
                data: b"raw sensor data".to_vec(),
                metadata: metadata(),
            },
            &editor,
        );
        task.handle(
            CaptureEvent::ProcessedPayload {
                data: png_bytes(),
                metadata: metadata(),
            },
            &editor,
        );
        task.handle(CaptureEvent::Error("device reported capture failure".into()), &editor);
        task.handle(CaptureEvent::Finished, &editor);

        let outcome = task.finalize(&LocalStore, 90);
        assert_eq!(
            outcome,
            CaptureOutcome::NoOutput {
                reason: "device reported capture failure".into()
            }
        );
        assert_eq!(task.state(), TaskState::NoOutput);
        assert_eq!(LocalStore.entry_count(dir.path()), 0);
    }

    #[test]
    fn undecodable_processed_payload_is_no_output() {
        let dir = TempDir::new().unwrap();
        let editor = MetadataEditor::default();
        let mut task = CaptureTask::new(request(1), context(dir.path()));
        task.on_raw_payload(b"raw".to_vec(), &metadata(), &editor);
        task.on_processed_payload(b"garbage".to_vec(), &metadata(), &editor);

        assert!(matches!(
            task.finalize(&LocalStore, 90),
            CaptureOutcome::NoOutput { .. }
        ));
        assert_eq!(LocalStore.entry_count(dir.path()), 0);
    }

    #[test]
    fn write_failure_is_reported() {
        let dir = TempDir::new().unwrap();
        let mut task = ready_task(dir.path());
        let outcome = task.finalize(&ReadOnlyStore, 90);
        assert!(matches!(outcome, CaptureOutcome::WriteFailed { .. }));
        assert_eq!(task.state(), TaskState::WriteFailed);
    }

    #[test]
    fn finalize_is_single_shot() {
        let dir = TempDir::new().unwrap();
        let mut task = ready_task(dir.path());
        assert!(task.finalize(&LocalStore, 90).is_written());
        assert!(!task.finalize(&LocalStore, 90).is_written());
        assert_eq!(task.state(), TaskState::Written);
    }

    #[test]
    fn abandon_drops_payloads() {
        let dir = TempDir::new().unwrap();
        let mut task = ready_task(dir.path());
        let outcome = task.abandon("timed out");
        assert!(matches!(outcome, CaptureOutcome::NoOutput { .. }));
        assert!(task.state().is_terminal());
        assert_eq!(LocalStore.entry_count(dir.path()), 0);
    }
}
