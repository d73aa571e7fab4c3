use std::collections::HashSet;
use std::io::Cursor;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use image::{DynamicImage, ImageBuffer, ImageFormat, Luma, Rgb, RgbImage};
use serde_json::json;
use tokio::sync::mpsc;

use super::{
    CaptureDevice, DeviceCapabilities, ExposureMode, FocusMode, PhotoOutput,
};
use crate::capture::{CaptureEvent, CaptureRequest};
use crate::error::BracketError;
use crate::exif::{EXIF_DICTIONARY, PhotoMetadata, TIFF_DICTIONARY};

const SIMULATED_MAKE: &str = "bracket-raw";
const SIMULATED_MODEL: &str = "Simulated";
const FRAME_WIDTH: u32 = 32;
const FRAME_HEIGHT: u32 = 24;

/// A camera that produces synthetic frames.
///
/// Backs the CLI rehearsal mode and the tests. Failures are scripted per shot
/// number (1-based, counted across the camera's lifetime).
///
/// ```rust
/// use bracket_raw::device::{CaptureDevice, SimulatedCamera};
///
/// let camera = SimulatedCamera::builder()
///     .auto_exposure(400.0, 0.02)
///     .fail_shot(2)
///     .build();
/// assert_eq!(camera.current_iso(), 400.0);
/// ```
#[derive(Debug)]
pub struct SimulatedCamera {
    capabilities: DeviceCapabilities,
    auto_iso: f32,
    auto_exposure_seconds: f64,
    settle_delay: Duration,
    hang_settle: bool,
    busy_lock: bool,
    fail_shots: HashSet<u32>,
    drop_raw_shots: HashSet<u32>,
    state: Mutex<CameraState>,
}

#[derive(Debug)]
struct CameraState {
    iso: f32,
    exposure_seconds: f64,
    focus_mode: FocusMode,
    exposure_mode: ExposureMode,
    config_locked: bool,
    shots: u32,
    requests: Vec<CaptureRequest>,
}

impl SimulatedCamera {
    pub fn builder() -> SimulatedCameraBuilder {
        SimulatedCameraBuilder::default()
    }

    /// Every capture request received so far, in order.
    pub fn requests(&self) -> Vec<CaptureRequest> {
        self.state().requests.clone()
    }

    fn state(&self) -> MutexGuard<'_, CameraState> {
        // A panic while holding the lock leaves plain data behind; keep going.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn configurable(&self) -> Result<MutexGuard<'_, CameraState>, BracketError> {
        let state = self.state();
        if !state.config_locked {
            return Err(BracketError::DeviceLock(
                "device is not locked for configuration".to_string(),
            ));
        }
        Ok(state)
    }

    fn metadata(iso: f32, exposure_seconds: f64) -> PhotoMetadata {
        let mut metadata = PhotoMetadata::new();
        metadata.insert(
            EXIF_DICTIONARY.to_string(),
            json!({
                "ISOSpeedRatings": [iso.round() as u32],
                "ExposureTime": exposure_seconds,
            }),
        );
        metadata.insert(
            TIFF_DICTIONARY.to_string(),
            json!({ "Make": SIMULATED_MAKE, "Model": SIMULATED_MODEL }),
        );
        metadata
    }

    /// 16-bit grayscale TIFF standing in for sensor data.
    fn raw_frame(level: f64) -> Result<Vec<u8>, BracketError> {
        let value = (level * f64::from(u16::MAX)) as u16;
        let frame: ImageBuffer<Luma<u16>, Vec<u16>> =
            ImageBuffer::from_fn(FRAME_WIDTH, FRAME_HEIGHT, |x, _| {
                Luma([value.saturating_add((x * 64) as u16)])
            });
        encode(DynamicImage::ImageLuma16(frame), ImageFormat::Tiff)
    }

    /// Processed frame; brightness follows the exposure value.
    fn processed_frame(level: f64) -> Result<Vec<u8>, BracketError> {
        let base = (level * 255.0) as u8;
        let frame = RgbImage::from_fn(FRAME_WIDTH, FRAME_HEIGHT, |x, y| {
            Rgb([base, base.saturating_add((x * 2) as u8), base.saturating_add((y * 2) as u8)])
        });
        encode(DynamicImage::ImageRgb8(frame), ImageFormat::Jpeg)
    }
}

fn encode(image: DynamicImage, format: ImageFormat) -> Result<Vec<u8>, BracketError> {
    let mut buf = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut buf), format)
        .map_err(|e| BracketError::Capture(format!("Failed to render simulated frame: {e}")))?;
    Ok(buf)
}

/// Map ISO × exposure onto `[0, 1]`, with ISO 100 at 1/100s in the middle.
fn exposure_level(iso: f32, exposure_seconds: f64) -> f64 {
    let ev = f64::from(iso) * exposure_seconds;
    (ev / (ev + 1.0)).clamp(0.0, 1.0)
}

#[async_trait]
impl CaptureDevice for SimulatedCamera {
    fn name(&self) -> &str {
        SIMULATED_MODEL
    }

    fn capabilities(&self) -> DeviceCapabilities {
        self.capabilities
    }

    fn current_iso(&self) -> f32 {
        self.state().iso
    }

    fn current_exposure_seconds(&self) -> f64 {
        self.state().exposure_seconds
    }

    fn focus_mode(&self) -> FocusMode {
        self.state().focus_mode
    }

    fn exposure_mode(&self) -> ExposureMode {
        self.state().exposure_mode
    }

    fn lock_for_configuration(&self) -> Result<(), BracketError> {
        if self.busy_lock {
            return Err(BracketError::DeviceLock("device is busy".to_string()));
        }
        let mut state = self.state();
        if state.config_locked {
            return Err(BracketError::DeviceLock(
                "device is already locked for configuration".to_string(),
            ));
        }
        state.config_locked = true;
        Ok(())
    }

    fn unlock_for_configuration(&self) {
        self.state().config_locked = false;
    }

    fn set_focus_mode(&self, mode: FocusMode) -> Result<(), BracketError> {
        self.configurable()?.focus_mode = mode;
        Ok(())
    }

    fn set_exposure_mode(&self, mode: ExposureMode) -> Result<(), BracketError> {
        let mut state = self.configurable()?;
        if matches!(
            mode,
            ExposureMode::AutoExpose | ExposureMode::ContinuousAutoExposure
        ) {
            state.iso = self.auto_iso;
            state.exposure_seconds = self.auto_exposure_seconds;
        }
        state.exposure_mode = mode;
        Ok(())
    }

    fn set_custom_exposure(&self, duration_seconds: f64, iso: f32) -> Result<(), BracketError> {
        let caps = self.capabilities;
        let mut state = self.configurable()?;
        state.exposure_mode = ExposureMode::Custom;
        state.iso = iso.clamp(caps.min_iso, caps.max_iso);
        state.exposure_seconds =
            duration_seconds.clamp(caps.min_exposure_seconds, caps.max_exposure_seconds);
        Ok(())
    }

    async fn settled(&self) -> Result<(), BracketError> {
        if self.hang_settle {
            std::future::pending::<()>().await;
        }
        if !self.settle_delay.is_zero() {
            tokio::time::sleep(self.settle_delay).await;
        }
        Ok(())
    }
}

#[async_trait]
impl PhotoOutput for SimulatedCamera {
    async fn capture(
        &self,
        request: &CaptureRequest,
    ) -> Result<mpsc::Receiver<CaptureEvent>, BracketError> {
        let (shot, iso, exposure_seconds) = {
            let mut state = self.state();
            state.shots += 1;
            state.requests.push(*request);
            (state.shots, state.iso, state.exposure_seconds)
        };

        let (tx, rx) = mpsc::channel(8);
        let mut events = Vec::with_capacity(3);

        if self.fail_shots.contains(&shot) {
            events.push(CaptureEvent::Error(format!("simulated failure on shot {shot}")));
        } else {
            let level = exposure_level(iso, exposure_seconds);
            let metadata = Self::metadata(iso, exposure_seconds);
            if !self.drop_raw_shots.contains(&shot) {
                events.push(CaptureEvent::RawPayload {
                    data: Self::raw_frame(level)?,
                    metadata: metadata.clone(),
                });
            }
            events.push(CaptureEvent::ProcessedPayload {
                data: Self::processed_frame(level)?,
                metadata,
            });
        }
        events.push(CaptureEvent::Finished);

        for event in events {
            // The channel holds every event of one shot; a closed receiver
            // just means nobody is listening any more.
            if tx.send(event).await.is_err() {
                break;
            }
        }
        Ok(rx)
    }
}

/// Builder for [`SimulatedCamera`].
#[derive(Debug, Clone)]
pub struct SimulatedCameraBuilder {
    capabilities: DeviceCapabilities,
    auto_iso: f32,
    auto_exposure_seconds: f64,
    settle_delay: Duration,
    hang_settle: bool,
    busy_lock: bool,
    fail_shots: HashSet<u32>,
    drop_raw_shots: HashSet<u32>,
}

impl Default for SimulatedCameraBuilder {
    fn default() -> Self {
        Self {
            capabilities: DeviceCapabilities {
                min_iso: 25.0,
                max_iso: 3200.0,
                min_exposure_seconds: 1.0 / 8000.0,
                max_exposure_seconds: 1.0,
            },
            auto_iso: 200.0,
            auto_exposure_seconds: 0.01,
            settle_delay: Duration::ZERO,
            hang_settle: false,
            busy_lock: false,
            fail_shots: HashSet::new(),
            drop_raw_shots: HashSet::new(),
        }
    }
}

impl SimulatedCameraBuilder {
    pub fn capabilities(mut self, capabilities: DeviceCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// ISO and exposure chosen whenever the camera auto-exposes.
    pub fn auto_exposure(mut self, iso: f32, exposure_seconds: f64) -> Self {
        self.auto_iso = iso;
        self.auto_exposure_seconds = exposure_seconds;
        self
    }

    /// Delay before focus/exposure changes settle.
    pub fn settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    /// Focus/exposure changes never settle.
    pub fn hang_settle(mut self) -> Self {
        self.hang_settle = true;
        self
    }

    /// Configuration lock is always refused.
    pub fn busy_lock(mut self) -> Self {
        self.busy_lock = true;
        self
    }

    /// Shot `n` reports an error and no payloads.
    pub fn fail_shot(mut self, n: u32) -> Self {
        self.fail_shots.insert(n);
        self
    }

    /// Shot `n` delivers only the processed payload.
    pub fn drop_raw(mut self, n: u32) -> Self {
        self.drop_raw_shots.insert(n);
        self
    }

    pub fn build(self) -> SimulatedCamera {
        SimulatedCamera {
            capabilities: self.capabilities,
            auto_iso: self.auto_iso,
            auto_exposure_seconds: self.auto_exposure_seconds,
            settle_delay: self.settle_delay,
            hang_settle: self.hang_settle,
            busy_lock: self.busy_lock,
            fail_shots: self.fail_shots,
            drop_raw_shots: self.drop_raw_shots,
            state: Mutex::new(CameraState {
                iso: self.auto_iso,
                exposure_seconds: self.auto_exposure_seconds,
                focus_mode: FocusMode::ContinuousAutoFocus,
                exposure_mode: ExposureMode::ContinuousAutoExposure,
                config_locked: false,
                shots: 0,
                requests: Vec::new(),
            }),
        }
    }
}
