//! Camera collaborators consumed by the bracketing core.
//!
//! The platform camera stack is split into two traits, mirroring how capture
//! frameworks separate the physical device from the photo output:
//!
//! - [`CaptureDevice`] — exposure/focus configuration and current readings
//! - [`PhotoOutput`] — issues one capture and streams its payloads back
//!
//! [`SimulatedCamera`] implements both and backs the CLI rehearsal mode and
//! the test suite.

mod simulated;

pub use simulated::{SimulatedCamera, SimulatedCameraBuilder};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::capture::{CaptureEvent, CaptureRequest};
use crate::error::{BracketError, RangeField, RangeViolation};
use crate::settings::SettingEntry;

/// Focus behaviour of the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusMode {
    Locked,
    AutoFocus,
    ContinuousAutoFocus,
}

/// Exposure behaviour of the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExposureMode {
    Locked,
    AutoExpose,
    ContinuousAutoExposure,
    Custom,
}

/// Device-reported bounds for explicit exposure settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeviceCapabilities {
    pub min_iso: f32,
    pub max_iso: f32,
    pub min_exposure_seconds: f64,
    pub max_exposure_seconds: f64,
}

impl DeviceCapabilities {
    /// Reject bounds no setting could ever satisfy: non-finite or negative
    /// values, or a minimum not below its maximum.
    pub fn validate(&self) -> Result<(), BracketError> {
        let iso = (f64::from(self.min_iso), f64::from(self.max_iso));
        let exposure = (self.min_exposure_seconds, self.max_exposure_seconds);
        for (field, (min, max)) in [("ISO", iso), ("exposure", exposure)] {
            if !min.is_finite() || !max.is_finite() || min < 0.0 || min >= max {
                return Err(BracketError::Configuration(format!(
                    "device reports unusable {field} bounds {min}..{max}"
                )));
            }
        }
        Ok(())
    }

    /// Check an entry against the bounds. Bounds are exclusive; auto entries always pass.
    pub fn check(&self, entry_index: usize, entry: &SettingEntry) -> Result<(), RangeViolation> {
        if entry.is_auto() {
            return Ok(());
        }

        let iso = entry.iso();
        if !(self.min_iso < iso && iso < self.max_iso) {
            return Err(RangeViolation {
                entry_index,
                field: RangeField::Iso,
                value: f64::from(iso),
                min: f64::from(self.min_iso),
                max: f64::from(self.max_iso),
            });
        }

        let exposure = entry.exposure_seconds();
        if !(self.min_exposure_seconds < exposure && exposure < self.max_exposure_seconds) {
            return Err(RangeViolation {
                entry_index,
                field: RangeField::Exposure,
                value: exposure,
                min: self.min_exposure_seconds,
                max: self.max_exposure_seconds,
            });
        }

        Ok(())
    }
}

/// Device readings taken when a capture is requested.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeviceSnapshot {
    pub iso: f32,
    pub exposure_seconds: f64,
    pub focus_mode: FocusMode,
    pub exposure_mode: ExposureMode,
}

impl DeviceSnapshot {
    pub fn of(device: &dyn CaptureDevice) -> Self {
        Self {
            iso: device.current_iso(),
            exposure_seconds: device.current_exposure_seconds(),
            focus_mode: device.focus_mode(),
            exposure_mode: device.exposure_mode(),
        }
    }
}

/// A camera whose focus and exposure can be configured.
///
/// Mode changes are requests: they return once the device accepted them, and
/// [`CaptureDevice::settled`] resolves once the device has actually converged.
/// Every `set_*` call must happen while holding a [`ConfigurationLock`].
#[async_trait]
pub trait CaptureDevice: Send + Sync {
    /// The display name of this device.
    fn name(&self) -> &str;
    fn capabilities(&self) -> DeviceCapabilities;
    fn current_iso(&self) -> f32;
    fn current_exposure_seconds(&self) -> f64;
    fn focus_mode(&self) -> FocusMode;
    fn exposure_mode(&self) -> ExposureMode;

    /// Acquire exclusive configuration access.
    fn lock_for_configuration(&self) -> Result<(), BracketError>;
    fn unlock_for_configuration(&self);

    fn set_focus_mode(&self, mode: FocusMode) -> Result<(), BracketError>;
    fn set_exposure_mode(&self, mode: ExposureMode) -> Result<(), BracketError>;
    /// Switch to custom exposure with an explicit duration and ISO.
    fn set_custom_exposure(&self, duration_seconds: f64, iso: f32) -> Result<(), BracketError>;

    /// Resolves when the last requested focus/exposure change has taken effect.
    async fn settled(&self) -> Result<(), BracketError>;
}

/// Issues photo captures.
#[async_trait]
pub trait PhotoOutput: Send + Sync {
    /// Start one capture. The receiver yields the payloads and errors for this
    /// request, then [`CaptureEvent::Finished`].
    async fn capture(
        &self,
        request: &CaptureRequest,
    ) -> Result<mpsc::Receiver<CaptureEvent>, BracketError>;
}

/// Exclusive configuration access, released on drop.
pub struct ConfigurationLock<'a> {
    device: &'a dyn CaptureDevice,
}

impl<'a> ConfigurationLock<'a> {
    pub fn acquire(device: &'a dyn CaptureDevice) -> Result<Self, BracketError> {
        device.lock_for_configuration()?;
        Ok(Self { device })
    }
}

impl Drop for ConfigurationLock<'_> {
    fn drop(&mut self) {
        self.device.unlock_for_configuration();
    }
}
