use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Errors produced by the bracketing core.
///
/// Only `Configuration`, `RangeValidation`, `Cancelled` and `Timeout` end a
/// sequence. Capture, persistence and device lock errors cost the affected
/// shot or reconfiguration; the bracket carries on.
#[derive(Error, Debug)]
pub enum BracketError {
    /// The device or capture session could not be configured at all.
    #[error("Device configuration failed: {0}")]
    Configuration(String),

    /// A requested ISO or exposure lies outside the device-reported bounds.
    #[error("{0}")]
    RangeValidation(RangeViolation),

    /// A single shot failed on the device or while encoding.
    #[error("Capture failed: {0}")]
    Capture(String),

    /// Writing a captured file failed.
    #[error("Failed to persist {}: {source}", path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Exclusive configuration access to the device could not be acquired.
    #[error("Could not lock device for configuration: {0}")]
    DeviceLock(String),

    /// A setting entry was rejected on input.
    #[error("Invalid setting: {0}")]
    InvalidSetting(String),

    /// The setting list or a new sequence was requested mid-sequence.
    #[error("A capture sequence is already in progress")]
    SequenceInProgress,

    /// A device callback arrived in a phase that does not expect it.
    #[error("Unexpected {event} while {phase}")]
    InvalidTransition { event: &'static str, phase: String },

    /// The user aborted the sequence.
    #[error("Capture sequence was cancelled")]
    Cancelled,

    /// A device operation did not complete within its bounded wait.
    #[error("Device operation '{0}' timed out")]
    Timeout(String),
}

impl BracketError {
    /// Create a persistence error for `path`.
    pub fn persistence(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Persistence {
            path: path.into(),
            source,
        }
    }

    /// Create an invalid-transition error.
    pub fn invalid_transition(event: &'static str, phase: impl fmt::Display) -> Self {
        Self::InvalidTransition {
            event,
            phase: phase.to_string(),
        }
    }
}

/// Which bracket parameter violated the device bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeField {
    Iso,
    Exposure,
}

impl fmt::Display for RangeField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Iso => write!(f, "ISO"),
            Self::Exposure => write!(f, "exposure"),
        }
    }
}

/// The first setting entry found outside the device-reported bounds.
///
/// Carries the offending bounds so the message shown to the user can say
/// what the device actually accepts.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeViolation {
    /// Position of the entry in the setting list.
    pub entry_index: usize,
    pub field: RangeField,
    pub value: f64,
    pub min: f64,
    pub max: f64,
}

impl fmt::Display for RangeViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Setting {}: {} {} is outside the device range ({} – {})",
            self.entry_index + 1,
            self.field,
            self.value,
            self.min,
            self.max
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_violation_message_names_bounds() {
        let violation = RangeViolation {
            entry_index: 1,
            field: RangeField::Iso,
            value: 1000.0,
            min: 50.0,
            max: 800.0,
        };
        let msg = BracketError::RangeValidation(violation).to_string();
        assert!(msg.contains("Setting 2"));
        assert!(msg.contains("ISO 1000"));
        assert!(msg.contains("50"));
        assert!(msg.contains("800"));
    }

    #[test]
    fn persistence_error_names_path() {
        let err = BracketError::persistence(
            "/tmp/x.jpg",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(err.to_string().contains("/tmp/x.jpg"));
    }
}
