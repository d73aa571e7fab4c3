use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::BracketError;

/// One bracket step: an explicit ISO/exposure pair or "auto", shot `repeat_count` times.
///
/// Auto entries carry zero ISO and exposure; the device's own exposure is used.
///
/// # Example
///
/// ```rust
/// use bracket_raw::settings::SettingEntry;
///
/// let entry = SettingEntry::manual(100.0, 0.1, 2).unwrap();
/// assert_eq!(entry.repeat_count(), 2);
/// assert!(!entry.is_auto());
///
/// let auto = SettingEntry::auto(1).unwrap();
/// assert!(auto.is_auto());
/// assert_eq!(auto.iso(), 0.0);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "EntryFields", into = "EntryFields")]
pub struct SettingEntry {
    iso: f32,
    exposure_seconds: f64,
    repeat_count: u32,
    is_auto: bool,
}

impl SettingEntry {
    /// An explicit ISO/exposure step.
    pub fn manual(iso: f32, exposure_seconds: f64, repeat_count: u32) -> Result<Self, BracketError> {
        if !iso.is_finite() || iso <= 0.0 {
            return Err(BracketError::InvalidSetting(format!(
                "ISO must be a positive number, got {iso}"
            )));
        }
        if !exposure_seconds.is_finite() || exposure_seconds <= 0.0 {
            return Err(BracketError::InvalidSetting(format!(
                "Exposure must be a positive number of seconds, got {exposure_seconds}"
            )));
        }
        check_repeat(repeat_count)?;
        Ok(Self {
            iso,
            exposure_seconds,
            repeat_count,
            is_auto: false,
        })
    }

    /// A step that uses the device's auto exposure.
    pub fn auto(repeat_count: u32) -> Result<Self, BracketError> {
        check_repeat(repeat_count)?;
        Ok(Self {
            iso: 0.0,
            exposure_seconds: 0.0,
            repeat_count,
            is_auto: true,
        })
    }

    /// Parse a manual entry from the three text fields of the add-setting form.
    ///
    /// All three fields are required.
    pub fn parse(iso: &str, exposure: &str, repeat: &str) -> Result<Self, BracketError> {
        let (iso, exposure, repeat) = (iso.trim(), exposure.trim(), repeat.trim());
        if iso.is_empty() || exposure.is_empty() || repeat.is_empty() {
            return Err(BracketError::InvalidSetting(
                "Please enter ISO, exposure and shot count".to_string(),
            ));
        }

        let iso: f32 = iso
            .parse()
            .map_err(|_| BracketError::InvalidSetting(format!("Not a number: {iso}")))?;
        let exposure: f64 = exposure
            .parse()
            .map_err(|_| BracketError::InvalidSetting(format!("Not a number: {exposure}")))?;
        let repeat: u32 = repeat
            .parse()
            .map_err(|_| BracketError::InvalidSetting(format!("Not a shot count: {repeat}")))?;

        Self::manual(iso, exposure, repeat)
    }

    pub fn iso(&self) -> f32 {
        self.iso
    }

    pub fn exposure_seconds(&self) -> f64 {
        self.exposure_seconds
    }

    pub fn repeat_count(&self) -> u32 {
        self.repeat_count
    }

    pub fn is_auto(&self) -> bool {
        self.is_auto
    }
}

fn check_repeat(repeat_count: u32) -> Result<(), BracketError> {
    if repeat_count == 0 {
        return Err(BracketError::InvalidSetting(
            "Shot count must be at least 1".to_string(),
        ));
    }
    Ok(())
}

/// Serialized form of [`SettingEntry`]; validated on the way in.
#[derive(Serialize, Deserialize)]
struct EntryFields {
    #[serde(default)]
    iso: f32,
    #[serde(default)]
    exposure_seconds: f64,
    repeat_count: u32,
    #[serde(default)]
    is_auto: bool,
}

impl TryFrom<EntryFields> for SettingEntry {
    type Error = BracketError;

    fn try_from(fields: EntryFields) -> Result<Self, Self::Error> {
        if fields.is_auto {
            Self::auto(fields.repeat_count)
        } else {
            Self::manual(fields.iso, fields.exposure_seconds, fields.repeat_count)
        }
    }
}

impl From<SettingEntry> for EntryFields {
    fn from(entry: SettingEntry) -> Self {
        Self {
            iso: entry.iso,
            exposure_seconds: entry.exposure_seconds,
            repeat_count: entry.repeat_count,
            is_auto: entry.is_auto,
        }
    }
}

impl fmt::Display for SettingEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_auto {
            write!(f, "Auto, Num: {}", self.repeat_count)
        } else {
            write!(
                f,
                "ISO: {},  Exposure: {}, Num: {}",
                self.iso, self.exposure_seconds, self.repeat_count
            )
        }
    }
}

/// The exposure a device settled on after an exposure lock.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExposureSample {
    pub iso: f32,
    pub exposure_seconds: f64,
}

/// Expand a locked exposure sample into the 3×3 auto bracket.
///
/// ISO spans `iso/2 .. iso*3` and exposure spans `exp/2 .. exp*2`, each as
/// `{min, (min+max)/2, max}`. ISO is the outer loop, exposure the inner one.
pub fn auto_bracket(sample: ExposureSample) -> Vec<SettingEntry> {
    let iso_min = sample.iso / 2.0;
    let iso_max = sample.iso * 3.0;
    let isos = [iso_min, (iso_min + iso_max) / 2.0, iso_max];

    let exp_min = sample.exposure_seconds / 2.0;
    let exp_max = sample.exposure_seconds * 2.0;
    let exposures = [exp_min, (exp_min + exp_max) / 2.0, exp_max];

    isos.iter()
        .flat_map(|&iso| {
            exposures.iter().map(move |&exposure_seconds| SettingEntry {
                iso,
                exposure_seconds,
                repeat_count: 1,
                is_auto: false,
            })
        })
        .collect()
}

/// Ordered bracket list; insertion order is capture order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SettingList {
    entries: Vec<SettingEntry>,
}

impl SettingList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: SettingEntry) {
        self.entries.push(entry);
    }

    pub fn extend(&mut self, entries: impl IntoIterator<Item = SettingEntry>) {
        self.entries.extend(entries);
    }

    /// Remove the entry at `index`, returning it if it existed.
    pub fn remove(&mut self, index: usize) -> Option<SettingEntry> {
        (index < self.entries.len()).then(|| self.entries.remove(index))
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn get(&self, index: usize) -> Option<&SettingEntry> {
        self.entries.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SettingEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of shots a full run of this list takes, or `None` if it does
    /// not fit in a `u32`.
    pub fn total_shots(&self) -> Option<u32> {
        self.entries
            .iter()
            .try_fold(0u32, |total, e| total.checked_add(e.repeat_count))
    }
}

impl FromIterator<SettingEntry> for SettingList {
    fn from_iter<I: IntoIterator<Item = SettingEntry>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}
