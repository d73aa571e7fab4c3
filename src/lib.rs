//! # bracket-raw
//!
//! Exposure/ISO bracketing sequencer: drive a camera through an ordered list of
//! ISO/exposure settings, capture a RAW+JPEG pair per shot, and persist each
//! pair with patched EXIF under deterministic scene directories.
//!
//! ## Quick Start
//!
//! The simplest way to use the library is through [`session::BracketSession`],
//! which runs the whole focus lock → exposure lock → validate → capture flow
//! against any [`device::CaptureDevice`] + [`device::PhotoOutput`]:
//!
//! ```rust,no_run
//! use bracket_raw::config::Config;
//! use bracket_raw::device::SimulatedCamera;
//! use bracket_raw::naming::NamingScheme;
//! use bracket_raw::sequencer::CaptureMode;
//! use bracket_raw::session::BracketSession;
//! use bracket_raw::store::LocalStore;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     // Load config from file (output root, device id, saved brackets)
//!     let mut config = Config::load(Some("config.json".as_ref()))?;
//!     config.ensure_device_id();
//!
//!     let camera = Arc::new(SimulatedCamera::builder().build());
//!     let naming = NamingScheme::new(&config.device.device_id, &config.output.root);
//!     let (mut session, _events) = BracketSession::new(
//!         camera.clone(),
//!         camera,
//!         Arc::new(LocalStore),
//!         naming,
//!         config.brackets.clone(),
//!         config.session_options(),
//!     );
//!
//!     let summary = session.run(CaptureMode::Manual).await?;
//!     println!(
//!         "{}: {} written, {} skipped",
//!         summary.context.scene_name, summary.written, summary.skipped
//!     );
//!     Ok(())
//! }
//! ```
//!
//! ## Lower-Level Usage
//!
//! [`sequencer::BracketSequencer`] is a pure state machine: feed it device
//! results, carry out the [`sequencer::Command`]s it returns. This is how the
//! session is built and how a different runtime would drive it:
//!
//! ```rust
//! use bracket_raw::sequencer::{BracketSequencer, CaptureMode, Command};
//! use bracket_raw::settings::{SettingEntry, SettingList};
//!
//! let mut settings = SettingList::new();
//! settings.push(SettingEntry::manual(100.0, 0.1, 2).unwrap());
//!
//! let mut sequencer = BracketSequencer::new(settings);
//! let commands = sequencer.start(CaptureMode::Manual).unwrap();
//! assert_eq!(commands, vec![Command::SetControlsEnabled(false), Command::LockFocus]);
//! ```
//!
//! ## On-Disk Layout
//!
//! | Directory | File |
//! |-----------|------|
//! | `<scene>_JPG_<yyyyMMdd-HHmmss>` | `<deviceId><scene>_JPG-<nnn>_I<iso>_E<1/exposure>_o.jpg` |
//! | `<scene>_DNG_<yyyyMMdd-HHmmss>` | `<deviceId><scene>_DNG-<nnn>_I<iso>_E<1/exposure>_o.dng` |
//!
//! ## Modules
//!
//! - [`capture`] — One in-flight capture: payload accumulation and persistence
//! - [`config`] — Configuration types and loading/saving
//! - [`device`] — Camera traits and the simulated camera
//! - [`error`] — Error taxonomy
//! - [`exif`] — Metadata patching, EXIF embedding and reading back
//! - [`naming`] — Scene, directory and file naming
//! - [`sequencer`] — The bracketing state machine
//! - [`session`] — Async driver of the state machine
//! - [`settings`] — Setting entries, the bracket list and auto-bracket expansion
//! - [`store`] — Filesystem access and the scene review workflow

pub mod capture;
pub mod config;
pub mod device;
pub mod error;
pub mod exif;
pub mod naming;
pub mod sequencer;
pub mod session;
pub mod settings;
pub mod store;
