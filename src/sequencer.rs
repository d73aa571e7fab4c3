use std::fmt;

use crate::capture::CaptureOutcome;
use crate::device::DeviceCapabilities;
use crate::error::{BracketError, RangeViolation};
use crate::naming::SequenceContext;
use crate::settings::{ExposureSample, SettingEntry, SettingList, auto_bracket};

/// How a sequence is seeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaptureMode {
    /// Run the user's setting list.
    #[default]
    Manual,
    /// Lock exposure, then bracket 3×3 around what the device chose.
    AutoExposure,
}

impl fmt::Display for CaptureMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Manual => write!(f, "manual"),
            Self::AutoExposure => write!(f, "auto-exposure"),
        }
    }
}

/// Why a sequence ended without finishing.
#[derive(Debug, Clone, PartialEq)]
pub enum FailureReason {
    /// A setting lies outside the device bounds; nothing was captured.
    Range(RangeViolation),
    /// The user aborted.
    Cancelled,
    /// A device operation exceeded its bounded wait.
    Timeout(String),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Range(v) => write!(f, "range-error: {v}"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Timeout(op) => write!(f, "timeout: {op}"),
        }
    }
}

impl From<FailureReason> for BracketError {
    fn from(reason: FailureReason) -> Self {
        match reason {
            FailureReason::Range(v) => Self::RangeValidation(v),
            FailureReason::Cancelled => Self::Cancelled,
            FailureReason::Timeout(op) => Self::Timeout(op),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum Phase {
    #[default]
    Idle,
    PreparingFocus,
    PreparingExposure,
    Capturing,
    Finished,
    Failed(FailureReason),
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::PreparingFocus => write!(f, "preparing focus"),
            Self::PreparingExposure => write!(f, "preparing exposure"),
            Self::Capturing => write!(f, "capturing"),
            Self::Finished => write!(f, "finished"),
            Self::Failed(reason) => write!(f, "failed ({reason})"),
        }
    }
}

/// Progress through the setting list.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SequenceState {
    pub setting_index: usize,
    pub within_setting_index: u32,
    pub total_planned: u32,
    pub total_completed: u32,
    pub phase: Phase,
}

/// What the device should do for one shot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ShotKind {
    /// Capture with whatever exposure the device has locked.
    Auto,
    /// Reconfigure to an explicit ISO/exposure, then capture.
    Manual { iso: f32, exposure_seconds: f64 },
    /// Capture again without reconfiguring.
    Repeat,
}

/// One shot of the sequence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShotPlan {
    /// 1-based position of the shot within the sequence.
    pub ordinal: u32,
    pub setting_index: usize,
    pub repeat_index: u32,
    pub kind: ShotKind,
}

/// Totals reported when a sequence finishes.
#[derive(Debug, Clone, PartialEq)]
pub struct SequenceSummary {
    pub mode: CaptureMode,
    pub context: SequenceContext,
    pub total_planned: u32,
    pub total_completed: u32,
    /// Shots that produced both files.
    pub written: u32,
    /// Shots that produced no output (capture, encode or write failure).
    pub skipped: u32,
}

/// Work the driver must perform, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Enable or disable the user-facing controls.
    SetControlsEnabled(bool),
    LockFocus,
    /// Return to auto exposure and lock it.
    LockExposure,
    /// Build the scene context and call [`BracketSequencer::begin_sequence`].
    PrepareSequence,
    Capture(ShotPlan),
    /// Fraction of planned shots completed, in `[0, 1]`.
    Progress(f32),
    Completed(SequenceSummary),
    Failed(FailureReason),
}

/// Walks a [`SettingList`] one shot at a time.
///
/// The sequencer performs no I/O. Every transition returns the [`Command`]s
/// the caller must carry out, and the caller reports each result back through
/// the matching `on_*` method. [`crate::session::BracketSession`] does this
/// against a real device.
///
/// ```text
/// Idle ─start─▶ PreparingFocus ─focus locked─▶ (AutoExposure) PreparingExposure ─exposure locked─┐
///                     │                                                                          │
///                     └─────────(Manual)───────────────▶ begin_sequence ◀────────────────────────┘
///                                                         │     │    └─range error─▶ Failed
///                                                         │     └─unusable bounds or shot count overflow─▶ Idle (error)
///                                                         ▼
///                                                     Capturing ─last shot─▶ Finished
/// ```
#[derive(Debug, Default)]
pub struct BracketSequencer {
    settings: SettingList,
    state: SequenceState,
    mode: CaptureMode,
    context: Option<SequenceContext>,
    awaiting_relock: bool,
    written: u32,
    skipped: u32,
}

impl BracketSequencer {
    pub fn new(settings: SettingList) -> Self {
        Self {
            settings,
            ..Self::default()
        }
    }

    pub fn settings(&self) -> &SettingList {
        &self.settings
    }

    /// Mutable access to the setting list; refused while a sequence runs.
    pub fn settings_mut(&mut self) -> Result<&mut SettingList, BracketError> {
        if self.is_active() {
            return Err(BracketError::SequenceInProgress);
        }
        Ok(&mut self.settings)
    }

    pub fn state(&self) -> &SequenceState {
        &self.state
    }

    pub fn phase(&self) -> &Phase {
        &self.state.phase
    }

    pub fn mode(&self) -> CaptureMode {
        self.mode
    }

    /// The scene of the running sequence, once `begin_sequence` has fixed it.
    pub fn context(&self) -> Option<&SequenceContext> {
        self.context.as_ref()
    }

    pub fn is_active(&self) -> bool {
        matches!(
            self.state.phase,
            Phase::PreparingFocus | Phase::PreparingExposure | Phase::Capturing
        )
    }

    /// Start a new sequence.
    pub fn start(&mut self, mode: CaptureMode) -> Result<Vec<Command>, BracketError> {
        if self.is_active() {
            return Err(BracketError::SequenceInProgress);
        }

        self.reset();
        self.mode = mode;

        match mode {
            CaptureMode::AutoExposure => {
                self.settings.clear();
                self.settings.push(SettingEntry::auto(1)?);
            }
            CaptureMode::Manual if self.settings.is_empty() => {
                log::info!("Setting list is empty, falling back to one auto shot");
                self.settings.push(SettingEntry::auto(1)?);
            }
            CaptureMode::Manual => {}
        }

        log::info!(
            "Starting {mode} sequence with {} setting(s)",
            self.settings.len()
        );
        self.state.phase = Phase::PreparingFocus;
        Ok(vec![Command::SetControlsEnabled(false), Command::LockFocus])
    }

    /// The device reports focus is locked.
    pub fn on_focus_locked(&mut self) -> Result<Vec<Command>, BracketError> {
        if self.state.phase != Phase::PreparingFocus {
            return Err(BracketError::invalid_transition("focus lock", &self.state.phase));
        }

        match self.mode {
            CaptureMode::Manual => Ok(vec![Command::PrepareSequence]),
            CaptureMode::AutoExposure => {
                self.state.phase = Phase::PreparingExposure;
                Ok(vec![Command::LockExposure])
            }
        }
    }

    /// The device reports exposure is locked at `sample`.
    pub fn on_exposure_locked(
        &mut self,
        sample: ExposureSample,
    ) -> Result<Vec<Command>, BracketError> {
        match (&self.state.phase, self.mode) {
            (Phase::PreparingExposure, CaptureMode::AutoExposure) => {
                log::info!(
                    "Exposure locked at ISO {} / {}s, expanding auto bracket",
                    sample.iso,
                    sample.exposure_seconds
                );
                self.settings.extend(auto_bracket(sample));
                Ok(vec![Command::PrepareSequence])
            }
            (Phase::Capturing, CaptureMode::Manual) if self.awaiting_relock => {
                self.awaiting_relock = false;
                Ok(vec![Command::Capture(self.plan(ShotKind::Auto))])
            }
            _ => Err(BracketError::invalid_transition(
                "exposure lock",
                &self.state.phase,
            )),
        }
    }

    /// Fix the scene, validate every entry against the device bounds, and
    /// issue the first capture.
    ///
    /// Validation runs once, over the whole list: the first out-of-range entry
    /// fails the sequence before anything is captured. Unusable device bounds
    /// or a list too long to count return an error and leave the sequencer
    /// idle.
    pub fn begin_sequence(
        &mut self,
        capabilities: &DeviceCapabilities,
        context: SequenceContext,
    ) -> Result<Vec<Command>, BracketError> {
        let preparing = matches!(
            self.state.phase,
            Phase::PreparingFocus | Phase::PreparingExposure
        );
        if !preparing || self.state.setting_index != 0 || self.state.within_setting_index != 0 {
            return Err(BracketError::invalid_transition(
                "begin sequence",
                &self.state.phase,
            ));
        }

        if let Err(e) = capabilities.validate() {
            log::error!("{e}");
            self.reset();
            return Err(e);
        }
        let Some(total_planned) = self.settings.total_shots() else {
            self.reset();
            return Err(BracketError::InvalidSetting(
                "total shot count does not fit in 32 bits".to_string(),
            ));
        };
        self.state.total_planned = total_planned;

        let violation = self
            .settings
            .iter()
            .enumerate()
            .find_map(|(i, entry)| capabilities.check(i, entry).err());
        if let Some(violation) = violation {
            log::warn!("{violation}");
            return Ok(self.abort(FailureReason::Range(violation)));
        }

        log::info!(
            "{}: {} shot(s) planned",
            context.scene_name,
            self.state.total_planned
        );
        self.context = Some(context);
        self.state.phase = Phase::Capturing;

        let mut commands = vec![Command::Progress(0.0)];
        commands.extend(self.capture_current_setting());
        Ok(commands)
    }

    /// Commands for the shot at the current position.
    pub fn capture_current_setting(&mut self) -> Vec<Command> {
        let Some(entry) = self.settings.get(self.state.setting_index).copied() else {
            return self.finish();
        };

        if self.state.within_setting_index > 0 {
            return vec![Command::Capture(self.plan(ShotKind::Repeat))];
        }

        if entry.is_auto() {
            if self.mode == CaptureMode::Manual {
                // Re-lock so the auto shot meters the current scene, not the
                // previous manual setting.
                self.awaiting_relock = true;
                return vec![Command::LockExposure];
            }
            return vec![Command::Capture(self.plan(ShotKind::Auto))];
        }

        vec![Command::Capture(self.plan(ShotKind::Manual {
            iso: entry.iso(),
            exposure_seconds: entry.exposure_seconds(),
        }))]
    }

    /// A shot reached its terminal state. Any outcome advances the sequence.
    pub fn on_capture_complete(
        &mut self,
        outcome: &CaptureOutcome,
    ) -> Result<Vec<Command>, BracketError> {
        if self.state.phase != Phase::Capturing || self.awaiting_relock {
            return Err(BracketError::invalid_transition(
                "capture completion",
                &self.state.phase,
            ));
        }

        self.state.total_completed += 1;
        if outcome.is_written() {
            self.written += 1;
        } else {
            self.skipped += 1;
        }

        self.state.within_setting_index += 1;
        let repeat = self
            .settings
            .get(self.state.setting_index)
            .map_or(1, SettingEntry::repeat_count);
        if self.state.within_setting_index >= repeat {
            self.state.setting_index += 1;
            self.state.within_setting_index = 0;
        }

        let progress = self.state.total_completed as f32 / self.state.total_planned.max(1) as f32;
        let mut commands = vec![Command::Progress(progress.min(1.0))];
        if self.state.setting_index >= self.settings.len() {
            commands.extend(self.finish());
        } else {
            commands.extend(self.capture_current_setting());
        }
        Ok(commands)
    }

    /// User abort. No-op unless a sequence is running.
    pub fn cancel(&mut self) -> Vec<Command> {
        self.fail(FailureReason::Cancelled)
    }

    /// End the running sequence with `reason`. No-op unless a sequence is running.
    pub fn fail(&mut self, reason: FailureReason) -> Vec<Command> {
        if !self.is_active() {
            return Vec::new();
        }
        log::warn!("Sequence aborted: {reason}");
        self.abort(reason)
    }

    fn plan(&self, kind: ShotKind) -> ShotPlan {
        ShotPlan {
            ordinal: self.state.total_completed + 1,
            setting_index: self.state.setting_index,
            repeat_index: self.state.within_setting_index,
            kind,
        }
    }

    fn finish(&mut self) -> Vec<Command> {
        let summary = SequenceSummary {
            mode: self.mode,
            context: self.context.take().unwrap_or_default(),
            total_planned: self.state.total_planned,
            total_completed: self.state.total_completed,
            written: self.written,
            skipped: self.skipped,
        };
        log::info!(
            "Sequence finished: {}/{} shot(s), {} written, {} skipped",
            summary.total_completed,
            summary.total_planned,
            summary.written,
            summary.skipped
        );

        self.reset();
        self.state.phase = Phase::Finished;
        vec![Command::SetControlsEnabled(true), Command::Completed(summary)]
    }

    fn abort(&mut self, reason: FailureReason) -> Vec<Command> {
        self.reset();
        self.state.phase = Phase::Failed(reason.clone());
        vec![Command::SetControlsEnabled(true), Command::Failed(reason)]
    }

    fn reset(&mut self) {
        self.state = SequenceState::default();
        self.context = None;
        self.awaiting_relock = false;
        self.written = 0;
        self.skipped = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn caps() -> DeviceCapabilities {
        DeviceCapabilities {
            min_iso: 50.0,
            max_iso: 800.0,
            min_exposure_seconds: 0.0001,
            max_exposure_seconds: 1.0,
        }
    }

    fn context() -> SequenceContext {
        SequenceContext {
            device_id: "dev".into(),
            scene_name: "Scene-001".into(),
            timestamp: "20240301-120000".into(),
            output_root: PathBuf::from("/captures"),
        }
    }

    fn written() -> CaptureOutcome {
        CaptureOutcome::Written {
            jpeg: PathBuf::from("a.jpg"),
            raw: PathBuf::from("a.dng"),
        }
    }

    /// What a scripted run observed.
    #[derive(Default)]
    struct Run {
        shots: Vec<ShotPlan>,
        exposure_locks: u32,
        controls: Vec<bool>,
        progress: Vec<f32>,
        summary: Option<SequenceSummary>,
        failure: Option<FailureReason>,
    }

    /// Drive the sequencer the way the session does, with every shot succeeding
    /// unless its ordinal is listed in `failing`.
    fn drive(seq: &mut BracketSequencer, mode: CaptureMode, failing: &[u32]) -> Run {
        let sample = ExposureSample {
            iso: 200.0,
            exposure_seconds: 0.01,
        };
        let mut run = Run::default();
        let mut pending: std::collections::VecDeque<Command> = seq.start(mode).unwrap().into();

        while let Some(cmd) = pending.pop_front() {
            let next = match cmd {
                Command::SetControlsEnabled(on) => {
                    run.controls.push(on);
                    Vec::new()
                }
                Command::LockFocus => seq.on_focus_locked().unwrap(),
                Command::LockExposure => {
                    run.exposure_locks += 1;
                    seq.on_exposure_locked(sample).unwrap()
                }
                Command::PrepareSequence => seq.begin_sequence(&caps(), context()).unwrap(),
                Command::Capture(plan) => {
                    run.shots.push(plan);
                    let outcome = if failing.contains(&plan.ordinal) {
                        CaptureOutcome::NoOutput {
                            reason: "sensor fault".into(),
                        }
                    } else {
                        written()
                    };
                    seq.on_capture_complete(&outcome).unwrap()
                }
                Command::Progress(p) => {
                    run.progress.push(p);
                    Vec::new()
                }
                Command::Completed(summary) => {
                    run.summary = Some(summary);
                    Vec::new()
                }
                Command::Failed(reason) => {
                    run.failure = Some(reason);
                    Vec::new()
                }
            };
            pending.extend(next);
        }
        run
    }

    fn list(entries: &[SettingEntry]) -> SettingList {
        entries.iter().copied().collect()
    }

    #[test]
    fn mixed_list_runs_in_order() {
        let mut seq = BracketSequencer::new(list(&[
            SettingEntry::auto(1).unwrap(),
            SettingEntry::manual(100.0, 0.1, 2).unwrap(),
        ]));
        let run = drive(&mut seq, CaptureMode::Manual, &[]);

        assert_eq!(run.shots.len(), 3);
        assert_eq!(run.shots[0].kind, ShotKind::Auto);
        assert_eq!(
            run.shots[1].kind,
            ShotKind::Manual {
                iso: 100.0,
                exposure_seconds: 0.1
            }
        );
        assert_eq!(run.shots[2].kind, ShotKind::Repeat);
        assert_eq!(
            run.shots.iter().map(|s| s.ordinal).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        // The auto entry re-locks exposure in manual mode
        assert_eq!(run.exposure_locks, 1);

        let summary = run.summary.unwrap();
        assert_eq!(summary.total_completed, 3);
        assert_eq!(summary.total_planned, 3);
        assert_eq!(summary.written, 3);
        assert_eq!(seq.phase(), &Phase::Finished);
    }

    #[test]
    fn shot_count_matches_total_repeats() {
        let mut seq = BracketSequencer::new(list(&[
            SettingEntry::manual(100.0, 0.1, 3).unwrap(),
            SettingEntry::manual(200.0, 0.05, 1).unwrap(),
            SettingEntry::manual(400.0, 0.02, 4).unwrap(),
        ]));
        let run = drive(&mut seq, CaptureMode::Manual, &[]);
        assert_eq!(run.shots.len(), 8);
        assert_eq!(run.summary.unwrap().total_completed, 8);

        // Repeats of one setting run before the next setting
        let order: Vec<(usize, u32)> = run
            .shots
            .iter()
            .map(|s| (s.setting_index, s.repeat_index))
            .collect();
        assert_eq!(
            order,
            vec![(0, 0), (0, 1), (0, 2), (1, 0), (2, 0), (2, 1), (2, 2), (2, 3)]
        );
    }

    #[test]
    fn empty_manual_list_falls_back_to_auto() {
        let mut seq = BracketSequencer::new(SettingList::new());
        let run = drive(&mut seq, CaptureMode::Manual, &[]);
        assert_eq!(run.shots.len(), 1);
        assert_eq!(run.shots[0].kind, ShotKind::Auto);
        assert_eq!(seq.settings().len(), 1);
    }

    #[test]
    fn auto_exposure_expands_nine_entries() {
        let mut seq = BracketSequencer::new(list(&[SettingEntry::manual(100.0, 0.1, 5).unwrap()]));
        let run = drive(&mut seq, CaptureMode::AutoExposure, &[]);

        // The user list is replaced: one auto shot, then the 3×3 bracket
        assert_eq!(seq.settings().len(), 10);
        assert_eq!(run.shots.len(), 10);
        assert_eq!(run.shots[0].kind, ShotKind::Auto);
        assert_eq!(
            run.shots[1].kind,
            ShotKind::Manual {
                iso: 100.0,
                exposure_seconds: 0.005
            }
        );
        match run.shots[9].kind {
            ShotKind::Manual {
                iso,
                exposure_seconds,
            } => {
                assert_eq!(iso, 600.0);
                assert!((exposure_seconds - 0.02).abs() < 1e-12);
            }
            other => panic!("unexpected {other:?}"),
        }
        // Only the initial lock; the auto shot does not re-lock in this mode
        assert_eq!(run.exposure_locks, 1);
    }

    #[test]
    fn range_error_fails_before_any_capture() {
        let mut seq = BracketSequencer::new(list(&[
            SettingEntry::manual(100.0, 0.1, 1).unwrap(),
            SettingEntry::manual(1000.0, 0.1, 1).unwrap(),
        ]));
        let run = drive(&mut seq, CaptureMode::Manual, &[]);

        assert!(run.shots.is_empty());
        match run.failure {
            Some(FailureReason::Range(v)) => {
                assert_eq!(v.entry_index, 1);
                assert_eq!(v.value, 1000.0);
            }
            other => panic!("expected range failure, got {other:?}"),
        }
        // Controls disabled at start, re-enabled on failure
        assert_eq!(run.controls, vec![false, true]);

        let state = seq.state();
        assert_eq!(state.setting_index, 0);
        assert_eq!(state.within_setting_index, 0);
        assert_eq!(state.total_completed, 0);
        assert!(matches!(state.phase, Phase::Failed(FailureReason::Range(_))));
    }

    #[test]
    fn unusable_device_bounds_are_a_configuration_error() {
        let mut seq = BracketSequencer::new(list(&[SettingEntry::manual(100.0, 0.1, 1).unwrap()]));
        seq.start(CaptureMode::Manual).unwrap();
        seq.on_focus_locked().unwrap();

        let inverted = DeviceCapabilities {
            min_iso: 800.0,
            max_iso: 50.0,
            ..caps()
        };
        let result = seq.begin_sequence(&inverted, context());
        assert!(matches!(result, Err(BracketError::Configuration(_))));
        assert_eq!(seq.phase(), &Phase::Idle);
        assert!(!seq.is_active());
        assert!(seq.context().is_none());
    }

    #[test]
    fn shot_count_overflow_is_rejected() {
        let mut seq = BracketSequencer::new(list(&[
            SettingEntry::manual(100.0, 0.1, u32::MAX).unwrap(),
            SettingEntry::manual(200.0, 0.1, 2).unwrap(),
        ]));
        seq.start(CaptureMode::Manual).unwrap();
        seq.on_focus_locked().unwrap();

        let result = seq.begin_sequence(&caps(), context());
        assert!(matches!(result, Err(BracketError::InvalidSetting(_))));
        assert_eq!(seq.phase(), &Phase::Idle);
        assert_eq!(seq.state().total_planned, 0);
    }

    #[test]
    fn failed_shots_still_advance() {
        let mut seq = BracketSequencer::new(list(&[SettingEntry::manual(100.0, 0.1, 3).unwrap()]));
        let run = drive(&mut seq, CaptureMode::Manual, &[2]);
        let summary = run.summary.unwrap();
        assert_eq!(summary.total_completed, 3);
        assert_eq!(summary.written, 2);
        assert_eq!(summary.skipped, 1);
    }

    #[test]
    fn progress_reaches_one() {
        let mut seq = BracketSequencer::new(list(&[SettingEntry::manual(100.0, 0.1, 4).unwrap()]));
        let run = drive(&mut seq, CaptureMode::Manual, &[]);
        assert_eq!(run.progress, vec![0.0, 0.25, 0.5, 0.75, 1.0]);
        assert_eq!(run.controls, vec![false, true]);
    }

    #[test]
    fn cancel_resets_state() {
        let mut seq = BracketSequencer::new(list(&[SettingEntry::manual(100.0, 0.1, 3).unwrap()]));
        seq.start(CaptureMode::Manual).unwrap();
        seq.on_focus_locked().unwrap();
        seq.begin_sequence(&caps(), context()).unwrap();
        seq.on_capture_complete(&written()).unwrap();
        assert_eq!(seq.state().total_completed, 1);

        let commands = seq.cancel();
        assert_eq!(
            commands,
            vec![
                Command::SetControlsEnabled(true),
                Command::Failed(FailureReason::Cancelled)
            ]
        );
        let state = seq.state();
        assert_eq!(state.setting_index, 0);
        assert_eq!(state.within_setting_index, 0);
        assert_eq!(state.total_completed, 0);
        assert!(seq.context().is_none());
    }

    #[test]
    fn cancel_when_idle_is_noop() {
        let mut seq = BracketSequencer::default();
        assert!(seq.cancel().is_empty());
        assert_eq!(seq.phase(), &Phase::Idle);
    }

    #[test]
    fn settings_locked_during_sequence() {
        let mut seq = BracketSequencer::new(list(&[SettingEntry::manual(100.0, 0.1, 1).unwrap()]));
        seq.start(CaptureMode::Manual).unwrap();
        assert!(matches!(
            seq.settings_mut(),
            Err(BracketError::SequenceInProgress)
        ));
        assert!(matches!(
            seq.start(CaptureMode::Manual),
            Err(BracketError::SequenceInProgress)
        ));

        seq.cancel();
        assert!(seq.settings_mut().is_ok());
    }

    #[test]
    fn unexpected_callbacks_are_rejected() {
        let mut seq = BracketSequencer::default();
        assert!(seq.on_focus_locked().is_err());
        assert!(seq.on_capture_complete(&written()).is_err());
        assert!(seq.begin_sequence(&caps(), context()).is_err());
    }

    #[test]
    fn context_frozen_for_whole_sequence() {
        let mut seq = BracketSequencer::new(list(&[SettingEntry::manual(100.0, 0.1, 2).unwrap()]));
        seq.start(CaptureMode::Manual).unwrap();
        seq.on_focus_locked().unwrap();
        seq.begin_sequence(&caps(), context()).unwrap();
        let first = seq.context().cloned();
        seq.on_capture_complete(&written()).unwrap();
        assert_eq!(seq.context().cloned(), first);

        let commands = seq.on_capture_complete(&written()).unwrap();
        let summary = commands
            .into_iter()
            .find_map(|c| match c {
                Command::Completed(s) => Some(s),
                _ => None,
            })
            .unwrap();
        assert_eq!(Some(summary.context), first);
        assert!(seq.context().is_none());
    }
}
