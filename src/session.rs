use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, watch};

use crate::capture::{CaptureEvent, CaptureOutcome, CaptureRequest, CaptureTask, RequestId};
use crate::device::{
    CaptureDevice, ConfigurationLock, DeviceSnapshot, ExposureMode, FocusMode, PhotoOutput,
};
use crate::error::BracketError;
use crate::exif::MetadataEditor;
use crate::naming::NamingScheme;
use crate::sequencer::{
    BracketSequencer, CaptureMode, Command, FailureReason, SequenceSummary, ShotKind, ShotPlan,
};
use crate::settings::{ExposureSample, SettingList};
use crate::store::FileStore;

/// Tunables of a session.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub jpeg_quality: u8,
    /// Bound on each focus/exposure change.
    pub operation_timeout: Duration,
    /// Bound on one capture, from request to the last payload.
    pub capture_timeout: Duration,
    pub user_comment: String,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            jpeg_quality: 92,
            operation_timeout: Duration::from_secs(5),
            capture_timeout: Duration::from_secs(10),
            user_comment: crate::exif::DEFAULT_USER_COMMENT.to_string(),
        }
    }
}

/// Fire-and-forget notifications for the UI.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    ControlsEnabled(bool),
    /// Fraction of planned shots completed, in `[0, 1]`.
    Progress(f32),
    ShotFinished {
        ordinal: u32,
        outcome: CaptureOutcome,
    },
    Finished(SequenceSummary),
    Failed(FailureReason),
}

/// Aborts a running session from any task.
#[derive(Debug, Clone)]
pub struct AbortHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl AbortHandle {
    pub fn abort(&self) {
        self.tx.send_replace(true);
    }
}

/// Drives a [`BracketSequencer`] against a real device.
///
/// The session performs each [`Command`] in order, waits on the device with a
/// bounded timeout, owns the in-flight capture registry and publishes
/// [`SessionEvent`]s for the UI. It runs one sequence at a time.
///
/// ```rust,no_run
/// use bracket_raw::device::SimulatedCamera;
/// use bracket_raw::naming::NamingScheme;
/// use bracket_raw::sequencer::CaptureMode;
/// use bracket_raw::session::{BracketSession, SessionOptions};
/// use bracket_raw::settings::{SettingEntry, SettingList};
/// use bracket_raw::store::LocalStore;
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let camera = Arc::new(SimulatedCamera::builder().build());
///     let mut settings = SettingList::new();
///     settings.push(SettingEntry::manual(100.0, 0.1, 2)?);
///
///     let (mut session, mut events) = BracketSession::new(
///         camera.clone(),
///         camera,
///         Arc::new(LocalStore),
///         NamingScheme::new("ab12cd34", "./captures"),
///         settings,
///         SessionOptions::default(),
///     );
///     tokio::spawn(async move {
///         while let Some(event) = events.recv().await {
///             println!("{event:?}");
///         }
///     });
///
///     let summary = session.run(CaptureMode::Manual).await?;
///     println!("{} of {} shots written", summary.written, summary.total_planned);
///     Ok(())
/// }
/// ```
pub struct BracketSession {
    device: Arc<dyn CaptureDevice>,
    output: Arc<dyn PhotoOutput>,
    store: Arc<dyn FileStore>,
    naming: NamingScheme,
    editor: MetadataEditor,
    options: SessionOptions,
    sequencer: BracketSequencer,
    in_flight: HashMap<RequestId, CaptureTask>,
    next_request_id: RequestId,
    events: mpsc::UnboundedSender<SessionEvent>,
    abort_tx: Arc<watch::Sender<bool>>,
    abort_rx: watch::Receiver<bool>,
}

impl BracketSession {
    pub fn new(
        device: Arc<dyn CaptureDevice>,
        output: Arc<dyn PhotoOutput>,
        store: Arc<dyn FileStore>,
        naming: NamingScheme,
        settings: SettingList,
        options: SessionOptions,
    ) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let (abort_tx, abort_rx) = watch::channel(false);
        let session = Self {
            device,
            output,
            store,
            naming,
            editor: MetadataEditor::new(options.user_comment.clone()),
            options,
            sequencer: BracketSequencer::new(settings),
            in_flight: HashMap::new(),
            next_request_id: 1,
            events,
            abort_tx: Arc::new(abort_tx),
            abort_rx,
        };
        (session, rx)
    }

    pub fn abort_handle(&self) -> AbortHandle {
        AbortHandle {
            tx: self.abort_tx.clone(),
        }
    }

    pub fn sequencer(&self) -> &BracketSequencer {
        &self.sequencer
    }

    pub fn settings_mut(&mut self) -> Result<&mut SettingList, BracketError> {
        self.sequencer.settings_mut()
    }

    /// Captures requested but not yet finalized.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Run one sequence to completion.
    ///
    /// Returns the summary, or the error that ended the sequence
    /// ([`BracketError::RangeValidation`], [`BracketError::Cancelled`] or
    /// [`BracketError::Timeout`]). Per-shot failures do not end the sequence;
    /// they show up as skipped shots in the summary. A device with unusable
    /// bounds is refused with [`BracketError::Configuration`] before anything
    /// is sent to it.
    pub async fn run(&mut self, mode: CaptureMode) -> Result<SequenceSummary, BracketError> {
        self.abort_tx.send_replace(false);

        if let Err(e) = self.device.capabilities().validate() {
            log::error!("{}: {e}", self.device.name());
            return Err(e);
        }
        log::info!("Starting {mode} sequence on {}", self.device.name());

        let mut pending: VecDeque<Command> = self.sequencer.start(mode)?.into();
        while let Some(command) = pending.pop_front() {
            match command {
                Command::SetControlsEnabled(enabled) => self.emit(SessionEvent::ControlsEnabled(enabled)),
                Command::Progress(fraction) => self.emit(SessionEvent::Progress(fraction)),
                Command::Completed(summary) => {
                    self.emit(SessionEvent::Finished(summary.clone()));
                    return Ok(summary);
                }
                Command::Failed(reason) => {
                    self.emit(SessionEvent::Failed(reason.clone()));
                    return Err(reason.into());
                }
                other => {
                    let next = match self.execute(other).await {
                        Ok(next) => next,
                        Err(BracketError::Cancelled) => self.sequencer.cancel(),
                        Err(BracketError::Timeout(op)) => {
                            self.sequencer.fail(FailureReason::Timeout(op))
                        }
                        Err(e) => {
                            log::error!("Sequence stopped: {e}");
                            self.sequencer.cancel();
                            self.in_flight.clear();
                            self.emit(SessionEvent::ControlsEnabled(true));
                            return Err(e);
                        }
                    };
                    pending.extend(next);
                }
            }
        }

        Err(BracketError::invalid_transition(
            "end of commands",
            self.sequencer.phase(),
        ))
    }

    async fn execute(&mut self, command: Command) -> Result<Vec<Command>, BracketError> {
        if *self.abort_rx.borrow() {
            return Err(BracketError::Cancelled);
        }

        match command {
            Command::LockFocus => {
                self.configure("focus", |d| d.set_focus_mode(FocusMode::Locked));
                self.wait_settled("focus lock").await?;
                self.sequencer.on_focus_locked()
            }
            Command::LockExposure => {
                self.configure("exposure", |d| {
                    d.set_exposure_mode(ExposureMode::ContinuousAutoExposure)
                });
                self.wait_settled("exposure lock").await?;
                self.configure("exposure", |d| d.set_exposure_mode(ExposureMode::Locked));
                let sample = ExposureSample {
                    iso: self.device.current_iso(),
                    exposure_seconds: self.device.current_exposure_seconds(),
                };
                self.sequencer.on_exposure_locked(sample)
            }
            Command::PrepareSequence => {
                let context = self.naming.begin_scene(self.store.as_ref(), Utc::now());
                let capabilities = self.device.capabilities();
                self.sequencer.begin_sequence(&capabilities, context)
            }
            Command::Capture(plan) => {
                let outcome = self.capture(plan).await?;
                self.emit(SessionEvent::ShotFinished {
                    ordinal: plan.ordinal,
                    outcome: outcome.clone(),
                });
                self.sequencer.on_capture_complete(&outcome)
            }
            other => Err(BracketError::invalid_transition(
                command_name(&other),
                self.sequencer.phase(),
            )),
        }
    }

    async fn capture(&mut self, plan: ShotPlan) -> Result<CaptureOutcome, BracketError> {
        if let ShotKind::Manual {
            iso,
            exposure_seconds,
        } = plan.kind
        {
            let applied = self.configure("custom exposure", |d| {
                d.set_custom_exposure(exposure_seconds, iso)
            });
            if applied {
                match self.wait_settled("custom exposure").await {
                    Ok(()) => {}
                    Err(BracketError::Cancelled) => return Err(BracketError::Cancelled),
                    Err(e) => log::warn!(
                        "Shot {}: {e}, capturing with the previous exposure",
                        plan.ordinal
                    ),
                }
            }
        }

        let context = self.sequencer.context().cloned().ok_or_else(|| {
            BracketError::invalid_transition("capture", self.sequencer.phase())
        })?;
        let id = self.next_request_id;
        self.next_request_id += 1;
        let request = CaptureRequest {
            id,
            ordinal: plan.ordinal,
            shot: plan.kind,
            snapshot: DeviceSnapshot::of(self.device.as_ref()),
        };
        log::debug!(
            "Shot {}: ISO {} / {}s",
            plan.ordinal,
            request.snapshot.iso,
            request.snapshot.exposure_seconds
        );
        self.in_flight.insert(id, CaptureTask::new(request, context));

        let outcome = self.collect(&request).await;
        self.in_flight.remove(&id);
        outcome
    }

    /// Feed the capture's events into its registered task, then finalize it.
    async fn collect(&mut self, request: &CaptureRequest) -> Result<CaptureOutcome, BracketError> {
        let Some(task) = self.in_flight.get_mut(&request.id) else {
            return Err(BracketError::Capture(format!(
                "request {} is not registered",
                request.id
            )));
        };

        let fed = bounded(
            &self.abort_rx,
            "capture",
            self.options.capture_timeout,
            feed(self.output.as_ref(), request, task, &self.editor),
        )
        .await;

        match fed {
            Ok(Ok(())) => {}
            Ok(Err(e)) => task.record_error(e.to_string()),
            Err(BracketError::Timeout(op)) => {
                log::warn!("Shot {}: {op} timed out", request.ordinal);
                return Ok(task.abandon(format!("{op} timed out")));
            }
            Err(e) => return Err(e),
        }
        Ok(task.finalize(self.store.as_ref(), self.options.jpeg_quality))
    }

    /// Apply a configuration change under the device lock.
    ///
    /// Lock or configuration failures are logged and the change is skipped.
    fn configure(
        &self,
        what: &str,
        apply: impl FnOnce(&dyn CaptureDevice) -> Result<(), BracketError>,
    ) -> bool {
        let device = self.device.as_ref();
        let result = ConfigurationLock::acquire(device).and_then(|_lock| apply(device));
        match result {
            Ok(()) => true,
            Err(e) => {
                log::warn!("Skipping {what} change: {e}");
                false
            }
        }
    }

    async fn wait_settled(&self, op: &str) -> Result<(), BracketError> {
        let settled = bounded(
            &self.abort_rx,
            op,
            self.options.operation_timeout,
            self.device.settled(),
        )
        .await?;
        if let Err(e) = settled {
            log::warn!("{op}: {e}");
        }
        Ok(())
    }

    fn emit(&self, event: SessionEvent) {
        // Nobody listening is fine.
        let _ = self.events.send(event);
    }
}

async fn feed(
    output: &dyn PhotoOutput,
    request: &CaptureRequest,
    task: &mut CaptureTask,
    editor: &MetadataEditor,
) -> Result<(), BracketError> {
    let mut events = output.capture(request).await?;
    while let Some(event) = events.recv().await {
        let finished = matches!(event, CaptureEvent::Finished);
        task.handle(event, editor);
        if finished {
            break;
        }
    }
    Ok(())
}

/// Await `fut` for at most `limit`, or until the abort flag is raised.
async fn bounded<T>(
    abort: &watch::Receiver<bool>,
    op: &str,
    limit: Duration,
    fut: impl Future<Output = T>,
) -> Result<T, BracketError> {
    let mut abort = abort.clone();
    tokio::select! {
        biased;
        _ = async { abort.wait_for(|aborted| *aborted).await.is_ok() } => Err(BracketError::Cancelled),
        res = tokio::time::timeout(limit, fut) => res.map_err(|_| BracketError::Timeout(op.to_string())),
    }
}

fn command_name(command: &Command) -> &'static str {
    match command {
        Command::SetControlsEnabled(_) => "controls update",
        Command::LockFocus => "focus lock",
        Command::LockExposure => "exposure lock",
        Command::PrepareSequence => "sequence preparation",
        Command::Capture(_) => "capture",
        Command::Progress(_) => "progress update",
        Command::Completed(_) => "completion",
        Command::Failed(_) => "failure",
    }
}
