//! An interactive conversion session.
//!
//! [`Session`] is the long-lived owner behind a picker-and-sliders UI: the
//! live [`QualityOptions`], the run [`Generation`] counter and the single
//! [`OutputManager`] slot. Each file selection starts a run on its own
//! thread with a snapshot of the options; the outcome comes back over a
//! channel and is applied by [`poll`](Session::poll) or
//! [`wait`](Session::wait) on the caller's thread, which is the only writer
//! of the output slot. Outcomes and status reports from superseded runs are
//! dropped.
//!
//! # Example
//!
//! ```no_run
//! use vidgif::{Session, SessionEvent};
//!
//! let mut session = Session::new();
//! session.set_option("frameRate", "12")?;
//! session.select_file("clip.mp4")?;
//!
//! if let Some(SessionEvent::Ready(preview)) = session.wait(None) {
//!     println!("preview at {}", preview.url);
//!     session.download(".")?;
//! }
//! # Ok::<(), vidgif::ConvertError>(())
//! ```

use std::path::{Path, PathBuf};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{
    Arc, Mutex, MutexGuard,
    mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError},
};
use std::thread;
use std::time::{Duration, Instant};

use crate::convert::{Conversion, Converter};
use crate::error::ConvertError;
use crate::options::QualityOptions;
use crate::output::{OutputManager, Preview};
use crate::progress::{ProgressCallback, ProgressInfo};
use crate::run::{Generation, RunPhase, RunToken};

/// What a finished run did to the session.
#[derive(Debug)]
pub enum SessionEvent {
    /// The run's output is installed and can be downloaded.
    Ready(Preview),
    /// The run failed; the output slot is unchanged.
    Failed {
        /// Generation of the failed run.
        generation: u64,
        /// Why it failed.
        error: ConvertError,
    },
}

struct RunOutcome {
    token: RunToken,
    result: Result<Conversion, ConvertError>,
}

#[derive(Debug, Clone, Copy)]
struct PhaseState {
    generation: u64,
    phase: RunPhase,
}

/// Records the current run's phase and forwards its reports; reports from
/// superseded runs are swallowed.
struct PhaseRecorder {
    inner: Arc<dyn ProgressCallback>,
    generation: Generation,
    state: Arc<Mutex<PhaseState>>,
}

impl PhaseRecorder {
    /// Start a new run and reset the recorded phase in one step.
    fn begin(&self) -> RunToken {
        let mut state = self.lock_state();
        let token = self.generation.begin();
        *state = PhaseState {
            generation: token.id(),
            phase: RunPhase::Idle,
        };
        token
    }

    /// Record `phase` if `generation` is still the newest run. The check
    /// and the write happen under the same lock as [`begin`](Self::begin).
    fn record(&self, generation: u64, phase: RunPhase) -> bool {
        let mut state = self.lock_state();
        if state.generation != generation || generation != self.generation.current() {
            return false;
        }
        state.phase = phase;
        true
    }

    fn phase(&self) -> RunPhase {
        self.lock_state().phase
    }

    fn lock_state(&self) -> MutexGuard<'_, PhaseState> {
        // The state is a plain copy; a poisoned lock still holds a valid one.
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ProgressCallback for PhaseRecorder {
    fn on_progress(&self, info: &ProgressInfo) {
        if info.generation == self.generation.current() {
            self.inner.on_progress(info);
        }
    }

    fn on_phase(&self, generation: u64, phase: &RunPhase, message: &str) {
        if !self.record(generation, *phase) {
            log::debug!("Ignoring {phase:?} from superseded run {generation}");
            return;
        }
        self.inner.on_phase(generation, phase, message);
    }
}

/// Live options, the run counter and the output slot.
pub struct Session {
    converter: Converter,
    recorder: Arc<PhaseRecorder>,
    quality: QualityOptions,
    outputs: OutputManager,
    sender: Sender<RunOutcome>,
    receiver: Receiver<RunOutcome>,
    in_flight: Option<u64>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    /// A session using the default [`Converter`].
    pub fn new() -> Self {
        Self::with_converter(Converter::new())
    }

    /// A session running conversions with `converter`.
    ///
    /// The converter's progress callback keeps receiving reports, filtered
    /// to the newest run.
    pub fn with_converter(converter: Converter) -> Self {
        let generation = Generation::new();
        let recorder = Arc::new(PhaseRecorder {
            inner: converter.options().progress.clone(),
            generation,
            state: Arc::new(Mutex::new(PhaseState {
                generation: 0,
                phase: RunPhase::Idle,
            })),
        });
        let options = converter
            .options()
            .clone()
            .with_progress(recorder.clone());
        let converter = converter.with_options(options);
        let outputs = OutputManager::new(converter.urls().clone());
        let (sender, receiver) = mpsc::channel();

        Self {
            converter,
            recorder,
            quality: QualityOptions::default(),
            outputs,
            sender,
            receiver,
            in_flight: None,
        }
    }

    /// The options the next run will use.
    pub fn options(&self) -> QualityOptions {
        self.quality
    }

    /// Edit the options for the next run.
    pub fn options_mut(&mut self) -> &mut QualityOptions {
        &mut self.quality
    }

    /// Update one option from control input and return its new label.
    ///
    /// Runs already started keep the options they were started with.
    ///
    /// # Errors
    ///
    /// Returns [`ConvertError::InvalidOption`] for unknown names or bad
    /// values.
    pub fn set_option(&mut self, name: &str, value: &str) -> Result<String, ConvertError> {
        self.quality.set(name, value)?;
        Ok(self.quality.label(name).unwrap_or_default())
    }

    /// Start converting `path`, superseding any run in flight.
    ///
    /// Clears the current output, so downloading is disabled until the new
    /// run succeeds. Returns the new run's generation.
    ///
    /// # Errors
    ///
    /// Returns [`ConvertError::Io`] if the run thread cannot be spawned.
    pub fn select_file<P: AsRef<Path>>(&mut self, path: P) -> Result<u64, ConvertError> {
        self.outputs.clear();

        self.in_flight = None;

        let token = self.recorder.begin();
        let generation = token.id();

        let path: PathBuf = path.as_ref().to_path_buf();
        let quality = self.quality;
        let converter = self.converter.clone();
        let sender = self.sender.clone();
        let recorder = Arc::clone(&self.recorder);

        log::debug!(
            "Starting run {generation} for {} with {quality:?}",
            path.display()
        );
        thread::Builder::new()
            .name(format!("vidgif-run-{generation}"))
            .spawn(move || {
                let result = panic::catch_unwind(AssertUnwindSafe(|| {
                    converter.run(&path, quality, &token)
                }))
                .unwrap_or_else(|payload| {
                    let error = ConvertError::TaskFailed(panic_message(payload.as_ref()));
                    log::error!("Run {generation} panicked: {error}");
                    recorder.record(generation, RunPhase::Failed(error.kind()));
                    Err(error)
                });
                // The session may be gone; its teardown already superseded us.
                let _ = sender.send(RunOutcome { token, result });
            })?;

        self.in_flight = Some(generation);
        Ok(generation)
    }

    /// Apply any finished outcome without blocking.
    pub fn poll(&mut self) -> Option<SessionEvent> {
        loop {
            match self.receiver.try_recv() {
                Ok(outcome) => {
                    if let Some(event) = self.apply(outcome) {
                        return Some(event);
                    }
                }
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => return None,
            }
        }
    }

    /// Block until the current run finishes, or `timeout` elapses.
    ///
    /// Returns `None` immediately when no run is in flight.
    pub fn wait(&mut self, timeout: Option<Duration>) -> Option<SessionEvent> {
        let deadline = timeout.map(|timeout| Instant::now() + timeout);
        while self.in_flight.is_some() {
            let outcome = match deadline {
                None => self.receiver.recv().ok()?,
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    match self.receiver.recv_timeout(remaining) {
                        Ok(outcome) => outcome,
                        Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => {
                            return None;
                        }
                    }
                }
            };
            if let Some(event) = self.apply(outcome) {
                return Some(event);
            }
        }
        None
    }

    fn apply(&mut self, outcome: RunOutcome) -> Option<SessionEvent> {
        let generation = outcome.token.id();
        if !outcome.token.is_current() {
            // Dropping the outcome releases its source URL; its output never
            // gets one.
            log::debug!("Discarding outcome of superseded run {generation}");
            return None;
        }
        self.in_flight = None;

        match outcome.result {
            Ok(conversion) => {
                let (output, media) = conversion.into_parts();
                let preview = self.outputs.install(output, media).clone();
                self.recorder.on_phase(generation, &RunPhase::Ready, "");
                Some(SessionEvent::Ready(preview))
            }
            Err(error) => Some(SessionEvent::Failed { generation, error }),
        }
    }

    /// Phase of the newest run.
    pub fn phase(&self) -> RunPhase {
        self.recorder.phase()
    }

    /// Generation of the newest run, `0` before the first selection.
    pub fn generation(&self) -> u64 {
        self.recorder.generation.current()
    }

    /// Whether a run is still in flight.
    pub fn is_running(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Whether the download action is enabled.
    pub fn can_download(&self) -> bool {
        self.outputs.can_download()
    }

    /// The current preview.
    pub fn preview(&self) -> Option<&Preview> {
        self.outputs.preview()
    }

    /// Save the live output into `dir`. `Ok(None)` when nothing is live.
    pub fn download<P: AsRef<Path>>(&self, dir: P) -> Result<Option<PathBuf>, ConvertError> {
        self.outputs.download_to(dir)
    }

    /// The converter runs are started with.
    pub fn converter(&self) -> &Converter {
        &self.converter
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|message| (*message).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "run thread panicked".to_string())
}

impl Drop for Session {
    fn drop(&mut self) {
        // Supersede whatever is in flight so it stops at its next check.
        self.recorder.generation.begin();
    }
}
