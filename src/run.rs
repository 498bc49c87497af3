//! Run lifecycle: the phase state machine and run generations.
//!
//! Every file selection starts a fresh run from [`RunPhase::Idle`]. Runs are
//! numbered by a shared [`Generation`] counter; each run holds a
//! [`RunToken`] and can ask whether it is still the newest run. Work that
//! belongs to a superseded run is discarded instead of touching shared
//! state.
//!
//! # Example
//!
//! ```
//! use vidgif::Generation;
//!
//! let generation = Generation::new();
//! let first = generation.begin();
//! assert!(first.is_current());
//!
//! let second = generation.begin();
//! assert!(!first.is_current());
//! assert!(second.is_current());
//! ```

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use crate::error::{ConvertError, FailureKind};

/// Where a conversion run currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    /// No work started yet.
    Idle,
    /// Opening the source and waiting for its first frame.
    Loading,
    /// Seeking and capturing frames.
    Sampling,
    /// Quantizing and writing the animation.
    Encoding,
    /// The output is installed and can be downloaded.
    Ready,
    /// The run stopped with an error.
    Failed(FailureKind),
}

impl RunPhase {
    /// `Ready` and `Failed` end a run.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunPhase::Ready | RunPhase::Failed(_))
    }

    /// Whether the state machine allows moving from `self` to `next`.
    ///
    /// The happy path is `Idle → Loading → Sampling → Encoding → Ready`;
    /// every non-terminal phase may fail.
    pub fn can_transition_to(&self, next: RunPhase) -> bool {
        match (self, next) {
            (RunPhase::Idle, RunPhase::Loading)
            | (RunPhase::Loading, RunPhase::Sampling)
            | (RunPhase::Sampling, RunPhase::Encoding)
            | (RunPhase::Encoding, RunPhase::Ready) => true,
            (current, RunPhase::Failed(_)) => !current.is_terminal(),
            _ => false,
        }
    }
}

/// Shared run counter. Cloning shares the counter.
#[derive(Debug, Clone, Default)]
pub struct Generation {
    latest: Arc<AtomicU64>,
}

impl Generation {
    /// Create a counter with no runs started.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new run, superseding every earlier token.
    pub fn begin(&self) -> RunToken {
        let id = self.latest.fetch_add(1, Ordering::AcqRel) + 1;
        RunToken {
            id,
            latest: Arc::clone(&self.latest),
        }
    }

    /// Generation number of the newest run, `0` before the first.
    pub fn current(&self) -> u64 {
        self.latest.load(Ordering::Acquire)
    }
}

/// Identity of one run, checked cooperatively at every suspension point.
#[derive(Debug, Clone)]
pub struct RunToken {
    id: u64,
    latest: Arc<AtomicU64>,
}

impl RunToken {
    /// A token for a standalone run that is never superseded.
    pub fn detached() -> Self {
        Generation::new().begin()
    }

    /// This run's generation number.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// `true` while no newer run has begun.
    pub fn is_current(&self) -> bool {
        self.latest.load(Ordering::Acquire) == self.id
    }

    /// Fail with [`ConvertError::Superseded`] once a newer run has begun.
    pub(crate) fn ensure_current(&self) -> Result<(), ConvertError> {
        if self.is_current() {
            Ok(())
        } else {
            Err(ConvertError::Superseded {
                generation: self.id,
            })
        }
    }
}
