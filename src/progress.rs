//! Progress and status reporting.
//!
//! This module provides [`ProgressCallback`] for observing a conversion: the
//! human-readable phase messages of the status line
//! ([`on_phase`](ProgressCallback::on_phase)) and per-frame
//! [`ProgressInfo`] snapshots while sampling and encoding
//! ([`on_progress`](ProgressCallback::on_progress)).
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use vidgif::{ConvertOptions, ProgressCallback, ProgressInfo, RunPhase};
//!
//! struct PrintProgress;
//!
//! impl ProgressCallback for PrintProgress {
//!     fn on_phase(&self, generation: u64, phase: &RunPhase, message: &str) {
//!         println!("[run {generation}] {phase:?}: {message}");
//!     }
//!
//!     fn on_progress(&self, info: &ProgressInfo) {
//!         if let Some(pct) = info.percentage {
//!             println!("[{:?}] {pct:.1}% complete", info.operation);
//!         }
//!     }
//! }
//!
//! let options = ConvertOptions::new().with_progress(Arc::new(PrintProgress));
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::run::RunPhase;

/// The kind of work currently in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum OperationType {
    /// Seeking the source and capturing frames.
    FrameSampling,
    /// Quantizing and writing the animation.
    Encoding,
}

/// A snapshot of conversion progress.
///
/// Delivered to [`ProgressCallback::on_progress`] at a cadence controlled
/// by [`ConvertOptions::with_batch_size`](crate::ConvertOptions::with_batch_size).
#[derive(Debug, Clone)]
pub struct ProgressInfo {
    /// What kind of work is being performed.
    pub operation: OperationType,
    /// Generation of the run this report belongs to.
    pub generation: u64,
    /// How many frames have been processed so far.
    pub current: u64,
    /// Total frames expected, if known ahead of time.
    pub total: Option<u64>,
    /// Completion percentage (0.0 – 100.0), if `total` is known.
    pub percentage: Option<f32>,
    /// Wall-clock time elapsed since the operation started.
    pub elapsed: Duration,
    /// Estimated time remaining, based on current throughput.
    pub estimated_remaining: Option<Duration>,
    /// The source timestamp of the frame just captured (sampling only).
    pub current_timestamp: Option<Duration>,
}

/// Trait for receiving status and progress updates during a conversion.
///
/// Implementations must be [`Send`] and [`Sync`]: runs execute on worker
/// threads and the encoder reports from its quantization pool.
///
/// Callbacks are **infallible**: they observe but cannot halt the run.
pub trait ProgressCallback: Send + Sync {
    /// Called at regular intervals while frames are sampled or encoded.
    fn on_progress(&self, info: &ProgressInfo);

    /// Called whenever the run enters a new phase, with the status text.
    fn on_phase(&self, _generation: u64, _phase: &RunPhase, _message: &str) {}
}

/// A no-op implementation that discards all notifications.
///
/// This is the default when no callback is configured.
pub(crate) struct NoOpProgress;

impl ProgressCallback for NoOpProgress {
    fn on_progress(&self, _info: &ProgressInfo) {}
}

/// Internal helper that tracks progress timing and emits callbacks.
pub(crate) struct ProgressTracker {
    callback: Arc<dyn ProgressCallback>,
    operation: OperationType,
    generation: u64,
    total: Option<u64>,
    current: u64,
    batch_size: u64,
    start_time: Instant,
    items_since_last_report: u64,
}

impl ProgressTracker {
    pub(crate) fn new(
        callback: Arc<dyn ProgressCallback>,
        operation: OperationType,
        generation: u64,
        total: Option<u64>,
        batch_size: u64,
    ) -> Self {
        Self {
            callback,
            operation,
            generation,
            total,
            current: 0,
            batch_size: batch_size.max(1),
            start_time: Instant::now(),
            items_since_last_report: 0,
        }
    }

    /// Record one completed frame and fire the callback if the batch
    /// threshold is reached.
    pub(crate) fn advance(&mut self, timestamp: Option<Duration>) {
        self.current += 1;
        self.items_since_last_report += 1;

        if self.items_since_last_report >= self.batch_size {
            self.report(timestamp);
            self.items_since_last_report = 0;
        }
    }

    /// Move to a completion fraction reported by the encoder (0.0 – 1.0).
    pub(crate) fn set_fraction(&mut self, fraction: f32) {
        if let Some(total) = self.total {
            let current = (fraction.clamp(0.0, 1.0) * total as f32).round() as u64;
            if current != self.current {
                self.current = current;
                self.report(None);
            }
        }
    }

    /// Unconditionally emit a final progress report.
    pub(crate) fn finish(&mut self) {
        self.report(None);
    }

    fn report(&self, timestamp: Option<Duration>) {
        let elapsed = self.start_time.elapsed();

        let percentage = self
            .total
            .filter(|&t| t > 0)
            .map(|t| (self.current as f32 / t as f32) * 100.0);

        let estimated_remaining = if self.current > 0 {
            self.total.map(|t| {
                let remaining = t.saturating_sub(self.current);
                let per_item = elapsed / self.current as u32;
                per_item * remaining as u32
            })
        } else {
            None
        };

        let info = ProgressInfo {
            operation: self.operation,
            generation: self.generation,
            current: self.current,
            total: self.total,
            percentage,
            elapsed,
            estimated_remaining,
            current_timestamp: timestamp,
        };

        self.callback.on_progress(&info);
    }
}
