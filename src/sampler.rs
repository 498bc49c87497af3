//! Frame sampling.
//!
//! The sampler turns a loaded [`MediaHandle`] into a fixed sequence of
//! frames: it plans `floor(min(D, ceiling) × F)` timestamps spaced `1/F`
//! apart, seeks to each in turn and hands every settled frame to a caller
//! supplied sink. A seek that does not settle in time stops the whole run;
//! nothing is retried.

use std::thread;
use std::time::Duration;

use image::RgbaImage;

use crate::error::ConvertError;
use crate::media::{MediaHandle, SeekOutcome};
use crate::options::{ConvertOptions, DEFAULT_MAX_DURATION};
use crate::progress::{OperationType, ProgressTracker};
use crate::run::RunToken;

/// Sample timestamps for a source of `duration` at `frame_rate`, using the
/// default 5 s ceiling.
///
/// # Example
///
/// ```
/// use std::time::Duration;
///
/// let timestamps = vidgif::sample_timestamps(Duration::from_millis(3200), 8);
/// assert_eq!(timestamps.len(), 25);
/// assert_eq!(timestamps.last(), Some(&Duration::from_secs(3)));
/// ```
pub fn sample_timestamps(duration: Duration, frame_rate: u32) -> Vec<Duration> {
    sample_timestamps_within(duration, DEFAULT_MAX_DURATION, frame_rate)
}

/// Sample timestamps for a source of `duration`, sampled for at most
/// `ceiling`.
///
/// Yields `floor(min(duration, ceiling) × frame_rate)` timestamps at
/// `i / frame_rate`, each within `[0, min(duration, ceiling))`. A zero
/// frame rate yields nothing.
pub fn sample_timestamps_within(
    duration: Duration,
    ceiling: Duration,
    frame_rate: u32,
) -> Vec<Duration> {
    let usable = duration.min(ceiling);
    if frame_rate == 0 || usable.is_zero() {
        return Vec::new();
    }

    let count = usable.as_nanos() * u128::from(frame_rate) / 1_000_000_000;
    let last_valid = usable - Duration::from_nanos(1);

    (0..count as u64)
        .map(|index| (Duration::from_secs(index) / frame_rate).min(last_valid))
        .collect()
}

/// Drives a [`MediaHandle`] through a planned list of timestamps.
pub struct FrameSampler<'a> {
    options: &'a ConvertOptions,
    token: &'a RunToken,
}

impl<'a> FrameSampler<'a> {
    /// Create a sampler for one run.
    pub fn new(options: &'a ConvertOptions, token: &'a RunToken) -> Self {
        Self { options, token }
    }

    /// Rewind to zero and poll until the handle can render.
    ///
    /// # Errors
    ///
    /// Returns [`ConvertError::NotReady`] when the handle is still not ready
    /// after the configured number of polls.
    pub fn wait_until_ready(&self, handle: &mut dyn MediaHandle) -> Result<(), ConvertError> {
        handle.seek(Duration::ZERO)?;

        let attempts = self.options.ready_poll_attempts;
        for attempt in 1..=attempts {
            if handle.ready_state().can_render() {
                log::debug!("Media ready after {attempt} check(s)");
                return Ok(());
            }
            self.token.ensure_current()?;
            thread::sleep(self.options.ready_poll_interval);
        }

        if handle.ready_state().can_render() {
            return Ok(());
        }
        Err(ConvertError::NotReady { attempts })
    }

    /// Seek to every timestamp and pass each settled frame to `on_frame`
    /// along with its 0-based index and timestamp.
    ///
    /// Returns the number of frames delivered.
    ///
    /// # Errors
    ///
    /// - [`ConvertError::SeekTimeout`] with the 1-based index of the first
    ///   frame whose seek did not settle in time.
    /// - [`ConvertError::Superseded`] once a newer run has begun.
    /// - Any error returned by the handle or by `on_frame`.
    pub fn sample<F>(
        &self,
        handle: &mut dyn MediaHandle,
        timestamps: &[Duration],
        mut on_frame: F,
    ) -> Result<usize, ConvertError>
    where
        F: FnMut(usize, Duration, &RgbaImage) -> Result<(), ConvertError>,
    {
        self.wait_until_ready(handle)?;

        let mut tracker = ProgressTracker::new(
            self.options.progress.clone(),
            OperationType::FrameSampling,
            self.token.id(),
            Some(timestamps.len() as u64),
            self.options.batch_size,
        );

        for (index, &timestamp) in timestamps.iter().enumerate() {
            self.token.ensure_current()?;

            handle.seek(timestamp)?;
            if handle.wait_seeked(self.options.seek_timeout)? == SeekOutcome::TimedOut {
                log::warn!(
                    "Seek to {timestamp:?} (frame {}) did not settle within {:?}",
                    index + 1,
                    self.options.seek_timeout
                );
                return Err(ConvertError::SeekTimeout {
                    frame: index + 1,
                    timeout: self.options.seek_timeout,
                });
            }

            if !handle.ready_state().can_render() {
                thread::sleep(self.options.settle_grace);
            }
            self.token.ensure_current()?;

            let frame = handle.current_frame().ok_or_else(|| {
                ConvertError::Decode(format!("no frame available at {timestamp:?}"))
            })?;
            on_frame(index, timestamp, frame)?;
            tracker.advance(Some(timestamp));
        }

        tracker.finish();
        Ok(timestamps.len())
    }
}
