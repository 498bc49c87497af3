//! Conversion configuration.
//!
//! [`QualityOptions`] holds the four user-facing knobs (colour precision,
//! frame rate, output size, dithering). It is `Copy`: a run snapshots it when
//! it starts, so editing the live options never affects a run in flight.
//!
//! [`ConvertOptions`] is a builder that threads the operational settings
//! (duration ceiling, timeouts, delay policy, worker count, progress
//! callback) through a conversion without polluting every signature.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//!
//! use vidgif::{ConvertOptions, DelayPolicy, QualityOptions};
//!
//! let mut quality = QualityOptions::default();
//! quality.set("frameRate", "12").unwrap();
//! quality.set("dither", "1").unwrap();
//! assert_eq!(quality.label("frameRate").as_deref(), Some("Frame rate (12)"));
//!
//! let options = ConvertOptions::new()
//!     .with_seek_timeout(Duration::from_secs(3))
//!     .with_delay_policy(DelayPolicy::Fixed(Duration::from_millis(100)));
//! ```

use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::sync::Arc;
use std::time::Duration;

use crate::error::ConvertError;
use crate::progress::{NoOpProgress, ProgressCallback};

/// Longest stretch of source video that is ever sampled.
pub const DEFAULT_MAX_DURATION: Duration = Duration::from_secs(5);
/// How long a single seek may take before the run fails.
pub const DEFAULT_SEEK_TIMEOUT: Duration = Duration::from_secs(2);
/// Extra wait after a seek settles on a handle that is still buffering.
pub const DEFAULT_SETTLE_GRACE: Duration = Duration::from_millis(100);
/// Interval between readiness checks before the first sample.
pub const DEFAULT_READY_POLL_INTERVAL: Duration = Duration::from_millis(50);
/// Readiness checks before giving up (40 × 50 ms = 2 s).
pub const DEFAULT_READY_POLL_ATTEMPTS: u32 = 40;
/// Quantization threads used by the encoder.
pub const DEFAULT_WORKERS: usize = 2;
/// Raster size used when the source does not report its dimensions.
pub const DEFAULT_DIMENSIONS: (u32, u32) = (640, 360);

const QUALITY_RANGE: (u8, u8) = (1, 30);
const FRAME_RATE_RANGE: (u32, u32) = (1, 30);
const SIZE_RANGE: (u32, u32) = (1, 100);

/// User-facing quality settings for the next conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QualityOptions {
    /// Colour quantization precision, 1–30. Smaller is better and slower.
    pub quality: u8,
    /// Frames sampled per second of source video, 1–30.
    pub frame_rate: u32,
    /// Output size as a percentage of the native video size, 1–100.
    pub size_percent: u32,
    /// Whether the quantizer dithers.
    pub dither: bool,
}

impl Default for QualityOptions {
    fn default() -> Self {
        Self {
            quality: 10,
            frame_rate: 8,
            size_percent: 100,
            dither: false,
        }
    }
}

impl QualityOptions {
    /// Create the default settings (quality 10, 8 fps, 100%, no dither).
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the colour precision, clamped to 1–30.
    #[must_use]
    pub fn with_quality(mut self, quality: u8) -> Self {
        self.quality = quality.clamp(QUALITY_RANGE.0, QUALITY_RANGE.1);
        self
    }

    /// Set the sampling frame rate, clamped to 1–30.
    #[must_use]
    pub fn with_frame_rate(mut self, frame_rate: u32) -> Self {
        self.frame_rate = frame_rate.clamp(FRAME_RATE_RANGE.0, FRAME_RATE_RANGE.1);
        self
    }

    /// Set the output size percentage, clamped to 1–100.
    #[must_use]
    pub fn with_size_percent(mut self, size_percent: u32) -> Self {
        self.size_percent = size_percent.clamp(SIZE_RANGE.0, SIZE_RANGE.1);
        self
    }

    /// Enable or disable dithering.
    #[must_use]
    pub fn with_dither(mut self, dither: bool) -> Self {
        self.dither = dither;
        self
    }

    /// Update one option from control input.
    ///
    /// Accepts the control names `quality`, `frameRate` (or `frame_rate`,
    /// `fps`), `size` (or `size_percent`) and `dither`. Numeric values are
    /// clamped into range; `dither` accepts `1`/`0`, `true`/`false` and
    /// `on`/`off`.
    ///
    /// # Errors
    ///
    /// Returns [`ConvertError::InvalidOption`] for an unknown name or a value
    /// that does not parse.
    pub fn set(&mut self, name: &str, value: &str) -> Result<(), ConvertError> {
        let invalid = |reason: &str| ConvertError::InvalidOption {
            name: name.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        };
        let trimmed = value.trim();

        match canonical_name(name) {
            Some("quality") => {
                let parsed: u32 = trimmed.parse().map_err(|_| invalid("expected an integer"))?;
                let clamped = parsed.clamp(QUALITY_RANGE.0 as u32, QUALITY_RANGE.1 as u32);
                *self = self.with_quality(clamped as u8);
            }
            Some("frameRate") => {
                let parsed: u32 = trimmed.parse().map_err(|_| invalid("expected an integer"))?;
                *self = self.with_frame_rate(parsed);
            }
            Some("size") => {
                let parsed: u32 = trimmed
                    .trim_end_matches('%')
                    .parse()
                    .map_err(|_| invalid("expected a percentage"))?;
                *self = self.with_size_percent(parsed);
            }
            Some("dither") => {
                let parsed = match trimmed.to_ascii_lowercase().as_str() {
                    "1" | "true" | "on" | "yes" => true,
                    "0" | "false" | "off" | "no" => false,
                    _ => return Err(invalid("expected 1/0, true/false or on/off")),
                };
                *self = self.with_dither(parsed);
            }
            _ => return Err(invalid("unknown option")),
        }

        log::debug!("Quality option {name} set to {value:?}: {self:?}");
        Ok(())
    }

    /// Human-readable label for a control, showing its current value.
    ///
    /// Returns `None` for unknown control names.
    pub fn label(&self, name: &str) -> Option<String> {
        let label = match canonical_name(name)? {
            "quality" => format!("Quality ({})", self.quality),
            "frameRate" => format!("Frame rate ({})", self.frame_rate),
            "size" => format!("Size ({}%)", self.size_percent),
            "dither" => format!("Dither ({})", if self.dither { "on" } else { "off" }),
            _ => return None,
        };
        Some(label)
    }

    /// Output dimensions for a source of the given native size.
    ///
    /// Each side is `round(native × size%)`, never less than one pixel.
    pub fn output_dimensions(&self, native_width: u32, native_height: u32) -> (u32, u32) {
        let scale = f64::from(self.size_percent) / 100.0;
        let width = (f64::from(native_width) * scale).round() as u32;
        let height = (f64::from(native_height) * scale).round() as u32;
        (width.max(1), height.max(1))
    }
}

fn canonical_name(name: &str) -> Option<&'static str> {
    match name {
        "quality" => Some("quality"),
        "frameRate" | "frame_rate" | "fps" => Some("frameRate"),
        "size" | "size_percent" => Some("size"),
        "dither" => Some("dither"),
        _ => None,
    }
}

/// How long each GIF frame is displayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DelayPolicy {
    /// Derive the display time from the sampling frame rate (`1/F` per
    /// frame, accumulated in GIF centiseconds so the total stays exact).
    #[default]
    FrameRate,
    /// Show every frame for the same fixed time, regardless of frame rate.
    Fixed(Duration),
}

impl DelayPolicy {
    /// Display time of each of `count` frames sampled at `frame_rate`.
    ///
    /// GIF delays are whole centiseconds; with [`DelayPolicy::FrameRate`]
    /// the rounding error is carried from frame to frame, so 8 fps yields
    /// alternating 120/130 ms delays rather than a drifting 130 ms.
    pub fn frame_delays(&self, count: usize, frame_rate: u32) -> Vec<Duration> {
        match *self {
            DelayPolicy::Fixed(delay) => vec![delay; count],
            DelayPolicy::FrameRate => {
                let frame_rate = f64::from(frame_rate.max(1));
                let centiseconds =
                    |index: usize| (index as f64 * 100.0 / frame_rate).round() as u64;
                (0..count)
                    .map(|index| {
                        let delay = centiseconds(index + 1).saturating_sub(centiseconds(index));
                        Duration::from_millis(delay.max(1) * 10)
                    })
                    .collect()
            }
        }
    }
}

/// Operational settings for a conversion run.
///
/// All fields have defaults matching the fixed constants of the browser
/// tool this crate models: a 5 s duration ceiling, a 2 s seek timeout, a
/// 100 ms settle grace, two encoder workers.
#[derive(Clone)]
pub struct ConvertOptions {
    pub(crate) max_duration: Duration,
    pub(crate) seek_timeout: Duration,
    pub(crate) settle_grace: Duration,
    pub(crate) ready_poll_interval: Duration,
    pub(crate) ready_poll_attempts: u32,
    pub(crate) delay_policy: DelayPolicy,
    pub(crate) workers: usize,
    pub(crate) repeat: Option<u16>,
    pub(crate) default_dimensions: (u32, u32),
    pub(crate) progress: Arc<dyn ProgressCallback>,
    pub(crate) batch_size: u64,
}

impl Debug for ConvertOptions {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("ConvertOptions")
            .field("max_duration", &self.max_duration)
            .field("seek_timeout", &self.seek_timeout)
            .field("settle_grace", &self.settle_grace)
            .field("ready_poll_interval", &self.ready_poll_interval)
            .field("ready_poll_attempts", &self.ready_poll_attempts)
            .field("delay_policy", &self.delay_policy)
            .field("workers", &self.workers)
            .field("repeat", &self.repeat)
            .field("default_dimensions", &self.default_dimensions)
            .field("has_progress", &true)
            .field("batch_size", &self.batch_size)
            .finish()
    }
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl ConvertOptions {
    /// Create options with the default settings.
    pub fn new() -> Self {
        Self {
            max_duration: DEFAULT_MAX_DURATION,
            seek_timeout: DEFAULT_SEEK_TIMEOUT,
            settle_grace: DEFAULT_SETTLE_GRACE,
            ready_poll_interval: DEFAULT_READY_POLL_INTERVAL,
            ready_poll_attempts: DEFAULT_READY_POLL_ATTEMPTS,
            delay_policy: DelayPolicy::default(),
            workers: DEFAULT_WORKERS,
            repeat: None,
            default_dimensions: DEFAULT_DIMENSIONS,
            progress: Arc::new(NoOpProgress),
            batch_size: 1,
        }
    }

    /// Set the longest stretch of source video to sample.
    #[must_use]
    pub fn with_max_duration(mut self, max_duration: Duration) -> Self {
        self.max_duration = max_duration;
        self
    }

    /// Set the per-frame seek timeout.
    #[must_use]
    pub fn with_seek_timeout(mut self, timeout: Duration) -> Self {
        self.seek_timeout = timeout;
        self
    }

    /// Set the grace delay applied after a seek settles on a buffering handle.
    #[must_use]
    pub fn with_settle_grace(mut self, grace: Duration) -> Self {
        self.settle_grace = grace;
        self
    }

    /// Set how readiness is polled before the first sample.
    ///
    /// `attempts` is clamped to a minimum of 1.
    #[must_use]
    pub fn with_ready_polling(mut self, interval: Duration, attempts: u32) -> Self {
        self.ready_poll_interval = interval;
        self.ready_poll_attempts = attempts.max(1);
        self
    }

    /// Set how per-frame display delays are derived.
    #[must_use]
    pub fn with_delay_policy(mut self, policy: DelayPolicy) -> Self {
        self.delay_policy = policy;
        self
    }

    /// Set the encoder's worker thread count. Clamped to a minimum of 1.
    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Set the repeat count. `None` means loop forever.
    #[must_use]
    pub fn with_repeat(mut self, repeat: Option<u16>) -> Self {
        self.repeat = repeat;
        self
    }

    /// Set the raster size used when the source reports no dimensions.
    #[must_use]
    pub fn with_default_dimensions(mut self, width: u32, height: u32) -> Self {
        self.default_dimensions = (width.max(1), height.max(1));
        self
    }

    /// Attach a progress callback.
    #[must_use]
    pub fn with_progress(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress = callback;
        self
    }

    /// Set how often per-frame progress fires. Clamped to a minimum of 1.
    #[must_use]
    pub fn with_batch_size(mut self, size: u64) -> Self {
        self.batch_size = size.max(1);
        self
    }

    /// The duration ceiling.
    pub fn max_duration(&self) -> Duration {
        self.max_duration
    }

    /// The per-frame seek timeout.
    pub fn seek_timeout(&self) -> Duration {
        self.seek_timeout
    }

    /// The configured delay policy.
    pub fn delay_policy(&self) -> DelayPolicy {
        self.delay_policy
    }

    /// The encoder worker count.
    pub fn workers(&self) -> usize {
        self.workers
    }
}
