//! The animation encoder capability.
//!
//! Encoding is modelled as configure → append frames → render, ending in a
//! single terminal result. [`EncoderBackend`] is the seam: the default
//! [`GifBackend`] quantizes with `imagequant` and writes with the `gif`
//! crate, and tests substitute recording backends. [`EncoderAdapter`] sits
//! between a run and a backend; it assigns per-frame delays, forwards
//! progress and turns a missing result into [`ConvertError::Encode`].

use std::sync::{Arc, Mutex};
use std::time::Duration;

use image::RgbaImage;

use crate::error::ConvertError;
use crate::options::{ConvertOptions, DelayPolicy, QualityOptions};
use crate::progress::{OperationType, ProgressCallback, ProgressTracker};

pub mod gif;

pub use self::gif::GifBackend;

/// Everything a backend is configured with at the start of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncoderSettings {
    /// Parallel worker count.
    pub workers: usize,
    /// Quantization precision, 1–30, smaller is better.
    pub quality: u8,
    /// Output width (native width × size%).
    pub width: u32,
    /// Output height (native height × size%).
    pub height: u32,
    /// Sampling frame rate the frames were captured at.
    pub frame_rate: u32,
    /// Whether to dither.
    pub dither: bool,
    /// Repeat count, `None` to loop forever.
    pub repeat: Option<u16>,
}

impl EncoderSettings {
    /// Settings for a source of `native` size under the given options.
    pub fn new(quality: &QualityOptions, native: (u32, u32), options: &ConvertOptions) -> Self {
        let (width, height) = quality.output_dimensions(native.0, native.1);
        Self {
            workers: options.workers,
            quality: quality.quality,
            width,
            height,
            frame_rate: quality.frame_rate,
            dither: quality.dither,
            repeat: options.repeat,
        }
    }
}

/// Per-frame instructions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameOptions {
    /// How long the frame is displayed.
    pub delay: Duration,
}

/// One configured encoding job.
///
/// Frames are borrowed for the duration of [`add_frame`](Self::add_frame)
/// only; implementations keep their own copy.
pub trait AnimationEncoder: Send {
    /// Append a copy of `frame`.
    fn add_frame(&mut self, frame: &RgbaImage, options: FrameOptions) -> Result<(), ConvertError>;

    /// Frames appended so far.
    fn frame_count(&self) -> usize;

    /// Encode everything appended, reporting completion fractions in
    /// `0.0..=1.0` to `progress`. `Ok(None)` means no output was produced.
    fn render(
        self: Box<Self>,
        progress: &(dyn Fn(f32) + Sync),
    ) -> Result<Option<Vec<u8>>, ConvertError>;
}

/// Factory for [`AnimationEncoder`]s.
pub trait EncoderBackend: Send + Sync {
    /// Start a new encoding job.
    fn configure(&self, settings: &EncoderSettings)
    -> Result<Box<dyn AnimationEncoder>, ConvertError>;
}

/// A finished animation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedOutput {
    data: Arc<[u8]>,
    width: u32,
    height: u32,
    frame_count: usize,
}

impl EncodedOutput {
    /// Wrap encoded bytes.
    pub fn new(data: Vec<u8>, width: u32, height: u32, frame_count: usize) -> Self {
        Self {
            data: Arc::from(data),
            width,
            height,
            frame_count,
        }
    }

    /// The encoded bytes.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Shared handle to the bytes.
    pub fn shared_data(&self) -> Arc<[u8]> {
        Arc::clone(&self.data)
    }

    /// Output width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Output height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Number of frames in the animation.
    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    /// Size in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// `true` if no bytes were produced.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Bridges one run to an [`AnimationEncoder`].
pub struct EncoderAdapter {
    encoder: Box<dyn AnimationEncoder>,
    settings: EncoderSettings,
    delays: Vec<Duration>,
}

impl EncoderAdapter {
    /// Configure `backend` for `planned_frames` frames, with delays taken
    /// from `policy`.
    pub fn start(
        backend: &dyn EncoderBackend,
        settings: EncoderSettings,
        policy: DelayPolicy,
        planned_frames: usize,
    ) -> Result<Self, ConvertError> {
        log::debug!("Configuring encoder: {settings:?}, {policy:?}, {planned_frames} frames");
        let encoder = backend.configure(&settings)?;
        let delays = policy.frame_delays(planned_frames, settings.frame_rate);
        Ok(Self {
            encoder,
            settings,
            delays,
        })
    }

    /// The settings the backend was configured with.
    pub fn settings(&self) -> &EncoderSettings {
        &self.settings
    }

    /// Append the frame sampled at `index`.
    pub fn add(&mut self, index: usize, frame: &RgbaImage) -> Result<(), ConvertError> {
        let delay = self
            .delays
            .get(index)
            .or_else(|| self.delays.last())
            .copied()
            .unwrap_or(Duration::from_millis(100));
        self.encoder.add_frame(frame, FrameOptions { delay })
    }

    /// Render and wait for the single terminal result.
    ///
    /// # Errors
    ///
    /// Returns [`ConvertError::Encode`] if the backend fails or finishes
    /// without output.
    pub fn finish(
        self,
        callback: Arc<dyn ProgressCallback>,
        generation: u64,
    ) -> Result<EncodedOutput, ConvertError> {
        let frame_count = self.encoder.frame_count();
        let tracker = Mutex::new(ProgressTracker::new(
            callback,
            OperationType::Encoding,
            generation,
            Some(frame_count as u64),
            1,
        ));

        let report = |fraction: f32| {
            if let Ok(mut tracker) = tracker.lock() {
                tracker.set_fraction(fraction);
            }
        };
        let data = self.encoder.render(&report)?;

        if let Ok(mut tracker) = tracker.lock() {
            tracker.finish();
        }

        let data = data.ok_or_else(|| {
            ConvertError::Encode("encoder finished without producing output".to_string())
        })?;
        log::debug!(
            "Encoded {frame_count} frames into {} bytes ({}x{})",
            data.len(),
            self.settings.width,
            self.settings.height
        );

        Ok(EncodedOutput::new(
            data,
            self.settings.width,
            self.settings.height,
            frame_count,
        ))
    }
}
