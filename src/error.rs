//! Error types for the `vidgif` crate.
//!
//! This module defines [`ConvertError`], the unified error type returned by
//! every fallible operation in the crate, and [`FailureKind`], the coarse
//! classification recorded in [`RunPhase::Failed`](crate::RunPhase::Failed).
//! Errors carry enough context (paths, 1-based frame numbers, upstream
//! messages) to diagnose a failed run without additional logging.

use std::{io::Error as IoError, path::PathBuf, time::Duration};

use image::ImageError;
use thiserror::Error;

/// The unified error type for all `vidgif` operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConvertError {
    /// The media decoder rejected the input before any frame was read.
    #[error("Failed to load media {path}: {reason}")]
    Load {
        /// Path of the selected input file.
        path: PathBuf,
        /// Underlying reason reported by the decoder.
        reason: String,
    },

    /// The media handle never reported enough data to start sampling.
    #[error("Media was not ready after {attempts} readiness checks")]
    NotReady {
        /// How many times readiness was polled before giving up.
        attempts: u32,
    },

    /// A seek did not settle within the per-frame timeout.
    #[error("Frame {frame} did not settle within {timeout:?}")]
    SeekTimeout {
        /// 1-based index of the frame that timed out.
        frame: usize,
        /// The timeout that elapsed.
        timeout: Duration,
    },

    /// The decoder failed after the media had loaded.
    #[error("Failed to decode video frame: {0}")]
    Decode(String),

    /// The encoder failed or finished without producing output.
    #[error("GIF encoding error: {0}")]
    Encode(String),

    /// A newer run started while this one was in flight.
    #[error("Run {generation} was superseded by a newer file selection")]
    Superseded {
        /// Generation number of the abandoned run.
        generation: u64,
    },

    /// A quality option could not be parsed.
    #[error("Invalid value {value:?} for option {name}: {reason}")]
    InvalidOption {
        /// Option name as given by the caller.
        name: String,
        /// The rejected value.
        value: String,
        /// Why it was rejected.
        reason: String,
    },

    /// An I/O error occurred while reading input or writing output.
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// An error from the `image` crate while decoding or resizing frames.
    #[error("Image processing error: {0}")]
    Image(#[from] ImageError),

    /// An error originating from the FFmpeg libraries.
    #[cfg(feature = "ffmpeg")]
    #[error("FFmpeg error: {0}")]
    Ffmpeg(String),

    /// A background conversion task panicked or was cancelled.
    #[error("Conversion task failed: {0}")]
    TaskFailed(String),
}

/// Coarse classification of a failed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// The input could not be loaded or never became ready.
    Load,
    /// A sample seek timed out.
    SeekTimeout,
    /// Decoding failed mid-run.
    Decode,
    /// Encoding failed or produced no output.
    Encode,
    /// A newer run replaced this one.
    Superseded,
    /// Invalid configuration.
    Configuration,
    /// Reading or writing files failed.
    Io,
}

impl ConvertError {
    /// Classify this error for the run state machine.
    pub fn kind(&self) -> FailureKind {
        match self {
            ConvertError::Load { .. } | ConvertError::NotReady { .. } => FailureKind::Load,
            ConvertError::SeekTimeout { .. } => FailureKind::SeekTimeout,
            ConvertError::Decode(_) | ConvertError::Image(_) => FailureKind::Decode,
            ConvertError::Encode(_) => FailureKind::Encode,
            ConvertError::Superseded { .. } => FailureKind::Superseded,
            ConvertError::InvalidOption { .. } => FailureKind::Configuration,
            ConvertError::Io(_) => FailureKind::Io,
            #[cfg(feature = "ffmpeg")]
            ConvertError::Ffmpeg(_) => FailureKind::Decode,
            ConvertError::TaskFailed(_) => FailureKind::Encode,
        }
    }
}

impl From<imagequant::Error> for ConvertError {
    fn from(error: imagequant::Error) -> Self {
        ConvertError::Encode(format!("quantization failed: {error}"))
    }
}

impl From<gif::EncodingError> for ConvertError {
    fn from(error: gif::EncodingError) -> Self {
        match error {
            gif::EncodingError::Io(error) => ConvertError::Io(error),
            other => ConvertError::Encode(other.to_string()),
        }
    }
}

#[cfg(feature = "ffmpeg")]
impl From<ffmpeg_next::Error> for ConvertError {
    fn from(error: ffmpeg_next::Error) -> Self {
        ConvertError::Ffmpeg(error.to_string())
    }
}
