//! # vidgif
//!
//! Turn the first seconds of a video into an animated GIF.
//!
//! `vidgif` samples a short clip (at most 5 seconds) at a chosen frame rate,
//! draws every sample onto a native-resolution raster, and hands the frames
//! to an encoder that quantizes them with
//! [`imagequant`](https://crates.io/crates/imagequant) and writes them with
//! the [`gif`](https://crates.io/crates/gif) crate. Animated GIF input is
//! decoded with the `image` crate; any other video goes through FFmpeg via
//! [`ffmpeg-next`](https://crates.io/crates/ffmpeg-next) when the `ffmpeg`
//! feature is enabled.
//!
//! ## Quick Start
//!
//! ### Convert a File
//!
//! ```no_run
//! use vidgif::{ConvertOptions, QualityOptions};
//!
//! let quality = QualityOptions::new().with_frame_rate(10).with_size_percent(50);
//! let saved = vidgif::convert_file("clip.mp4", ".", quality, ConvertOptions::new()).unwrap();
//! println!("saved {}", saved.display());
//! ```
//!
//! ### Drive a Session
//!
//! ```no_run
//! use vidgif::{Session, SessionEvent};
//!
//! let mut session = Session::new();
//! session.set_option("dither", "1").unwrap();
//! session.select_file("clip.mp4").unwrap();
//!
//! match session.wait(None) {
//!     Some(SessionEvent::Ready(preview)) => {
//!         println!("{}x{}, {} frames", preview.width, preview.height, preview.frame_count);
//!         session.download(".").unwrap();
//!     }
//!     Some(SessionEvent::Failed { error, .. }) => eprintln!("{error}"),
//!     None => {}
//! }
//! ```
//!
//! ### Plan the Samples
//!
//! ```
//! use std::time::Duration;
//!
//! let timestamps = vidgif::sample_timestamps(Duration::from_millis(3200), 8);
//! assert_eq!(timestamps.len(), 25);
//! ```
//!
//! ## Features
//!
//! - **Deterministic sampling**: `floor(min(D, 5) × F)` frames at `i / F`
//! - **Bounded waits**: readiness polling and per-seek timeouts, no retries
//! - **Run generations**: a new file selection supersedes the run in flight
//! - **Owned resources**: every object URL is revoked exactly once, on every
//!   exit path
//! - **Pluggable encoder**: the [`EncoderBackend`] capability, with
//!   [`GifBackend`] as the default
//! - **Progress reporting**: phase messages and per-frame snapshots through
//!   [`ProgressCallback`]
//!
//! ### Optional Features
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `ffmpeg` | Video input through FFmpeg (needs the FFmpeg development libraries) |
//! | `async` | `convert_async` and a status `Stream` via Tokio |
//! | `full` | Enables all of the above |

pub mod convert;
pub mod encoder;
pub mod error;
pub mod media;
pub mod options;
pub mod output;
pub mod progress;
pub mod renderer;
pub mod resource;
pub mod run;
pub mod sampler;
pub mod session;
#[cfg(feature = "async")]
pub mod stream;

pub use convert::{
    Conversion, Converter, ENCODING_MESSAGE, LOADING_MESSAGE, convert_file, sampling_message,
};
pub use encoder::{
    AnimationEncoder, EncodedOutput, EncoderAdapter, EncoderBackend, EncoderSettings,
    FrameOptions, GifBackend,
};
pub use error::{ConvertError, FailureKind};
#[cfg(feature = "ffmpeg")]
pub use media::ffmpeg::{FfmpegLogLevel, set_ffmpeg_log_level};
#[cfg(feature = "ffmpeg")]
pub use media::FfmpegMedia;
pub use media::{
    DefaultLoader, GifMedia, LoadedMedia, MediaHandle, MediaInfo, MediaLoader, ReadyState,
    SeekOutcome, load_media,
};
pub use options::{
    ConvertOptions, DEFAULT_DIMENSIONS, DEFAULT_MAX_DURATION, DEFAULT_SEEK_TIMEOUT, DelayPolicy,
    QualityOptions,
};
pub use output::{DOWNLOAD_FILE_NAME, OutputManager, Preview};
pub use progress::{OperationType, ProgressCallback, ProgressInfo};
pub use renderer::Surface;
pub use resource::{Blob, ObjectUrl, ObjectUrls, UrlGuard};
pub use run::{Generation, RunPhase, RunToken};
pub use sampler::{FrameSampler, sample_timestamps, sample_timestamps_within};
pub use session::{Session, SessionEvent};
#[cfg(feature = "async")]
pub use stream::{ConversionFuture, StatusEvent, StatusStream, convert_async};
