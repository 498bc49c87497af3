//! Media loading.
//!
//! A [`MediaHandle`] is a seekable source of decoded frames: it reports how
//! much data it has ([`ReadyState`]), accepts a seek, and later announces
//! that the seek settled. Loaders turn a selected file into a handle;
//! [`load_media`] wraps the file in an [`ObjectUrl`](crate::ObjectUrl), opens
//! it, and waits for the first frame.
//!
//! Two backends ship with the crate:
//!
//! - [`GifMedia`] decodes animated GIF input with the `image` crate.
//! - `FfmpegMedia` decodes any video FFmpeg understands, on a dedicated
//!   decoder thread (feature `ffmpeg`).

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

use image::RgbaImage;

use crate::error::ConvertError;
use crate::resource::{Blob, ObjectUrl, ObjectUrls, UrlGuard};

#[cfg(feature = "ffmpeg")]
pub mod ffmpeg;
pub mod gif_source;

#[cfg(feature = "ffmpeg")]
pub use ffmpeg::FfmpegMedia;
pub use gif_source::GifMedia;

/// How much of the media is available at the current position.
///
/// Ordered like the HTML media ready states: a handle can render the
/// current position once it reaches [`ReadyState::HaveCurrentData`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ReadyState {
    /// Nothing is known yet.
    HaveNothing = 0,
    /// Duration and dimensions are known, no frame is decoded.
    HaveMetadata = 1,
    /// The frame at the current position is decoded.
    HaveCurrentData = 2,
    /// The current frame and some following data are decoded.
    HaveFutureData = 3,
    /// Everything needed for playback is available.
    HaveEnoughData = 4,
}

impl ReadyState {
    /// Decode from the raw value stored by threaded backends.
    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            0 => ReadyState::HaveNothing,
            1 => ReadyState::HaveMetadata,
            2 => ReadyState::HaveCurrentData,
            3 => ReadyState::HaveFutureData,
            _ => ReadyState::HaveEnoughData,
        }
    }

    /// `true` once the current position can be drawn.
    pub fn can_render(self) -> bool {
        self >= ReadyState::HaveCurrentData
    }
}

/// What a handle knows about its source once loaded.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MediaInfo {
    /// Full duration of the source.
    pub duration: Duration,
    /// Native frame width, `0` when unknown.
    pub width: u32,
    /// Native frame height, `0` when unknown.
    pub height: u32,
}

impl MediaInfo {
    /// Duration clamped to `ceiling`.
    pub fn usable_duration(&self, ceiling: Duration) -> Duration {
        self.duration.min(ceiling)
    }

    /// Native dimensions, falling back to `default` when either is unknown.
    pub fn dimensions_or(&self, default: (u32, u32)) -> (u32, u32) {
        if self.width == 0 || self.height == 0 {
            default
        } else {
            (self.width, self.height)
        }
    }
}

/// Result of waiting for a seek.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekOutcome {
    /// The handle acknowledged the new position.
    Settled,
    /// No acknowledgement arrived in time.
    TimedOut,
}

/// A seekable, silent, paused source of decoded frames.
///
/// Handles never play on their own and never decode audio; they only move
/// when [`seek`](MediaHandle::seek) is called.
pub trait MediaHandle: Send {
    /// Block until the first frame is decoded.
    ///
    /// # Errors
    ///
    /// Returns [`ConvertError::Load`] when the decoder rejects the source.
    fn wait_loaded(&mut self) -> Result<(), ConvertError>;

    /// Duration and native size. Only meaningful after
    /// [`wait_loaded`](MediaHandle::wait_loaded) succeeded.
    fn info(&self) -> MediaInfo;

    /// How much data is available at the current position.
    fn ready_state(&self) -> ReadyState;

    /// Start moving to `position`. Completion is observed through
    /// [`wait_seeked`](MediaHandle::wait_seeked).
    fn seek(&mut self, position: Duration) -> Result<(), ConvertError>;

    /// Wait up to `timeout` for the most recent seek to settle.
    fn wait_seeked(&mut self, timeout: Duration) -> Result<SeekOutcome, ConvertError>;

    /// The frame at the settled position, if one is decoded.
    fn current_frame(&self) -> Option<&RgbaImage>;
}

/// Opens a selected file as a [`MediaHandle`].
pub trait MediaLoader: Send + Sync {
    /// Create a handle for `blob`. The handle may still be loading when
    /// this returns.
    fn open(&self, blob: &Blob) -> Result<Box<dyn MediaHandle>, ConvertError>;
}

/// Picks a backend by sniffing the file's first bytes.
///
/// GIF input (`GIF87a`/`GIF89a`) goes to [`GifMedia`]. Everything else goes
/// to FFmpeg when the `ffmpeg` feature is enabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultLoader;

impl MediaLoader for DefaultLoader {
    fn open(&self, blob: &Blob) -> Result<Box<dyn MediaHandle>, ConvertError> {
        let path = match blob {
            Blob::File(path) => path,
            Blob::Bytes { data, .. } => {
                return Ok(Box::new(GifMedia::from_bytes(data.to_vec())?));
            }
        };

        if sniff_gif(path)? {
            log::debug!("Opening {} with the GIF decoder", path.display());
            return Ok(Box::new(GifMedia::open(path)?));
        }

        open_video(path)
    }
}

#[cfg(feature = "ffmpeg")]
fn open_video(path: &Path) -> Result<Box<dyn MediaHandle>, ConvertError> {
    log::debug!("Opening {} with FFmpeg", path.display());
    Ok(Box::new(FfmpegMedia::open(path)?))
}

#[cfg(not(feature = "ffmpeg"))]
fn open_video(path: &Path) -> Result<Box<dyn MediaHandle>, ConvertError> {
    Err(ConvertError::Load {
        path: path.to_path_buf(),
        reason: "not a GIF; video input requires the `ffmpeg` feature".to_string(),
    })
}

fn sniff_gif(path: &Path) -> Result<bool, ConvertError> {
    let mut file = File::open(path).map_err(|error| ConvertError::Load {
        path: path.to_path_buf(),
        reason: error.to_string(),
    })?;
    let mut magic = [0_u8; 6];
    let mut filled = 0;
    while filled < magic.len() {
        let read = file.read(&mut magic[filled..])?;
        if read == 0 {
            break;
        }
        filled += read;
    }
    Ok(&magic[..filled] == b"GIF87a" || &magic[..filled] == b"GIF89a")
}

/// A loaded handle together with the object URL it was opened from.
///
/// Dropping it revokes the URL, so the source is released on every path
/// out of a run; the success path releases it explicitly through
/// [`OutputManager::install`](crate::OutputManager::install).
pub struct LoadedMedia {
    handle: Box<dyn MediaHandle>,
    source: UrlGuard,
    path: PathBuf,
}

impl LoadedMedia {
    /// The decoded source.
    pub fn handle(&self) -> &dyn MediaHandle {
        self.handle.as_ref()
    }

    /// Mutable access for seeking.
    pub fn handle_mut(&mut self) -> &mut dyn MediaHandle {
        self.handle.as_mut()
    }

    /// URL of the source blob, `None` once released.
    pub fn source_url(&self) -> Option<&ObjectUrl> {
        self.source.url()
    }

    /// Path of the selected file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Release the source URL; the handle is dropped with `self`.
    pub fn release(mut self) {
        self.source.release();
    }
}

/// Wrap `path` in an object URL, open it with `loader`, and wait until the
/// first frame is available.
///
/// # Errors
///
/// Returns [`ConvertError::Load`] if the file cannot be opened or decoded.
/// The source URL is revoked before the error is returned.
pub fn load_media(
    loader: &dyn MediaLoader,
    urls: &ObjectUrls,
    path: &Path,
) -> Result<LoadedMedia, ConvertError> {
    let blob = Blob::file(path);
    let source = UrlGuard::create(urls, blob.clone());
    log::debug!(
        "Loading {} as {}",
        path.display(),
        source.url().map(ToString::to_string).unwrap_or_default()
    );

    let mut handle = loader.open(&blob)?;
    handle.wait_loaded()?;

    let info = handle.info();
    log::debug!(
        "Loaded {}: {:?}, {}x{}",
        path.display(),
        info.duration,
        info.width,
        info.height
    );

    Ok(LoadedMedia {
        handle,
        source,
        path: path.to_path_buf(),
    })
}
