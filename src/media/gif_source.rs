//! Animated GIF input.
//!
//! [`GifMedia`] decodes every frame up front with the `image` crate and lays
//! them out on a timeline using their delays. Seeks settle immediately and
//! land on the frame being displayed at the requested time, which makes
//! the backend handy for re-encoding GIFs at another size or frame rate.

use std::fs;
use std::io::{BufRead, Cursor, Seek};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use image::codecs::gif::GifDecoder;
use image::{AnimationDecoder, ImageDecoder, ImageError, RgbaImage};

use crate::error::ConvertError;
use crate::media::{MediaHandle, MediaInfo, ReadyState, SeekOutcome};

/// Browsers play delays below this at [`FALLBACK_DELAY`].
const MIN_PLAYABLE_DELAY: Duration = Duration::from_millis(20);
const FALLBACK_DELAY: Duration = Duration::from_millis(100);

struct TimedFrame {
    start: Duration,
    image: RgbaImage,
}

/// A fully decoded animated GIF.
pub struct GifMedia {
    frames: Vec<TimedFrame>,
    info: MediaInfo,
    loaded: bool,
    current: Option<usize>,
    seek_pending: bool,
}

impl GifMedia {
    /// Decode the GIF at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ConvertError::Load`] if the file cannot be read or is not a
    /// valid GIF.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ConvertError> {
        let path = path.as_ref();
        let load_error = |reason: String| ConvertError::Load {
            path: path.to_path_buf(),
            reason,
        };
        let bytes = fs::read(path).map_err(|error| load_error(error.to_string()))?;
        Self::decode(Cursor::new(bytes)).map_err(|error| load_error(error.to_string()))
    }

    /// Decode a GIF held in memory.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, ConvertError> {
        Self::decode(Cursor::new(bytes)).map_err(|error| ConvertError::Load {
            path: PathBuf::from("<memory>"),
            reason: error.to_string(),
        })
    }

    fn decode<R: BufRead + Seek>(reader: R) -> Result<Self, ImageError> {
        let decoder = GifDecoder::new(reader)?;
        let (width, height) = decoder.dimensions();
        let decoded = decoder.into_frames().collect_frames()?;

        let mut frames = Vec::with_capacity(decoded.len());
        let mut start = Duration::ZERO;
        for frame in decoded {
            let (numerator, denominator) = frame.delay().numer_denom_ms();
            let mut delay = Duration::from_secs_f64(
                f64::from(numerator) / f64::from(denominator.max(1)) / 1000.0,
            );
            if delay < MIN_PLAYABLE_DELAY {
                delay = FALLBACK_DELAY;
            }
            frames.push(TimedFrame {
                start,
                image: frame.into_buffer(),
            });
            start += delay;
        }

        log::debug!(
            "Decoded GIF: {} frames, {width}x{height}, {:?}",
            frames.len(),
            start
        );

        Ok(Self {
            frames,
            info: MediaInfo {
                duration: start,
                width,
                height,
            },
            loaded: false,
            current: None,
            seek_pending: false,
        })
    }

    /// Number of frames in the animation.
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    fn frame_index_at(&self, position: Duration) -> Option<usize> {
        let after = self.frames.partition_point(|frame| frame.start <= position);
        after.checked_sub(1)
    }
}

impl MediaHandle for GifMedia {
    fn wait_loaded(&mut self) -> Result<(), ConvertError> {
        if self.frames.is_empty() {
            return Err(ConvertError::Load {
                path: PathBuf::from("<gif>"),
                reason: "animation has no frames".to_string(),
            });
        }
        self.loaded = true;
        self.current = Some(0);
        Ok(())
    }

    fn info(&self) -> MediaInfo {
        self.info
    }

    fn ready_state(&self) -> ReadyState {
        if self.loaded {
            ReadyState::HaveEnoughData
        } else {
            ReadyState::HaveMetadata
        }
    }

    fn seek(&mut self, position: Duration) -> Result<(), ConvertError> {
        self.current = self.frame_index_at(position).or(Some(0));
        self.seek_pending = true;
        Ok(())
    }

    fn wait_seeked(&mut self, timeout: Duration) -> Result<SeekOutcome, ConvertError> {
        if std::mem::take(&mut self.seek_pending) {
            Ok(SeekOutcome::Settled)
        } else {
            // Nothing was requested, so no acknowledgement can arrive.
            thread::sleep(timeout);
            Ok(SeekOutcome::TimedOut)
        }
    }

    fn current_frame(&self) -> Option<&RgbaImage> {
        self.current
            .and_then(|index| self.frames.get(index))
            .map(|frame| &frame.image)
    }
}
