//! Video input through FFmpeg.
//!
//! [`FfmpegMedia`] owns a decoder thread. The handle sends numbered seek
//! commands; the thread seeks to the nearest keyframe, decodes forward to
//! the requested time, converts the frame on screen at that time to RGBA
//! and answers with a `Seeked` event carrying the same number. Answers to
//! seeks that have since been superseded are dropped, so a late frame can
//! never be mistaken for the current one.
//!
//! FFmpeg has its own internal logging, separate from the Rust
//! [`log`](https://crates.io/crates/log) facade; [`set_ffmpeg_log_level`]
//! tunes it.
//!
//! # Example
//!
//! ```no_run
//! use vidgif::{FfmpegLogLevel, FfmpegMedia, MediaHandle};
//!
//! vidgif::set_ffmpeg_log_level(FfmpegLogLevel::Error);
//!
//! let mut media = FfmpegMedia::open("input.mp4")?;
//! media.wait_loaded()?;
//! println!("{:?}", media.info());
//! # Ok::<(), vidgif::ConvertError>(())
//! ```

use std::path::{Path, PathBuf};
use std::sync::{
    Arc,
    atomic::{AtomicU8, AtomicU64, Ordering},
    mpsc::{self, Receiver, RecvTimeoutError, Sender},
};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use ffmpeg_next::{
    Rational,
    codec::context::Context as CodecContext,
    format::{Pixel, context::Input},
    frame::Video as VideoFrame,
    media::Type,
    software::scaling::{Context as ScalingContext, Flags as ScalingFlags},
    util::log::Level,
};
use image::RgbaImage;

use crate::error::ConvertError;
use crate::media::{MediaHandle, MediaInfo, ReadyState, SeekOutcome};

/// Frames whose timestamp is within this of the target count as on target.
const PTS_TOLERANCE_SECONDS: f64 = 0.001;

/// FFmpeg internal log verbosity level.
///
/// Maps directly to FFmpeg's `AV_LOG_*` constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FfmpegLogLevel {
    /// Print no output at all.
    Quiet,
    /// Only unrecoverable errors.
    Fatal,
    /// Recoverable errors.
    Error,
    /// Warnings (FFmpeg's default).
    Warning,
    /// Informational messages.
    Info,
    /// Debugging messages.
    Debug,
}

impl FfmpegLogLevel {
    fn to_ffmpeg_level(self) -> Level {
        match self {
            FfmpegLogLevel::Quiet => Level::Quiet,
            FfmpegLogLevel::Fatal => Level::Fatal,
            FfmpegLogLevel::Error => Level::Error,
            FfmpegLogLevel::Warning => Level::Warning,
            FfmpegLogLevel::Info => Level::Info,
            FfmpegLogLevel::Debug => Level::Debug,
        }
    }

    /// Parse a level name as given on the command line.
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "quiet" => Some(FfmpegLogLevel::Quiet),
            "fatal" => Some(FfmpegLogLevel::Fatal),
            "error" => Some(FfmpegLogLevel::Error),
            "warning" | "warn" => Some(FfmpegLogLevel::Warning),
            "info" => Some(FfmpegLogLevel::Info),
            "debug" => Some(FfmpegLogLevel::Debug),
            _ => None,
        }
    }
}

/// Set the FFmpeg internal log verbosity level.
///
/// This controls what FFmpeg prints to stderr. It does **not** affect
/// Rust-side `log` crate output.
pub fn set_ffmpeg_log_level(level: FfmpegLogLevel) {
    ffmpeg_next::util::log::set_level(level.to_ffmpeg_level());
}

enum Command {
    Seek { serial: u64, position: Duration },
}

enum Event {
    Loaded { info: MediaInfo, frame: RgbaImage },
    Seeked { serial: u64, frame: RgbaImage },
    Failed(String),
}

/// A video file decoded by FFmpeg on a background thread.
pub struct FfmpegMedia {
    path: PathBuf,
    commands: Option<Sender<Command>>,
    events: Receiver<Event>,
    ready: Arc<AtomicU8>,
    latest_serial: Arc<AtomicU64>,
    info: MediaInfo,
    current: Option<RgbaImage>,
    worker: Option<JoinHandle<()>>,
}

impl FfmpegMedia {
    /// Start decoding `path` in the background.
    ///
    /// Returns immediately; call [`wait_loaded`](MediaHandle::wait_loaded)
    /// to block until the first frame is available.
    ///
    /// # Errors
    ///
    /// Returns [`ConvertError::Load`] if FFmpeg cannot be initialised or the
    /// decoder thread cannot be spawned.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ConvertError> {
        let path = path.as_ref().to_path_buf();

        ffmpeg_next::init().map_err(|error| ConvertError::Load {
            path: path.clone(),
            reason: format!("FFmpeg initialisation failed: {error}"),
        })?;

        let (command_sender, command_receiver) = mpsc::channel();
        let (event_sender, event_receiver) = mpsc::channel();
        let ready = Arc::new(AtomicU8::new(ReadyState::HaveNothing as u8));
        let latest_serial = Arc::new(AtomicU64::new(0));

        let worker = {
            let path = path.clone();
            let ready = Arc::clone(&ready);
            let latest_serial = Arc::clone(&latest_serial);
            thread::Builder::new()
                .name("vidgif-decoder".to_string())
                .spawn(move || {
                    decode_loop(
                        &path,
                        command_receiver,
                        event_sender,
                        &ready,
                        &latest_serial,
                    )
                })
                .map_err(|error| ConvertError::Load {
                    path: path.clone(),
                    reason: format!("failed to start decoder thread: {error}"),
                })?
        };

        Ok(Self {
            path,
            commands: Some(command_sender),
            events: event_receiver,
            ready,
            latest_serial,
            info: MediaInfo::default(),
            current: None,
            worker: Some(worker),
        })
    }

    fn decoder_gone(&self) -> ConvertError {
        ConvertError::Decode(format!(
            "decoder thread for {} exited",
            self.path.display()
        ))
    }
}

impl MediaHandle for FfmpegMedia {
    fn wait_loaded(&mut self) -> Result<(), ConvertError> {
        match self.events.recv() {
            Ok(Event::Loaded { info, frame }) => {
                self.info = info;
                self.current = Some(frame);
                Ok(())
            }
            Ok(Event::Failed(reason)) => Err(ConvertError::Load {
                path: self.path.clone(),
                reason,
            }),
            Ok(Event::Seeked { .. }) | Err(_) => Err(ConvertError::Load {
                path: self.path.clone(),
                reason: "decoder stopped before the first frame".to_string(),
            }),
        }
    }

    fn info(&self) -> MediaInfo {
        self.info
    }

    fn ready_state(&self) -> ReadyState {
        ReadyState::from_u8(self.ready.load(Ordering::Acquire))
    }

    fn seek(&mut self, position: Duration) -> Result<(), ConvertError> {
        let serial = self.latest_serial.fetch_add(1, Ordering::AcqRel) + 1;
        self.ready
            .store(ReadyState::HaveMetadata as u8, Ordering::Release);
        let sender = self.commands.as_ref().ok_or_else(|| self.decoder_gone())?;
        sender
            .send(Command::Seek { serial, position })
            .map_err(|_| self.decoder_gone())
    }

    fn wait_seeked(&mut self, timeout: Duration) -> Result<SeekOutcome, ConvertError> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.events.recv_timeout(remaining) {
                Ok(Event::Seeked { serial, frame }) => {
                    if serial == self.latest_serial.load(Ordering::Acquire) {
                        self.current = Some(frame);
                        return Ok(SeekOutcome::Settled);
                    }
                    log::debug!("Dropping stale seek answer #{serial}");
                }
                Ok(Event::Failed(reason)) => return Err(ConvertError::Decode(reason)),
                Ok(Event::Loaded { .. }) => {}
                Err(RecvTimeoutError::Timeout) => return Ok(SeekOutcome::TimedOut),
                Err(RecvTimeoutError::Disconnected) => return Err(self.decoder_gone()),
            }
        }
    }

    fn current_frame(&self) -> Option<&RgbaImage> {
        self.current.as_ref()
    }
}

impl Drop for FfmpegMedia {
    fn drop(&mut self) {
        // Closing the command channel ends the decode loop.
        self.commands.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::warn!("Decoder thread for {} panicked", self.path.display());
            }
        }
    }
}

fn decode_loop(
    path: &Path,
    commands: Receiver<Command>,
    events: Sender<Event>,
    ready: &AtomicU8,
    latest_serial: &AtomicU64,
) {
    let mut decoder = match FrameDecoder::open(path) {
        Ok(decoder) => decoder,
        Err(error) => {
            let _ = events.send(Event::Failed(error.to_string()));
            return;
        }
    };

    match decoder.frame_at(Duration::ZERO) {
        Ok(frame) => {
            ready.store(ReadyState::HaveEnoughData as u8, Ordering::Release);
            let info = decoder.info;
            if events.send(Event::Loaded { info, frame }).is_err() {
                return;
            }
        }
        Err(error) => {
            let _ = events.send(Event::Failed(error.to_string()));
            return;
        }
    }

    while let Ok(Command::Seek { serial, position }) = commands.recv() {
        if serial < latest_serial.load(Ordering::Acquire) {
            continue;
        }
        match decoder.frame_at(position) {
            Ok(frame) => {
                if serial == latest_serial.load(Ordering::Acquire) {
                    ready.store(ReadyState::HaveEnoughData as u8, Ordering::Release);
                }
                if events.send(Event::Seeked { serial, frame }).is_err() {
                    return;
                }
            }
            Err(error) => {
                log::warn!("Seek to {position:?} failed: {error}");
                let _ = events.send(Event::Failed(error.to_string()));
                return;
            }
        }
    }
}

struct FrameDecoder {
    input: Input,
    stream_index: usize,
    time_base: Rational,
    decoder: ffmpeg_next::decoder::Video,
    scaler: ScalingContext,
    info: MediaInfo,
}

impl FrameDecoder {
    fn open(path: &Path) -> Result<Self, ConvertError> {
        let input = ffmpeg_next::format::input(&path)?;
        let stream = input
            .streams()
            .best(Type::Video)
            .ok_or_else(|| ConvertError::Decode("no video stream found".to_string()))?;
        let stream_index = stream.index();
        let time_base = stream.time_base();
        let stream_duration = stream.duration();

        let decoder_context = CodecContext::from_parameters(stream.parameters())?;
        let decoder = decoder_context.decoder().video()?;
        let width = decoder.width();
        let height = decoder.height();

        let scaler = ScalingContext::get(
            decoder.format(),
            width,
            height,
            Pixel::RGBA,
            width,
            height,
            ScalingFlags::BILINEAR,
        )?;

        let container_duration = input.duration();
        let duration = if container_duration > 0 {
            Duration::from_micros(container_duration as u64)
        } else if stream_duration > 0 {
            Duration::from_secs_f64(pts_to_seconds(stream_duration, time_base).max(0.0))
        } else {
            Duration::ZERO
        };

        Ok(Self {
            input,
            stream_index,
            time_base,
            decoder,
            scaler,
            info: MediaInfo {
                duration,
                width,
                height,
            },
        })
    }

    /// Decode the frame on screen at `position`: the last one whose
    /// timestamp is not past it.
    fn frame_at(&mut self, position: Duration) -> Result<RgbaImage, ConvertError> {
        let Self {
            input,
            stream_index,
            time_base,
            decoder,
            scaler,
            info,
        } = self;
        let mut cursor = FrameCursor {
            target_seconds: position.as_secs_f64() + PTS_TOLERANCE_SECONDS,
            time_base: *time_base,
            width: info.width,
            height: info.height,
            shown: None,
        };

        let seek_timestamp = duration_to_seek_timestamp(position);
        input.seek(seek_timestamp, ..seek_timestamp)?;
        decoder.flush();

        let mut decoded = VideoFrame::empty();
        for (stream, packet) in input.packets() {
            if stream.index() != *stream_index {
                continue;
            }
            decoder.send_packet(&packet)?;
            while decoder.receive_frame(&mut decoded).is_ok() {
                if let Some(image) = cursor.advance(scaler, &decoded)? {
                    return Ok(image);
                }
            }
        }

        decoder.send_eof()?;
        while decoder.receive_frame(&mut decoded).is_ok() {
            if let Some(image) = cursor.advance(scaler, &decoded)? {
                return Ok(image);
            }
        }

        // Past the last frame: show the final picture, as a player would.
        cursor.shown.ok_or_else(|| {
            ConvertError::Decode(format!("no frame could be decoded at {position:?}"))
        })
    }
}

/// Tracks the frame on screen while decoding forward to a target time.
struct FrameCursor {
    target_seconds: f64,
    time_base: Rational,
    width: u32,
    height: u32,
    shown: Option<RgbaImage>,
}

impl FrameCursor {
    /// Feed one decoded frame. Returns the answer once a frame past the
    /// target arrives, or for a frame without a timestamp.
    fn advance(
        &mut self,
        scaler: &mut ScalingContext,
        decoded: &VideoFrame,
    ) -> Result<Option<RgbaImage>, ConvertError> {
        let Some(pts) = decoded.pts() else {
            return convert_frame(scaler, decoded, self.width, self.height).map(Some);
        };
        if pts_to_seconds(pts, self.time_base) > self.target_seconds {
            // The keyframe seek can land past the target when the target
            // precedes the first frame; that frame is what gets shown.
            return match self.shown.take() {
                Some(image) => Ok(Some(image)),
                None => convert_frame(scaler, decoded, self.width, self.height).map(Some),
            };
        }
        self.shown = Some(convert_frame(scaler, decoded, self.width, self.height)?);
        Ok(None)
    }
}

/// Scale a decoded frame to RGBA and copy it out of FFmpeg's padded planes.
fn convert_frame(
    scaler: &mut ScalingContext,
    decoded: &VideoFrame,
    width: u32,
    height: u32,
) -> Result<RgbaImage, ConvertError> {
    let mut rgba_frame = VideoFrame::empty();
    scaler.run(decoded, &mut rgba_frame)?;

    let buffer = frame_to_buffer(&rgba_frame, width, height, 4);
    RgbaImage::from_raw(width, height, buffer).ok_or_else(|| {
        ConvertError::Decode("Failed to construct RGBA image from decoded frame data".to_string())
    })
}

/// Copy pixel data from an FFmpeg video frame into a tightly-packed buffer.
fn frame_to_buffer(
    video_frame: &VideoFrame,
    width: u32,
    height: u32,
    bytes_per_pixel: usize,
) -> Vec<u8> {
    let stride = video_frame.stride(0);
    let expected_stride = (width as usize) * bytes_per_pixel;
    let data = video_frame.data(0);

    if stride == expected_stride {
        data[..expected_stride * (height as usize)].to_vec()
    } else {
        let mut buffer = Vec::with_capacity(expected_stride * (height as usize));
        for row in 0..(height as usize) {
            let row_start = row * stride;
            buffer.extend_from_slice(&data[row_start..row_start + expected_stride]);
        }
        buffer
    }
}

/// Rescale a PTS value from stream time base to seconds.
fn pts_to_seconds(pts: i64, time_base: Rational) -> f64 {
    pts as f64 * f64::from(time_base.numerator()) / f64::from(time_base.denominator())
}

/// Convert a [`Duration`] to a seek timestamp in AV_TIME_BASE (microseconds).
///
/// `Input::seek` (via `avformat_seek_file` with `stream_index = -1`) expects
/// container-level timestamps.
fn duration_to_seek_timestamp(duration: Duration) -> i64 {
    duration.as_micros() as i64
}
