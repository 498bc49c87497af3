//! Shared test doubles: scripted media, a recording encoder backend, a
//! recording progress callback and an in-memory GIF builder.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use image::codecs::gif::{GifEncoder, Repeat};
use image::{Delay, Frame, Rgba, RgbaImage};
use vidgif::{
    AnimationEncoder, Blob, ConvertError, EncoderBackend, EncoderSettings, FrameOptions,
    MediaHandle, MediaInfo, MediaLoader, ProgressCallback, ProgressInfo, ReadyState, RunPhase,
    SeekOutcome,
};

// ── Scripted media ─────────────────────────────────────────────────

/// A media handle whose behaviour is fixed up front.
///
/// Frames are solid colours whose red channel encodes the position in
/// centiseconds, so tests can tell which timestamp a frame came from.
#[derive(Clone)]
pub struct ScriptedMedia {
    pub info: MediaInfo,
    pub frame_size: (u32, u32),
    pub ready: ReadyState,
    pub stall_at: Option<Duration>,
    pub seek_delay: Duration,
    pub buffering_after_settle: bool,
    pub seeks: Arc<Mutex<Vec<Duration>>>,
    position: Duration,
    settled: bool,
    buffering: bool,
    frame: Option<RgbaImage>,
}

impl ScriptedMedia {
    pub fn new(duration: Duration, width: u32, height: u32) -> Self {
        Self {
            info: MediaInfo {
                duration,
                width,
                height,
            },
            frame_size: (width.max(1), height.max(1)),
            ready: ReadyState::HaveEnoughData,
            stall_at: None,
            seek_delay: Duration::ZERO,
            buffering_after_settle: false,
            seeks: Arc::new(Mutex::new(Vec::new())),
            position: Duration::ZERO,
            settled: true,
            buffering: false,
            frame: None,
        }
    }

    pub fn with_frame_size(mut self, width: u32, height: u32) -> Self {
        self.frame_size = (width, height);
        self
    }

    pub fn never_ready(mut self) -> Self {
        self.ready = ReadyState::HaveMetadata;
        self
    }

    pub fn stalling_at(mut self, position: Duration) -> Self {
        self.stall_at = Some(position);
        self
    }

    pub fn with_seek_delay(mut self, delay: Duration) -> Self {
        self.seek_delay = delay;
        self
    }

    pub fn buffering(mut self) -> Self {
        self.buffering_after_settle = true;
        self
    }

    /// Every seek requested so far, including the readiness rewind.
    pub fn recorded_seeks(&self) -> Vec<Duration> {
        self.seeks.lock().unwrap().clone()
    }

    fn render_frame(&self) -> RgbaImage {
        let red = ((self.position.as_millis() / 10) % 256) as u8;
        RgbaImage::from_pixel(
            self.frame_size.0,
            self.frame_size.1,
            Rgba([red, 40, 200, 255]),
        )
    }
}

pub fn red_for(position: Duration) -> u8 {
    ((position.as_millis() / 10) % 256) as u8
}

impl MediaHandle for ScriptedMedia {
    fn wait_loaded(&mut self) -> Result<(), ConvertError> {
        self.frame = Some(self.render_frame());
        Ok(())
    }

    fn info(&self) -> MediaInfo {
        self.info
    }

    fn ready_state(&self) -> ReadyState {
        if self.buffering {
            ReadyState::HaveMetadata
        } else {
            self.ready
        }
    }

    fn seek(&mut self, position: Duration) -> Result<(), ConvertError> {
        self.seeks.lock().unwrap().push(position);
        self.position = position;
        self.settled = false;
        Ok(())
    }

    fn wait_seeked(&mut self, timeout: Duration) -> Result<SeekOutcome, ConvertError> {
        if self.stall_at == Some(self.position) {
            thread::sleep(timeout);
            return Ok(SeekOutcome::TimedOut);
        }
        thread::sleep(self.seek_delay);
        self.settled = true;
        self.buffering = self.buffering_after_settle;
        self.frame = Some(self.render_frame());
        Ok(SeekOutcome::Settled)
    }

    fn current_frame(&self) -> Option<&RgbaImage> {
        self.frame.as_ref()
    }
}

/// Hands out clones of scripted media, optionally per file name.
#[derive(Clone, Default)]
pub struct ScriptedLoader {
    default: Option<ScriptedMedia>,
    by_name: HashMap<PathBuf, ScriptedMedia>,
    pub opened: Arc<AtomicUsize>,
}

impl ScriptedLoader {
    pub fn new(media: ScriptedMedia) -> Self {
        Self {
            default: Some(media),
            ..Self::default()
        }
    }

    /// A loader that rejects every file.
    pub fn failing() -> Self {
        Self::default()
    }

    pub fn with_file<P: AsRef<Path>>(mut self, name: P, media: ScriptedMedia) -> Self {
        self.by_name.insert(name.as_ref().to_path_buf(), media);
        self
    }
}

impl MediaLoader for ScriptedLoader {
    fn open(&self, blob: &Blob) -> Result<Box<dyn MediaHandle>, ConvertError> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        let Blob::File(path) = blob else {
            return Err(ConvertError::Load {
                path: PathBuf::from("<memory>"),
                reason: "scripted loader only opens files".to_string(),
            });
        };
        let media = self
            .by_name
            .get(path)
            .or(self.default.as_ref())
            .cloned()
            .ok_or_else(|| ConvertError::Load {
                path: path.clone(),
                reason: "unsupported format".to_string(),
            })?;
        Ok(Box::new(media))
    }
}

// ── Recording encoder ──────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct Recording {
    pub settings: Vec<EncoderSettings>,
    pub frames: Vec<((u32, u32), Duration, Rgba<u8>)>,
    pub renders: usize,
}

/// Records everything it is given and renders a fixed payload.
#[derive(Clone, Default)]
pub struct RecordingBackend {
    pub recording: Arc<Mutex<Recording>>,
    pub produce_nothing: bool,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn producing_nothing() -> Self {
        Self {
            produce_nothing: true,
            ..Self::default()
        }
    }

    pub fn settings(&self) -> Vec<EncoderSettings> {
        self.recording.lock().unwrap().settings.clone()
    }

    pub fn frames(&self) -> Vec<((u32, u32), Duration, Rgba<u8>)> {
        self.recording.lock().unwrap().frames.clone()
    }

    pub fn renders(&self) -> usize {
        self.recording.lock().unwrap().renders
    }
}

struct RecordingEncoder {
    recording: Arc<Mutex<Recording>>,
    produce_nothing: bool,
    count: usize,
}

impl EncoderBackend for RecordingBackend {
    fn configure(
        &self,
        settings: &EncoderSettings,
    ) -> Result<Box<dyn AnimationEncoder>, ConvertError> {
        self.recording.lock().unwrap().settings.push(*settings);
        Ok(Box::new(RecordingEncoder {
            recording: Arc::clone(&self.recording),
            produce_nothing: self.produce_nothing,
            count: 0,
        }))
    }
}

impl AnimationEncoder for RecordingEncoder {
    fn add_frame(&mut self, frame: &RgbaImage, options: FrameOptions) -> Result<(), ConvertError> {
        let pixel = *frame.get_pixel(0, 0);
        self.recording
            .lock()
            .unwrap()
            .frames
            .push((frame.dimensions(), options.delay, pixel));
        self.count += 1;
        Ok(())
    }

    fn frame_count(&self) -> usize {
        self.count
    }

    fn render(
        self: Box<Self>,
        progress: &(dyn Fn(f32) + Sync),
    ) -> Result<Option<Vec<u8>>, ConvertError> {
        self.recording.lock().unwrap().renders += 1;
        progress(0.5);
        progress(1.0);
        if self.produce_nothing || self.count == 0 {
            Ok(None)
        } else {
            Ok(Some(b"GIF89a-recorded".to_vec()))
        }
    }
}

// ── Recording progress ─────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingProgress {
    pub phases: Mutex<Vec<(u64, RunPhase, String)>>,
    pub infos: Mutex<Vec<ProgressInfo>>,
}

impl RecordingProgress {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn phases(&self) -> Vec<RunPhase> {
        self.phases
            .lock()
            .unwrap()
            .iter()
            .map(|(_, phase, _)| *phase)
            .collect()
    }

    pub fn messages(&self) -> Vec<String> {
        self.phases
            .lock()
            .unwrap()
            .iter()
            .map(|(_, _, message)| message.clone())
            .collect()
    }

    pub fn infos(&self) -> Vec<ProgressInfo> {
        self.infos.lock().unwrap().clone()
    }
}

impl ProgressCallback for RecordingProgress {
    fn on_progress(&self, info: &ProgressInfo) {
        self.infos.lock().unwrap().push(info.clone());
    }

    fn on_phase(&self, generation: u64, phase: &RunPhase, message: &str) {
        self.phases
            .lock()
            .unwrap()
            .push((generation, *phase, message.to_string()));
    }
}

// ── GIF fixtures ───────────────────────────────────────────────────

/// Encode solid-colour frames of `width × height` as an animated GIF.
pub fn gif_bytes(width: u32, height: u32, frames: &[(Rgba<u8>, u32)]) -> Vec<u8> {
    let mut buffer = Vec::new();
    {
        let mut encoder = GifEncoder::new(&mut buffer);
        encoder.set_repeat(Repeat::Infinite).unwrap();
        let frames = frames.iter().map(|(colour, delay_ms)| {
            Frame::from_parts(
                RgbaImage::from_pixel(width, height, *colour),
                0,
                0,
                Delay::from_numer_denom_ms(*delay_ms, 1),
            )
        });
        encoder.encode_frames(frames).unwrap();
    }
    buffer
}

/// Write a GIF with `count` frames of 100 ms each into `dir`.
pub fn write_gif(dir: &Path, name: &str, width: u32, height: u32, count: usize) -> PathBuf {
    let frames: Vec<(Rgba<u8>, u32)> = (0..count)
        .map(|index| (palette_colour(index), 100))
        .collect();
    let path = dir.join(name);
    std::fs::write(&path, gif_bytes(width, height, &frames)).unwrap();
    path
}

/// Distinct opaque colour for frame `index`.
pub fn palette_colour(index: usize) -> Rgba<u8> {
    let step = (index * 37 % 256) as u8;
    Rgba([step, 255 - step, (index * 91 % 256) as u8, 255])
}

/// The average colour of a decoded frame.
pub fn mean_colour(image: &RgbaImage) -> [f64; 3] {
    let mut sum = [0.0; 3];
    for pixel in image.pixels() {
        for channel in 0..3 {
            sum[channel] += f64::from(pixel[channel]);
        }
    }
    let count = f64::from(image.width() * image.height());
    sum.map(|total| total / count)
}
