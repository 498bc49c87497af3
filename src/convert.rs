//! One conversion run, end to end.
//!
//! [`Converter::run`] walks the run state machine
//! `Idle → Loading → Sampling → Encoding`, reporting each phase through
//! [`ProgressCallback::on_phase`](crate::ProgressCallback::on_phase), and
//! returns the encoded output together with the still-open media. Whoever
//! installs the output moves the run to `Ready`. On any error the run moves
//! to `Failed` and the media is dropped, which releases its source URL.
//!
//! # Example
//!
//! ```no_run
//! use vidgif::{Converter, QualityOptions, RunToken};
//!
//! let converter = Converter::new();
//! let conversion = converter.run(
//!     "clip.gif".as_ref(),
//!     QualityOptions::default(),
//!     &RunToken::detached(),
//! )?;
//! println!("{} bytes", conversion.output().len());
//! # Ok::<(), vidgif::ConvertError>(())
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::encoder::{EncodedOutput, EncoderAdapter, EncoderBackend, EncoderSettings, GifBackend};
use crate::error::ConvertError;
use crate::media::{DefaultLoader, LoadedMedia, MediaInfo, MediaLoader, load_media};
use crate::options::{ConvertOptions, QualityOptions};
use crate::output::OutputManager;
use crate::renderer::Surface;
use crate::resource::ObjectUrls;
use crate::run::{RunPhase, RunToken};
use crate::sampler::{FrameSampler, sample_timestamps_within};

/// Status text shown while the source loads.
pub const LOADING_MESSAGE: &str = "Loading video...";
/// Status text shown while the animation is encoded.
pub const ENCODING_MESSAGE: &str = "Generating GIF...";

/// Status text shown once the duration is known.
pub fn sampling_message(duration: std::time::Duration) -> String {
    format!(
        "Video duration: {:.1}s, sampling frames...",
        duration.as_secs_f64()
    )
}

/// The result of a successful run, before it is installed.
pub struct Conversion {
    output: EncodedOutput,
    media: LoadedMedia,
    info: MediaInfo,
}

impl Conversion {
    /// The encoded animation.
    pub fn output(&self) -> &EncodedOutput {
        &self.output
    }

    /// What the source reported when it loaded.
    pub fn media_info(&self) -> MediaInfo {
        self.info
    }

    /// Split into the output and the media whose URL is still live.
    pub fn into_parts(self) -> (EncodedOutput, LoadedMedia) {
        (self.output, self.media)
    }
}

/// Runs conversions with a fixed loader, encoder backend and option set.
#[derive(Clone)]
pub struct Converter {
    loader: Arc<dyn MediaLoader>,
    backend: Arc<dyn EncoderBackend>,
    urls: ObjectUrls,
    options: ConvertOptions,
}

impl Default for Converter {
    fn default() -> Self {
        Self::new()
    }
}

impl Converter {
    /// A converter using [`DefaultLoader`], [`GifBackend`] and default
    /// options.
    pub fn new() -> Self {
        Self {
            loader: Arc::new(DefaultLoader),
            backend: Arc::new(GifBackend::new()),
            urls: ObjectUrls::new(),
            options: ConvertOptions::default(),
        }
    }

    /// Replace the media loader.
    #[must_use]
    pub fn with_loader(mut self, loader: Arc<dyn MediaLoader>) -> Self {
        self.loader = loader;
        self
    }

    /// Replace the encoder backend.
    #[must_use]
    pub fn with_backend(mut self, backend: Arc<dyn EncoderBackend>) -> Self {
        self.backend = backend;
        self
    }

    /// Issue object URLs from a shared registry.
    #[must_use]
    pub fn with_urls(mut self, urls: ObjectUrls) -> Self {
        self.urls = urls;
        self
    }

    /// Replace the operational options.
    #[must_use]
    pub fn with_options(mut self, options: ConvertOptions) -> Self {
        self.options = options;
        self
    }

    /// The registry URLs are issued from.
    pub fn urls(&self) -> &ObjectUrls {
        &self.urls
    }

    /// The operational options.
    pub fn options(&self) -> &ConvertOptions {
        &self.options
    }

    /// Convert `path` with the given quality snapshot.
    ///
    /// # Errors
    ///
    /// Any [`ConvertError`]; the failure is also reported as
    /// [`RunPhase::Failed`] through the progress callback. No output is
    /// produced for a failed run.
    pub fn run(
        &self,
        path: &Path,
        quality: QualityOptions,
        token: &RunToken,
    ) -> Result<Conversion, ConvertError> {
        let mut phase = RunPhase::Idle;
        let result = self.run_phases(path, quality, token, &mut phase);

        if let Err(error) = &result {
            let failed = RunPhase::Failed(error.kind());
            if phase.can_transition_to(failed) {
                log::warn!("Run {} failed while {phase:?}: {error}", token.id());
                self.options
                    .progress
                    .on_phase(token.id(), &failed, &error.to_string());
            }
        }
        result
    }

    fn enter(&self, token: &RunToken, phase: &mut RunPhase, next: RunPhase, message: &str) {
        debug_assert!(phase.can_transition_to(next), "{phase:?} -> {next:?}");
        *phase = next;
        log::debug!("Run {}: {message}", token.id());
        self.options.progress.on_phase(token.id(), phase, message);
    }

    fn run_phases(
        &self,
        path: &Path,
        quality: QualityOptions,
        token: &RunToken,
        phase: &mut RunPhase,
    ) -> Result<Conversion, ConvertError> {
        self.enter(token, phase, RunPhase::Loading, LOADING_MESSAGE);
        let mut media = load_media(self.loader.as_ref(), &self.urls, path)?;
        token.ensure_current()?;

        let info = media.handle().info();
        let usable = info.usable_duration(self.options.max_duration);
        self.enter(token, phase, RunPhase::Sampling, &sampling_message(usable));

        let timestamps =
            sample_timestamps_within(info.duration, self.options.max_duration, quality.frame_rate);
        let native = info.dimensions_or(self.options.default_dimensions);
        let mut surface = Surface::for_media(&info, self.options.default_dimensions);

        let settings = EncoderSettings::new(&quality, native, &self.options);
        let mut encoder = EncoderAdapter::start(
            self.backend.as_ref(),
            settings,
            self.options.delay_policy,
            timestamps.len(),
        )?;

        let sampled = FrameSampler::new(&self.options, token).sample(
            media.handle_mut(),
            &timestamps,
            |index, _, frame| encoder.add(index, surface.draw(frame)),
        )?;
        log::debug!("Sampled {sampled} frames from {}", path.display());

        self.enter(token, phase, RunPhase::Encoding, ENCODING_MESSAGE);
        let output = encoder.finish(self.options.progress.clone(), token.id())?;
        token.ensure_current()?;

        Ok(Conversion {
            output,
            media,
            info,
        })
    }
}

/// Convert one file and save it into `out_dir` as
/// [`DOWNLOAD_FILE_NAME`](crate::DOWNLOAD_FILE_NAME).
///
/// # Errors
///
/// Any [`ConvertError`] from the run or from writing the file.
pub fn convert_file<P, Q>(
    input: P,
    out_dir: Q,
    quality: QualityOptions,
    options: ConvertOptions,
) -> Result<PathBuf, ConvertError>
where
    P: AsRef<Path>,
    Q: AsRef<Path>,
{
    let converter = Converter::new().with_options(options);
    let token = RunToken::detached();
    let conversion = converter.run(input.as_ref(), quality, &token)?;

    let mut outputs = OutputManager::new(converter.urls().clone());
    let (output, media) = conversion.into_parts();
    outputs.install(output, media);
    converter
        .options()
        .progress
        .on_phase(token.id(), &RunPhase::Ready, "");

    outputs.download_to(out_dir)?.ok_or_else(|| {
        ConvertError::Encode("no output was installed".to_string())
    })
}
