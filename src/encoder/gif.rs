//! The default GIF backend.
//!
//! Frames are scaled to the output size as they are appended. Rendering
//! quantizes every frame to a 256-colour palette with `imagequant` on a
//! dedicated rayon pool, then writes the palettized frames in order with the
//! `gif` crate.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use image::RgbaImage;
//! use vidgif::{EncoderBackend, EncoderSettings, FrameOptions, GifBackend};
//!
//! let settings = EncoderSettings {
//!     workers: 2,
//!     quality: 10,
//!     width: 320,
//!     height: 180,
//!     frame_rate: 8,
//!     dither: false,
//!     repeat: None,
//! };
//! let mut encoder = GifBackend::new().configure(&settings)?;
//! encoder.add_frame(
//!     &RgbaImage::new(640, 360),
//!     FrameOptions { delay: Duration::from_millis(125) },
//! )?;
//! let bytes = encoder.render(&|_fraction: f32| {})?;
//! # Ok::<(), vidgif::ConvertError>(())
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use ::gif::{DisposalMethod, Encoder, Frame, Repeat};
use image::{RgbaImage, imageops};
use imagequant::RGBA;
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};

use crate::encoder::{AnimationEncoder, EncoderBackend, EncoderSettings, FrameOptions};
use crate::error::ConvertError;

/// Encodes with `imagequant` and the `gif` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct GifBackend;

impl GifBackend {
    /// Create the backend.
    pub fn new() -> Self {
        Self
    }
}

impl EncoderBackend for GifBackend {
    fn configure(
        &self,
        settings: &EncoderSettings,
    ) -> Result<Box<dyn AnimationEncoder>, ConvertError> {
        let width = u16::try_from(settings.width).map_err(|_| too_large(settings))?;
        let height = u16::try_from(settings.height).map_err(|_| too_large(settings))?;
        if width == 0 || height == 0 {
            return Err(ConvertError::Encode(format!(
                "output size {}x{} is empty",
                settings.width, settings.height
            )));
        }

        Ok(Box::new(GifEncoder {
            settings: *settings,
            width,
            height,
            frames: Vec::new(),
        }))
    }
}

fn too_large(settings: &EncoderSettings) -> ConvertError {
    ConvertError::Encode(format!(
        "output size {}x{} exceeds the GIF limit of 65535",
        settings.width, settings.height
    ))
}

struct PendingFrame {
    image: RgbaImage,
    delay: Duration,
}

struct PalettizedFrame {
    palette: Vec<u8>,
    indices: Vec<u8>,
    transparent: Option<u8>,
}

struct GifEncoder {
    settings: EncoderSettings,
    width: u16,
    height: u16,
    frames: Vec<PendingFrame>,
}

impl AnimationEncoder for GifEncoder {
    fn add_frame(&mut self, frame: &RgbaImage, options: FrameOptions) -> Result<(), ConvertError> {
        let (width, height) = (u32::from(self.width), u32::from(self.height));
        let image = if frame.dimensions() == (width, height) {
            frame.clone()
        } else {
            imageops::resize(frame, width, height, imageops::FilterType::Triangle)
        };
        self.frames.push(PendingFrame {
            image,
            delay: options.delay,
        });
        Ok(())
    }

    fn frame_count(&self) -> usize {
        self.frames.len()
    }

    fn render(
        self: Box<Self>,
        progress: &(dyn Fn(f32) + Sync),
    ) -> Result<Option<Vec<u8>>, ConvertError> {
        if self.frames.is_empty() {
            log::warn!("No frames were added; nothing to encode");
            return Ok(None);
        }

        let total = self.frames.len();
        let done = AtomicUsize::new(0);
        let quality = self.settings.quality;
        let dither = self.settings.dither;

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.settings.workers.max(1))
            .thread_name(|index| format!("vidgif-quantize-{index}"))
            .build()
            .map_err(|error| {
                ConvertError::Encode(format!("failed to start encoder workers: {error}"))
            })?;

        let palettized: Vec<PalettizedFrame> = pool.install(|| {
            self.frames
                .par_iter()
                .map(|frame| {
                    let palettized = quantize(&frame.image, quality, dither)?;
                    let finished = done.fetch_add(1, Ordering::AcqRel) + 1;
                    // Quantization dominates; writing is reported as the last step.
                    progress(finished as f32 / total as f32 * 0.95);
                    Ok(palettized)
                })
                .collect::<Result<Vec<_>, ConvertError>>()
        })?;

        let mut buffer = Vec::new();
        {
            let mut encoder = Encoder::new(&mut buffer, self.width, self.height, &[])?;
            let repeat = match self.settings.repeat {
                None => Repeat::Infinite,
                Some(count) => Repeat::Finite(count),
            };
            encoder.set_repeat(repeat)?;

            for (pending, frame) in self.frames.iter().zip(palettized) {
                let mut gif_frame = Frame::from_palette_pixels(
                    self.width,
                    self.height,
                    frame.indices,
                    frame.palette,
                    frame.transparent,
                );
                gif_frame.delay = centiseconds(pending.delay);
                gif_frame.dispose = DisposalMethod::Background;
                encoder.write_frame(&gif_frame)?;
            }
        }
        progress(1.0);

        Ok(Some(buffer))
    }
}

/// Map the 1–30 precision scale onto imagequant's speed (1 slowest, 10 fastest).
fn speed_for_quality(quality: u8) -> i32 {
    u32::from(quality).div_ceil(3).clamp(1, 10) as i32
}

fn quantize(image: &RgbaImage, quality: u8, dither: bool) -> Result<PalettizedFrame, ConvertError> {
    let mut attributes = imagequant::new();
    attributes.set_speed(speed_for_quality(quality))?;
    attributes.set_quality(0, 100)?;

    let pixels: Vec<RGBA> = image
        .pixels()
        .map(|pixel| RGBA::new(pixel[0], pixel[1], pixel[2], pixel[3]))
        .collect();
    let mut liq_image = attributes.new_image(
        pixels,
        image.width() as usize,
        image.height() as usize,
        0.0,
    )?;

    let mut result = attributes.quantize(&mut liq_image)?;
    result.set_dithering_level(if dither { 1.0 } else { 0.0 })?;
    let (palette, indices) = result.remapped(&mut liq_image)?;

    let transparent = palette
        .iter()
        .position(|colour| colour.a == 0)
        .and_then(|index| u8::try_from(index).ok());
    let palette = palette
        .iter()
        .flat_map(|colour| [colour.r, colour.g, colour.b])
        .collect();

    Ok(PalettizedFrame {
        palette,
        indices,
        transparent,
    })
}

fn centiseconds(delay: Duration) -> u16 {
    let rounded = (delay.as_millis() + 5) / 10;
    u16::try_from(rounded).unwrap_or(u16::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn speed_tracks_quality() {
        assert_eq!(speed_for_quality(1), 1);
        assert_eq!(speed_for_quality(10), 4);
        assert_eq!(speed_for_quality(30), 10);
    }

    #[test]
    fn delays_round_to_centiseconds() {
        assert_eq!(centiseconds(Duration::from_millis(125)), 13);
        assert_eq!(centiseconds(Duration::from_millis(120)), 12);
        assert_eq!(centiseconds(Duration::from_millis(100)), 10);
    }
}
