//! Offscreen raster capture.
//!
//! A [`Surface`] is sized once per run to the source's native dimensions.
//! Each draw clears it and paints the current frame stretched over the
//! whole raster. Output scaling happens later in the encoder.

use image::{Rgba, RgbaImage, imageops};

use crate::media::MediaInfo;

/// The raster every sampled frame is drawn onto.
#[derive(Debug, Clone)]
pub struct Surface {
    canvas: RgbaImage,
}

impl Surface {
    /// A transparent surface of `width × height`, each side at least 1.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            canvas: RgbaImage::new(width.max(1), height.max(1)),
        }
    }

    /// A surface matching the media's native size, or `default` when the
    /// media does not report one.
    pub fn for_media(info: &MediaInfo, default: (u32, u32)) -> Self {
        let (width, height) = info.dimensions_or(default);
        Self::new(width, height)
    }

    /// Surface width in pixels.
    pub fn width(&self) -> u32 {
        self.canvas.width()
    }

    /// Surface height in pixels.
    pub fn height(&self) -> u32 {
        self.canvas.height()
    }

    /// Clear, then draw `frame` scaled to fill the surface.
    pub fn draw(&mut self, frame: &RgbaImage) -> &RgbaImage {
        self.clear();

        if frame.dimensions() == self.canvas.dimensions() {
            imageops::overlay(&mut self.canvas, frame, 0, 0);
        } else {
            let scaled = imageops::resize(
                frame,
                self.canvas.width(),
                self.canvas.height(),
                imageops::FilterType::Triangle,
            );
            imageops::overlay(&mut self.canvas, &scaled, 0, 0);
        }

        &self.canvas
    }

    /// The most recently drawn raster.
    pub fn raster(&self) -> &RgbaImage {
        &self.canvas
    }

    fn clear(&mut self) {
        for pixel in self.canvas.pixels_mut() {
            *pixel = Rgba([0, 0, 0, 0]);
        }
    }
}
