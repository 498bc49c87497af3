//! The single live output slot.
//!
//! [`OutputManager`] owns at most one encoded animation at a time, exposed
//! through an object URL and a [`Preview`]. Installing a new output is one
//! replace-and-release transition: the previous output URL is revoked
//! before the new one is created, and the source media URL of the run that
//! produced it is released in the same step.

use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::encoder::EncodedOutput;
use crate::error::ConvertError;
use crate::media::LoadedMedia;
use crate::resource::{Blob, ObjectUrl, ObjectUrls};

/// Name every download is saved under.
pub const DOWNLOAD_FILE_NAME: &str = "1.gif";

/// What the preview shows: the live output URL plus a few facts about it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preview {
    /// URL the preview is bound to.
    pub url: ObjectUrl,
    /// Animation width in pixels.
    pub width: u32,
    /// Animation height in pixels.
    pub height: u32,
    /// Number of frames.
    pub frame_count: usize,
    /// Encoded size in bytes.
    pub byte_len: usize,
}

#[derive(Debug)]
struct LiveOutput {
    url: ObjectUrl,
    output: EncodedOutput,
    preview: Preview,
}

/// Holds the live output and its URL.
#[derive(Debug)]
pub struct OutputManager {
    urls: ObjectUrls,
    live: Option<LiveOutput>,
}

impl OutputManager {
    /// Create an empty slot issuing URLs from `urls`.
    pub fn new(urls: ObjectUrls) -> Self {
        Self { urls, live: None }
    }

    /// Replace the live output with `output`.
    ///
    /// Revokes the previous output URL, registers the new blob, releases
    /// the source URL held by `media` and binds a fresh preview.
    pub fn install(&mut self, output: EncodedOutput, media: LoadedMedia) -> &Preview {
        self.release_live();

        let url = self.urls.create(Blob::gif(output.shared_data()));
        media.release();

        let preview = Preview {
            url: url.clone(),
            width: output.width(),
            height: output.height(),
            frame_count: output.frame_count(),
            byte_len: output.len(),
        };
        log::debug!(
            "Installed output {url}: {}x{}, {} frames, {} bytes",
            preview.width,
            preview.height,
            preview.frame_count,
            preview.byte_len
        );

        &self
            .live
            .insert(LiveOutput {
                url,
                output,
                preview,
            })
            .preview
    }

    /// Drop the live output, if any, revoking its URL.
    pub fn clear(&mut self) {
        self.release_live();
    }

    /// Whether there is something to download.
    pub fn can_download(&self) -> bool {
        self.live
            .as_ref()
            .is_some_and(|live| self.urls.is_live(&live.url))
    }

    /// The current preview.
    pub fn preview(&self) -> Option<&Preview> {
        self.live.as_ref().map(|live| &live.preview)
    }

    /// The live output.
    pub fn output(&self) -> Option<&EncodedOutput> {
        self.live.as_ref().map(|live| &live.output)
    }

    /// Save the live output into `dir` as [`DOWNLOAD_FILE_NAME`].
    ///
    /// Returns `Ok(None)` without touching the disk when nothing is live.
    /// The bytes are written to a temporary file in `dir` first and then
    /// moved into place, so a failed write never leaves a partial file.
    ///
    /// # Errors
    ///
    /// Returns [`ConvertError::Io`] if writing or renaming fails.
    pub fn download_to<P: AsRef<Path>>(&self, dir: P) -> Result<Option<PathBuf>, ConvertError> {
        let Some(live) = self.live.as_ref() else {
            return Ok(None);
        };
        let Some(Blob::Bytes { data, .. }) = self.urls.resolve(&live.url) else {
            log::warn!("Output URL {} is no longer live", live.url);
            return Ok(None);
        };

        let dir = dir.as_ref();
        let target = dir.join(DOWNLOAD_FILE_NAME);

        let mut staged = NamedTempFile::new_in(dir)?;
        staged.write_all(&data)?;
        staged.flush()?;
        staged.persist(&target).map_err(|error| error.error)?;

        log::debug!("Saved {} bytes to {}", data.len(), target.display());
        Ok(Some(target))
    }

    fn release_live(&mut self) {
        if let Some(live) = self.live.take() {
            self.urls.revoke(&live.url);
        }
    }
}

impl Drop for OutputManager {
    fn drop(&mut self) {
        self.release_live();
    }
}
