//! Object URLs over in-memory and file-backed blobs.
//!
//! [`ObjectUrls`] is the registry every transient resource goes through:
//! the selected source file while it is being sampled, and the encoded
//! output while it is previewed and offered for download. Each
//! [`ObjectUrl`] stays resolvable until it is revoked, and revoking is the
//! only way to release it. [`UrlGuard`] ties a URL to a scope so it is
//! revoked on every exit path, including errors.

use std::collections::HashMap;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::path::{Path, PathBuf};
use std::sync::{
    Arc, Mutex, MutexGuard,
    atomic::{AtomicU64, Ordering},
};

/// Data an object URL can point at.
#[derive(Debug, Clone)]
pub enum Blob {
    /// A file on disk, as chosen by the user.
    File(PathBuf),
    /// Bytes held in memory with their MIME type.
    Bytes {
        /// The payload.
        data: Arc<[u8]>,
        /// MIME type, e.g. `image/gif`.
        mime: &'static str,
    },
}

impl Blob {
    /// Wrap a file path.
    pub fn file<P: AsRef<Path>>(path: P) -> Self {
        Blob::File(path.as_ref().to_path_buf())
    }

    /// Wrap encoded GIF bytes.
    pub fn gif(data: Arc<[u8]>) -> Self {
        Blob::Bytes {
            data,
            mime: "image/gif",
        }
    }

    /// Size in bytes, if known without touching the disk.
    pub fn len(&self) -> Option<usize> {
        match self {
            Blob::File(_) => None,
            Blob::Bytes { data, .. } => Some(data.len()),
        }
    }

    /// `true` for an in-memory blob with no bytes.
    pub fn is_empty(&self) -> bool {
        self.len() == Some(0)
    }
}

/// A handle naming a registered blob.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectUrl {
    id: u64,
}

impl Display for ObjectUrl {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "blob:vidgif/{:08x}", self.id)
    }
}

#[derive(Debug, Default)]
struct Registry {
    live: HashMap<u64, Blob>,
    created: u64,
    revoked: u64,
}

/// Registry of live object URLs. Cloning shares the registry.
#[derive(Debug, Clone, Default)]
pub struct ObjectUrls {
    inner: Arc<Mutex<Registry>>,
    next_id: Arc<AtomicU64>,
}

impl ObjectUrls {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a blob and return a fresh URL for it.
    pub fn create(&self, blob: Blob) -> ObjectUrl {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let url = ObjectUrl { id };
        let mut registry = self.registry();
        registry.live.insert(id, blob);
        registry.created += 1;
        log::debug!("Created {url}");
        url
    }

    /// Release a URL. Returns `false` if it was not live.
    pub fn revoke(&self, url: &ObjectUrl) -> bool {
        let mut registry = self.registry();
        let removed = registry.live.remove(&url.id).is_some();
        if removed {
            registry.revoked += 1;
            log::debug!("Revoked {url}");
        } else {
            log::warn!("Revoking {url}, which is not live");
        }
        removed
    }

    /// Look up the blob behind a live URL.
    pub fn resolve(&self, url: &ObjectUrl) -> Option<Blob> {
        self.registry().live.get(&url.id).cloned()
    }

    /// Whether `url` is still live.
    pub fn is_live(&self, url: &ObjectUrl) -> bool {
        self.registry().live.contains_key(&url.id)
    }

    /// Number of URLs currently live.
    pub fn live_count(&self) -> usize {
        self.registry().live.len()
    }

    /// Total URLs ever created and revoked, as `(created, revoked)`.
    pub fn totals(&self) -> (u64, u64) {
        let registry = self.registry();
        (registry.created, registry.revoked)
    }
}

/// Revokes its URL when dropped, unless released explicitly first.
#[derive(Debug)]
pub struct UrlGuard {
    urls: ObjectUrls,
    url: Option<ObjectUrl>,
}

impl UrlGuard {
    /// Register `blob` and guard the resulting URL.
    pub fn create(urls: &ObjectUrls, blob: Blob) -> Self {
        let url = urls.create(blob);
        Self {
            urls: urls.clone(),
            url: Some(url),
        }
    }

    /// The guarded URL, `None` once released.
    pub fn url(&self) -> Option<&ObjectUrl> {
        self.url.as_ref()
    }

    /// Revoke now. Later calls and the drop are no-ops.
    pub fn release(&mut self) {
        if let Some(url) = self.url.take() {
            self.urls.revoke(&url);
        }
    }
}

impl Drop for UrlGuard {
    fn drop(&mut self) {
        self.release();
    }
}
