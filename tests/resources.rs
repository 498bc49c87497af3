//! Object URL lifetime tests for the output slot and source media.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{ScriptedLoader, ScriptedMedia};
use vidgif::{
    Blob, DOWNLOAD_FILE_NAME, EncodedOutput, LoadedMedia, ObjectUrls, OutputManager, UrlGuard,
    load_media,
};

fn loaded(urls: &ObjectUrls, name: &str) -> LoadedMedia {
    let loader = ScriptedLoader::new(ScriptedMedia::new(Duration::from_secs(1), 4, 4));
    load_media(&loader, urls, name.as_ref()).expect("scripted media loads")
}

fn output(bytes: &[u8]) -> EncodedOutput {
    EncodedOutput::new(bytes.to_vec(), 4, 4, 2)
}

// ── Output slot ────────────────────────────────────────────────────

#[test]
fn install_releases_source_and_binds_preview() {
    let urls = ObjectUrls::new();
    let mut outputs = OutputManager::new(urls.clone());
    let media = loaded(&urls, "clip.mp4");
    let source = media.source_url().cloned().unwrap();

    let preview = outputs.install(output(b"GIF89a-one"), media).clone();

    assert!(!urls.is_live(&source), "source URL released on install");
    assert!(urls.is_live(&preview.url));
    assert_eq!(urls.live_count(), 1);
    assert_eq!(preview.byte_len, 10);
    assert_eq!(preview.frame_count, 2);
    assert!(outputs.can_download());
    assert_eq!(outputs.preview(), Some(&preview));
    assert_eq!(outputs.output().map(EncodedOutput::data), Some(&b"GIF89a-one"[..]));
}

#[test]
fn reinstall_revokes_before_creating() {
    let urls = ObjectUrls::new();
    let mut outputs = OutputManager::new(urls.clone());

    let first = outputs.install(output(b"one"), loaded(&urls, "a.mp4")).clone();
    let second_media = loaded(&urls, "b.mp4");
    let (created_before, revoked_before) = urls.totals();

    let second = outputs.install(output(b"two"), second_media).clone();

    assert!(!urls.is_live(&first.url));
    assert!(urls.is_live(&second.url));
    assert_ne!(first.url, second.url);
    assert_eq!(urls.totals(), (created_before + 1, revoked_before + 2));
    assert_eq!(urls.live_count(), 1);
}

#[test]
fn clear_disables_download() {
    let urls = ObjectUrls::new();
    let mut outputs = OutputManager::new(urls.clone());
    outputs.install(output(b"one"), loaded(&urls, "a.mp4"));

    outputs.clear();

    assert!(!outputs.can_download());
    assert!(outputs.preview().is_none());
    assert_eq!(urls.live_count(), 0);
}

#[test]
fn dropping_the_slot_releases_its_url() {
    let urls = ObjectUrls::new();
    {
        let mut outputs = OutputManager::new(urls.clone());
        outputs.install(output(b"one"), loaded(&urls, "a.mp4"));
        assert_eq!(urls.live_count(), 1);
    }
    assert_eq!(urls.live_count(), 0);
    assert_eq!(urls.totals(), (2, 2));
}

// ── Downloads ──────────────────────────────────────────────────────

#[test]
fn download_saves_under_the_fixed_name() {
    let temporary_directory = tempfile::tempdir().expect("Failed to create temp dir");
    let urls = ObjectUrls::new();
    let mut outputs = OutputManager::new(urls.clone());
    outputs.install(output(b"GIF89a-bytes"), loaded(&urls, "a.mp4"));

    let saved = outputs
        .download_to(temporary_directory.path())
        .unwrap()
        .expect("live output is saved");

    assert_eq!(
        saved.file_name().and_then(|name| name.to_str()),
        Some(DOWNLOAD_FILE_NAME)
    );
    assert_eq!(std::fs::read(&saved).unwrap(), b"GIF89a-bytes");

    // A second download overwrites the same file.
    outputs.install(output(b"GIF89a-newer"), loaded(&urls, "b.mp4"));
    outputs.download_to(temporary_directory.path()).unwrap();
    assert_eq!(std::fs::read(&saved).unwrap(), b"GIF89a-newer");
    let entries = std::fs::read_dir(temporary_directory.path()).unwrap().count();
    assert_eq!(entries, 1, "no staging files are left behind");
}

#[test]
fn download_without_output_writes_nothing() {
    let temporary_directory = tempfile::tempdir().expect("Failed to create temp dir");
    let outputs = OutputManager::new(ObjectUrls::new());

    assert_eq!(
        outputs.download_to(temporary_directory.path()).unwrap(),
        None
    );
    assert_eq!(
        std::fs::read_dir(temporary_directory.path()).unwrap().count(),
        0
    );
}

#[test]
fn download_into_missing_directory_fails() {
    let temporary_directory = tempfile::tempdir().expect("Failed to create temp dir");
    let urls = ObjectUrls::new();
    let mut outputs = OutputManager::new(urls.clone());
    outputs.install(output(b"one"), loaded(&urls, "a.mp4"));

    let result = outputs.download_to(temporary_directory.path().join("missing"));

    assert!(matches!(result, Err(vidgif::ConvertError::Io(_))));
}

// ── Registry ───────────────────────────────────────────────────────

#[test]
fn dropped_media_releases_its_source() {
    let urls = ObjectUrls::new();
    let media = loaded(&urls, "a.mp4");
    assert_eq!(urls.live_count(), 1);
    drop(media);
    assert_eq!(urls.live_count(), 0);
}

#[test]
fn guards_and_blobs() {
    let urls = ObjectUrls::new();
    let guard = UrlGuard::create(&urls, Blob::gif(Arc::from(Vec::new())));
    let url = guard.url().cloned().unwrap();

    assert!(matches!(urls.resolve(&url), Some(blob) if blob.is_empty()));
    assert_eq!(Blob::file("clip.mp4").len(), None);

    drop(guard);
    assert!(urls.resolve(&url).is_none());
    assert!(!urls.revoke(&url), "revoking twice is a no-op");
}
