//! GIF input tests: timeline layout, seeking and loader sniffing.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{gif_bytes, palette_colour, write_gif};
use image::Rgba;
use vidgif::{
    Blob, ConvertError, DefaultLoader, GifMedia, MediaHandle, MediaLoader, ObjectUrls, ReadyState,
    SeekOutcome, load_media,
};

// ── Timeline ───────────────────────────────────────────────────────

#[test]
fn frames_are_laid_out_by_delay() {
    let temporary_directory = tempfile::tempdir().expect("Failed to create temp dir");
    let path = write_gif(temporary_directory.path(), "three.gif", 8, 4, 3);

    let mut media = GifMedia::open(&path).expect("Failed to open GIF");
    assert_eq!(media.frame_count(), 3);
    assert_eq!(media.ready_state(), ReadyState::HaveMetadata);

    media.wait_loaded().expect("GIF should load");
    let info = media.info();
    assert_eq!(info.duration, Duration::from_millis(300));
    assert_eq!((info.width, info.height), (8, 4));
    assert_eq!(media.ready_state(), ReadyState::HaveEnoughData);
    assert_eq!(
        media.current_frame().map(|frame| *frame.get_pixel(0, 0)),
        Some(palette_colour(0))
    );
}

#[test]
fn tiny_delays_play_at_a_tenth_of_a_second() {
    let red = Rgba([255, 0, 0, 255]);
    let blue = Rgba([0, 0, 255, 255]);
    let mut media = GifMedia::from_bytes(gif_bytes(4, 4, &[(red, 10), (blue, 10)]))
        .expect("Failed to decode GIF");
    media.wait_loaded().unwrap();

    assert_eq!(media.info().duration, Duration::from_millis(200));
}

#[test]
fn invalid_bytes_fail_to_load() {
    let result = GifMedia::from_bytes(b"GIF89a but not really".to_vec());
    assert!(matches!(result, Err(ConvertError::Load { .. })));
}

// ── Seeking ────────────────────────────────────────────────────────

#[test]
fn seek_lands_on_the_displayed_frame() {
    let temporary_directory = tempfile::tempdir().expect("Failed to create temp dir");
    let path = write_gif(temporary_directory.path(), "four.gif", 6, 6, 4);
    let mut media = GifMedia::open(&path).unwrap();
    media.wait_loaded().unwrap();

    for (position_ms, expected_frame) in [
        (0, 0),
        (99, 0),
        (100, 1),
        (250, 2),
        (399, 3),
        (10_000, 3),
    ] {
        media.seek(Duration::from_millis(position_ms)).unwrap();
        assert_eq!(
            media.wait_seeked(Duration::from_millis(10)).unwrap(),
            SeekOutcome::Settled
        );
        let pixel = *media.current_frame().unwrap().get_pixel(3, 3);
        assert_eq!(pixel, palette_colour(expected_frame), "at {position_ms} ms");
    }
}

#[test]
fn waiting_without_a_seek_times_out() {
    let mut media = GifMedia::from_bytes(gif_bytes(2, 2, &[(palette_colour(0), 100)])).unwrap();
    media.wait_loaded().unwrap();

    assert_eq!(
        media.wait_seeked(Duration::from_millis(5)).unwrap(),
        SeekOutcome::TimedOut
    );

    media.seek(Duration::ZERO).unwrap();
    assert_eq!(
        media.wait_seeked(Duration::from_millis(5)).unwrap(),
        SeekOutcome::Settled
    );
    assert_eq!(
        media.wait_seeked(Duration::from_millis(5)).unwrap(),
        SeekOutcome::TimedOut,
        "a seek is acknowledged once"
    );
}

// ── Loader ─────────────────────────────────────────────────────────

#[test]
fn default_loader_opens_gif_files() {
    let temporary_directory = tempfile::tempdir().expect("Failed to create temp dir");
    let path = write_gif(temporary_directory.path(), "clip.bin", 10, 5, 2);

    let mut handle = DefaultLoader.open(&Blob::file(&path)).expect("GIF is sniffed by content");
    handle.wait_loaded().unwrap();
    assert_eq!(handle.info().duration, Duration::from_millis(200));
}

#[test]
fn default_loader_opens_in_memory_gifs() {
    let bytes = gif_bytes(3, 3, &[(palette_colour(2), 100)]);
    let mut handle = DefaultLoader
        .open(&Blob::gif(Arc::from(bytes)))
        .expect("in-memory GIF should open");
    handle.wait_loaded().unwrap();
    assert_eq!((handle.info().width, handle.info().height), (3, 3));
}

#[test]
fn default_loader_rejects_missing_files() {
    let result = DefaultLoader.open(&Blob::file("/definitely/not/here.mp4"));
    assert!(matches!(result, Err(ConvertError::Load { .. })));
}

#[cfg(not(feature = "ffmpeg"))]
#[test]
fn non_gif_input_needs_ffmpeg() {
    let temporary_directory = tempfile::tempdir().expect("Failed to create temp dir");
    let path = temporary_directory.path().join("clip.mp4");
    std::fs::write(&path, b"\x00\x00\x00\x18ftypmp42").unwrap();

    match DefaultLoader.open(&Blob::file(&path)) {
        Err(ConvertError::Load { reason, .. }) => assert!(reason.contains("ffmpeg")),
        Err(other) => panic!("expected Load, got {other}"),
        Ok(_) => panic!("expected Load, got a handle"),
    }
}

#[test]
fn load_media_holds_the_source_url_until_released() {
    let temporary_directory = tempfile::tempdir().expect("Failed to create temp dir");
    let path = write_gif(temporary_directory.path(), "clip.gif", 4, 4, 2);
    let urls = ObjectUrls::new();

    let media = load_media(&DefaultLoader, &urls, &path).expect("GIF should load");
    let url = media.source_url().cloned().expect("URL is live while loaded");
    assert!(urls.is_live(&url));
    assert!(matches!(
        urls.resolve(&url),
        Some(Blob::File(file)) if file == path
    ));
    assert_eq!(media.path(), path.as_path());

    media.release();
    assert!(!urls.is_live(&url));
    assert_eq!(urls.totals(), (1, 1));
}

#[test]
fn load_media_releases_the_url_on_failure() {
    let temporary_directory = tempfile::tempdir().expect("Failed to create temp dir");
    let path = temporary_directory.path().join("broken.gif");
    std::fs::write(&path, b"GIF89a\x01").unwrap();
    let urls = ObjectUrls::new();

    let result = load_media(&DefaultLoader, &urls, &path);

    assert!(matches!(result, Err(ConvertError::Load { .. })));
    assert_eq!(urls.live_count(), 0);
    assert_eq!(urls.totals(), (1, 1));
}
