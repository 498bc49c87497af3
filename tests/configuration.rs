//! Quality options, delay policies and operational defaults.

use std::time::Duration;

use vidgif::{
    ConvertError, ConvertOptions, DEFAULT_MAX_DURATION, DEFAULT_SEEK_TIMEOUT, DelayPolicy,
    QualityOptions,
};

// ── Quality options ────────────────────────────────────────────────

#[test]
fn defaults_match_the_controls() {
    let options = QualityOptions::default();
    assert_eq!(options.quality, 10);
    assert_eq!(options.frame_rate, 8);
    assert_eq!(options.size_percent, 100);
    assert!(!options.dither);
}

#[test]
fn set_updates_value_and_label() {
    let mut options = QualityOptions::new();

    options.set("quality", "3").unwrap();
    options.set("frameRate", "15").unwrap();
    options.set("size", "50%").unwrap();
    options.set("dither", "on").unwrap();

    assert_eq!(options.label("quality").as_deref(), Some("Quality (3)"));
    assert_eq!(options.label("frameRate").as_deref(), Some("Frame rate (15)"));
    assert_eq!(options.label("size").as_deref(), Some("Size (50%)"));
    assert_eq!(options.label("dither").as_deref(), Some("Dither (on)"));
}

#[test]
fn aliases_reach_the_same_controls() {
    let mut options = QualityOptions::new();
    options.set("fps", "12").unwrap();
    options.set("size_percent", "25").unwrap();
    options.set("frame_rate", " 9 ").unwrap();

    assert_eq!(options.frame_rate, 9);
    assert_eq!(options.size_percent, 25);
}

#[test]
fn values_are_clamped_into_range() {
    let mut options = QualityOptions::new();
    options.set("quality", "0").unwrap();
    options.set("frameRate", "240").unwrap();
    options.set("size", "500").unwrap();
    assert_eq!(
        (options.quality, options.frame_rate, options.size_percent),
        (1, 30, 100)
    );

    options.set("quality", "99").unwrap();
    options.set("size", "0").unwrap();
    assert_eq!((options.quality, options.size_percent), (30, 1));
}

#[test]
fn bad_input_is_rejected_and_leaves_options_alone() {
    let mut options = QualityOptions::new().with_dither(true);
    let before = options;

    for (name, value) in [
        ("quality", "high"),
        ("dither", "maybe"),
        ("volume", "3"),
        ("size", "-5"),
    ] {
        match options.set(name, value) {
            Err(ConvertError::InvalidOption {
                name: rejected, ..
            }) => assert_eq!(rejected, name),
            other => panic!("{name}={value}: expected InvalidOption, got {other:?}"),
        }
    }
    assert_eq!(options, before);
    assert_eq!(options.label("volume"), None);
}

#[test]
fn output_dimensions_scale_native_size() {
    let options = QualityOptions::new().with_size_percent(50);
    assert_eq!(options.output_dimensions(640, 360), (320, 180));
    assert_eq!(options.output_dimensions(3, 3), (2, 2));
    assert_eq!(
        QualityOptions::new().output_dimensions(641, 361),
        (641, 361)
    );
}

// ── Delay policies ─────────────────────────────────────────────────

#[test]
fn frame_rate_delays_sum_to_the_sampled_span() {
    for frame_rate in [3, 7, 8, 12, 30] {
        let count = frame_rate as usize * 2;
        let delays = DelayPolicy::FrameRate.frame_delays(count, frame_rate);
        let total: Duration = delays.iter().sum();
        assert_eq!(total, Duration::from_secs(2), "{frame_rate} fps");
        assert!(delays.iter().all(|delay| delay.as_millis() % 10 == 0));
    }
}

#[test]
fn thirty_fps_never_collapses_to_zero() {
    let delays = DelayPolicy::FrameRate.frame_delays(30, 30);
    assert!(delays.iter().all(|delay| *delay >= Duration::from_millis(30)));
}

#[test]
fn fixed_delay_is_the_default_alternative() {
    assert_eq!(DelayPolicy::default(), DelayPolicy::FrameRate);
    let fixed = DelayPolicy::Fixed(Duration::from_millis(100)).frame_delays(5, 8);
    assert_eq!(fixed, vec![Duration::from_millis(100); 5]);
}

// ── Operational options ────────────────────────────────────────────

#[test]
fn convert_options_defaults() {
    let options = ConvertOptions::default();
    assert_eq!(options.max_duration(), DEFAULT_MAX_DURATION);
    assert_eq!(options.max_duration(), Duration::from_secs(5));
    assert_eq!(options.seek_timeout(), DEFAULT_SEEK_TIMEOUT);
    assert_eq!(options.delay_policy(), DelayPolicy::FrameRate);
    assert_eq!(options.workers(), 2);
}

#[test]
fn convert_options_builders() {
    let options = ConvertOptions::new()
        .with_max_duration(Duration::from_secs(3))
        .with_seek_timeout(Duration::from_millis(500))
        .with_workers(0)
        .with_delay_policy(DelayPolicy::Fixed(Duration::from_millis(50)));

    assert_eq!(options.max_duration(), Duration::from_secs(3));
    assert_eq!(options.seek_timeout(), Duration::from_millis(500));
    assert_eq!(options.workers(), 1, "worker count is at least one");
    assert_eq!(
        options.delay_policy(),
        DelayPolicy::Fixed(Duration::from_millis(50))
    );
    assert!(format!("{options:?}").contains("ConvertOptions"));
}
