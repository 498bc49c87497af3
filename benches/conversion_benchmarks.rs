//! Benchmarks for sampling, quantization and whole conversions.
//!
//! Run with: cargo bench
//!
//! Fixtures are synthesized in a temporary directory, so no video files or
//! FFmpeg install are needed.

use std::path::{Path, PathBuf};
use std::time::Duration;

use criterion::{BenchmarkId, Criterion};
use image::codecs::gif::{GifEncoder, Repeat};
use image::{Delay, Frame, Rgba, RgbaImage};
use vidgif::{
    ConvertOptions, Converter, DelayPolicy, EncoderBackend, EncoderSettings, FrameOptions,
    GifBackend, QualityOptions, RunToken, sample_timestamps,
};

const WIDTH: u32 = 160;
const HEIGHT: u32 = 90;

fn gradient(index: u32) -> RgbaImage {
    RgbaImage::from_fn(WIDTH, HEIGHT, |x, y| {
        Rgba([
            ((x + index * 7) % 256) as u8,
            ((y * 2 + index * 3) % 256) as u8,
            ((x + y) % 256) as u8,
            255,
        ])
    })
}

fn write_fixture(dir: &Path, frames: u32) -> PathBuf {
    let path = dir.join("fixture.gif");
    let file = std::fs::File::create(&path).unwrap();
    let mut encoder = GifEncoder::new_with_speed(file, 30);
    encoder.set_repeat(Repeat::Infinite).unwrap();
    encoder
        .encode_frames((0..frames).map(|index| {
            Frame::from_parts(gradient(index), 0, 0, Delay::from_numer_denom_ms(100, 1))
        }))
        .unwrap();
    path
}

fn benchmark_timestamp_planning(criterion: &mut Criterion) {
    criterion.bench_function("plan timestamps (5s @ 30fps)", |bencher| {
        bencher.iter(|| sample_timestamps(Duration::from_secs(60), 30));
    });

    criterion.bench_function("frame-rate delays (150 frames)", |bencher| {
        bencher.iter(|| DelayPolicy::FrameRate.frame_delays(150, 30));
    });
}

fn benchmark_quantization(criterion: &mut Criterion) {
    let frames: Vec<RgbaImage> = (0..16).map(gradient).collect();
    let mut group = criterion.benchmark_group("gif_render_16_frames");
    group.sample_size(10);

    for quality in [1_u8, 10, 30] {
        group.bench_with_input(BenchmarkId::new("quality", quality), &quality, |bencher, &quality| {
            bencher.iter(|| {
                let settings = EncoderSettings {
                    workers: 2,
                    quality,
                    width: WIDTH,
                    height: HEIGHT,
                    frame_rate: 8,
                    dither: false,
                    repeat: None,
                };
                let mut encoder = GifBackend::new().configure(&settings).unwrap();
                for frame in &frames {
                    encoder
                        .add_frame(
                            frame,
                            FrameOptions {
                                delay: Duration::from_millis(125),
                            },
                        )
                        .unwrap();
                }
                encoder.render(&|_fraction: f32| {}).unwrap()
            });
        });
    }

    group.finish();
}

fn benchmark_worker_scaling(criterion: &mut Criterion) {
    let frames: Vec<RgbaImage> = (0..16).map(gradient).collect();
    let mut group = criterion.benchmark_group("gif_render_workers");
    group.sample_size(10);

    for workers in [1_usize, 2, 4] {
        group.bench_with_input(BenchmarkId::new("workers", workers), &workers, |bencher, &workers| {
            bencher.iter(|| {
                let settings = EncoderSettings {
                    workers,
                    quality: 10,
                    width: WIDTH,
                    height: HEIGHT,
                    frame_rate: 8,
                    dither: true,
                    repeat: None,
                };
                let mut encoder = GifBackend::new().configure(&settings).unwrap();
                for frame in &frames {
                    encoder
                        .add_frame(
                            frame,
                            FrameOptions {
                                delay: Duration::from_millis(125),
                            },
                        )
                        .unwrap();
                }
                encoder.render(&|_fraction: f32| {}).unwrap()
            });
        });
    }

    group.finish();
}

fn benchmark_full_conversion(criterion: &mut Criterion) {
    let fixtures = tempfile::tempdir().unwrap();
    let input = write_fixture(fixtures.path(), 30);
    let converter = Converter::new().with_options(ConvertOptions::new());

    let mut group = criterion.benchmark_group("convert_gif_3s");
    group.sample_size(10);

    for size in [25_u32, 50, 100] {
        group.bench_with_input(BenchmarkId::new("size_percent", size), &size, |bencher, &size| {
            let quality = QualityOptions::new().with_size_percent(size);
            bencher.iter(|| {
                converter
                    .run(&input, quality, &RunToken::detached())
                    .unwrap()
                    .output()
                    .len()
            });
        });
    }

    group.finish();
}

criterion::criterion_group!(
    benches,
    benchmark_timestamp_planning,
    benchmark_quantization,
    benchmark_worker_scaling,
    benchmark_full_conversion,
);
criterion::criterion_main!(benches);
