use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use vidstab_core::Frame;
use vidstab_features::{DetectorBuilder, DetectorMethod, KeypointTracker};

/// Smooth texture shifted by (dx, dy) so tracking has something to lock onto
fn create_benchmark_frame(index: usize, width: usize, height: usize, dx: f32, dy: f32) -> Frame {
    let data = (0..width * height)
        .map(|i| {
            let x = (i % width) as f32 - dx;
            let y = (i / width) as f32 - dy;
            let v = 128.0 + 40.0 * (0.30 * x + 0.20 * y).sin() + 35.0 * (0.23 * y - 0.17 * x).cos();
            v.clamp(0.0, 255.0) as u8
        })
        .collect();
    Frame::from_gray(index, width, height, data)
}

/// Benchmark every detector variant at a few frame sizes
fn bench_detectors(c: &mut Criterion) {
    let mut group = c.benchmark_group("detect");

    for &(width, height) in &[(160, 120), (320, 240), (640, 480)] {
        let frame = create_benchmark_frame(0, width, height, 0.0, 0.0);
        for method in DetectorMethod::ALL {
            let detector = DetectorBuilder::new(method).build().unwrap();
            group.bench_with_input(
                BenchmarkId::new(method.name(), format!("{}x{}", width, height)),
                &frame,
                |b, frame| b.iter(|| black_box(detector.detect_frame(black_box(frame)).unwrap())),
            );
        }
    }

    group.finish();
}

/// Benchmark the tracking stages separately
fn bench_tracking(c: &mut Criterion) {
    let tracker = KeypointTracker::new(DetectorBuilder::default().build().unwrap());
    let prev = create_benchmark_frame(0, 320, 240, 0.0, 0.0);
    let cur = create_benchmark_frame(1, 320, 240, 2.5, -1.5);

    let mut group = c.benchmark_group("tracking");

    group.bench_function("prepare_320x240", |b| b.iter(|| black_box(tracker.prepare(black_box(&cur)).unwrap())));

    let prev_prepared = tracker.prepare(&prev).unwrap();
    let cur_prepared = tracker.prepare(&cur).unwrap();
    let keypoints = tracker.detect_prepared(&prev_prepared).unwrap();

    group.bench_function("track_prepared", |b| {
        b.iter(|| black_box(tracker.track_prepared(&prev_prepared, black_box(&keypoints), &cur_prepared)))
    });

    group.bench_function("detect_and_track", |b| {
        b.iter(|| {
            let kps = tracker.detect(black_box(&prev)).unwrap();
            black_box(tracker.track(&prev, &kps, black_box(&cur)).unwrap())
        })
    });

    group.finish();
}

criterion_group!(benches, bench_detectors, bench_tracking);
criterion_main!(benches);
