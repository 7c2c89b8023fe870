#![allow(dead_code)]

use vidstab_cli::{DetectorBuilder, DetectorKind, DetectorMethod, StabilizerSettings};
use vidstab_core::Frame;

pub const WIDTH: usize = 96;
pub const HEIGHT: usize = 80;

/// Smooth aperiodic texture viewed through a camera offset by (dx, dy)
pub fn textured_frame(index: usize, dx: f32, dy: f32, channels: usize) -> Frame {
    let mut data = Vec::with_capacity(WIDTH * HEIGHT * channels);
    for y in 0..HEIGHT {
        for x in 0..WIDTH {
            let (fx, fy) = (x as f32 - dx, y as f32 - dy);
            let v = 128.0
                + 40.0 * (0.30 * fx + 0.20 * fy).sin()
                + 35.0 * (0.23 * fy - 0.17 * fx).cos()
                + 25.0 * (0.11 * fx).sin() * (0.13 * fy).cos();
            let v = v.round().clamp(0.0, 255.0) as u8;
            for c in 0..channels {
                data.push(v.saturating_add((c * 10) as u8));
            }
        }
    }
    Frame::new(index, WIDTH, HEIGHT, channels, data)
}

/// Camera offsets of a hand-held shot
pub fn shaky_offsets(n: usize) -> Vec<(f32, f32)> {
    (0..n)
        .map(|i| {
            let t = i as f32;
            (2.0 * (1.3 * t).sin(), 1.5 * (0.9 * t).cos())
        })
        .collect()
}

pub fn frames_at(offsets: &[(f32, f32)]) -> Vec<Frame> {
    offsets
        .iter()
        .enumerate()
        .map(|(i, &(dx, dy))| textured_frame(i, dx, dy, 3))
        .collect()
}

/// Dense grid keypoints keep the tests independent of corner detector tuning
pub fn dense_detector() -> DetectorKind {
    DetectorBuilder::new(DetectorMethod::Dense)
        .option("step", 8)
        .option("border", 20)
        .to_kind()
        .unwrap()
}

pub fn settings(window: usize) -> StabilizerSettings {
    StabilizerSettings::default().with_window(window).with_detector(dense_detector())
}
