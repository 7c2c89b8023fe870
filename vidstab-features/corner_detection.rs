use rayon::prelude::*;

use crate::refinement::KeypointRefinement;
use crate::types::ScoredKeypoint;
use crate::utils::{clamp_coord, has_consecutive_pixels};

/// Corner measure computed from the gradient structure tensor
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CornerResponse {
    /// Smaller eigenvalue (Shi-Tomasi)
    MinEigen,
    /// `det - k * trace^2`
    Harris { k: f32 },
}

/// Corner detection algorithms (FAST segment test and structure-tensor corners)
pub struct CornerDetector;

impl CornerDetector {
    /// FAST circle offsets, clockwise from 12 o'clock
    pub const FAST_OFFSETS: [(i32, i32); 16] = [
        (0, -3), (1, -3), (2, -2), (3, -1),
        (3, 0), (3, 1), (2, 2), (1, 3),
        (0, 3), (-1, 3), (-2, 2), (-3, 1),
        (-3, 0), (-3, -1), (-2, -2), (-1, -3),
    ];

    /// Minimum arc length for FAST-9
    const ARC_LENGTH: usize = 9;

    /// FAST-9 corners with their segment scores, rows processed in parallel
    pub fn fast(img: &[u8], width: usize, height: usize, threshold: u8) -> Vec<ScoredKeypoint> {
        if width < 7 || height < 7 {
            return Vec::new();
        }

        (3..height - 3)
            .into_par_iter()
            .flat_map_iter(|y| {
                (3..width - 3).filter_map(move |x| {
                    Self::segment_score(img, width, x, y, threshold)
                        .map(|score| ScoredKeypoint::new(x as f32, y as f32, score))
                })
            })
            .collect()
    }

    /// Segment test; returns the summed excess contrast of the circle when the pixel is a corner
    fn segment_score(img: &[u8], width: usize, x: usize, y: usize, threshold: u8) -> Option<f32> {
        let center = img[y * width + x] as i32;
        let t = threshold as i32;

        let mut brighter = [false; 16];
        let mut darker = [false; 16];
        let mut bright_sum = 0i32;
        let mut dark_sum = 0i32;

        for (i, &(dx, dy)) in Self::FAST_OFFSETS.iter().enumerate() {
            let px = (x as i32 + dx) as usize;
            let py = (y as i32 + dy) as usize;
            let p = img[py * width + px] as i32;

            if p > center + t {
                brighter[i] = true;
                bright_sum += p - center - t;
            } else if p < center - t {
                darker[i] = true;
                dark_sum += center - p - t;
            }
        }

        if has_consecutive_pixels(&brighter, Self::ARC_LENGTH) {
            Some(bright_sum as f32)
        } else if has_consecutive_pixels(&darker, Self::ARC_LENGTH) {
            Some(dark_sum as f32)
        } else {
            None
        }
    }

    /// Sobel gradients with replicated borders, scaled by 1/8
    pub fn sobel_gradients(img: &[u8], width: usize, height: usize) -> (Vec<f32>, Vec<f32>) {
        let mut gx = vec![0.0f32; width * height];
        let mut gy = vec![0.0f32; width * height];

        gx.par_chunks_mut(width)
            .zip(gy.par_chunks_mut(width))
            .enumerate()
            .for_each(|(y, (row_x, row_y))| {
                let ym = clamp_coord(y as i64 - 1, height) * width;
                let yc = y * width;
                let yp = clamp_coord(y as i64 + 1, height) * width;
                for x in 0..width {
                    let xm = clamp_coord(x as i64 - 1, width);
                    let xp = clamp_coord(x as i64 + 1, width);
                    let p = |row: usize, col: usize| img[row + col] as f32;

                    row_x[x] = (p(ym, xp) + 2.0 * p(yc, xp) + p(yp, xp) - p(ym, xm) - 2.0 * p(yc, xm) - p(yp, xm)) / 8.0;
                    row_y[x] = (p(yp, xm) + 2.0 * p(yp, x) + p(yp, xp) - p(ym, xm) - 2.0 * p(ym, x) - p(ym, xp)) / 8.0;
                }
            });

        (gx, gy)
    }

    /// Per-pixel corner response over a `block_size` x `block_size` window
    pub fn response_map(img: &[u8], width: usize, height: usize, block_size: usize, response: CornerResponse) -> Vec<f32> {
        let (gx, gy) = Self::sobel_gradients(img, width, height);
        let r = (block_size / 2) as i64;
        let mut out = vec![0.0f32; width * height];

        out.par_chunks_mut(width).enumerate().for_each(|(y, row)| {
            for (x, value) in row.iter_mut().enumerate() {
                let (mut a, mut b, mut c) = (0.0f32, 0.0f32, 0.0f32);
                for dy in -r..=r {
                    let yy = clamp_coord(y as i64 + dy, height) * width;
                    for dx in -r..=r {
                        let i = yy + clamp_coord(x as i64 + dx, width);
                        a += gx[i] * gx[i];
                        b += gx[i] * gy[i];
                        c += gy[i] * gy[i];
                    }
                }
                *value = match response {
                    CornerResponse::MinEigen => 0.5 * ((a + c) - ((a - c) * (a - c) + 4.0 * b * b).sqrt()),
                    CornerResponse::Harris { k } => a * c - b * b - k * (a + c) * (a + c),
                };
            }
        });

        out
    }

    /// Strongest corners above `quality_level * max_response`, at least `min_distance` apart
    pub fn good_features(
        img: &[u8],
        width: usize,
        height: usize,
        max_corners: usize,
        quality_level: f32,
        min_distance: f32,
        block_size: usize,
        response: CornerResponse,
    ) -> Vec<ScoredKeypoint> {
        if width < 3 || height < 3 {
            return Vec::new();
        }

        let map = Self::response_map(img, width, height, block_size, response);
        let max_response = map.iter().cloned().fold(0.0f32, f32::max);
        if max_response <= 0.0 {
            return Vec::new();
        }
        let threshold = max_response * quality_level;

        let candidates: Vec<ScoredKeypoint> = (1..height - 1)
            .into_par_iter()
            .flat_map_iter(|y| {
                let map = &map;
                (1..width - 1).filter_map(move |x| {
                    let v = map[y * width + x];
                    (v > threshold && KeypointRefinement::is_local_max(map, width, height, x, y))
                        .then(|| ScoredKeypoint::new(x as f32, y as f32, v))
                })
            })
            .collect();

        let mut corners = KeypointRefinement::non_maximum_suppression(&candidates, min_distance);
        if max_corners > 0 {
            corners.truncate(max_corners);
        }
        corners
    }

    /// Harris response at a single pixel (7x7 window), used for ranking
    pub fn harris_at(img: &[u8], width: usize, height: usize, x: usize, y: usize, k: f32) -> f32 {
        if x < 4 || y < 4 || x + 4 >= width || y + 4 >= height {
            return 0.0;
        }

        let (mut a, mut b, mut c) = (0.0f32, 0.0f32, 0.0f32);
        for yy in y - 3..=y + 3 {
            for xx in x - 3..=x + 3 {
                let p = |px: usize, py: usize| img[py * width + px] as f32;
                let ix = (p(xx + 1, yy - 1) + 2.0 * p(xx + 1, yy) + p(xx + 1, yy + 1)
                    - p(xx - 1, yy - 1) - 2.0 * p(xx - 1, yy) - p(xx - 1, yy + 1)) / 8.0;
                let iy = (p(xx - 1, yy + 1) + 2.0 * p(xx, yy + 1) + p(xx + 1, yy + 1)
                    - p(xx - 1, yy - 1) - 2.0 * p(xx, yy - 1) - p(xx + 1, yy - 1)) / 8.0;
                a += ix * ix;
                b += ix * iy;
                c += iy * iy;
            }
        }

        a * c - b * b - k * (a + c) * (a + c)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_square_image(width: usize, height: usize, x0: usize, y0: usize, size: usize) -> Vec<u8> {
        let mut img = vec![50u8; width * height];
        for y in y0..y0 + size {
            for x in x0..x0 + size {
                img[y * width + x] = 220;
            }
        }
        img
    }

    #[test]
    fn test_uniform_image_has_no_corners() {
        let img = vec![128u8; 32 * 32];
        assert!(CornerDetector::fast(&img, 32, 32, 20).is_empty());
        assert!(CornerDetector::good_features(&img, 32, 32, 100, 0.01, 5.0, 3, CornerResponse::MinEigen).is_empty());
    }

    #[test]
    fn test_fast_finds_square_corners() {
        let img = create_square_image(40, 40, 12, 12, 14);
        let corners = CornerDetector::fast(&img, 40, 40, 20);
        assert!(!corners.is_empty());
        // Every detection lies near the square outline
        for c in &corners {
            let (x, y) = (c.keypoint.x, c.keypoint.y);
            assert!((9.0..=29.0).contains(&x) && (9.0..=29.0).contains(&y));
            assert!(c.response > 0.0);
        }
    }

    #[test]
    fn test_fast_too_small() {
        let img = vec![0u8; 36];
        assert!(CornerDetector::fast(&img, 6, 6, 20).is_empty());
    }

    #[test]
    fn test_good_features_near_square_corners() {
        let img = create_square_image(48, 48, 14, 14, 20);
        let corners = CornerDetector::good_features(&img, 48, 48, 4, 0.1, 8.0, 3, CornerResponse::MinEigen);
        assert_eq!(corners.len(), 4);

        let expected = [(14.0, 14.0), (33.0, 14.0), (14.0, 33.0), (33.0, 33.0)];
        for c in &corners {
            let near = expected
                .iter()
                .any(|&(ex, ey)| (c.keypoint.x - ex).abs() <= 2.0 && (c.keypoint.y - ey).abs() <= 2.0);
            assert!(near, "unexpected corner at ({}, {})", c.keypoint.x, c.keypoint.y);
        }
    }

    #[test]
    fn test_harris_response_sign() {
        let img = create_square_image(48, 48, 14, 14, 20);
        // Corner is positive, straight edge is negative, flat is zero
        assert!(CornerDetector::harris_at(&img, 48, 48, 14, 14, 0.04) > 0.0);
        assert!(CornerDetector::harris_at(&img, 48, 48, 24, 14, 0.04) < 0.0);
        assert_eq!(CornerDetector::harris_at(&img, 48, 48, 5, 5, 0.04), 0.0);
    }

    #[test]
    fn test_sobel_on_ramp() {
        let (w, h) = (8, 8);
        let img: Vec<u8> = (0..w * h).map(|i| ((i % w) * 10) as u8).collect();
        let (gx, gy) = CornerDetector::sobel_gradients(&img, w, h);
        assert!((gx[3 * w + 3] - 10.0).abs() < 1e-4);
        assert!(gy[3 * w + 3].abs() < 1e-4);
    }
}
