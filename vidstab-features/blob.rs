use rayon::prelude::*;

use crate::refinement::KeypointRefinement;
use crate::types::ScoredKeypoint;

/// Outer half-sizes of the center-surround filters
const STAR_SIZES: [usize; 10] = [2, 3, 4, 6, 8, 11, 16, 22, 32, 45];

/// Summed-area table with one row/column of zero padding
pub struct IntegralImage {
    width: usize,
    sums: Vec<u64>,
}

impl IntegralImage {
    pub fn new(img: &[u8], width: usize, height: usize) -> Self {
        let stride = width + 1;
        let mut sums = vec![0u64; stride * (height + 1)];
        for y in 0..height {
            let mut row_sum = 0u64;
            for x in 0..width {
                row_sum += img[y * width + x] as u64;
                sums[(y + 1) * stride + x + 1] = sums[y * stride + x + 1] + row_sum;
            }
        }
        Self { width, sums }
    }

    /// Sum over the inclusive box `[x0, x1] x [y0, y1]`
    #[inline]
    pub fn box_sum(&self, x0: usize, y0: usize, x1: usize, y1: usize) -> u64 {
        let s = self.width + 1;
        self.sums[(y1 + 1) * s + x1 + 1] + self.sums[y0 * s + x0] - self.sums[y0 * s + x1 + 1] - self.sums[(y1 + 1) * s + x0]
    }
}

/// Center-surround (STAR-style) blob detector
pub struct BlobDetector;

impl BlobDetector {
    /// Blob centres whose center-minus-surround mean exceeds `response_threshold`
    pub fn detect(
        img: &[u8],
        width: usize,
        height: usize,
        max_size: usize,
        response_threshold: f32,
        suppress_nonmax_size: usize,
    ) -> Vec<ScoredKeypoint> {
        let sizes: Vec<usize> = STAR_SIZES.iter().copied().filter(|&s| s <= max_size).collect();
        let Some(&smallest) = sizes.first() else {
            return Vec::new();
        };
        if width <= 2 * smallest || height <= 2 * smallest {
            return Vec::new();
        }

        let integral = IntegralImage::new(img, width, height);
        let mut map = vec![0.0f32; width * height];

        map.par_chunks_mut(width).enumerate().for_each(|(y, row)| {
            for (x, value) in row.iter_mut().enumerate() {
                *value = Self::best_response(&integral, width, height, x, y, &sizes);
            }
        });

        let candidates: Vec<ScoredKeypoint> = (0..height)
            .flat_map(|y| (0..width).map(move |x| (x, y)))
            .filter(|&(x, y)| {
                let v = map[y * width + x];
                v >= response_threshold && v > 0.0 && KeypointRefinement::is_local_max(&map, width, height, x, y)
            })
            .map(|(x, y)| ScoredKeypoint::new(x as f32, y as f32, map[y * width + x]))
            .collect();

        KeypointRefinement::non_maximum_suppression(&candidates, suppress_nonmax_size as f32)
    }

    /// Largest |inner mean - ring mean| over the filter sizes that fit at (x, y)
    fn best_response(integral: &IntegralImage, width: usize, height: usize, x: usize, y: usize, sizes: &[usize]) -> f32 {
        let mut best = 0.0f32;
        for &r in sizes {
            if x < r || y < r || x + r >= width || y + r >= height {
                break;
            }
            let ri = (r / 2).max(1);
            let inner = integral.box_sum(x - ri, y - ri, x + ri, y + ri) as f32;
            let outer = integral.box_sum(x - r, y - r, x + r, y + r) as f32;
            let inner_n = ((2 * ri + 1) * (2 * ri + 1)) as f32;
            let outer_n = ((2 * r + 1) * (2 * r + 1)) as f32;

            let response = (inner / inner_n - (outer - inner) / (outer_n - inner_n)).abs();
            if response > best {
                best = response;
            }
        }
        best
    }
}
