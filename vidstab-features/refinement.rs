use std::collections::HashMap;

use crate::types::ScoredKeypoint;

/// Suppression and orientation helpers shared by the detectors
pub struct KeypointRefinement;

impl KeypointRefinement {
    /// Greedy suppression: keep the strongest keypoints, drop any closer than
    /// `min_distance` to one already kept. Output is sorted by response.
    pub fn non_maximum_suppression(keypoints: &[ScoredKeypoint], min_distance: f32) -> Vec<ScoredKeypoint> {
        let mut sorted = keypoints.to_vec();
        sorted.sort_by(|a, b| b.response.partial_cmp(&a.response).unwrap_or(std::cmp::Ordering::Equal));

        if min_distance <= 0.0 || sorted.len() < 2 {
            return sorted;
        }

        let min_distance_sq = min_distance * min_distance;
        let cell_of = |v: f32| (v / min_distance).floor() as i64;
        let mut grid: HashMap<(i64, i64), Vec<usize>> = HashMap::new();
        let mut kept: Vec<ScoredKeypoint> = Vec::new();

        for candidate in sorted {
            let (cx, cy) = (cell_of(candidate.keypoint.x), cell_of(candidate.keypoint.y));

            let too_close = (-1..=1).any(|gy| {
                (-1..=1).any(|gx| {
                    grid.get(&(cx + gx, cy + gy)).is_some_and(|idxs| {
                        idxs.iter().any(|&i| {
                            let dx = candidate.keypoint.x - kept[i].keypoint.x;
                            let dy = candidate.keypoint.y - kept[i].keypoint.y;
                            dx * dx + dy * dy < min_distance_sq
                        })
                    })
                })
            });

            if !too_close {
                grid.entry((cx, cy)).or_default().push(kept.len());
                kept.push(candidate);
            }
        }

        kept
    }

    /// True when `map[y * width + x]` is not exceeded by any 8-neighbour
    pub fn is_local_max(map: &[f32], width: usize, height: usize, x: usize, y: usize) -> bool {
        let v = map[y * width + x];
        for ny in y.saturating_sub(1)..=(y + 1).min(height - 1) {
            for nx in x.saturating_sub(1)..=(x + 1).min(width - 1) {
                if (nx, ny) != (x, y) && map[ny * width + nx] > v {
                    return false;
                }
            }
        }
        true
    }

    /// Orientation by the intensity-centroid method over a square patch
    pub fn compute_orientation(img: &[u8], width: usize, height: usize, x: f32, y: f32, patch_size: usize) -> f32 {
        let half = (patch_size / 2) as i64;
        let (cx, cy) = (x.round() as i64, y.round() as i64);

        if cx - half < 0 || cy - half < 0 || cx + half >= width as i64 || cy + half >= height as i64 {
            return 0.0;
        }

        let mut m10 = 0i64;
        let mut m01 = 0i64;
        for dy in -half..=half {
            let row = ((cy + dy) as usize) * width;
            for dx in -half..=half {
                let val = img[row + (cx + dx) as usize] as i64;
                m10 += dx * val;
                m01 += dy * val;
            }
        }

        if m10 == 0 && m01 == 0 {
            0.0
        } else {
            (m01 as f32).atan2(m10 as f32)
        }
    }
}
