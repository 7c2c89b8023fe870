use rayon::prelude::*;
use tracing::{debug, warn};
use vidstab_core::{CorrespondenceSet, Frame, Keypoint};

use crate::detector::KeypointDetector;
use crate::error::{check_frame, FeatureResult};
use crate::pyramid::{GrayPyramid, PyramidLevel};

/// Pyramidal Lucas-Kanade parameters
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct LkParams {
    /// Half size of the integration window; the window is (2r+1)^2 pixels
    pub window_radius: usize,
    /// Coarsest pyramid level, 0 disables the pyramid
    pub max_level: usize,
    pub max_iterations: usize,
    /// Stop iterating once the update is shorter than this (pixels)
    pub epsilon: f32,
    /// Minimum eigenvalue of the normalized gradient matrix
    pub min_eigen_threshold: f32,
    /// Mean absolute intensity difference above which a track is dropped
    pub max_residual: f32,
}

impl Default for LkParams {
    fn default() -> Self {
        Self {
            window_radius: 10,
            max_level: 3,
            max_iterations: 30,
            epsilon: 0.01,
            min_eigen_threshold: 1e-4,
            max_residual: 50.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackStatus {
    Tracked,
    /// Flat texture, diverged, or residual too large
    Lost,
    /// Converged outside the current frame
    OutOfBounds,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackedPoint {
    pub from: [f32; 2],
    pub to: [f32; 2],
    pub status: TrackStatus,
    pub residual: f32,
}

/// Grayscale image and pyramid for one frame, reusable as both the
/// "current" frame of one pair and the "previous" frame of the next
#[derive(Debug, Clone)]
pub struct TrackingFrame {
    pub index: usize,
    pub width: usize,
    pub height: usize,
    gray: Vec<u8>,
    pyramid: Option<GrayPyramid>,
}

impl TrackingFrame {
    pub fn is_empty(&self) -> bool {
        self.pyramid.is_none()
    }

    pub fn gray(&self) -> &[u8] {
        &self.gray
    }

    pub fn pyramid(&self) -> Option<&GrayPyramid> {
        self.pyramid.as_ref()
    }
}

/// Detects keypoints in one frame and follows them into the next
#[derive(Debug, Clone)]
pub struct KeypointTracker {
    detector: KeypointDetector,
    params: LkParams,
}

impl KeypointTracker {
    pub fn new(detector: KeypointDetector) -> Self {
        Self {
            detector,
            params: LkParams::default(),
        }
    }

    pub fn with_params(mut self, params: LkParams) -> Self {
        self.params = params;
        self
    }

    pub fn detector(&self) -> &KeypointDetector {
        &self.detector
    }

    pub fn params(&self) -> &LkParams {
        &self.params
    }

    /// Convert a frame to grayscale and build its tracking pyramid.
    ///
    /// A buffer that disagrees with the frame geometry is rejected before
    /// any pyramid level is sampled.
    pub fn prepare(&self, frame: &Frame) -> FeatureResult<TrackingFrame> {
        if frame.is_empty() {
            return Ok(TrackingFrame {
                index: frame.index,
                width: 0,
                height: 0,
                gray: Vec::new(),
                pyramid: None,
            });
        }
        check_frame(frame)?;

        let gray = frame.to_gray();
        let min_size = 2 * self.params.window_radius + 1;
        let pyramid = GrayPyramid::build(&gray, frame.width, frame.height, self.params.max_level, min_size);
        Ok(TrackingFrame {
            index: frame.index,
            width: frame.width,
            height: frame.height,
            gray,
            pyramid: Some(pyramid),
        })
    }

    /// Keypoints of a frame; an absent or empty frame yields none
    pub fn detect(&self, frame: &Frame) -> FeatureResult<Vec<Keypoint>> {
        self.detector.detect_frame(frame)
    }

    pub fn detect_prepared(&self, frame: &TrackingFrame) -> FeatureResult<Vec<Keypoint>> {
        if frame.is_empty() {
            return Ok(Vec::new());
        }
        self.detector.detect(&frame.gray, frame.width, frame.height)
    }

    /// Correspondences between `prev_keypoints` in `prev` and their tracked positions in `cur`
    pub fn track(&self, prev: &Frame, prev_keypoints: &[Keypoint], cur: &Frame) -> FeatureResult<CorrespondenceSet> {
        Ok(self.track_prepared(&self.prepare(prev)?, prev_keypoints, &self.prepare(cur)?))
    }

    pub fn track_prepared(
        &self,
        prev: &TrackingFrame,
        prev_keypoints: &[Keypoint],
        cur: &TrackingFrame,
    ) -> CorrespondenceSet {
        let tracked = self.track_points(prev, prev_keypoints, cur);
        let set: CorrespondenceSet = tracked
            .iter()
            .filter(|t| t.status == TrackStatus::Tracked)
            .map(|t| (t.from, t.to))
            .collect();

        debug!(
            prev = prev.index,
            cur = cur.index,
            requested = prev_keypoints.len(),
            tracked = set.len(),
            "tracked keypoints"
        );
        set
    }

    /// Per-point tracking results in input order, including lost points
    pub fn track_points(&self, prev: &TrackingFrame, prev_keypoints: &[Keypoint], cur: &TrackingFrame) -> Vec<TrackedPoint> {
        let (prev_pyr, cur_pyr) = match (&prev.pyramid, &cur.pyramid) {
            (Some(p), Some(c)) => (p, c),
            _ => return Vec::new(),
        };
        if (prev.width, prev.height) != (cur.width, cur.height) {
            warn!(
                prev = ?(prev.width, prev.height),
                cur = ?(cur.width, cur.height),
                "frame size changed between consecutive frames, skipping tracking"
            );
            return Vec::new();
        }

        let levels = prev_pyr.num_levels().min(cur_pyr.num_levels());
        prev_keypoints
            .par_iter()
            .map(|kp| self.track_one(prev_pyr, cur_pyr, levels, [kp.x, kp.y]))
            .collect()
    }

    fn track_one(&self, prev: &GrayPyramid, cur: &GrayPyramid, levels: usize, from: [f32; 2]) -> TrackedPoint {
        let p = &self.params;
        let mut guess = [0.0f32; 2];
        let mut delta = [0.0f32; 2];

        for level in (0..levels).rev() {
            let scale = (1u32 << level) as f32;
            let at = [from[0] / scale, from[1] / scale];
            let prev_l = prev.level(level);
            let cur_l = cur.level(level);

            delta = match refine(prev_l, cur_l, at, guess, p) {
                Some(d) => d,
                None if level == 0 => return lost(from),
                None => [0.0, 0.0],
            };

            if level > 0 {
                guess = [2.0 * (guess[0] + delta[0]), 2.0 * (guess[1] + delta[1])];
            }
        }

        let to = [from[0] + guess[0] + delta[0], from[1] + guess[1] + delta[1]];
        if !to[0].is_finite() || !to[1].is_finite() {
            return lost(from);
        }

        let base = prev.base();
        let (max_x, max_y) = ((base.width - 1) as f32, (base.height - 1) as f32);
        if to[0] < 0.0 || to[1] < 0.0 || to[0] > max_x || to[1] > max_y {
            return TrackedPoint {
                from,
                to,
                status: TrackStatus::OutOfBounds,
                residual: f32::INFINITY,
            };
        }

        let residual = window_residual(base, cur.base(), from, to, p.window_radius);
        let status = if residual > p.max_residual {
            TrackStatus::Lost
        } else {
            TrackStatus::Tracked
        };
        TrackedPoint { from, to, status, residual }
    }
}

fn lost(from: [f32; 2]) -> TrackedPoint {
    TrackedPoint {
        from,
        to: from,
        status: TrackStatus::Lost,
        residual: f32::INFINITY,
    }
}

/// Iterative LK refinement at one level. Returns the displacement on top of
/// `guess`, or `None` when the template is too flat to track.
fn refine(prev: &PyramidLevel, cur: &PyramidLevel, at: [f32; 2], guess: [f32; 2], p: &LkParams) -> Option<[f32; 2]> {
    let r = p.window_radius as i32;
    let n = ((2 * r + 1) * (2 * r + 1)) as usize;

    let mut template = Vec::with_capacity(n);
    let mut grads = Vec::with_capacity(n);
    let (mut gxx, mut gxy, mut gyy) = (0.0f32, 0.0f32, 0.0f32);

    for j in -r..=r {
        for i in -r..=r {
            let x = at[0] + i as f32;
            let y = at[1] + j as f32;
            let ix = 0.5 * (prev.sample(x + 1.0, y) - prev.sample(x - 1.0, y));
            let iy = 0.5 * (prev.sample(x, y + 1.0) - prev.sample(x, y - 1.0));
            gxx += ix * ix;
            gxy += ix * iy;
            gyy += iy * iy;
            template.push(prev.sample(x, y));
            grads.push((ix, iy));
        }
    }

    let det = gxx * gyy - gxy * gxy;
    let trace_half = 0.5 * (gxx + gyy);
    let min_eigen = trace_half - (trace_half * trace_half - det).max(0.0).sqrt();
    if min_eigen / (n as f32) < p.min_eigen_threshold || det.abs() < f32::EPSILON {
        return None;
    }

    let mut v = [0.0f32; 2];
    for _ in 0..p.max_iterations {
        let (mut bx, mut by) = (0.0f32, 0.0f32);
        let mut k = 0;
        for j in -r..=r {
            for i in -r..=r {
                let x = at[0] + guess[0] + v[0] + i as f32;
                let y = at[1] + guess[1] + v[1] + j as f32;
                let diff = template[k] - cur.sample(x, y);
                bx += diff * grads[k].0;
                by += diff * grads[k].1;
                k += 1;
            }
        }

        let ex = (gyy * bx - gxy * by) / det;
        let ey = (gxx * by - gxy * bx) / det;
        v[0] += ex;
        v[1] += ey;

        if !v[0].is_finite() || !v[1].is_finite() {
            return None;
        }
        if ex * ex + ey * ey < p.epsilon * p.epsilon {
            break;
        }
    }

    Some(v)
}

fn window_residual(prev: &PyramidLevel, cur: &PyramidLevel, from: [f32; 2], to: [f32; 2], radius: usize) -> f32 {
    let r = radius as i32;
    let mut sum = 0.0f32;
    for j in -r..=r {
        for i in -r..=r {
            let (di, dj) = (i as f32, j as f32);
            sum += (prev.sample(from[0] + di, from[1] + dj) - cur.sample(to[0] + di, to[1] + dj)).abs();
        }
    }
    sum / ((2 * r + 1) * (2 * r + 1)) as f32
}
