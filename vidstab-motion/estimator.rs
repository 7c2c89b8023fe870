use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;
use vidstab_core::{CorrespondenceSet, Transform};

/// Fewer correspondences than this and the pair is treated as motionless
pub const MIN_CORRESPONDENCES: usize = 4;

/// RANSAC settings for the similarity fit
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct EstimatorParams {
    /// Reprojection error (pixels) under which a correspondence is an inlier
    pub inlier_threshold: f64,
    pub max_iterations: usize,
    /// Probability that at least one sample is outlier free; drives early exit
    pub confidence: f64,
    /// Least-squares re-fits on the inlier set after sampling
    pub refine_iterations: usize,
    /// Seed for the per-call sampler, so equal inputs give equal outputs
    pub seed: u64,
}

impl Default for EstimatorParams {
    fn default() -> Self {
        Self {
            inlier_threshold: 3.0,
            max_iterations: 2000,
            confidence: 0.99,
            refine_iterations: 10,
            seed: 0x5EED,
        }
    }
}

/// Why an estimate fell back to the identity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Degradation {
    TooFewCorrespondences { found: usize },
    /// Every sample was degenerate or the result was not finite
    FitFailed,
}

/// Outcome of one estimation, including how it was obtained
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionEstimate {
    pub transform: Transform,
    /// Uniform scale of the fitted similarity; reported only, never accumulated
    pub scale: f64,
    pub inliers: usize,
    pub degraded: Option<Degradation>,
}

impl MotionEstimate {
    fn identity(degraded: Degradation) -> Self {
        Self {
            transform: Transform::IDENTITY,
            scale: 1.0,
            inliers: 0,
            degraded: Some(degraded),
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded.is_some()
    }
}

/// 4-DOF similarity `x' = a x - b y + tx`, `y' = b x + a y + ty`
#[derive(Debug, Clone, Copy, PartialEq)]
struct Similarity {
    a: f64,
    b: f64,
    tx: f64,
    ty: f64,
}

impl Similarity {
    #[inline]
    fn apply(&self, p: [f32; 2]) -> (f64, f64) {
        let (x, y) = (p[0] as f64, p[1] as f64);
        (self.a * x - self.b * y + self.tx, self.b * x + self.a * y + self.ty)
    }

    #[inline]
    fn sq_error(&self, src: [f32; 2], dst: [f32; 2]) -> f64 {
        let (x, y) = self.apply(src);
        let (ex, ey) = (x - dst[0] as f64, y - dst[1] as f64);
        ex * ex + ey * ey
    }

    fn is_finite(&self) -> bool {
        self.a.is_finite() && self.b.is_finite() && self.tx.is_finite() && self.ty.is_finite()
    }

    /// Closed-form least-squares fit over the selected pairs
    fn fit<I>(pairs: I) -> Option<Self>
    where
        I: Iterator<Item = ([f32; 2], [f32; 2])> + Clone,
    {
        let mut n = 0.0f64;
        let (mut sx, mut sy, mut dx, mut dy) = (0.0f64, 0.0f64, 0.0f64, 0.0f64);
        for (s, d) in pairs.clone() {
            n += 1.0;
            sx += s[0] as f64;
            sy += s[1] as f64;
            dx += d[0] as f64;
            dy += d[1] as f64;
        }
        if n < 2.0 {
            return None;
        }
        let (scx, scy, dcx, dcy) = (sx / n, sy / n, dx / n, dy / n);

        let (mut norm, mut dot, mut cross) = (0.0f64, 0.0f64, 0.0f64);
        for (s, d) in pairs {
            let (px, py) = (s[0] as f64 - scx, s[1] as f64 - scy);
            let (qx, qy) = (d[0] as f64 - dcx, d[1] as f64 - dcy);
            norm += px * px + py * py;
            dot += px * qx + py * qy;
            cross += px * qy - py * qx;
        }
        if norm < 1e-9 {
            return None;
        }

        let a = dot / norm;
        let b = cross / norm;
        let model = Similarity {
            a,
            b,
            tx: dcx - (a * scx - b * scy),
            ty: dcy - (b * scx + a * scy),
        };
        model.is_finite().then_some(model)
    }

    fn to_estimate(self, inliers: usize) -> MotionEstimate {
        MotionEstimate {
            transform: Transform::new(self.tx, self.ty, self.b.atan2(self.a)),
            scale: (self.a * self.a + self.b * self.b).sqrt(),
            inliers,
            degraded: None,
        }
    }
}

/// Robust frame-to-frame motion from keypoint correspondences.
///
/// Fits a partial affine (rotation, uniform scale, translation) with RANSAC
/// over two-point samples, then re-fits on the inliers. The result is always
/// a transform: weak input degrades to the identity.
#[derive(Debug, Clone, Default)]
pub struct TransformEstimator {
    params: EstimatorParams,
}

impl TransformEstimator {
    pub fn new(params: EstimatorParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &EstimatorParams {
        &self.params
    }

    pub fn estimate(&self, set: &CorrespondenceSet) -> Transform {
        self.estimate_detailed(set).transform
    }

    pub fn estimate_detailed(&self, set: &CorrespondenceSet) -> MotionEstimate {
        let n = set.len();
        if n < MIN_CORRESPONDENCES {
            debug!(found = n, required = MIN_CORRESPONDENCES, "too few correspondences, assuming no motion");
            return MotionEstimate::identity(Degradation::TooFewCorrespondences { found: n });
        }

        match self.ransac(set.prev_points(), set.cur_points()) {
            Some(estimate) => estimate,
            None => {
                debug!(correspondences = n, "motion fit failed, assuming no motion");
                MotionEstimate::identity(Degradation::FitFailed)
            }
        }
    }

    fn ransac(&self, src: &[[f32; 2]], dst: &[[f32; 2]]) -> Option<MotionEstimate> {
        let p = &self.params;
        let n = src.len();
        let threshold_sq = p.inlier_threshold * p.inlier_threshold;
        let mut rng = StdRng::seed_from_u64(p.seed);

        let count_inliers = |m: &Similarity| (0..n).filter(|&k| m.sq_error(src[k], dst[k]) < threshold_sq).count();

        let mut best: Option<(Similarity, usize)> = None;
        let mut required = p.max_iterations;
        let mut iteration = 0;

        while iteration < required.min(p.max_iterations) {
            iteration += 1;

            let i = rng.gen_range(0..n);
            let mut j = rng.gen_range(0..n - 1);
            if j >= i {
                j += 1;
            }

            let sample = [i, j].into_iter().map(|k| (src[k], dst[k]));
            let Some(model) = Similarity::fit(sample) else {
                continue;
            };

            let inliers = count_inliers(&model);
            if best.map_or(true, |(_, b)| inliers > b) {
                best = Some((model, inliers));
                required = adaptive_iterations(inliers, n, p.confidence, p.max_iterations);
            }
        }

        let (mut model, mut inliers) = best?;
        if inliers < 2 {
            return None;
        }

        for _ in 0..p.refine_iterations {
            let mask: Vec<usize> = (0..n).filter(|&k| model.sq_error(src[k], dst[k]) < threshold_sq).collect();
            let Some(refined) = Similarity::fit(mask.iter().map(|&k| (src[k], dst[k]))) else {
                break;
            };
            let refined_inliers = count_inliers(&refined);
            if refined_inliers < inliers || refined == model {
                break;
            }
            model = refined;
            inliers = refined_inliers;
        }

        Some(model.to_estimate(inliers))
    }
}

/// Number of two-point samples needed to hit an outlier-free one with `confidence`
fn adaptive_iterations(inliers: usize, total: usize, confidence: f64, cap: usize) -> usize {
    let ratio = inliers as f64 / total as f64;
    let p_good = ratio * ratio;
    if p_good >= 1.0 {
        return 1;
    }
    if p_good <= 0.0 {
        return cap;
    }
    let k = (1.0 - confidence).ln() / (1.0 - p_good).ln();
    if k.is_finite() {
        (k.ceil() as usize).clamp(1, cap)
    } else {
        cap
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid_points() -> Vec<[f32; 2]> {
        (0..6)
            .flat_map(|y| (0..6).map(move |x| [20.0 + 30.0 * x as f32, 15.0 + 25.0 * y as f32]))
            .collect()
    }

    fn moved(points: &[[f32; 2]], t: Transform) -> CorrespondenceSet {
        let m = t.to_affine();
        points
            .iter()
            .map(|&p| {
                let (x, y) = (p[0] as f64, p[1] as f64);
                let q = [
                    (m[0][0] * x + m[0][1] * y + m[0][2]) as f32,
                    (m[1][0] * x + m[1][1] * y + m[1][2]) as f32,
                ];
                (p, q)
            })
            .collect()
    }

    #[test]
    fn test_pure_translation() {
        let truth = Transform::new(4.0, -2.5, 0.0);
        let estimate = TransformEstimator::default().estimate_detailed(&moved(&grid_points(), truth));

        assert!(estimate.transform.approx_eq(&truth, 1e-3), "{:?}", estimate.transform);
        assert!((estimate.scale - 1.0).abs() < 1e-6);
        assert_eq!(estimate.inliers, 36);
        assert!(!estimate.is_degraded());
    }

    #[test]
    fn test_rotation_and_translation() {
        let truth = Transform::new(-3.0, 1.5, 0.05);
        let estimate = TransformEstimator::default().estimate(&moved(&grid_points(), truth));
        assert!(estimate.approx_eq(&truth, 1e-3), "{:?}", estimate);
    }

    #[test]
    fn test_outliers_are_rejected() {
        let truth = Transform::new(2.0, 3.0, -0.02);
        let mut set = moved(&grid_points(), truth);
        for k in 0..8 {
            let p = [10.0 + 17.0 * k as f32, 90.0];
            set.push(p, [p[0] + 40.0 + 3.0 * k as f32, p[1] - 25.0 - 2.0 * k as f32]);
        }

        let estimate = TransformEstimator::default().estimate_detailed(&set);
        assert!(estimate.transform.approx_eq(&truth, 1e-2), "{:?}", estimate.transform);
        assert_eq!(estimate.inliers, 36);
    }

    #[test]
    fn test_too_few_correspondences_is_identity() {
        let set = moved(&grid_points()[..3], Transform::new(5.0, 5.0, 0.0));
        let estimate = TransformEstimator::default().estimate_detailed(&set);

        assert_eq!(estimate.transform, Transform::IDENTITY);
        assert_eq!(estimate.degraded, Some(Degradation::TooFewCorrespondences { found: 3 }));

        let empty = TransformEstimator::default().estimate(&CorrespondenceSet::new());
        assert!(empty.is_identity());
    }

    #[test]
    fn test_degenerate_points_fail_to_identity() {
        let set: CorrespondenceSet = (0..6).map(|_| ([10.0, 10.0], [12.0, 11.0])).collect();
        let estimate = TransformEstimator::default().estimate_detailed(&set);

        assert_eq!(estimate.transform, Transform::IDENTITY);
        assert_eq!(estimate.degraded, Some(Degradation::FitFailed));
    }

    #[test]
    fn test_estimate_is_deterministic() {
        let mut set = moved(&grid_points(), Transform::new(1.0, -1.0, 0.01));
        set.push([5.0, 5.0], [80.0, 2.0]);
        let estimator = TransformEstimator::default();
        assert_eq!(estimator.estimate(&set), estimator.estimate(&set));
    }

    #[test]
    fn test_adaptive_iterations() {
        assert_eq!(adaptive_iterations(10, 10, 0.99, 500), 1);
        assert_eq!(adaptive_iterations(0, 10, 0.99, 500), 500);
        // half inliers: log(0.01) / log(0.75) = 16.008
        assert_eq!(adaptive_iterations(5, 10, 0.99, 500), 17);
    }
}
