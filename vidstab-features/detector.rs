use tracing::{trace, warn};
use vidstab_core::{Frame, Keypoint};

use crate::blob::BlobDetector;
use crate::config::{DenseOptions, DetectorKind, DetectorMethod, OrbOptions};
use crate::corner_detection::{CornerDetector, CornerResponse};
use crate::error::{check_frame, FeatureError, FeatureResult};
use crate::pyramid::ImagePyramid;
use crate::refinement::KeypointRefinement;
use crate::types::ScoredKeypoint;

/// Runtime keypoint detector for one validated `DetectorKind`
#[derive(Debug, Clone)]
pub struct KeypointDetector {
    kind: DetectorKind,
}

impl KeypointDetector {
    pub(crate) fn new(kind: DetectorKind) -> Self {
        Self { kind }
    }

    /// Validate the option set and create the detector
    pub fn from_kind(kind: DetectorKind) -> FeatureResult<Self> {
        kind.validate()?;
        Ok(Self::new(kind))
    }

    pub fn kind(&self) -> &DetectorKind {
        &self.kind
    }

    pub fn method(&self) -> DetectorMethod {
        self.kind.method()
    }

    /// Detect keypoints in a row-major grayscale image
    pub fn detect(&self, img: &[u8], width: usize, height: usize) -> FeatureResult<Vec<Keypoint>> {
        Ok(self
            .detect_scored(img, width, height)?
            .into_iter()
            .map(|sk| sk.keypoint)
            .collect())
    }

    /// Detect keypoints in a frame; an empty frame yields no keypoints
    pub fn detect_frame(&self, frame: &Frame) -> FeatureResult<Vec<Keypoint>> {
        if frame.is_empty() {
            return Ok(Vec::new());
        }
        check_frame(frame)?;
        self.detect(&frame.to_gray(), frame.width, frame.height)
    }

    /// Detect keypoints with their responses, strongest first where the method ranks them
    pub fn detect_scored(&self, img: &[u8], width: usize, height: usize) -> FeatureResult<Vec<ScoredKeypoint>> {
        let expected_len = width * height;
        if img.len() != expected_len {
            return Err(FeatureError::InvalidImageData {
                expected_len,
                actual_len: img.len(),
            });
        }
        if expected_len == 0 {
            return Ok(Vec::new());
        }

        let keypoints = match &self.kind {
            DetectorKind::Fast(o) => {
                let corners = CornerDetector::fast(img, width, height, o.threshold);
                if o.nonmax_suppression {
                    KeypointRefinement::non_maximum_suppression(&corners, 3.0)
                } else {
                    corners
                }
            }
            DetectorKind::Gftt(o) => CornerDetector::good_features(
                img,
                width,
                height,
                o.max_corners,
                o.quality_level as f32,
                o.min_distance as f32,
                o.block_size,
                CornerResponse::MinEigen,
            ),
            DetectorKind::Harris(o) => CornerDetector::good_features(
                img,
                width,
                height,
                o.max_corners,
                o.quality_level as f32,
                o.min_distance as f32,
                o.block_size,
                CornerResponse::Harris { k: o.k as f32 },
            ),
            DetectorKind::Orb(o) => detect_orb(img, width, height, o),
            DetectorKind::Star(o) => BlobDetector::detect(
                img,
                width,
                height,
                o.max_size,
                o.response_threshold as f32,
                o.suppress_nonmax_size,
            ),
            DetectorKind::Dense(o) => dense_grid(width, height, o),
        };

        trace!(method = %self.method(), count = keypoints.len(), "detected keypoints");
        Ok(keypoints)
    }
}

/// Multi-scale FAST, ranked by Harris response and oriented by intensity centroid
fn detect_orb(img: &[u8], width: usize, height: usize, o: &OrbOptions) -> Vec<ScoredKeypoint> {
    use rayon::prelude::*;

    let min_size = 2 * o.edge_threshold + 7;
    let levels = ImagePyramid::generate_scale_levels(width, height, o.scale_factor as f32, o.n_levels, min_size);
    if levels.is_empty() {
        warn!(width, height, edge_threshold = o.edge_threshold, "frame too small for ORB edge threshold");
        return Vec::new();
    }
    let pyramid = ImagePyramid::build_scaled(img, width, height, &levels);

    let mut all: Vec<ScoredKeypoint> = levels
        .par_iter()
        .zip(pyramid.par_iter())
        .flat_map_iter(|(level, level_img)| {
            let (lw, lh) = (level.width, level.height);
            let edge = o.edge_threshold as f32;
            let corners = CornerDetector::fast(level_img, lw, lh, o.fast_threshold);
            let corners: Vec<ScoredKeypoint> = corners
                .into_iter()
                .filter(|c| {
                    let (x, y) = (c.keypoint.x, c.keypoint.y);
                    x >= edge && y >= edge && x < (lw as f32 - edge) && y < (lh as f32 - edge)
                })
                .collect();

            let patch = ((o.patch_size as f32 / level.scale) as usize).max(7) | 1;
            KeypointRefinement::non_maximum_suppression(&corners, 3.0)
                .into_iter()
                .map(move |c| {
                    let (x, y) = (c.keypoint.x as usize, c.keypoint.y as usize);
                    let mut sk = ScoredKeypoint::new(
                        c.keypoint.x * level.scale,
                        c.keypoint.y * level.scale,
                        CornerDetector::harris_at(level_img, lw, lh, x, y, 0.04),
                    );
                    sk.keypoint.angle =
                        KeypointRefinement::compute_orientation(level_img, lw, lh, c.keypoint.x, c.keypoint.y, patch);
                    sk
                })
                .collect::<Vec<_>>()
        })
        .collect();

    all.sort_by(|a, b| b.response.partial_cmp(&a.response).unwrap_or(std::cmp::Ordering::Equal));
    all.truncate(o.n_features);
    all
}

fn dense_grid(width: usize, height: usize, o: &DenseOptions) -> Vec<ScoredKeypoint> {
    if 2 * o.border >= width || 2 * o.border >= height {
        warn!(width, height, border = o.border, "dense grid border leaves no room for keypoints");
        return Vec::new();
    }
    (o.border..height - o.border)
        .step_by(o.step)
        .flat_map(|y| {
            (o.border..width - o.border)
                .step_by(o.step)
                .map(move |x| ScoredKeypoint::new(x as f32, y as f32, 1.0))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::DetectorBuilder;
    use crate::config::FastOptions;

    /// Bright squares on a dark background, one every `spacing` pixels
    fn squares(width: usize, height: usize, spacing: usize) -> Vec<u8> {
        (0..width * height)
            .map(|i| {
                let (x, y) = (i % width, i / width);
                let (lx, ly) = ((x + spacing - 6) % spacing, (y + spacing - 6) % spacing);
                if lx < 10 && ly < 10 { 210 } else { 40 }
            })
            .collect()
    }

    #[test]
    fn test_invalid_image_data() {
        let detector = DetectorBuilder::new(DetectorMethod::Fast).build().unwrap();
        let result = detector.detect(&[0u8; 50], 10, 10);
        assert!(matches!(result, Err(FeatureError::InvalidImageData { expected_len: 100, actual_len: 50 })));
    }

    #[test]
    fn test_empty_frame_yields_no_keypoints() {
        for method in DetectorMethod::ALL {
            let detector = DetectorBuilder::new(method).build().unwrap();
            let empty = Frame::new(0, 0, 0, 3, Vec::new());
            assert!(detector.detect_frame(&empty).unwrap().is_empty());
        }
    }

    #[test]
    fn test_every_method_runs_on_texture() {
        let img = squares(128, 96, 24);
        for method in DetectorMethod::ALL {
            let detector = DetectorBuilder::new(method).build().unwrap();
            let kps = detector.detect(&img, 128, 96).unwrap();
            if method != DetectorMethod::Star {
                assert!(!kps.is_empty(), "{} found nothing", method);
            }
            for kp in kps {
                assert!(kp.x >= 0.0 && kp.x < 128.0 && kp.y >= 0.0 && kp.y < 96.0);
            }
        }
    }

    #[test]
    fn test_nonmax_suppression_reduces_fast_corners() {
        let img = squares(96, 96, 24);
        let with = KeypointDetector::from_kind(DetectorKind::Fast(FastOptions {
            threshold: 20,
            nonmax_suppression: true,
        }))
        .unwrap();
        let without = KeypointDetector::from_kind(DetectorKind::Fast(FastOptions {
            threshold: 20,
            nonmax_suppression: false,
        }))
        .unwrap();

        let n_with = with.detect(&img, 96, 96).unwrap().len();
        let n_without = without.detect(&img, 96, 96).unwrap().len();
        assert!(n_with <= n_without);
    }

    #[test]
    fn test_gftt_respects_max_corners() {
        let img = squares(128, 128, 24);
        let detector = DetectorBuilder::new(DetectorMethod::Gftt)
            .max_corners(10)
            .option("min_distance", 4.0)
            .build()
            .unwrap();
        let kps = detector.detect(&img, 128, 128).unwrap();
        assert_eq!(kps.len(), 10);
    }

    #[test]
    fn test_dense_grid_layout() {
        let detector = DetectorBuilder::new(DetectorMethod::Dense)
            .option("step", 10)
            .option("border", 5)
            .build()
            .unwrap();
        let kps = detector.detect(&vec![0u8; 40 * 30], 40, 30).unwrap();
        // x in {5, 15, 25}, y in {5, 15}
        assert_eq!(kps.len(), 6);
        assert_eq!((kps[0].x, kps[0].y), (5.0, 5.0));
    }

    #[test]
    fn test_margins_larger_than_frame_find_nothing() {
        let img = squares(40, 30, 8);
        let orb = DetectorBuilder::new(DetectorMethod::Orb)
            .option("edge_threshold", 20)
            .build()
            .unwrap();
        assert!(orb.detect(&img, 40, 30).unwrap().is_empty());

        let dense = DetectorBuilder::new(DetectorMethod::Dense)
            .option("border", 15)
            .build()
            .unwrap();
        assert!(dense.detect(&img, 40, 30).unwrap().is_empty());
    }

    #[test]
    fn test_from_kind_validates() {
        let bad = DetectorKind::Fast(FastOptions {
            threshold: 200,
            nonmax_suppression: true,
        });
        assert!(KeypointDetector::from_kind(bad).is_err());
    }
}
