use tracing::debug;
use vidstab_core::{Frame, Keypoint, Transform};
use vidstab_features::{KeypointDetector, KeypointTracker, TrackingFrame};
use vidstab_motion::{TrajectoryBuilder, TransformEstimator};

use crate::error::StabResult;
use crate::settings::StabilizerSettings;

/// Per-frame motion step shared by the batch and streaming drivers:
/// track from the previous frame, estimate, accumulate.
///
/// Only the previous frame's pyramid and keypoints are retained.
#[derive(Debug, Clone)]
pub struct FrameMotion {
    tracker: KeypointTracker,
    estimator: TransformEstimator,
    builder: TrajectoryBuilder,
    previous: Option<(TrackingFrame, Vec<Keypoint>)>,
    degraded: usize,
}

/// Motion of one frame relative to its predecessor and the running trajectory
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameStep {
    pub index: usize,
    pub transform: Transform,
    pub trajectory: Transform,
    pub degraded: bool,
}

impl FrameMotion {
    pub fn new(settings: &StabilizerSettings) -> StabResult<Self> {
        let detector = KeypointDetector::from_kind(settings.detector.clone())?;
        Ok(Self {
            tracker: KeypointTracker::new(detector).with_params(settings.tracker),
            estimator: TransformEstimator::new(settings.estimator),
            builder: TrajectoryBuilder::new(),
            previous: None,
            degraded: 0,
        })
    }

    pub fn tracker(&self) -> &KeypointTracker {
        &self.tracker
    }

    /// Frames whose motion fell back to the identity
    pub fn degraded(&self) -> usize {
        self.degraded
    }

    pub fn frames(&self) -> usize {
        self.builder.len()
    }

    pub fn reset(&mut self) {
        self.builder.reset();
        self.previous = None;
        self.degraded = 0;
    }

    /// Process the next frame. The first frame has no predecessor and gets the identity.
    pub fn observe(&mut self, frame: &Frame) -> StabResult<FrameStep> {
        let index = self.builder.len();
        let current = self.tracker.prepare(frame)?;

        let (transform, degraded) = match &self.previous {
            None => (Transform::IDENTITY, false),
            Some((prev, prev_keypoints)) => {
                let set = self.tracker.track_prepared(prev, prev_keypoints, &current);
                let estimate = self.estimator.estimate_detailed(&set);
                if let Some(reason) = estimate.degraded {
                    debug!(frame = index, ?reason, "estimation degraded to identity");
                }
                (estimate.transform, estimate.is_degraded())
            }
        };
        if degraded {
            self.degraded += 1;
        }

        let keypoints = self.tracker.detect_prepared(&current)?;
        self.previous = Some((current, keypoints));

        let trajectory = self.builder.append(transform);
        Ok(FrameStep {
            index,
            transform,
            trajectory,
            degraded,
        })
    }
}
