//! Motion side of the stabilizer: estimate frame-to-frame motion from
//! correspondences, accumulate it into a trajectory, smooth that trajectory
//! (whole-sequence or with bounded look-ahead) and warp frames by the
//! difference.

pub mod error;
pub mod estimator;
pub mod layer;
pub mod smoother;
pub mod trajectory;
pub mod warp;

pub use error::{MotionError, MotionResult};
pub use estimator::{Degradation, EstimatorParams, MotionEstimate, TransformEstimator, MIN_CORRESPONDENCES};
pub use layer::{apply_layer_func, LayerFn};
pub use smoother::{smooth, Smoothed, SmootherState, StreamingSmoother};
pub use trajectory::{cumulative_sum, TrajectoryBuilder};
pub use warp::{auto_border_size, correct, corrective_matrix, make_border, warp_affine, FrameWarper};
