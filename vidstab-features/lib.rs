//! Keypoint detection and frame-to-frame tracking.
//!
//! A `DetectorKind` names one detector variant together with its validated
//! options; `DetectorBuilder` turns loosely typed `(name, value)` options into
//! one, failing on options the variant does not accept. `KeypointTracker`
//! pairs a detector with a pyramidal Lucas-Kanade tracker and produces the
//! `CorrespondenceSet` consumed by motion estimation.

pub mod blob;
pub mod builder;
pub mod config;
pub mod corner_detection;
pub mod detector;
pub mod error;
pub mod pyramid;
pub mod refinement;
pub mod tracker;
pub mod types;
pub mod utils;

pub use builder::DetectorBuilder;
pub use config::{
    DenseOptions, DetectorKind, DetectorMethod, FastOptions, GfttOptions, HarrisOptions, OrbOptions, StarOptions,
};
pub use detector::KeypointDetector;
pub use error::{FeatureError, FeatureResult};
pub use tracker::{KeypointTracker, LkParams, TrackStatus, TrackedPoint, TrackingFrame};
pub use types::{OptionValue, ScoredKeypoint};
