//! High-level video stabilization.
//!
//! [`Stabilizer`] runs the two-pass batch pipeline over a re-readable
//! [`FrameSource`]; [`StreamingStabilizer`] runs the same per-frame motion
//! step in a single pass with a bounded look-ahead buffer.

pub mod cli;
pub mod error;
pub mod io;
pub mod motion;
pub mod settings;
pub mod stabilizer;
pub mod streaming;

pub use error::{StabError, StabResult};
pub use io::{FrameSink, FrameSource, ImageSequenceSink, ImageSequenceSource, IterSource, VecSource};
pub use motion::{FrameMotion, FrameStep};
pub use settings::{StabilizerSettings, TransformLog};
pub use stabilizer::Stabilizer;
pub use streaming::{EmittedCorrection, StreamOutput, StreamingStabilizer};

pub use vidstab_core::{
    self, init_thread_pool, BorderConfig, BorderMode, BorderSize, Frame, StabConfig, Transform,
    DEFAULT_SMOOTHING_WINDOW,
};
pub use vidstab_features::{self, DetectorBuilder, DetectorKind, DetectorMethod, FastOptions};
pub use vidstab_motion::{self, LayerFn, SmootherState};
