use std::path::PathBuf;

use thiserror::Error;
use vidstab_features::FeatureError;
use vidstab_motion::MotionError;

#[derive(Debug, Error)]
pub enum StabError {
    #[error("{} does not exist", .0.display())]
    SourceNotFound(PathBuf),

    #[error("invalid option '{option}': {reason}")]
    InvalidOption { option: String, reason: String },

    #[error(transparent)]
    Feature(#[from] FeatureError),

    #[error(transparent)]
    Motion(#[from] MotionError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("invalid settings file: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid transform log: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("frame source cannot be rewound for a second pass")]
    SourceNotRewindable,

    #[error("no transforms available; generate or load them before applying")]
    NoTransforms,
}

impl StabError {
    /// True for configuration that was rejected at construction time,
    /// whether by the detector option validation or by the stabilizer itself
    pub fn is_invalid_option(&self) -> bool {
        matches!(
            self,
            StabError::InvalidOption { .. }
                | StabError::Feature(FeatureError::InvalidOption { .. })
                | StabError::Feature(FeatureError::InvalidOptionValue { .. })
        )
    }
}

pub type StabResult<T> = Result<T, StabError>;
