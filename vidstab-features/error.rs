use thiserror::Error;
use vidstab_core::Frame;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FeatureError {
    #[error("invalid keyword argument '{option}' for {method} detector")]
    InvalidOption { method: &'static str, option: String },

    #[error("invalid value for '{option}': {reason}")]
    InvalidOptionValue { option: String, reason: String },

    #[error("unknown keypoint method '{0}'")]
    UnknownMethod(String),

    #[error("image data length mismatch: expected {expected_len}, got {actual_len}")]
    InvalidImageData { expected_len: usize, actual_len: usize },

    #[cfg(feature = "serde")]
    #[error("invalid detector table: {0}")]
    Table(String),
}

pub type FeatureResult<T> = Result<T, FeatureError>;

/// Reject a frame whose buffer disagrees with its declared geometry
pub(crate) fn check_frame(frame: &Frame) -> FeatureResult<()> {
    if frame.is_consistent() {
        return Ok(());
    }
    Err(FeatureError::InvalidImageData {
        expected_len: frame.width * frame.height * frame.channels,
        actual_len: frame.data.len(),
    })
}
