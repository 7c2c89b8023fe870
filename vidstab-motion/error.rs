use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum MotionError {
    #[error("frame {index} is empty")]
    EmptyFrame { index: usize },

    #[error("frame {index} buffer length mismatch: expected {expected_len}, got {actual_len}")]
    InvalidFrame { index: usize, expected_len: usize, actual_len: usize },

    #[error("frame geometry mismatch: expected {expected:?}, got {actual:?} (width, height, channels)")]
    DimensionMismatch {
        expected: (usize, usize, usize),
        actual: (usize, usize, usize),
    },

    #[error("blend alpha must be within [0, 1], got {0}")]
    InvalidAlpha(f32),
}

pub type MotionResult<T> = Result<T, MotionError>;

/// Reject frames the warper and layering functions cannot sample
pub(crate) fn check_frame(frame: &vidstab_core::Frame) -> MotionResult<()> {
    if frame.is_empty() {
        return Err(MotionError::EmptyFrame { index: frame.index });
    }
    if !frame.is_consistent() {
        return Err(MotionError::InvalidFrame {
            index: frame.index,
            expected_len: frame.width * frame.height * frame.channels,
            actual_len: frame.data.len(),
        });
    }
    Ok(())
}
