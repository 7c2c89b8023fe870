use vidstab_core::Keypoint;

use crate::error::{FeatureError, FeatureResult};

/// Keypoint with detector response score used for ranking and suppression
#[derive(Debug, Clone, Copy)]
pub struct ScoredKeypoint {
    pub keypoint: Keypoint,
    pub response: f32,
}

impl ScoredKeypoint {
    pub fn new(x: f32, y: f32, response: f32) -> Self {
        Self {
            keypoint: Keypoint::at(x, y),
            response,
        }
    }
}

/// Scale information for pyramid levels
#[derive(Debug, Clone, Copy)]
pub struct ScaleLevel {
    pub level: usize,
    pub scale: f32,
    pub width: usize,
    pub height: usize,
}

/// Untyped detector option value, checked against the target field when applied
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
pub enum OptionValue {
    Bool(bool),
    Int(i64),
    Float(f64),
}

impl OptionValue {
    pub(crate) fn as_bool(&self, option: &str) -> FeatureResult<bool> {
        match *self {
            OptionValue::Bool(b) => Ok(b),
            OptionValue::Int(0) => Ok(false),
            OptionValue::Int(1) => Ok(true),
            _ => Err(Self::mismatch(option, "expected a boolean")),
        }
    }

    pub(crate) fn as_f64(&self, option: &str) -> FeatureResult<f64> {
        match *self {
            OptionValue::Float(f) if f.is_finite() => Ok(f),
            OptionValue::Int(i) => Ok(i as f64),
            _ => Err(Self::mismatch(option, "expected a finite number")),
        }
    }

    pub(crate) fn as_usize(&self, option: &str) -> FeatureResult<usize> {
        match *self {
            OptionValue::Int(i) if i >= 0 => Ok(i as usize),
            _ => Err(Self::mismatch(option, "expected a non-negative integer")),
        }
    }

    pub(crate) fn as_u8(&self, option: &str) -> FeatureResult<u8> {
        match *self {
            OptionValue::Int(i) if (0..=255).contains(&i) => Ok(i as u8),
            _ => Err(Self::mismatch(option, "expected an integer in 0..=255")),
        }
    }

    fn mismatch(option: &str, reason: &str) -> FeatureError {
        FeatureError::InvalidOptionValue {
            option: option.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl From<bool> for OptionValue {
    fn from(v: bool) -> Self {
        OptionValue::Bool(v)
    }
}

impl From<i32> for OptionValue {
    fn from(v: i32) -> Self {
        OptionValue::Int(v as i64)
    }
}

impl From<i64> for OptionValue {
    fn from(v: i64) -> Self {
        OptionValue::Int(v)
    }
}

impl From<u32> for OptionValue {
    fn from(v: u32) -> Self {
        OptionValue::Int(v as i64)
    }
}

impl From<usize> for OptionValue {
    fn from(v: usize) -> Self {
        OptionValue::Int(v as i64)
    }
}

impl From<f32> for OptionValue {
    fn from(v: f32) -> Self {
        OptionValue::Float(v as f64)
    }
}

impl From<f64> for OptionValue {
    fn from(v: f64) -> Self {
        OptionValue::Float(v)
    }
}
