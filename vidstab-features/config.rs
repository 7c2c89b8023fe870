use std::fmt;
use std::str::FromStr;

use crate::error::{FeatureError, FeatureResult};
use crate::types::OptionValue;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Names of the supported keypoint detectors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "UPPERCASE"))]
pub enum DetectorMethod {
    Fast,
    Gftt,
    Harris,
    Orb,
    Star,
    Dense,
}

impl DetectorMethod {
    pub const ALL: [DetectorMethod; 6] = [
        DetectorMethod::Gftt,
        DetectorMethod::Fast,
        DetectorMethod::Harris,
        DetectorMethod::Orb,
        DetectorMethod::Star,
        DetectorMethod::Dense,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            DetectorMethod::Fast => "FAST",
            DetectorMethod::Gftt => "GFTT",
            DetectorMethod::Harris => "HARRIS",
            DetectorMethod::Orb => "ORB",
            DetectorMethod::Star => "STAR",
            DetectorMethod::Dense => "DENSE",
        }
    }

    /// Detector of this kind with its default options
    pub fn default_kind(&self) -> DetectorKind {
        match self {
            DetectorMethod::Fast => DetectorKind::Fast(FastOptions::default()),
            DetectorMethod::Gftt => DetectorKind::Gftt(GfttOptions::default()),
            DetectorMethod::Harris => DetectorKind::Harris(HarrisOptions::default()),
            DetectorMethod::Orb => DetectorKind::Orb(OrbOptions::default()),
            DetectorMethod::Star => DetectorKind::Star(StarOptions::default()),
            DetectorMethod::Dense => DetectorKind::Dense(DenseOptions::default()),
        }
    }
}

impl Default for DetectorMethod {
    fn default() -> Self {
        DetectorMethod::Gftt
    }
}

impl fmt::Display for DetectorMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DetectorMethod {
    type Err = FeatureError;

    fn from_str(s: &str) -> FeatureResult<Self> {
        DetectorMethod::ALL
            .into_iter()
            .find(|m| m.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| FeatureError::UnknownMethod(s.to_string()))
    }
}

/// FAST segment-test corners
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FastOptions {
    pub threshold: u8,
    pub nonmax_suppression: bool,
}

impl Default for FastOptions {
    fn default() -> Self {
        Self {
            threshold: 20,
            nonmax_suppression: true,
        }
    }
}

/// Shi-Tomasi "good features to track"
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GfttOptions {
    /// 0 keeps every corner above the quality threshold
    pub max_corners: usize,
    pub quality_level: f64,
    pub min_distance: f64,
    pub block_size: usize,
}

impl Default for GfttOptions {
    fn default() -> Self {
        Self {
            max_corners: 200,
            quality_level: 0.01,
            min_distance: 30.0,
            block_size: 3,
        }
    }
}

/// GFTT ranking with the Harris response `det - k * trace^2`
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct HarrisOptions {
    pub max_corners: usize,
    pub quality_level: f64,
    pub min_distance: f64,
    pub block_size: usize,
    pub k: f64,
}

impl Default for HarrisOptions {
    fn default() -> Self {
        Self {
            max_corners: 200,
            quality_level: 0.01,
            min_distance: 30.0,
            block_size: 3,
            k: 0.04,
        }
    }
}

/// Multi-scale FAST ranked by Harris response, with intensity-centroid orientation
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct OrbOptions {
    pub n_features: usize,
    pub scale_factor: f64,
    pub n_levels: usize,
    pub fast_threshold: u8,
    pub edge_threshold: usize,
    pub patch_size: usize,
}

impl Default for OrbOptions {
    fn default() -> Self {
        Self {
            n_features: 500,
            scale_factor: 1.2,
            n_levels: 8,
            fast_threshold: 20,
            edge_threshold: 31,
            patch_size: 31,
        }
    }
}

/// Center-surround blob extrema over box filters
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StarOptions {
    pub max_size: usize,
    pub response_threshold: f64,
    pub suppress_nonmax_size: usize,
}

impl Default for StarOptions {
    fn default() -> Self {
        Self {
            max_size: 45,
            response_threshold: 30.0,
            suppress_nonmax_size: 5,
        }
    }
}

/// Regular grid of points
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DenseOptions {
    pub step: usize,
    pub border: usize,
}

impl Default for DenseOptions {
    fn default() -> Self {
        Self { step: 16, border: 8 }
    }
}

/// Detector variant together with its option set
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "method", rename_all = "UPPERCASE"))]
pub enum DetectorKind {
    Fast(FastOptions),
    Gftt(GfttOptions),
    Harris(HarrisOptions),
    Orb(OrbOptions),
    Star(StarOptions),
    Dense(DenseOptions),
}

impl Default for DetectorKind {
    fn default() -> Self {
        DetectorMethod::default().default_kind()
    }
}

impl DetectorKind {
    pub fn method(&self) -> DetectorMethod {
        match self {
            DetectorKind::Fast(_) => DetectorMethod::Fast,
            DetectorKind::Gftt(_) => DetectorMethod::Gftt,
            DetectorKind::Harris(_) => DetectorMethod::Harris,
            DetectorKind::Orb(_) => DetectorMethod::Orb,
            DetectorKind::Star(_) => DetectorMethod::Star,
            DetectorKind::Dense(_) => DetectorMethod::Dense,
        }
    }

    /// Option names accepted by this variant
    pub fn option_names(&self) -> &'static [&'static str] {
        match self {
            DetectorKind::Fast(_) => &["threshold", "nonmax_suppression"],
            DetectorKind::Gftt(_) => &["max_corners", "quality_level", "min_distance", "block_size"],
            DetectorKind::Harris(_) => &["max_corners", "quality_level", "min_distance", "block_size", "k"],
            DetectorKind::Orb(_) => &[
                "n_features",
                "scale_factor",
                "n_levels",
                "fast_threshold",
                "edge_threshold",
                "patch_size",
            ],
            DetectorKind::Star(_) => &["max_size", "response_threshold", "suppress_nonmax_size"],
            DetectorKind::Dense(_) => &["step", "border"],
        }
    }

    /// Apply one named option; names outside this variant's set are rejected
    pub fn set_option(&mut self, name: &str, value: OptionValue) -> FeatureResult<()> {
        let method = self.method().name();
        let unknown = || FeatureError::InvalidOption {
            method,
            option: name.to_string(),
        };

        match self {
            DetectorKind::Fast(o) => match name {
                "threshold" => o.threshold = value.as_u8(name)?,
                "nonmax_suppression" | "nonmaxSuppression" => o.nonmax_suppression = value.as_bool(name)?,
                _ => return Err(unknown()),
            },
            DetectorKind::Gftt(o) => match name {
                "max_corners" | "maxCorners" => o.max_corners = value.as_usize(name)?,
                "quality_level" | "qualityLevel" => o.quality_level = value.as_f64(name)?,
                "min_distance" | "minDistance" => o.min_distance = value.as_f64(name)?,
                "block_size" | "blockSize" => o.block_size = value.as_usize(name)?,
                _ => return Err(unknown()),
            },
            DetectorKind::Harris(o) => match name {
                "max_corners" | "maxCorners" => o.max_corners = value.as_usize(name)?,
                "quality_level" | "qualityLevel" => o.quality_level = value.as_f64(name)?,
                "min_distance" | "minDistance" => o.min_distance = value.as_f64(name)?,
                "block_size" | "blockSize" => o.block_size = value.as_usize(name)?,
                "k" => o.k = value.as_f64(name)?,
                _ => return Err(unknown()),
            },
            DetectorKind::Orb(o) => match name {
                "n_features" | "nfeatures" => o.n_features = value.as_usize(name)?,
                "scale_factor" | "scaleFactor" => o.scale_factor = value.as_f64(name)?,
                "n_levels" | "nlevels" => o.n_levels = value.as_usize(name)?,
                "fast_threshold" | "fastThreshold" => o.fast_threshold = value.as_u8(name)?,
                "edge_threshold" | "edgeThreshold" => o.edge_threshold = value.as_usize(name)?,
                "patch_size" | "patchSize" => o.patch_size = value.as_usize(name)?,
                _ => return Err(unknown()),
            },
            DetectorKind::Star(o) => match name {
                "max_size" | "maxSize" => o.max_size = value.as_usize(name)?,
                "response_threshold" | "responseThreshold" => o.response_threshold = value.as_f64(name)?,
                "suppress_nonmax_size" | "suppressNonmaxSize" => o.suppress_nonmax_size = value.as_usize(name)?,
                _ => return Err(unknown()),
            },
            DetectorKind::Dense(o) => match name {
                "step" | "initXyStep" => o.step = value.as_usize(name)?,
                "border" | "initImgBound" => o.border = value.as_usize(name)?,
                _ => return Err(unknown()),
            },
        }
        Ok(())
    }

    /// Range checks for every option of the active variant
    pub fn validate(&self) -> FeatureResult<()> {
        match self {
            DetectorKind::Fast(o) => check(o.threshold >= 1 && o.threshold <= 127, "threshold", "must be 1-127"),
            DetectorKind::Gftt(o) => {
                check_quality(o.quality_level)?;
                check(o.min_distance >= 0.0, "min_distance", "must be >= 0")?;
                check_block(o.block_size)
            }
            DetectorKind::Harris(o) => {
                check_quality(o.quality_level)?;
                check(o.min_distance >= 0.0, "min_distance", "must be >= 0")?;
                check_block(o.block_size)?;
                check(o.k > 0.0 && o.k < 0.25, "k", "must be in (0, 0.25)")
            }
            DetectorKind::Orb(o) => {
                check(o.n_features > 0, "n_features", "must be > 0")?;
                check(o.scale_factor > 1.0, "scale_factor", "must be > 1")?;
                check(o.n_levels >= 1 && o.n_levels <= 16, "n_levels", "must be 1-16")?;
                check(o.fast_threshold >= 1 && o.fast_threshold <= 127, "fast_threshold", "must be 1-127")?;
                check(o.edge_threshold >= 3 && o.edge_threshold <= 127, "edge_threshold", "must be 3-127")?;
                check(o.patch_size % 2 == 1 && o.patch_size >= 7, "patch_size", "must be odd and >= 7")
            }
            DetectorKind::Star(o) => {
                check(o.max_size >= 2, "max_size", "must be >= 2")?;
                check(o.response_threshold >= 0.0, "response_threshold", "must be >= 0")?;
                check(
                    o.suppress_nonmax_size >= 1 && o.suppress_nonmax_size <= o.max_size,
                    "suppress_nonmax_size",
                    "must be between 1 and max_size",
                )
            }
            DetectorKind::Dense(o) => {
                check(o.step > 0, "step", "must be > 0")?;
                check(o.border <= MAX_DENSE_BORDER, "border", "must be <= 1024")
            }
        }
    }

    pub fn summary(&self) -> String {
        format!("{}: {:?}", self.method(), self)
    }
}

const MAX_DENSE_BORDER: usize = 1024;

fn check(ok: bool, option: &str, reason: &str) -> FeatureResult<()> {
    if ok {
        Ok(())
    } else {
        Err(FeatureError::InvalidOptionValue {
            option: option.to_string(),
            reason: reason.to_string(),
        })
    }
}

fn check_quality(q: f64) -> FeatureResult<()> {
    check(q > 0.0 && q <= 1.0, "quality_level", "must be in (0, 1]")
}

fn check_block(b: usize) -> FeatureResult<()> {
    check(b >= 1 && b % 2 == 1, "block_size", "must be odd and >= 1")
}
