use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use vidstab_core::{BorderConfig, BorderMode, BorderSize, StabConfig, Transform};
use vidstab_features::{DetectorBuilder, DetectorKind, LkParams};
use vidstab_motion::EstimatorParams;

use crate::error::{StabError, StabResult};

/// Everything a stabilization run is configured with
#[derive(Debug, Clone, Default)]
pub struct StabilizerSettings {
    pub config: StabConfig,
    pub detector: DetectorKind,
    pub tracker: LkParams,
    pub estimator: EstimatorParams,
    /// Stop reading after this many frames (batch runs)
    pub max_frames: Option<usize>,
}

impl StabilizerSettings {
    pub fn with_window(mut self, smoothing_window: usize) -> Self {
        self.config.smoothing_window = smoothing_window;
        self
    }

    pub fn with_border(mut self, border: BorderConfig) -> Self {
        self.config.border = border;
        self
    }

    pub fn with_detector(mut self, detector: DetectorKind) -> Self {
        self.detector = detector;
        self
    }

    pub fn with_max_frames(mut self, max_frames: usize) -> Self {
        self.max_frames = Some(max_frames);
        self
    }

    /// Parse a settings document with optional `[stabilizer]`, `[detector]`,
    /// `[tracker]` and `[estimator]` tables. Detector options are validated
    /// against the chosen method exactly like builder options.
    pub fn from_toml(toml_str: &str) -> StabResult<Self> {
        let file: SettingsFile = toml::from_str(toml_str)?;
        let mut settings = StabilizerSettings::default();

        let s = file.stabilizer;
        if let Some(w) = s.smoothing_window {
            settings.config.smoothing_window = w;
        }
        if let Some(size) = s.border {
            settings.config.border.size = size.into_border_size()?;
        }
        if let Some(mode) = s.border_mode {
            settings.config.border.mode = parse_border_mode(&mode)?;
        }
        if let Some(crop) = s.crop_to_original {
            settings.config.crop_to_original = crop;
        }
        if let Some(n) = s.n_threads {
            settings.config.n_threads = n.max(1);
        }
        settings.max_frames = s.max_frames;

        if let Some(table) = file.detector {
            settings.detector = DetectorBuilder::from_toml_table(&table)?.to_kind()?;
        }
        if let Some(tracker) = file.tracker {
            settings.tracker = tracker;
        }
        if let Some(estimator) = file.estimator {
            settings.estimator = estimator;
        }
        Ok(settings)
    }

    pub fn load_toml(path: impl AsRef<Path>) -> StabResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(StabError::SourceNotFound(path.to_path_buf()));
        }
        Self::from_toml(&fs::read_to_string(path)?)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct SettingsFile {
    #[serde(default)]
    stabilizer: StabilizerTable,
    detector: Option<toml::Table>,
    tracker: Option<LkParams>,
    estimator: Option<EstimatorParams>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct StabilizerTable {
    smoothing_window: Option<usize>,
    border: Option<BorderSpec>,
    border_mode: Option<String>,
    crop_to_original: Option<bool>,
    n_threads: Option<usize>,
    max_frames: Option<usize>,
}

/// `border = 10` or `border = "auto"`
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum BorderSpec {
    Pixels(u32),
    Named(String),
}

impl BorderSpec {
    fn into_border_size(self) -> StabResult<BorderSize> {
        match self {
            BorderSpec::Pixels(n) => Ok(BorderSize::Fixed(n)),
            BorderSpec::Named(s) => parse_border_size(&s),
        }
    }
}

/// `"auto"` or a pixel count
pub fn parse_border_size(s: &str) -> StabResult<BorderSize> {
    if s.eq_ignore_ascii_case("auto") {
        return Ok(BorderSize::Auto);
    }
    u32::from_str(s.trim()).map(BorderSize::Fixed).map_err(|_| StabError::InvalidOption {
        option: "border".to_string(),
        reason: format!("expected a pixel count or 'auto', got '{}'", s),
    })
}

/// `black`, `replicate`, `reflect`, or `constant:R,G,B[,A]`
pub fn parse_border_mode(s: &str) -> StabResult<BorderMode> {
    let invalid = || StabError::InvalidOption {
        option: "border_mode".to_string(),
        reason: format!("expected black, replicate, reflect or constant:R,G,B[,A], got '{}'", s),
    };

    match s.trim().to_ascii_lowercase().as_str() {
        "black" => Ok(BorderMode::BLACK),
        "replicate" => Ok(BorderMode::Replicate),
        "reflect" => Ok(BorderMode::Reflect),
        other => {
            let values = other.strip_prefix("constant:").ok_or_else(invalid)?;
            let parts: Vec<u8> = values
                .split(',')
                .map(|v| v.trim().parse::<u8>())
                .collect::<Result<_, _>>()
                .map_err(|_| invalid())?;
            match parts.as_slice() {
                [r, g, b] => Ok(BorderMode::Constant([*r, *g, *b, 255])),
                [r, g, b, a] => Ok(BorderMode::Constant([*r, *g, *b, *a])),
                _ => Err(invalid()),
            }
        }
    }
}

/// Transforms of a batch run, persisted so stabilization can be re-applied
/// without estimating motion again
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransformLog {
    pub smoothing_window: usize,
    pub transforms: Vec<Transform>,
    pub trajectory: Vec<Transform>,
    pub smoothed_trajectory: Vec<Transform>,
}

impl TransformLog {
    pub fn len(&self) -> usize {
        self.transforms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }

    pub fn validate(&self) -> StabResult<()> {
        let n = self.transforms.len();
        if self.trajectory.len() != n || self.smoothed_trajectory.len() != n {
            return Err(StabError::Config(format!(
                "transform log arrays differ in length: {} transforms, {} trajectory, {} smoothed",
                n,
                self.trajectory.len(),
                self.smoothed_trajectory.len()
            )));
        }
        Ok(())
    }

    pub fn to_json(&self) -> StabResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> StabResult<Self> {
        let log: TransformLog = serde_json::from_str(json)?;
        log.validate()?;
        Ok(log)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> StabResult<()> {
        fs::write(path, self.to_json()?)?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> StabResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(StabError::SourceNotFound(path.to_path_buf()));
        }
        Self::from_json(&fs::read_to_string(path)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vidstab_features::{DetectorMethod, FastOptions, FeatureError};

    #[test]
    fn test_defaults() {
        let settings = StabilizerSettings::default();
        assert_eq!(settings.config.smoothing_window, 30);
        assert_eq!(settings.detector.method(), DetectorMethod::Gftt);
        assert_eq!(settings.max_frames, None);
    }

    #[test]
    fn test_from_toml() {
        let settings = StabilizerSettings::from_toml(
            r#"
            [stabilizer]
            smoothing_window = 5
            border = "auto"
            border_mode = "reflect"
            max_frames = 40

            [detector]
            method = "FAST"
            threshold = 42
            nonmaxSuppression = false

            [tracker]
            window_radius = 7
            "#,
        )
        .unwrap();

        assert_eq!(settings.config.smoothing_window, 5);
        assert_eq!(settings.config.border.size, BorderSize::Auto);
        assert_eq!(settings.config.border.mode, BorderMode::Reflect);
        assert_eq!(settings.max_frames, Some(40));
        assert_eq!(
            settings.detector,
            DetectorKind::Fast(FastOptions {
                threshold: 42,
                nonmax_suppression: false
            })
        );
        assert_eq!(settings.tracker.window_radius, 7);
        assert_eq!(settings.tracker.max_level, LkParams::default().max_level);
    }

    #[test]
    fn test_unknown_detector_option_in_file() {
        let err = StabilizerSettings::from_toml("[detector]\nmethod = \"FAST\"\nfake = 1\n").unwrap_err();
        assert!(err.is_invalid_option());
        assert!(matches!(err, StabError::Feature(FeatureError::InvalidOption { .. })));
        assert!(err.to_string().contains("invalid keyword argument"));
    }

    #[test]
    fn test_unknown_stabilizer_key() {
        let err = StabilizerSettings::from_toml("[stabilizer]\nwindow = 3\n").unwrap_err();
        assert!(matches!(err, StabError::Toml(_)));
    }

    #[test]
    fn test_border_parsing() {
        assert_eq!(parse_border_size("auto").unwrap(), BorderSize::Auto);
        assert_eq!(parse_border_size("12").unwrap(), BorderSize::Fixed(12));
        assert!(parse_border_size("-3").unwrap_err().is_invalid_option());

        assert_eq!(parse_border_mode("Black").unwrap(), BorderMode::BLACK);
        assert_eq!(parse_border_mode("constant:1,2,3").unwrap(), BorderMode::Constant([1, 2, 3, 255]));
        assert_eq!(parse_border_mode("constant:1,2,3,0").unwrap(), BorderMode::Constant([1, 2, 3, 0]));
        assert!(parse_border_mode("constant:1,2").is_err());
        assert!(parse_border_mode("wrap").is_err());
    }

    #[test]
    fn test_transform_log_json() {
        let log = TransformLog {
            smoothing_window: 2,
            transforms: vec![Transform::IDENTITY, Transform::new(1.0, -2.0, 0.01)],
            trajectory: vec![Transform::IDENTITY, Transform::new(1.0, -2.0, 0.01)],
            smoothed_trajectory: vec![Transform::new(0.5, -1.0, 0.005); 2],
        };
        let parsed = TransformLog::from_json(&log.to_json().unwrap()).unwrap();
        assert_eq!(parsed, log);

        let mut broken = log;
        broken.trajectory.pop();
        assert!(TransformLog::from_json(&broken.to_json().unwrap()).is_err());
    }

    #[test]
    fn test_missing_files() {
        let err = TransformLog::load("no_such_log.json").unwrap_err();
        assert_eq!(err.to_string(), "no_such_log.json does not exist");
        assert!(matches!(
            StabilizerSettings::load_toml("no_such_settings.toml"),
            Err(StabError::SourceNotFound(_))
        ));
    }
}
