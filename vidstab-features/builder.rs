use crate::config::{DetectorKind, DetectorMethod};
use crate::detector::KeypointDetector;
use crate::error::FeatureResult;
use crate::types::OptionValue;

/// Builder for creating a validated `KeypointDetector`.
///
/// Options are recorded as given and checked against the chosen variant in
/// `build()`, so an option the variant does not support fails construction
/// instead of being ignored.
#[derive(Debug, Clone)]
pub struct DetectorBuilder {
    kind: DetectorKind,
    options: Vec<(String, OptionValue)>,
}

impl DetectorBuilder {
    /// Create a new builder with the variant's default options
    pub fn new(method: DetectorMethod) -> Self {
        Self::from_kind(method.default_kind())
    }

    /// Create a builder from a method name such as `"FAST"` or `"gftt"`
    pub fn from_name(name: &str) -> FeatureResult<Self> {
        Ok(Self::new(name.parse()?))
    }

    /// Start from an existing option set
    pub fn from_kind(kind: DetectorKind) -> Self {
        Self {
            kind,
            options: Vec::new(),
        }
    }

    /// Record a named option
    pub fn option(mut self, name: &str, value: impl Into<OptionValue>) -> Self {
        self.options.push((name.to_string(), value.into()));
        self
    }

    /// Set the FAST threshold
    pub fn threshold(self, threshold: u8) -> Self {
        self.option("threshold", threshold as u32)
    }

    /// Enable or disable FAST non-maximum suppression
    pub fn nonmax_suppression(self, enable: bool) -> Self {
        self.option("nonmax_suppression", enable)
    }

    /// Set the corner budget for GFTT/HARRIS
    pub fn max_corners(self, n: usize) -> Self {
        self.option("max_corners", n)
    }

    pub fn method(&self) -> DetectorMethod {
        self.kind.method()
    }

    /// Resolve recorded options into a validated option set
    pub fn to_kind(self) -> FeatureResult<DetectorKind> {
        let mut kind = self.kind;
        for (name, value) in &self.options {
            kind.set_option(name, *value)?;
        }
        kind.validate()?;
        Ok(kind)
    }

    /// Build the `KeypointDetector`
    pub fn build(self) -> FeatureResult<KeypointDetector> {
        Ok(KeypointDetector::new(self.to_kind()?))
    }

    /// Generate a summary of the builder's configuration
    pub fn summary(&self) -> String {
        let opts: Vec<String> = self
            .options
            .iter()
            .map(|(k, v)| format!("{}={:?}", k, v))
            .collect();
        format!("DetectorBuilder: {} [{}]", self.kind.method(), opts.join(", "))
    }

    /// Create a builder from a TOML table with a `method` key and option keys
    #[cfg(feature = "serde")]
    pub fn from_toml_table(table: &toml::Table) -> FeatureResult<Self> {
        use crate::error::FeatureError;

        let mut builder = match table.get("method") {
            Some(toml::Value::String(name)) => Self::from_name(name)?,
            Some(other) => return Err(FeatureError::Table(format!("method must be a string, got {}", other))),
            None => Self::new(DetectorMethod::default()),
        };

        for (key, value) in table.iter().filter(|(k, _)| k.as_str() != "method") {
            let value = match value {
                toml::Value::Boolean(b) => OptionValue::Bool(*b),
                toml::Value::Integer(i) => OptionValue::Int(*i),
                toml::Value::Float(f) => OptionValue::Float(*f),
                other => {
                    return Err(FeatureError::InvalidOptionValue {
                        option: key.clone(),
                        reason: format!("unsupported value {}", other),
                    })
                }
            };
            builder = builder.option(key, value);
        }
        Ok(builder)
    }

    /// Parse a TOML document holding a detector table
    #[cfg(feature = "serde")]
    pub fn from_toml(toml_str: &str) -> FeatureResult<Self> {
        let table: toml::Table = toml_str
            .parse()
            .map_err(|e: toml::de::Error| crate::error::FeatureError::Table(e.to_string()))?;
        Self::from_toml_table(&table)
    }
}

impl Default for DetectorBuilder {
    fn default() -> Self {
        Self::new(DetectorMethod::default())
    }
}
