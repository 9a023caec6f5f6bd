use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::preprocess::{InputSize, Normalization, PreprocessProfile};

pub const DEFAULT_LABELS: [&str; 3] = ["glioma", "meningioma", "pituitary"];

fn default_labels() -> Vec<String> {
    DEFAULT_LABELS.iter().map(|s| s.to_string()).collect()
}

fn default_subtype_size() -> InputSize {
    InputSize::square(300)
}

/// Input profile and class labels of the subtype stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubtypeConfig {
    #[serde(default = "default_subtype_size")]
    pub input_size: InputSize,
    #[serde(default)]
    pub normalization: Normalization,
    /// Stage-2 output index → label.
    #[serde(default = "default_labels")]
    pub labels: Vec<String>,
}

impl SubtypeConfig {
    pub fn profile(&self) -> PreprocessProfile {
        PreprocessProfile { input_size: self.input_size, normalization: self.normalization.clone() }
    }
}

impl Default for SubtypeConfig {
    fn default() -> Self {
        SubtypeConfig {
            input_size: default_subtype_size(),
            normalization: Normalization::UnitRange,
            labels: default_labels(),
        }
    }
}

/// Everything that tunes a `Pipeline`. Missing JSON fields take their
/// default values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub screening: PreprocessProfile,
    pub subtype: SubtypeConfig,
    /// Stage-2 layer whose activations Grad-CAM explains.
    pub designated_layer_name: String,
    /// Stage-1 probabilities at or above this are positive.
    pub screening_threshold: f64,
    /// Heatmap share of each overlay pixel.
    pub blend_weight: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            screening: PreprocessProfile {
                input_size: InputSize::square(224),
                normalization: Normalization::UnitRange,
            },
            subtype: SubtypeConfig::default(),
            designated_layer_name: "top_conv".into(),
            screening_threshold: 0.5,
            blend_weight: 0.4,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.screening.validate("screening")?;
        self.subtype.profile().validate("subtype")?;
        if self.subtype.labels.len() < 2 {
            return Err(ConfigError::TooFewLabels(self.subtype.labels.len()));
        }
        if self.designated_layer_name.trim().is_empty() {
            return Err(ConfigError::EmptyLayerName);
        }
        if !(0.0..=1.0).contains(&self.screening_threshold) {
            return Err(ConfigError::OutOfUnitRange {
                field: "screening_threshold",
                value: self.screening_threshold,
            });
        }
        if !(0.0..=1.0).contains(&self.blend_weight) {
            return Err(ConfigError::OutOfUnitRange { field: "blend_weight", value: self.blend_weight });
        }
        Ok(())
    }

    /// Serializes the configuration to a pretty-printed JSON file.
    pub fn save_json(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let file = std::fs::File::create(path)?;
        let writer = std::io::BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))
    }

    /// Reads and validates a configuration file.
    pub fn load_json(path: impl AsRef<Path>) -> Result<PipelineConfig, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Io(format!("{}: {}", path.display(), e)))?;
        let config: PipelineConfig =
            serde_json::from_str(&text).map_err(|e| ConfigError::Parse(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_deployed_models() {
        let config = PipelineConfig::default();
        assert_eq!(config.screening.input_size, InputSize::square(224));
        assert_eq!(config.subtype.input_size, InputSize::square(300));
        assert_eq!(config.subtype.labels, vec!["glioma", "meningioma", "pituitary"]);
        assert_eq!(config.designated_layer_name, "top_conv");
        assert_eq!(config.screening_threshold, 0.5);
        assert_eq!(config.blend_weight, 0.4);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config: PipelineConfig = serde_json::from_str(r#"{"blend_weight": 0.25}"#).unwrap();
        assert_eq!(config.blend_weight, 0.25);
        assert_eq!(config.designated_layer_name, "top_conv");

        let config: PipelineConfig =
            serde_json::from_str(r#"{"subtype": {"normalization": {"mean_std": {"mean": [0.5, 0.5, 0.5], "std": [0.25, 0.25, 0.25]}}}}"#)
                .unwrap();
        assert_eq!(config.subtype.input_size, InputSize::square(300));
        assert_eq!(config.subtype.labels.len(), 3);
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        let config = PipelineConfig { screening_threshold: 1.2, ..Default::default() };
        assert_eq!(
            config.validate(),
            Err(ConfigError::OutOfUnitRange { field: "screening_threshold", value: 1.2 })
        );
        let config = PipelineConfig { designated_layer_name: " ".into(), ..Default::default() };
        assert_eq!(config.validate(), Err(ConfigError::EmptyLayerName));
        let mut config = PipelineConfig::default();
        config.subtype.labels.truncate(1);
        assert_eq!(config.validate(), Err(ConfigError::TooFewLabels(1)));
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.json");
        let config = PipelineConfig { blend_weight: 0.6, ..Default::default() };
        config.save_json(&path).unwrap();
        assert_eq!(PipelineConfig::load_json(&path).unwrap(), config);
    }

    #[test]
    fn unreadable_files_are_reported() {
        assert!(matches!(PipelineConfig::load_json("/nonexistent/pipeline.json"), Err(ConfigError::Io(_))));
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(PipelineConfig::load_json(&path), Err(ConfigError::Parse(_))));
    }
}
