use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ScoringError;

/// Parameters for one scoring call.
///
/// `batch_size` and the label sizes come from the dataset and runner; they are
/// checked against every incoming batch instead of being read from globals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Absolute difference below which two scalars count as equal during alignment.
    #[serde(default = "default_threshold")]
    pub threshold: f32,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_note_label_size")]
    pub note_label_size: usize,
    #[serde(default = "default_scalar_label_size")]
    pub polyphony_label_size: usize,
    #[serde(default = "default_scalar_label_size")]
    pub onset_label_size: usize,
}

impl ScoringConfig {
    pub const DEFAULT_THRESHOLD: f32 = 0.05;
    pub const DEFAULT_NOTE_LABEL_SIZE: usize = 88;

    pub fn load(path: &Path) -> Result<Self, ScoringError> {
        let data = std::fs::read_to_string(path)
            .map_err(|e| ScoringError::io("read scoring config", e))?;
        let config: Self = serde_json::from_str(&data)
            .map_err(|e| ScoringError::json("parse scoring config", e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ScoringError> {
        if !self.threshold.is_finite() || self.threshold <= 0.0 {
            return Err(ScoringError::invalid_input(format!(
                "threshold must be finite and positive, got {}",
                self.threshold
            )));
        }
        if self.batch_size == 0 {
            return Err(ScoringError::invalid_input("batch_size must be at least 1"));
        }
        for (name, size) in [
            ("note_label_size", self.note_label_size),
            ("polyphony_label_size", self.polyphony_label_size),
            ("onset_label_size", self.onset_label_size),
        ] {
            if size == 0 {
                return Err(ScoringError::invalid_input(format!(
                    "{name} must be at least 1"
                )));
            }
        }
        // Polyphony and onset heads are read as one value per timestep.
        if self.polyphony_label_size != 1 || self.onset_label_size != 1 {
            return Err(ScoringError::invalid_input(format!(
                "polyphony/onset heads must be scalar, got sizes {}/{}",
                self.polyphony_label_size, self.onset_label_size
            )));
        }
        Ok(())
    }
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            threshold: Self::DEFAULT_THRESHOLD,
            batch_size: default_batch_size(),
            note_label_size: Self::DEFAULT_NOTE_LABEL_SIZE,
            polyphony_label_size: 1,
            onset_label_size: 1,
        }
    }
}

fn default_threshold() -> f32 {
    ScoringConfig::DEFAULT_THRESHOLD
}
fn default_batch_size() -> usize {
    1
}
fn default_note_label_size() -> usize {
    ScoringConfig::DEFAULT_NOTE_LABEL_SIZE
}
fn default_scalar_label_size() -> usize {
    1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scoring_config_default() {
        let config = ScoringConfig::default();
        assert!((config.threshold - 0.05).abs() < f32::EPSILON);
        assert_eq!(config.batch_size, 1);
        assert_eq!(config.note_label_size, 88);
        assert_eq!(config.polyphony_label_size, 1);
        assert_eq!(config.onset_label_size, 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn scoring_config_fills_missing_fields() {
        let json = r#"{ "batch_size": 16, "note_label_size": 4 }"#;
        let config: ScoringConfig = serde_json::from_str(json).expect("valid config json");
        assert_eq!(config.batch_size, 16);
        assert_eq!(config.note_label_size, 4);
        assert!((config.threshold - ScoringConfig::DEFAULT_THRESHOLD).abs() < f32::EPSILON);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn scoring_config_rejects_bad_values() {
        let mut config = ScoringConfig::default();
        config.threshold = 0.0;
        assert!(matches!(
            config.validate(),
            Err(ScoringError::InvalidInput { .. })
        ));

        let mut config = ScoringConfig::default();
        config.batch_size = 0;
        assert!(config.validate().is_err());

        let mut config = ScoringConfig::default();
        config.onset_label_size = 3;
        assert!(config.validate().is_err());
    }

    #[test]
    fn scoring_config_load_missing_file() {
        let err = ScoringConfig::load(Path::new("does/not/exist.json")).unwrap_err();
        assert!(matches!(err, ScoringError::Io { .. }));
    }
}
