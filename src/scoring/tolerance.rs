use crate::config::ScoringConfig;
use crate::error::ScoringError;

/// Equality predicate for alignment: `|a - b| < threshold`.
///
/// NaN never matches anything, including itself.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToleranceComparator {
    threshold: f32,
}

impl ToleranceComparator {
    pub fn new(threshold: f32) -> Result<Self, ScoringError> {
        if !threshold.is_finite() || threshold <= 0.0 {
            return Err(ScoringError::invalid_input(format!(
                "tolerance threshold must be finite and positive, got {threshold}"
            )));
        }
        Ok(Self { threshold })
    }

    pub fn from_config(config: &ScoringConfig) -> Result<Self, ScoringError> {
        Self::new(config.threshold)
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    #[inline]
    pub fn matches(&self, a: f32, b: f32) -> bool {
        (a - b).abs() < self.threshold
    }
}

impl Default for ToleranceComparator {
    fn default() -> Self {
        Self {
            threshold: ScoringConfig::DEFAULT_THRESHOLD,
        }
    }
}
