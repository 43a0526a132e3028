use candle_core::Tensor;

use crate::config::ScoringConfig;
use crate::error::ScoringError;
use crate::pipeline::traits::{ForwardOutput, ForwardPass};
use crate::scoring::aggregate::SequenceMetricAggregator;
use crate::scoring::report::{build_report, ScoreReport};
use crate::types::{FeatureLengths, LabelLogitPair, NoteTensor, ScalarTensor, ScoringBatch};

/// Features and ground truth for one batch, as the data loader hands them over.
#[derive(Debug, Clone)]
pub struct EvaluationInput {
    pub features: Tensor,
    /// Rank-1 integer tensor, one valid length per sequence.
    pub feature_lengths: Tensor,
    pub note_labels: Tensor,
    pub polyphony_labels: Tensor,
    pub onset_labels: Tensor,
}

pub struct Evaluator {
    config: ScoringConfig,
    forward_pass: Box<dyn ForwardPass>,
    aggregator: SequenceMetricAggregator,
}

pub(crate) struct EvaluatorParts {
    pub config: ScoringConfig,
    pub forward_pass: Box<dyn ForwardPass>,
    pub aggregator: SequenceMetricAggregator,
}

impl Evaluator {
    pub(crate) fn from_parts(parts: EvaluatorParts) -> Self {
        Self {
            config: parts.config,
            forward_pass: parts.forward_pass,
            aggregator: parts.aggregator,
        }
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    pub fn aggregator(&self) -> &SequenceMetricAggregator {
        &self.aggregator
    }

    /// Runs the network on `input.features` and scores its outputs.
    pub fn evaluate(&self, input: &EvaluationInput) -> Result<ScoreReport, ScoringError> {
        let feature_lengths = FeatureLengths::from_tensor(&input.feature_lengths)?;
        let output = self
            .forward_pass
            .forward(&input.features, feature_lengths.as_slice())?;
        let batch = assemble_batch(input, output, feature_lengths)?;
        self.score_batch(&batch)
    }

    /// Scores outputs that were computed elsewhere.
    pub fn score_batch(&self, batch: &ScoringBatch) -> Result<ScoreReport, ScoringError> {
        let report = build_report(&self.aggregator, batch, &self.config)?;
        tracing::info!(
            sequences = report.meta.batch_size,
            timesteps = report.meta.scored_timesteps,
            note_score = report.summary.note_score,
            onset_score = report.summary.onset_score,
            polyphony_score = report.summary.polyphony_score,
            "batch scored"
        );
        Ok(report)
    }
}

fn assemble_batch(
    input: &EvaluationInput,
    output: ForwardOutput,
    feature_lengths: FeatureLengths,
) -> Result<ScoringBatch, ScoringError> {
    Ok(ScoringBatch {
        notes: LabelLogitPair {
            labels: NoteTensor::from_tensor(&input.note_labels)?,
            logits: NoteTensor::from_tensor(&output.note_logits)?,
        },
        polyphony: LabelLogitPair {
            labels: ScalarTensor::from_tensor(&input.polyphony_labels)?,
            logits: ScalarTensor::from_tensor(&output.polyphony_logits)?,
        },
        onsets: LabelLogitPair {
            labels: ScalarTensor::from_tensor(&input.onset_labels)?,
            logits: ScalarTensor::from_tensor(&output.onset_logits)?,
        },
        feature_lengths,
    })
}

#[cfg(test)]
mod tests {
    use candle_core::Device;

    use crate::pipeline::builder::EvaluatorBuilder;

    use super::*;

    /// Replays fixed logits regardless of the features it is given.
    struct ReplayForwardPass {
        output: ForwardOutput,
    }

    impl ForwardPass for ReplayForwardPass {
        fn forward(
            &self,
            _features: &Tensor,
            _feature_lengths: &[usize],
        ) -> Result<ForwardOutput, ScoringError> {
            Ok(self.output.clone())
        }
    }

    struct FailingForwardPass;

    impl ForwardPass for FailingForwardPass {
        fn forward(
            &self,
            _features: &Tensor,
            _feature_lengths: &[usize],
        ) -> Result<ForwardOutput, ScoringError> {
            Err(ScoringError::runtime("forward pass", "weights not loaded"))
        }
    }

    fn config() -> ScoringConfig {
        ScoringConfig {
            batch_size: 2,
            note_label_size: 4,
            ..ScoringConfig::default()
        }
    }

    fn input(device: &Device) -> EvaluationInput {
        EvaluationInput {
            features: Tensor::zeros((2, 2, 8), candle_core::DType::F32, device).unwrap(),
            feature_lengths: Tensor::new(&[2i64, 1], device).unwrap(),
            note_labels: Tensor::new(
                &[
                    [[0.9f32, 0.8, 0.1, 0.1], [0.0, 0.0, 0.0, 0.0]],
                    [[0.1, 0.9, 0.2, 0.3], [0.0, 0.0, 0.0, 0.0]],
                ],
                device,
            )
            .unwrap(),
            polyphony_labels: Tensor::new(&[[2.0f32, 0.0], [1.0, 0.0]], device).unwrap(),
            onset_labels: Tensor::new(&[[1.0f32, 0.0], [1.0, 0.0]], device).unwrap(),
        }
    }

    fn replay(device: &Device) -> ReplayForwardPass {
        ReplayForwardPass {
            output: ForwardOutput {
                note_logits: Tensor::new(
                    &[
                        [[0.85f32, 0.2, 0.75, 0.1], [0.0, 0.0, 0.0, 0.0]],
                        [[0.1, 0.9, 0.2, 0.3], [5.0, 5.0, 5.0, 5.0]],
                    ],
                    device,
                )
                .unwrap(),
                polyphony_logits: Tensor::new(&[[[2.0f32], [0.0]], [[1.0], [9.0]]], device)
                    .unwrap(),
                onset_logits: Tensor::new(&[[0.5f32, 0.0], [1.0, 9.0]], device).unwrap(),
            },
        }
    }

    #[test]
    fn evaluate_scores_forward_output() {
        let device = Device::Cpu;
        let evaluator = EvaluatorBuilder::new(config())
            .with_forward_pass(Box::new(replay(&device)))
            .build()
            .unwrap();
        let report = evaluator.evaluate(&input(&device)).unwrap();

        assert!((report.summary.note_score - 200.0 / 3.0).abs() < 1e-9);
        assert!((report.summary.onset_score - 0.5 / 3.0).abs() < 1e-6);
        assert_eq!(report.summary.polyphony_score, 0.0);
        assert_eq!(report.meta.scored_timesteps, 3);
        assert_eq!(report.sequences[1].onset_edit_distance, 0.0);
    }

    #[test]
    fn evaluate_rejects_batch_size_mismatch() {
        let device = Device::Cpu;
        let evaluator = EvaluatorBuilder::new(ScoringConfig {
            batch_size: 3,
            ..config()
        })
        .with_forward_pass(Box::new(replay(&device)))
        .build()
        .unwrap();
        let err = evaluator.evaluate(&input(&device)).unwrap_err();
        assert!(matches!(err, ScoringError::InvalidInput { .. }));
    }

    #[test]
    fn evaluate_rejects_negative_lengths() {
        let device = Device::Cpu;
        let evaluator = EvaluatorBuilder::new(config())
            .with_forward_pass(Box::new(replay(&device)))
            .build()
            .unwrap();
        let mut bad = input(&device);
        bad.feature_lengths = Tensor::new(&[2i64, -1], &device).unwrap();
        let err = evaluator.evaluate(&bad).unwrap_err();
        assert!(err.to_string().contains("negative length"));
    }

    #[test]
    fn evaluate_propagates_forward_failure() {
        let device = Device::Cpu;
        let evaluator = EvaluatorBuilder::new(config())
            .with_forward_pass(Box::new(FailingForwardPass))
            .build()
            .unwrap();
        let err = evaluator.evaluate(&input(&device)).unwrap_err();
        assert!(matches!(err, ScoringError::Runtime { .. }));
    }
}
