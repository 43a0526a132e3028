use crate::config::ScoringConfig;
use crate::error::ScoringError;
use crate::pipeline::runtime::{Evaluator, EvaluatorParts};
use crate::pipeline::traits::ForwardPass;
use crate::scoring::aggregate::SequenceMetricAggregator;

pub struct EvaluatorBuilder {
    config: ScoringConfig,
    forward_pass: Option<Box<dyn ForwardPass>>,
    aggregator: Option<SequenceMetricAggregator>,
}

impl EvaluatorBuilder {
    pub fn new(config: ScoringConfig) -> Self {
        Self {
            config,
            forward_pass: None,
            aggregator: None,
        }
    }

    pub fn with_forward_pass(mut self, forward_pass: Box<dyn ForwardPass>) -> Self {
        self.forward_pass = Some(forward_pass);
        self
    }

    pub fn with_aggregator(mut self, aggregator: SequenceMetricAggregator) -> Self {
        self.aggregator = Some(aggregator);
        self
    }

    pub fn build(self) -> Result<Evaluator, ScoringError> {
        self.config.validate()?;
        let forward_pass = self.forward_pass.ok_or_else(|| {
            ScoringError::invalid_input("evaluator needs a forward pass to score")
        })?;
        let aggregator = match self.aggregator {
            Some(aggregator) => aggregator,
            None => SequenceMetricAggregator::from_config(&self.config)?,
        };

        tracing::info!(
            batch_size = self.config.batch_size,
            note_label_size = self.config.note_label_size,
            threshold = self.config.threshold,
            device = %forward_pass.device_label(),
            "note scoring evaluator ready"
        );

        Ok(Evaluator::from_parts(EvaluatorParts {
            config: self.config,
            forward_pass,
            aggregator,
        }))
    }
}
