pub mod config;
pub mod error;
pub mod pipeline;
pub mod scoring;
pub mod types;

pub use config::ScoringConfig;
pub use error::ScoringError;
pub use pipeline::builder::EvaluatorBuilder;
pub use pipeline::runtime::{EvaluationInput, Evaluator};
pub use pipeline::traits::{ForwardOutput, ForwardPass};
pub use scoring::aggregate::{SequenceMetricAggregator, Tally};
pub use scoring::edit_distance::{AlignmentMatrix, EditDistanceAligner};
pub use scoring::report::{
    build_report, MetricDistribution, OutlierEntry, ScoreReport, SequenceReport,
};
pub use scoring::tolerance::ToleranceComparator;
pub use scoring::top_k::TopKSetScorer;
pub use types::{
    FeatureLengths, LabelLogitPair, NoteTensor, ScalarTensor, ScoreSummary, ScoringBatch,
};
