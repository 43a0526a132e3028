use crate::config::ScoringConfig;
use crate::error::ScoringError;
use crate::scoring::edit_distance::EditDistanceAligner;
use crate::scoring::tolerance::ToleranceComparator;
use crate::scoring::top_k::TopKSetScorer;
use crate::types::{
    FeatureLengths, LabelLogitPair, NoteTensor, ScalarTensor, ScoreSummary, ScoringBatch,
};

/// Running numerator and denominator of one metric.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Tally {
    pub score: f64,
    pub count: f64,
}

impl Tally {
    fn add(&mut self, other: Tally) {
        self.score += other.score;
        self.count += other.count;
    }

    pub fn sum(tallies: &[Tally]) -> Tally {
        let mut total = Tally::default();
        for tally in tallies {
            total.add(*tally);
        }
        total
    }

    /// `score / count`, or `DegenerateAggregate` when nothing was counted.
    pub fn ratio(&self, metric: &'static str) -> Result<f64, ScoringError> {
        if self.count == 0.0 {
            return Err(ScoringError::degenerate(metric));
        }
        checked_metric(self.score / self.count, metric)
    }
}

/// Padding-aware scoring passes over a batch.
///
/// Every pass visits each sequence `i` and only its first `L_i` timesteps.
/// Sequences are accumulated independently and summed afterwards.
#[derive(Debug, Clone, Copy, Default)]
pub struct SequenceMetricAggregator {
    top_k: TopKSetScorer,
    aligner: EditDistanceAligner,
}

impl SequenceMetricAggregator {
    pub fn new(aligner: EditDistanceAligner) -> Self {
        Self {
            top_k: TopKSetScorer,
            aligner,
        }
    }

    pub fn from_config(config: &ScoringConfig) -> Result<Self, ScoringError> {
        let comparator = ToleranceComparator::from_config(config)?;
        Ok(Self::new(EditDistanceAligner::new(comparator)))
    }

    pub fn aligner(&self) -> &EditDistanceAligner {
        &self.aligner
    }

    /// Top-k note overlap in percent, with `k = ceil(polyphony label)`.
    pub fn note_score(
        &self,
        notes: &LabelLogitPair<NoteTensor>,
        polyphony_labels: &ScalarTensor,
        feature_lengths: &FeatureLengths,
    ) -> Result<f64, ScoringError> {
        let total = Tally::sum(&self.note_tallies(notes, polyphony_labels, feature_lengths)?);
        tracing::debug!(
            metric = "note_score",
            score = total.score,
            count = total.count,
            "note overlap pass complete"
        );
        Ok(100.0 * total.ratio("note_score")?)
    }

    pub fn onset_score(
        &self,
        onsets: &LabelLogitPair<ScalarTensor>,
        feature_lengths: &FeatureLengths,
    ) -> Result<f64, ScoringError> {
        self.mean_absolute_error(onsets, feature_lengths, "onset_score")
    }

    pub fn polyphony_score(
        &self,
        polyphony: &LabelLogitPair<ScalarTensor>,
        feature_lengths: &FeatureLengths,
    ) -> Result<f64, ScoringError> {
        self.mean_absolute_error(polyphony, feature_lengths, "polyphony_score")
    }

    /// All three metrics; fails with the first metric that cannot be computed.
    pub fn score_all(
        &self,
        batch: &ScoringBatch,
        config: &ScoringConfig,
    ) -> Result<ScoreSummary, ScoringError> {
        batch.validate(config)?;
        Ok(ScoreSummary {
            note_score: self.note_score(
                &batch.notes,
                &batch.polyphony.labels,
                &batch.feature_lengths,
            )?,
            onset_score: self.onset_score(&batch.onsets, &batch.feature_lengths)?,
            polyphony_score: self.polyphony_score(&batch.polyphony, &batch.feature_lengths)?,
        })
    }

    /// Per-sequence note overlap numerator (`score`) and polyphony sum (`count`).
    pub fn note_tallies(
        &self,
        notes: &LabelLogitPair<NoteTensor>,
        polyphony_labels: &ScalarTensor,
        feature_lengths: &FeatureLengths,
    ) -> Result<Vec<Tally>, ScoringError> {
        notes.check_same_shape()?;
        let (batch_size, max_timesteps, label_size) = notes.labels.dims();
        if polyphony_labels.dims() != (batch_size, max_timesteps) {
            return Err(ScoringError::invalid_input(format!(
                "polyphony labels {:?} do not match note tensor [{batch_size}, {max_timesteps}]",
                polyphony_labels.dims()
            )));
        }
        check_lengths(feature_lengths, batch_size, max_timesteps)?;

        let mut tallies = Vec::with_capacity(batch_size);
        for (i, length) in feature_lengths.iter() {
            let mut tally = Tally::default();
            for j in 0..length {
                let k = polyphony_top_k(polyphony_labels.value(i, j)?, label_size, i, j)?;
                if k == 0 {
                    continue;
                }
                let overlap = self.top_k.overlap(
                    notes.labels.vector(i, j)?,
                    notes.logits.vector(i, j)?,
                    k,
                )?;
                tally.score += overlap as f64;
                tally.count += k as f64;
            }
            tallies.push(tally);
        }
        Ok(tallies)
    }

    /// Per-sequence sum of `|label - logit|` (`score`) and timestep count.
    pub fn absolute_error_tallies(
        &self,
        pair: &LabelLogitPair<ScalarTensor>,
        feature_lengths: &FeatureLengths,
    ) -> Result<Vec<Tally>, ScoringError> {
        pair.check_same_shape()?;
        let (batch_size, max_timesteps) = pair.labels.dims();
        check_lengths(feature_lengths, batch_size, max_timesteps)?;

        feature_lengths
            .iter()
            .map(|(i, length)| {
                let labels = pair.labels.series(i, length)?;
                let logits = pair.logits.series(i, length)?;
                let score = labels
                    .iter()
                    .zip(logits)
                    .map(|(&label, &logit)| (label as f64 - logit as f64).abs())
                    .sum::<f64>();
                Ok::<_, ScoringError>(Tally {
                    score,
                    count: length as f64,
                })
            })
            .collect()
    }

    /// Tolerance edit distance between label and logit series of each sequence,
    /// restricted to its valid timesteps.
    pub fn sequence_edit_distances(
        &self,
        pair: &LabelLogitPair<ScalarTensor>,
        feature_lengths: &FeatureLengths,
    ) -> Result<Vec<f64>, ScoringError> {
        pair.check_same_shape()?;
        let (batch_size, max_timesteps) = pair.labels.dims();
        check_lengths(feature_lengths, batch_size, max_timesteps)?;

        feature_lengths
            .iter()
            .map(|(i, length)| {
                self.aligner.distance(
                    pair.labels.series(i, length)?,
                    pair.logits.series(i, length)?,
                )
            })
            .collect()
    }

    fn mean_absolute_error(
        &self,
        pair: &LabelLogitPair<ScalarTensor>,
        feature_lengths: &FeatureLengths,
        metric: &'static str,
    ) -> Result<f64, ScoringError> {
        let total = Tally::sum(&self.absolute_error_tallies(pair, feature_lengths)?);
        tracing::debug!(
            metric,
            score = total.score,
            count = total.count,
            "absolute error pass complete"
        );
        total.ratio(metric)
    }
}

/// `ceil` of a polyphony label as a top-k count, clamped to `[0, label_size]`.
pub fn polyphony_top_k(
    polyphony: f32,
    label_size: usize,
    sequence: usize,
    timestep: usize,
) -> Result<usize, ScoringError> {
    if !polyphony.is_finite() {
        return Err(ScoringError::invalid_input(format!(
            "polyphony label at [{sequence}, {timestep}] is not finite: {polyphony}"
        )));
    }
    let ceiled = polyphony.ceil();
    if ceiled <= 0.0 {
        return Ok(0);
    }
    if ceiled > label_size as f32 {
        tracing::warn!(
            sequence,
            timestep,
            polyphony,
            label_size,
            "polyphony exceeds note label size; clamping top-k"
        );
        return Ok(label_size);
    }
    Ok(ceiled as usize)
}

fn check_lengths(
    feature_lengths: &FeatureLengths,
    batch_size: usize,
    max_timesteps: usize,
) -> Result<(), ScoringError> {
    if feature_lengths.len() != batch_size {
        return Err(ScoringError::invalid_input(format!(
            "{} feature lengths for {batch_size} sequences",
            feature_lengths.len()
        )));
    }
    feature_lengths.check_within(max_timesteps)
}

pub(crate) fn checked_metric(value: f64, metric_name: &str) -> Result<f64, ScoringError> {
    if !value.is_finite() {
        return Err(ScoringError::invalid_input(format!(
            "metric '{metric_name}' produced non-finite value: {value}"
        )));
    }
    Ok(value)
}
