use std::cmp::Ordering;

use serde::Serialize;

use crate::config::ScoringConfig;
use crate::error::ScoringError;
use crate::scoring::aggregate::{checked_metric, SequenceMetricAggregator, Tally};
use crate::types::{ScoreSummary, ScoringBatch};

pub const SCHEMA_VERSION: u32 = 1;
const OUTLIER_TOP_N: usize = 10;

#[derive(Debug, Clone, Serialize)]
pub struct ScoreReport {
    pub schema_version: u32,
    pub meta: Meta,
    pub summary: ScoreSummary,
    pub sequences: Vec<SequenceReport>,
    pub aggregates: AggregateMetrics,
    pub outliers: OutlierReport,
}

#[derive(Debug, Clone, Serialize)]
pub struct Meta {
    pub generated_at: String,
    pub threshold: f32,
    pub batch_size: usize,
    pub note_label_size: usize,
    pub max_timesteps: usize,
    pub scored_timesteps: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SequenceReport {
    pub index: usize,
    pub length: usize,
    /// `None` when no timestep of this sequence had positive polyphony.
    pub note_overlap_pct: Option<f64>,
    pub onset_mae: Option<f64>,
    pub polyphony_mae: Option<f64>,
    pub onset_edit_distance: f64,
    pub polyphony_edit_distance: f64,
    pub notes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct AggregateMetrics {
    pub note_overlap_pct: Option<MetricDistribution>,
    pub onset_mae: Option<MetricDistribution>,
    pub polyphony_mae: Option<MetricDistribution>,
    pub onset_edit_distance: Option<MetricDistribution>,
    pub polyphony_edit_distance: Option<MetricDistribution>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricDistribution {
    pub mean: f64,
    pub p50: f64,
    pub p90: f64,
    pub p95: f64,
    pub p99: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct OutlierReport {
    pub lowest_note_overlap_pct: Vec<OutlierEntry>,
    pub worst_onset_mae: Vec<OutlierEntry>,
    pub worst_polyphony_mae: Vec<OutlierEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutlierEntry {
    pub index: usize,
    pub value: f64,
}

/// Scores a validated batch and breaks the result down per sequence.
///
/// The batch-level summary is computed exactly as `score_all` does, so a
/// degenerate batch fails here too.
pub fn build_report(
    aggregator: &SequenceMetricAggregator,
    batch: &ScoringBatch,
    config: &ScoringConfig,
) -> Result<ScoreReport, ScoringError> {
    let summary = aggregator.score_all(batch, config)?;
    let sequences = compute_sequence_reports(aggregator, batch)?;
    let aggregates = aggregate_sequences(&sequences);
    let outliers = build_outliers(&sequences, OUTLIER_TOP_N);

    Ok(ScoreReport {
        schema_version: SCHEMA_VERSION,
        meta: Meta {
            generated_at: chrono::Utc::now().to_rfc3339(),
            threshold: aggregator.aligner().comparator().threshold(),
            batch_size: batch.batch_size(),
            note_label_size: batch.notes.labels.label_size(),
            max_timesteps: batch.notes.labels.max_timesteps(),
            scored_timesteps: batch.feature_lengths.iter().map(|(_, len)| len).sum(),
        },
        summary,
        sequences,
        aggregates,
        outliers,
    })
}

pub fn compute_sequence_reports(
    aggregator: &SequenceMetricAggregator,
    batch: &ScoringBatch,
) -> Result<Vec<SequenceReport>, ScoringError> {
    let lengths = &batch.feature_lengths;
    let note = aggregator.note_tallies(&batch.notes, &batch.polyphony.labels, lengths)?;
    let onset = aggregator.absolute_error_tallies(&batch.onsets, lengths)?;
    let polyphony = aggregator.absolute_error_tallies(&batch.polyphony, lengths)?;
    let onset_edits = aggregator.sequence_edit_distances(&batch.onsets, lengths)?;
    let polyphony_edits = aggregator.sequence_edit_distances(&batch.polyphony, lengths)?;

    lengths
        .iter()
        .map(|(i, length)| {
            let mut notes = Vec::new();
            if length == 0 {
                notes.push("empty_sequence".to_string());
            } else if note[i].count == 0.0 {
                notes.push("no_active_notes".to_string());
            }
            Ok::<_, ScoringError>(SequenceReport {
                index: i,
                length,
                note_overlap_pct: optional_ratio(note[i], "sequence.note_overlap_pct")?
                    .map(|ratio| 100.0 * ratio),
                onset_mae: optional_ratio(onset[i], "sequence.onset_mae")?,
                polyphony_mae: optional_ratio(polyphony[i], "sequence.polyphony_mae")?,
                onset_edit_distance: onset_edits[i],
                polyphony_edit_distance: polyphony_edits[i],
                notes,
            })
        })
        .collect()
}

pub fn aggregate_sequences(sequences: &[SequenceReport]) -> AggregateMetrics {
    let collect = |metric: fn(&SequenceReport) -> Option<f64>| -> Vec<f64> {
        sequences.iter().filter_map(metric).collect()
    };

    AggregateMetrics {
        note_overlap_pct: distribution_or_none(&collect(|s| s.note_overlap_pct)),
        onset_mae: distribution_or_none(&collect(|s| s.onset_mae)),
        polyphony_mae: distribution_or_none(&collect(|s| s.polyphony_mae)),
        onset_edit_distance: distribution_or_none(&collect(|s| {
            (s.length > 0).then_some(s.onset_edit_distance)
        })),
        polyphony_edit_distance: distribution_or_none(&collect(|s| {
            (s.length > 0).then_some(s.polyphony_edit_distance)
        })),
    }
}

fn build_outliers(sequences: &[SequenceReport], top_n: usize) -> OutlierReport {
    OutlierReport {
        // Negated so the ranking puts the lowest overlap first.
        lowest_note_overlap_pct: ranked_outliers(sequences, top_n, |s| {
            s.note_overlap_pct.map(|value| -value)
        })
        .into_iter()
        .map(|entry| OutlierEntry {
            index: entry.index,
            value: -entry.value,
        })
        .collect(),
        worst_onset_mae: ranked_outliers(sequences, top_n, |s| s.onset_mae),
        worst_polyphony_mae: ranked_outliers(sequences, top_n, |s| s.polyphony_mae),
    }
}

fn ranked_outliers(
    sequences: &[SequenceReport],
    top_n: usize,
    metric: impl Fn(&SequenceReport) -> Option<f64>,
) -> Vec<OutlierEntry> {
    let mut entries: Vec<OutlierEntry> = sequences
        .iter()
        .filter_map(|sequence| {
            metric(sequence).map(|value| OutlierEntry {
                index: sequence.index,
                value,
            })
        })
        .collect();

    entries.sort_by(|a, b| {
        b.value
            .partial_cmp(&a.value)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.index.cmp(&b.index))
    });
    entries.truncate(top_n);
    entries
}

fn optional_ratio(tally: Tally, metric_name: &str) -> Result<Option<f64>, ScoringError> {
    if tally.count == 0.0 {
        return Ok(None);
    }
    checked_metric(tally.score / tally.count, metric_name).map(Some)
}

fn distribution_or_none(values: &[f64]) -> Option<MetricDistribution> {
    if values.is_empty() {
        return None;
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));

    Some(MetricDistribution {
        mean: mean(&sorted),
        p50: percentile_sorted(&sorted, 0.5),
        p90: percentile_sorted(&sorted, 0.9),
        p95: percentile_sorted(&sorted, 0.95),
        p99: percentile_sorted(&sorted, 0.99),
    })
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

fn percentile_sorted(sorted_values: &[f64], percentile: f64) -> f64 {
    if sorted_values.is_empty() {
        return 0.0;
    }
    if sorted_values.len() == 1 {
        return sorted_values[0];
    }

    let clamped = percentile.clamp(0.0, 1.0);
    let max_index = (sorted_values.len() - 1) as f64;
    let rank = clamped * max_index;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    if lower == upper {
        sorted_values[lower]
    } else {
        let weight = rank - lower as f64;
        sorted_values[lower] * (1.0 - weight) + sorted_values[upper] * weight
    }
}
