use std::cmp::Ordering;

use crate::error::ScoringError;

/// Indices of the `k` largest values, in no particular order.
///
/// Partition-based (`select_nth_unstable_by`), so the cost is linear in the
/// vector length. Equal values are ranked by lower index first, which makes the
/// selected set deterministic under ties.
pub fn top_k_indices(values: &[f32], k: usize) -> Result<Vec<usize>, ScoringError> {
    if k > values.len() {
        return Err(ScoringError::invalid_input(format!(
            "top-k of {k} exceeds vector dimension {}",
            values.len()
        )));
    }
    let mut indices: Vec<usize> = (0..values.len()).collect();
    if k == 0 {
        return Ok(Vec::new());
    }
    if k < indices.len() {
        indices.select_nth_unstable_by(k - 1, |&a, &b| rank_desc(values, a, b));
        indices.truncate(k);
    }
    Ok(indices)
}

#[inline]
fn rank_desc(values: &[f32], a: usize, b: usize) -> Ordering {
    values[b].total_cmp(&values[a]).then_with(|| a.cmp(&b))
}

/// Counts indices shared by the top-`k` sets of a label and a logit vector.
#[derive(Debug, Clone, Copy, Default)]
pub struct TopKSetScorer;

impl TopKSetScorer {
    /// Result is in `[0, k]`. `k == 0` yields 0 without touching the vectors'
    /// contents.
    pub fn overlap(
        &self,
        label_vector: &[f32],
        logit_vector: &[f32],
        k: usize,
    ) -> Result<usize, ScoringError> {
        if label_vector.len() != logit_vector.len() {
            return Err(ScoringError::invalid_input(format!(
                "label vector has {} classes, logit vector has {}",
                label_vector.len(),
                logit_vector.len()
            )));
        }
        let top_labels = top_k_indices(label_vector, k)?;
        let top_logits = top_k_indices(logit_vector, k)?;

        let mut in_logits = vec![false; logit_vector.len()];
        for idx in top_logits {
            in_logits[idx] = true;
        }
        Ok(top_labels.into_iter().filter(|&idx| in_logits[idx]).count())
    }
}
