use crate::error::ScoringError;
use crate::scoring::tolerance::ToleranceComparator;

/// `(n + 1) × (m + 1)` edit-cost table for two sequences of lengths `n` and `m`.
///
/// Row `i`, column `j` holds the cost of turning the first `i` elements of the
/// source into the first `j` elements of the target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlignmentMatrix {
    rows: usize,
    cols: usize,
    cells: Vec<u32>,
}

impl AlignmentMatrix {
    fn with_prefix_costs(n: usize, m: usize) -> Self {
        let rows = n + 1;
        let cols = m + 1;
        let mut cells = vec![0u32; rows * cols];
        for i in 0..rows {
            cells[i * cols] = i as u32;
        }
        for j in 0..cols {
            cells[j] = j as u32;
        }
        Self { rows, cols, cells }
    }

    #[inline(always)]
    fn at(&self, i: usize, j: usize) -> u32 {
        self.cells[i * self.cols + j]
    }

    #[inline(always)]
    fn set(&mut self, i: usize, j: usize, value: u32) {
        self.cells[i * self.cols + j] = value;
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn get(&self, i: usize, j: usize) -> Option<u32> {
        (i < self.rows && j < self.cols).then(|| self.at(i, j))
    }

    /// Cost of the full transformation (bottom-right cell).
    pub fn distance(&self) -> f64 {
        self.at(self.rows - 1, self.cols - 1) as f64
    }
}

/// Insert/delete edit distance where "equal" means within tolerance.
///
/// A matching pair copies the diagonal cost. Otherwise the cell is
/// `1 + min(up, left, diagonal)`, so a mismatched pair costs the same single
/// unit as an insertion or deletion.
#[derive(Debug, Clone, Copy, Default)]
pub struct EditDistanceAligner {
    comparator: ToleranceComparator,
}

impl EditDistanceAligner {
    pub fn new(comparator: ToleranceComparator) -> Self {
        Self { comparator }
    }

    pub fn comparator(&self) -> &ToleranceComparator {
        &self.comparator
    }

    pub fn distance(&self, s: &[f32], t: &[f32]) -> Result<f64, ScoringError> {
        Ok(self.alignment_matrix(s, t)?.distance())
    }

    pub fn alignment_matrix(&self, s: &[f32], t: &[f32]) -> Result<AlignmentMatrix, ScoringError> {
        reject_nan("source", s)?;
        reject_nan("target", t)?;
        let n = s.len();
        let m = t.len();
        if u32::try_from(n.max(m)).is_err() {
            return Err(ScoringError::invalid_input(format!(
                "sequences of length {n} and {m} are too long to align"
            )));
        }

        let mut d = AlignmentMatrix::with_prefix_costs(n, m);
        for j in 0..m {
            for i in 0..n {
                let cost = if self.comparator.matches(s[i], t[j]) {
                    d.at(i, j)
                } else {
                    1 + d.at(i, j + 1).min(d.at(i + 1, j)).min(d.at(i, j))
                };
                d.set(i + 1, j + 1, cost);
            }
        }
        Ok(d)
    }
}

fn reject_nan(which: &str, values: &[f32]) -> Result<(), ScoringError> {
    match values.iter().position(|v| v.is_nan()) {
        Some(idx) => Err(ScoringError::invalid_input(format!(
            "{which} sequence has NaN at index {idx}"
        ))),
        None => Ok(()),
    }
}
