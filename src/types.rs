use candle_core::{DType, Tensor};

use crate::config::ScoringConfig;
use crate::error::ScoringError;

/// Per-class scores for every `(sequence, timestep)` pair, shaped `[B, T, V]`.
#[derive(Debug, Clone, PartialEq)]
pub struct NoteTensor {
    batch_size: usize,
    max_timesteps: usize,
    label_size: usize,
    data: Vec<f32>,
}

impl NoteTensor {
    pub fn new(
        batch_size: usize,
        max_timesteps: usize,
        label_size: usize,
        data: Vec<f32>,
    ) -> Result<Self, ScoringError> {
        let expected = batch_size * max_timesteps * label_size;
        if data.len() != expected {
            return Err(ScoringError::invalid_input(format!(
                "note tensor [{batch_size}, {max_timesteps}, {label_size}] needs {expected} values, got {}",
                data.len()
            )));
        }
        Ok(Self {
            batch_size,
            max_timesteps,
            label_size,
            data,
        })
    }

    pub fn from_nested(rows: &[Vec<Vec<f32>>]) -> Result<Self, ScoringError> {
        let batch_size = rows.len();
        let max_timesteps = rows.first().map_or(0, Vec::len);
        let label_size = rows
            .first()
            .and_then(|seq| seq.first())
            .map_or(0, Vec::len);
        let mut data = Vec::with_capacity(batch_size * max_timesteps * label_size);
        for (i, seq) in rows.iter().enumerate() {
            if seq.len() != max_timesteps {
                return Err(ScoringError::invalid_input(format!(
                    "note sequence {i} has {} timesteps, expected {max_timesteps}",
                    seq.len()
                )));
            }
            for (j, vector) in seq.iter().enumerate() {
                if vector.len() != label_size {
                    return Err(ScoringError::invalid_input(format!(
                        "note vector [{i}, {j}] has {} classes, expected {label_size}",
                        vector.len()
                    )));
                }
                data.extend_from_slice(vector);
            }
        }
        Self::new(batch_size, max_timesteps, label_size, data)
    }

    /// Converts a rank-3 `[B, T, V]` candle tensor.
    pub fn from_tensor(tensor: &Tensor) -> Result<Self, ScoringError> {
        let (batch_size, max_timesteps, label_size) = tensor
            .dims3()
            .map_err(|e| ScoringError::runtime("note tensor dims3", e))?;
        let data = tensor
            .to_dtype(DType::F32)
            .and_then(|t| t.flatten_all())
            .and_then(|t| t.to_vec1::<f32>())
            .map_err(|e| ScoringError::runtime("note tensor to_vec1", e))?;
        Self::new(batch_size, max_timesteps, label_size, data)
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn max_timesteps(&self) -> usize {
        self.max_timesteps
    }

    pub fn label_size(&self) -> usize {
        self.label_size
    }

    pub fn dims(&self) -> (usize, usize, usize) {
        (self.batch_size, self.max_timesteps, self.label_size)
    }

    pub fn vector(&self, sequence: usize, timestep: usize) -> Result<&[f32], ScoringError> {
        if sequence >= self.batch_size || timestep >= self.max_timesteps {
            return Err(ScoringError::invalid_input(format!(
                "note index [{sequence}, {timestep}] outside [{}, {}]",
                self.batch_size, self.max_timesteps
            )));
        }
        let start = (sequence * self.max_timesteps + timestep) * self.label_size;
        Ok(&self.data[start..start + self.label_size])
    }
}

/// One value per `(sequence, timestep)` pair, shaped `[B, T]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ScalarTensor {
    batch_size: usize,
    max_timesteps: usize,
    data: Vec<f32>,
}

impl ScalarTensor {
    pub fn new(
        batch_size: usize,
        max_timesteps: usize,
        data: Vec<f32>,
    ) -> Result<Self, ScoringError> {
        if data.len() != batch_size * max_timesteps {
            return Err(ScoringError::invalid_input(format!(
                "scalar tensor [{batch_size}, {max_timesteps}] needs {} values, got {}",
                batch_size * max_timesteps,
                data.len()
            )));
        }
        Ok(Self {
            batch_size,
            max_timesteps,
            data,
        })
    }

    pub fn from_nested(rows: &[Vec<f32>]) -> Result<Self, ScoringError> {
        let max_timesteps = rows.first().map_or(0, Vec::len);
        let mut data = Vec::with_capacity(rows.len() * max_timesteps);
        for (i, seq) in rows.iter().enumerate() {
            if seq.len() != max_timesteps {
                return Err(ScoringError::invalid_input(format!(
                    "scalar sequence {i} has {} timesteps, expected {max_timesteps}",
                    seq.len()
                )));
            }
            data.extend_from_slice(seq);
        }
        Self::new(rows.len(), max_timesteps, data)
    }

    /// Converts a `[B, T]` or `[B, T, 1]` candle tensor.
    pub fn from_tensor(tensor: &Tensor) -> Result<Self, ScoringError> {
        let squeezed = match tensor.rank() {
            2 => tensor.clone(),
            3 => tensor
                .squeeze(2)
                .map_err(|e| ScoringError::runtime("scalar tensor squeeze", e))?,
            rank => {
                return Err(ScoringError::invalid_input(format!(
                    "scalar tensor must be rank 2 or [B, T, 1], got rank {rank}"
                )))
            }
        };
        let (batch_size, max_timesteps) = squeezed
            .dims2()
            .map_err(|e| ScoringError::runtime("scalar tensor dims2", e))?;
        let data = squeezed
            .to_dtype(DType::F32)
            .and_then(|t| t.flatten_all())
            .and_then(|t| t.to_vec1::<f32>())
            .map_err(|e| ScoringError::runtime("scalar tensor to_vec1", e))?;
        Self::new(batch_size, max_timesteps, data)
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn max_timesteps(&self) -> usize {
        self.max_timesteps
    }

    pub fn dims(&self) -> (usize, usize) {
        (self.batch_size, self.max_timesteps)
    }

    pub fn value(&self, sequence: usize, timestep: usize) -> Result<f32, ScoringError> {
        if sequence >= self.batch_size || timestep >= self.max_timesteps {
            return Err(ScoringError::invalid_input(format!(
                "scalar index [{sequence}, {timestep}] outside [{}, {}]",
                self.batch_size, self.max_timesteps
            )));
        }
        Ok(self.data[sequence * self.max_timesteps + timestep])
    }

    /// The first `length` values of one sequence.
    pub fn series(&self, sequence: usize, length: usize) -> Result<&[f32], ScoringError> {
        if sequence >= self.batch_size || length > self.max_timesteps {
            return Err(ScoringError::invalid_input(format!(
                "series [{sequence}, ..{length}] outside [{}, {}]",
                self.batch_size, self.max_timesteps
            )));
        }
        let start = sequence * self.max_timesteps;
        Ok(&self.data[start..start + length])
    }
}

/// Valid timestep count per sequence; storage beyond it is padding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureLengths(Vec<usize>);

impl FeatureLengths {
    pub fn new(lengths: Vec<usize>) -> Self {
        Self(lengths)
    }

    pub fn try_from_signed(lengths: &[i64]) -> Result<Self, ScoringError> {
        lengths
            .iter()
            .enumerate()
            .map(|(i, &len)| {
                usize::try_from(len).map_err(|_| {
                    ScoringError::invalid_input(format!("sequence {i} has negative length {len}"))
                })
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Self)
    }

    /// Converts a rank-1 integer candle tensor.
    pub fn from_tensor(tensor: &Tensor) -> Result<Self, ScoringError> {
        let lengths = tensor
            .to_dtype(DType::I64)
            .and_then(|t| t.to_vec1::<i64>())
            .map_err(|e| ScoringError::runtime("feature lengths to_vec1", e))?;
        Self::try_from_signed(&lengths)
    }

    pub fn as_slice(&self) -> &[usize] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.0.iter().copied().enumerate()
    }

    pub fn check_within(&self, max_timesteps: usize) -> Result<(), ScoringError> {
        match self.iter().find(|&(_, len)| len > max_timesteps) {
            Some((i, len)) => Err(ScoringError::invalid_input(format!(
                "sequence {i} length {len} exceeds max timesteps {max_timesteps}"
            ))),
            None => Ok(()),
        }
    }
}

/// Ground truth and model output for the same head.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelLogitPair<T> {
    pub labels: T,
    pub logits: T,
}

impl LabelLogitPair<NoteTensor> {
    pub fn check_same_shape(&self) -> Result<(), ScoringError> {
        if self.labels.dims() != self.logits.dims() {
            return Err(ScoringError::invalid_input(format!(
                "note labels {:?} and logits {:?} differ in shape",
                self.labels.dims(),
                self.logits.dims()
            )));
        }
        Ok(())
    }
}

impl LabelLogitPair<ScalarTensor> {
    pub fn check_same_shape(&self) -> Result<(), ScoringError> {
        if self.labels.dims() != self.logits.dims() {
            return Err(ScoringError::invalid_input(format!(
                "scalar labels {:?} and logits {:?} differ in shape",
                self.labels.dims(),
                self.logits.dims()
            )));
        }
        Ok(())
    }
}

/// Everything one scoring call reads.
#[derive(Debug, Clone)]
pub struct ScoringBatch {
    pub notes: LabelLogitPair<NoteTensor>,
    pub polyphony: LabelLogitPair<ScalarTensor>,
    pub onsets: LabelLogitPair<ScalarTensor>,
    pub feature_lengths: FeatureLengths,
}

impl ScoringBatch {
    pub fn validate(&self, config: &ScoringConfig) -> Result<(), ScoringError> {
        self.notes.check_same_shape()?;
        self.polyphony.check_same_shape()?;
        self.onsets.check_same_shape()?;

        let (batch_size, max_timesteps, label_size) = self.notes.labels.dims();
        if batch_size != config.batch_size {
            return Err(ScoringError::invalid_input(format!(
                "batch holds {batch_size} sequences, config expects {}",
                config.batch_size
            )));
        }
        if label_size != config.note_label_size {
            return Err(ScoringError::invalid_input(format!(
                "note vectors have {label_size} classes, config expects {}",
                config.note_label_size
            )));
        }
        for (name, dims) in [
            ("polyphony", self.polyphony.labels.dims()),
            ("onset", self.onsets.labels.dims()),
        ] {
            if dims != (batch_size, max_timesteps) {
                return Err(ScoringError::invalid_input(format!(
                    "{name} tensor {dims:?} does not match note tensor [{batch_size}, {max_timesteps}]"
                )));
            }
        }
        if self.feature_lengths.len() != batch_size {
            return Err(ScoringError::invalid_input(format!(
                "{} feature lengths for {batch_size} sequences",
                self.feature_lengths.len()
            )));
        }
        self.feature_lengths.check_within(max_timesteps)
    }

    pub fn batch_size(&self) -> usize {
        self.notes.labels.batch_size()
    }
}

/// The three headline metrics of one scoring call.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct ScoreSummary {
    /// Top-k note overlap in percent, `[0, 100]`.
    pub note_score: f64,
    /// Mean absolute onset error.
    pub onset_score: f64,
    /// Mean absolute polyphony error.
    pub polyphony_score: f64,
}

#[cfg(test)]
mod tests {
    use candle_core::Device;

    use super::*;

    #[test]
    fn note_tensor_vector_is_bounds_checked() {
        let notes = NoteTensor::new(1, 2, 2, vec![0.1, 0.2, 0.3, 0.4]).unwrap();
        assert_eq!(notes.vector(0, 1).unwrap(), &[0.3, 0.4]);
        assert!(notes.vector(0, 2).is_err());
        assert!(notes.vector(1, 0).is_err());
    }

    #[test]
    fn note_tensor_rejects_ragged_rows() {
        let rows = vec![vec![vec![0.0, 1.0], vec![0.0]]];
        assert!(matches!(
            NoteTensor::from_nested(&rows),
            Err(ScoringError::InvalidInput { .. })
        ));
    }

    #[test]
    fn note_tensor_from_candle() {
        let tensor = Tensor::from_vec(
            vec![0.0f32, 1.0, 2.0, 3.0, 4.0, 5.0],
            (1, 3, 2),
            &Device::Cpu,
        )
        .unwrap();
        let notes = NoteTensor::from_tensor(&tensor).unwrap();
        assert_eq!(notes.dims(), (1, 3, 2));
        assert_eq!(notes.vector(0, 2).unwrap(), &[4.0, 5.0]);
    }

    #[test]
    fn scalar_tensor_accepts_trailing_unit_dim() {
        let tensor = Tensor::from_vec(vec![0.5f32, 1.5, 2.5, 3.5], (2, 2, 1), &Device::Cpu).unwrap();
        let scalars = ScalarTensor::from_tensor(&tensor).unwrap();
        assert_eq!(scalars.dims(), (2, 2));
        assert_eq!(scalars.value(1, 0).unwrap(), 2.5);
        assert_eq!(scalars.series(1, 1).unwrap(), &[2.5]);
        assert!(scalars.series(0, 3).is_err());
    }

    #[test]
    fn feature_lengths_reject_negative() {
        let err = FeatureLengths::try_from_signed(&[2, -1]).unwrap_err();
        assert!(err.to_string().contains("negative length"));
    }

    #[test]
    fn feature_lengths_from_candle() {
        let tensor = Tensor::new(&[3i64, 0, 1], &Device::Cpu).unwrap();
        let lengths = FeatureLengths::from_tensor(&tensor).unwrap();
        assert_eq!(lengths.as_slice(), &[3, 0, 1]);
        assert!(lengths.check_within(3).is_ok());
        assert!(lengths.check_within(2).is_err());
    }

    fn batch(lengths: Vec<usize>) -> ScoringBatch {
        let notes = NoteTensor::new(2, 2, 3, vec![0.0; 12]).unwrap();
        let scalars = ScalarTensor::new(2, 2, vec![0.0; 4]).unwrap();
        ScoringBatch {
            notes: LabelLogitPair {
                labels: notes.clone(),
                logits: notes,
            },
            polyphony: LabelLogitPair {
                labels: scalars.clone(),
                logits: scalars.clone(),
            },
            onsets: LabelLogitPair {
                labels: scalars.clone(),
                logits: scalars,
            },
            feature_lengths: FeatureLengths::new(lengths),
        }
    }

    #[test]
    fn scoring_batch_validate() {
        let config = ScoringConfig {
            batch_size: 2,
            note_label_size: 3,
            ..ScoringConfig::default()
        };
        assert!(batch(vec![2, 1]).validate(&config).is_ok());
        assert!(batch(vec![3, 1]).validate(&config).is_err());
        assert!(batch(vec![1]).validate(&config).is_err());

        let wrong_classes = ScoringConfig {
            note_label_size: 4,
            ..config.clone()
        };
        assert!(batch(vec![2, 1]).validate(&wrong_classes).is_err());

        let mut mismatched = batch(vec![2, 1]);
        mismatched.onsets.logits = ScalarTensor::new(2, 1, vec![0.0; 2]).unwrap();
        assert!(mismatched.validate(&config).is_err());
    }
}
