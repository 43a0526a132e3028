use candle_core::Tensor;

use crate::error::ScoringError;

/// Raw per-timestep outputs of the note network, in the shapes it emits.
#[derive(Debug, Clone)]
pub struct ForwardOutput {
    /// `[batch_size, max_timesteps, note_label_size]`
    pub note_logits: Tensor,
    /// `[batch_size, max_timesteps]` or `[batch_size, max_timesteps, 1]`
    pub polyphony_logits: Tensor,
    /// `[batch_size, max_timesteps]` or `[batch_size, max_timesteps, 1]`
    pub onset_logits: Tensor,
}

/// The recurrent network being scored. Only its outputs matter here.
pub trait ForwardPass: Send + Sync {
    fn forward(
        &self,
        features: &Tensor,
        feature_lengths: &[usize],
    ) -> Result<ForwardOutput, ScoringError>;

    fn device_label(&self) -> String {
        "cpu".to_string()
    }
}
