//! Causal transformer stack behind a narrow, replaceable interface

use ndarray::{Array2, Array3};

use crate::model::attention::MultiHeadAttention;
use crate::model::residual::{LayerNorm, Linear};

/// Sequence-to-sequence collaborator of the patched decoder.
///
/// Given per-patch embeddings and a per-patch validity mask, returns output
/// embeddings of the same sequence length.
pub trait SequenceModel {
    /// `embeddings` is (batch, num_patches, d_model); `patch_padding` is
    /// (batch, num_patches) with 1 marking a fully padded patch.
    fn forward(&self, embeddings: &Array3<f64>, patch_padding: &Array2<f64>) -> Array3<f64>;
}

/// One transformer layer: causal self-attention and a feed-forward network,
/// each with a residual connection and layer norm
#[derive(Debug, Clone)]
pub struct TransformerBlock {
    attention: MultiHeadAttention,
    ff_in: Linear,
    ff_out: Linear,
    ln1: LayerNorm,
    ln2: LayerNorm,
}

impl TransformerBlock {
    pub fn new(d_model: usize, num_heads: usize, hidden_dim: usize) -> Self {
        Self {
            attention: MultiHeadAttention::new(d_model, num_heads, true),
            ff_in: Linear::new(d_model, hidden_dim),
            ff_out: Linear::new(hidden_dim, d_model),
            ln1: LayerNorm::new(d_model),
            ln2: LayerNorm::new(d_model),
        }
    }

    pub fn forward(&self, x: &Array3<f64>, patch_padding: &Array2<f64>) -> Array3<f64> {
        let attn = self.attention.forward(x, Some(patch_padding));
        let x1 = self.ln1.forward(&(x + &attn));

        let hidden = gelu(&self.ff_in.forward(&x1));
        let ff = self.ff_out.forward(&hidden);
        self.ln2.forward(&(&x1 + &ff))
    }
}

/// Stack of causal transformer layers
#[derive(Debug, Clone)]
pub struct StackedTransformer {
    layers: Vec<TransformerBlock>,
}

impl StackedTransformer {
    pub fn new(d_model: usize, num_heads: usize, hidden_dim: usize, num_layers: usize) -> Self {
        let layers = (0..num_layers)
            .map(|_| TransformerBlock::new(d_model, num_heads, hidden_dim))
            .collect();
        Self { layers }
    }
}

impl SequenceModel for StackedTransformer {
    fn forward(&self, embeddings: &Array3<f64>, patch_padding: &Array2<f64>) -> Array3<f64> {
        let mut output = embeddings.clone();
        for layer in &self.layers {
            output = layer.forward(&output, patch_padding);
        }
        output
    }
}

/// GELU activation (tanh approximation)
fn gelu(x: &Array3<f64>) -> Array3<f64> {
    x.mapv(|v| {
        0.5 * v * (1.0 + (std::f64::consts::FRAC_2_SQRT_PI * (v + 0.044715 * v.powi(3))).tanh())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{Array2, Array3};

    #[test]
    fn test_stacked_transformer_shapes() {
        let transformer = StackedTransformer::new(32, 4, 64, 2);
        let input = Array3::from_shape_fn((2, 5, 32), |(_, t, d)| (t * 32 + d) as f64 * 0.001);
        let padding = Array2::zeros((2, 5));

        let output = transformer.forward(&input, &padding);
        assert_eq!(output.dim(), (2, 5, 32));
        assert!(output.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_stack_is_causal() {
        let transformer = StackedTransformer::new(16, 2, 32, 2);
        let padding = Array2::zeros((1, 4));

        let mut input = Array3::from_shape_fn((1, 4, 16), |(_, t, d)| ((t + d) as f64).sin());
        let base = transformer.forward(&input, &padding);

        for d in 0..16 {
            input[[0, 3, d]] = 9.0;
        }
        let perturbed = transformer.forward(&input, &padding);

        for t in 0..3 {
            for d in 0..16 {
                assert_abs_diff_eq!(base[[0, t, d]], perturbed[[0, t, d]], epsilon = 1e-9);
            }
        }
    }
}
