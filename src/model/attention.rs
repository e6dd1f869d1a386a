//! Multi-head causal self-attention with key-padding masking

use ndarray::{Array2, Array3};
use ndarray_rand::rand_distr::Normal;
use ndarray_rand::RandomExt;

/// Additive penalty for masked attention logits.
///
/// Large and finite rather than -inf, so a fully masked row softmaxes to a
/// uniform distribution instead of NaN.
const MASK_PENALTY: f64 = -1e9;

/// Multi-head self-attention with optional causal masking
#[derive(Debug, Clone)]
pub struct MultiHeadAttention {
    d_model: usize,
    num_heads: usize,
    head_dim: usize,
    causal: bool,
    w_q: Array2<f64>,
    w_k: Array2<f64>,
    w_v: Array2<f64>,
    w_o: Array2<f64>,
}

impl MultiHeadAttention {
    /// Creates a new attention layer; `causal` forbids attending to future positions
    pub fn new(d_model: usize, num_heads: usize, causal: bool) -> Self {
        assert!(
            d_model % num_heads == 0,
            "d_model must be divisible by num_heads"
        );

        let head_dim = d_model / num_heads;
        let scale = (1.0 / d_model as f64).sqrt();
        let dist = Normal::new(0.0, scale).unwrap();

        Self {
            d_model,
            num_heads,
            head_dim,
            causal,
            w_q: Array2::random((d_model, d_model), dist),
            w_k: Array2::random((d_model, d_model), dist),
            w_v: Array2::random((d_model, d_model), dist),
            w_o: Array2::random((d_model, d_model), dist),
        }
    }

    /// Forward pass.
    ///
    /// `x` is (batch, seq_len, d_model); `key_padding`, when given, is
    /// (batch, seq_len) with 1 marking positions no query may attend to.
    pub fn forward(&self, x: &Array3<f64>, key_padding: Option<&Array2<f64>>) -> Array3<f64> {
        let q = self.linear(x, &self.w_q);
        let k = self.linear(x, &self.w_k);
        let v = self.linear(x, &self.w_v);

        let q = self.split_heads(&q);
        let k = self.split_heads(&k);
        let v = self.split_heads(&v);

        let attn_output = self.scaled_dot_product_attention(&q, &k, &v, key_padding);

        let merged = self.merge_heads(&attn_output);
        self.linear(&merged, &self.w_o)
    }

    fn linear(&self, x: &Array3<f64>, weight: &Array2<f64>) -> Array3<f64> {
        let (batch, seq_len, in_dim) = x.dim();
        let out_dim = weight.ncols();

        let mut output = Array3::zeros((batch, seq_len, out_dim));
        for b in 0..batch {
            for t in 0..seq_len {
                for o in 0..out_dim {
                    let mut sum = 0.0;
                    for i in 0..in_dim {
                        sum += x[[b, t, i]] * weight[[i, o]];
                    }
                    output[[b, t, o]] = sum;
                }
            }
        }
        output
    }

    /// (batch, seq_len, d_model) -> per-head (batch, seq_len, head_dim)
    fn split_heads(&self, x: &Array3<f64>) -> Vec<Array3<f64>> {
        let (batch, seq_len, _) = x.dim();
        let mut heads = Vec::with_capacity(self.num_heads);

        for h in 0..self.num_heads {
            let mut head = Array3::zeros((batch, seq_len, self.head_dim));
            let start = h * self.head_dim;
            for b in 0..batch {
                for t in 0..seq_len {
                    for d in 0..self.head_dim {
                        head[[b, t, d]] = x[[b, t, start + d]];
                    }
                }
            }
            heads.push(head);
        }
        heads
    }

    /// Per-head (batch, seq_len, head_dim) -> (batch, seq_len, d_model)
    fn merge_heads(&self, heads: &[Array3<f64>]) -> Array3<f64> {
        let (batch, seq_len, _) = heads[0].dim();
        let mut output = Array3::zeros((batch, seq_len, self.d_model));

        for (h, head) in heads.iter().enumerate() {
            let start = h * self.head_dim;
            for b in 0..batch {
                for t in 0..seq_len {
                    for d in 0..self.head_dim {
                        output[[b, t, start + d]] = head[[b, t, d]];
                    }
                }
            }
        }
        output
    }

    fn scaled_dot_product_attention(
        &self,
        q: &[Array3<f64>],
        k: &[Array3<f64>],
        v: &[Array3<f64>],
        key_padding: Option<&Array2<f64>>,
    ) -> Vec<Array3<f64>> {
        let scale = (self.head_dim as f64).sqrt();
        let mut outputs = Vec::with_capacity(self.num_heads);

        for h in 0..self.num_heads {
            let (batch, seq_len, _) = q[h].dim();

            let mut scores = Array3::zeros((batch, seq_len, seq_len));
            for b in 0..batch {
                for i in 0..seq_len {
                    for j in 0..seq_len {
                        let mut dot = 0.0;
                        for d in 0..self.head_dim {
                            dot += q[h][[b, i, d]] * k[h][[b, j, d]];
                        }
                        let mut score = dot / scale;
                        if self.causal && j > i {
                            score += MASK_PENALTY;
                        }
                        if let Some(pads) = key_padding {
                            if pads[[b, j]] > 0.5 {
                                score += MASK_PENALTY;
                            }
                        }
                        scores[[b, i, j]] = score;
                    }
                }
            }

            let attn_weights = softmax_3d(&scores);

            let mut output = Array3::zeros((batch, seq_len, self.head_dim));
            for b in 0..batch {
                for i in 0..seq_len {
                    for d in 0..self.head_dim {
                        let mut sum = 0.0;
                        for j in 0..seq_len {
                            sum += attn_weights[[b, i, j]] * v[h][[b, j, d]];
                        }
                        output[[b, i, d]] = sum;
                    }
                }
            }
            outputs.push(output);
        }
        outputs
    }
}

/// Softmax over the last dimension of a 3D array
fn softmax_3d(x: &Array3<f64>) -> Array3<f64> {
    let (batch, rows, cols) = x.dim();
    let mut output = Array3::zeros((batch, rows, cols));

    for b in 0..batch {
        for i in 0..rows {
            let mut max_val = f64::NEG_INFINITY;
            for j in 0..cols {
                max_val = max_val.max(x[[b, i, j]]);
            }

            let mut sum = 0.0;
            for j in 0..cols {
                let exp_val = (x[[b, i, j]] - max_val).exp();
                output[[b, i, j]] = exp_val;
                sum += exp_val;
            }

            for j in 0..cols {
                output[[b, i, j]] /= sum;
            }
        }
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_attention_shapes() {
        let mha = MultiHeadAttention::new(32, 4, true);
        let input = Array3::from_shape_fn((2, 6, 32), |(_, t, d)| (t + d) as f64 * 0.01);

        let output = mha.forward(&input, None);
        assert_eq!(output.dim(), (2, 6, 32));
    }

    #[test]
    fn test_causal_masking() {
        // Changing a later position must not affect earlier outputs
        let mha = MultiHeadAttention::new(16, 2, true);
        let mut a = Array3::from_shape_fn((1, 4, 16), |(_, t, d)| ((t * 16 + d) as f64).sin());
        let base = mha.forward(&a, None);

        for d in 0..16 {
            a[[0, 3, d]] += 5.0;
        }
        let perturbed = mha.forward(&a, None);

        for t in 0..3 {
            for d in 0..16 {
                assert_abs_diff_eq!(base[[0, t, d]], perturbed[[0, t, d]], epsilon = 1e-10);
            }
        }
    }

    #[test]
    fn test_key_padding_masking() {
        // A padded key position must not contribute to other positions' outputs
        let mha = MultiHeadAttention::new(16, 2, false);
        let mut a = Array3::from_shape_fn((1, 4, 16), |(_, t, d)| ((t + d) as f64).cos());
        let mut pads = Array2::zeros((1, 4));
        pads[[0, 1]] = 1.0;

        let base = mha.forward(&a, Some(&pads));
        for d in 0..16 {
            a[[0, 1, d]] = 100.0;
        }
        let perturbed = mha.forward(&a, Some(&pads));

        for t in [0usize, 2, 3] {
            for d in 0..16 {
                assert_abs_diff_eq!(base[[0, t, d]], perturbed[[0, t, d]], epsilon = 1e-10);
            }
        }
    }
}
