//! Feed-forward residual block used for input and output projections

use ndarray::{Array1, Array2, Array3};
use ndarray_rand::rand_distr::Normal;
use ndarray_rand::RandomExt;

/// Dense layer applied over the last axis of a 3D tensor
#[derive(Debug, Clone)]
pub struct Linear {
    weight: Array2<f64>,
    bias: Array1<f64>,
}

impl Linear {
    /// Creates a layer with Xavier-initialized weights
    pub fn new(in_dim: usize, out_dim: usize) -> Self {
        let scale = (2.0 / (in_dim + out_dim) as f64).sqrt();
        Self {
            weight: Array2::random((in_dim, out_dim), Normal::new(0.0, scale).unwrap()),
            bias: Array1::zeros(out_dim),
        }
    }

    /// Input (batch, seq_len, in_dim), output (batch, seq_len, out_dim)
    pub fn forward(&self, x: &Array3<f64>) -> Array3<f64> {
        let (batch, seq_len, in_dim) = x.dim();
        let out_dim = self.weight.ncols();

        let mut output = Array3::zeros((batch, seq_len, out_dim));
        for b in 0..batch {
            for t in 0..seq_len {
                for o in 0..out_dim {
                    let mut sum = self.bias[o];
                    for i in 0..in_dim {
                        sum += x[[b, t, i]] * self.weight[[i, o]];
                    }
                    output[[b, t, o]] = sum;
                }
            }
        }
        output
    }
}

/// Layer normalization over the last axis
#[derive(Debug, Clone)]
pub struct LayerNorm {
    gamma: Array1<f64>,
    beta: Array1<f64>,
    eps: f64,
}

impl LayerNorm {
    pub fn new(dim: usize) -> Self {
        Self {
            gamma: Array1::ones(dim),
            beta: Array1::zeros(dim),
            eps: 1e-5,
        }
    }

    pub fn forward(&self, x: &Array3<f64>) -> Array3<f64> {
        let (batch, seq_len, dim) = x.dim();
        let mut output = Array3::zeros((batch, seq_len, dim));

        for b in 0..batch {
            for t in 0..seq_len {
                let mut mean = 0.0;
                for d in 0..dim {
                    mean += x[[b, t, d]];
                }
                mean /= dim as f64;

                let mut var = 0.0;
                for d in 0..dim {
                    var += (x[[b, t, d]] - mean).powi(2);
                }
                var /= dim as f64;

                let std = (var + self.eps).sqrt();
                for d in 0..dim {
                    output[[b, t, d]] = self.gamma[d] * (x[[b, t, d]] - mean) / std + self.beta[d];
                }
            }
        }
        output
    }
}

/// Feed-forward block with a residual skip connection.
///
/// A swish-activated hidden layer feeds a linear output layer; a separate
/// linear projection carries the residual. Layer norm on the sum is optional.
#[derive(Debug, Clone)]
pub struct ResidualBlock {
    hidden_layer: Linear,
    output_layer: Linear,
    residual_layer: Linear,
    layer_norm: Option<LayerNorm>,
}

impl ResidualBlock {
    pub fn new(input_dim: usize, hidden_dim: usize, output_dim: usize, layer_norm: bool) -> Self {
        Self {
            hidden_layer: Linear::new(input_dim, hidden_dim),
            output_layer: Linear::new(hidden_dim, output_dim),
            residual_layer: Linear::new(input_dim, output_dim),
            layer_norm: layer_norm.then(|| LayerNorm::new(output_dim)),
        }
    }

    /// Input (batch, seq_len, input_dim), output (batch, seq_len, output_dim)
    pub fn forward(&self, x: &Array3<f64>) -> Array3<f64> {
        let hidden = swish(&self.hidden_layer.forward(x));
        let output = self.output_layer.forward(&hidden);
        let residual = self.residual_layer.forward(x);

        let sum = &output + &residual;
        match &self.layer_norm {
            Some(ln) => ln.forward(&sum),
            None => sum,
        }
    }
}

/// Swish activation: x * sigmoid(x)
fn swish(x: &Array3<f64>) -> Array3<f64> {
    x.mapv(|v| v / (1.0 + (-v).exp()))
}
