//! Quantile (pinball) loss and the combined training objective

use ndarray::{Array2, Array3};

use crate::error::{Error, Result};

/// Quantile loss over a forecast grid
#[derive(Debug, Clone)]
pub struct QuantileLoss {
    /// Quantiles the loss is evaluated at
    pub quantiles: Vec<f64>,
}

impl QuantileLoss {
    pub fn new(quantiles: Vec<f64>) -> Self {
        Self { quantiles }
    }

    /// Pinball loss for a single prediction: `2 * max(q*dev, -(1-q)*dev)`
    /// with `dev = actual - pred`
    pub fn pinball(pred: f64, actual: f64, quantile: f64) -> f64 {
        let dev = actual - pred;
        let loss_first = dev * quantile;
        let loss_second = -dev * (1.0 - quantile);
        2.0 * loss_first.max(loss_second)
    }

    /// Combined objective over a full forecast: squared error on the mean
    /// channel plus the pinball loss summed over the quantile channels,
    /// averaged over batch and horizon.
    ///
    /// `pred` is (batch, horizon, 1 + num_quantiles) with the mean at
    /// channel 0; `actual` is (batch, horizon).
    pub fn forecast_loss(&self, pred: &Array3<f64>, actual: &Array2<f64>) -> Result<f64> {
        let (batch, horizon, channels) = pred.dim();
        if actual.dim() != (batch, horizon) {
            return Err(Error::ShapeMismatch(format!(
                "actual shape {:?} does not match prediction shape {:?}",
                actual.dim(),
                pred.dim()
            )));
        }
        if channels != self.quantiles.len() + 1 {
            return Err(Error::ShapeMismatch(format!(
                "prediction has {} channels, expected {}",
                channels,
                self.quantiles.len() + 1
            )));
        }

        let mut total = 0.0;
        for b in 0..batch {
            for h in 0..horizon {
                let y = actual[[b, h]];
                let mean_err = pred[[b, h, 0]] - y;
                let mut loss = mean_err * mean_err;
                for (i, &q) in self.quantiles.iter().enumerate() {
                    loss += Self::pinball(pred[[b, h, i + 1]], y, q);
                }
                total += loss;
            }
        }
        Ok(total / (batch * horizon) as f64)
    }

    /// Mean pinball loss per quantile channel over a (horizon,) target and a
    /// (horizon, num_quantiles) prediction
    pub fn per_quantile(&self, pred: &Array2<f64>, actual: &[f64]) -> Vec<f64> {
        let horizon = actual.len();
        self.quantiles
            .iter()
            .enumerate()
            .map(|(i, &q)| {
                let mut loss = 0.0;
                for h in 0..horizon {
                    loss += Self::pinball(pred[[h, i]], actual[h], q);
                }
                loss / horizon as f64
            })
            .collect()
    }
}
