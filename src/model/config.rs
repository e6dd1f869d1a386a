//! Decoder model configuration

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Configuration for the patched time-series decoder
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecoderConfig {
    /// Length of input patches
    pub patch_len: usize,
    /// Native output horizon of a single forward pass
    pub horizon_len: usize,
    /// Model dimension of the transformer stack
    pub d_model: usize,
    /// Hidden dimension of the fully connected layers
    pub hidden_dim: usize,
    /// Number of attention heads
    pub num_heads: usize,
    /// Number of transformer layers
    pub num_layers: usize,
    /// Quantiles for the probabilistic output head
    pub quantiles: Vec<f64>,
    /// Whether to condition on a per-series frequency category
    pub use_freq: bool,
    /// Number of frequency categories
    pub num_freq_classes: usize,
    /// Maximum number of patch positions to precompute embeddings for
    pub max_positions: usize,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            patch_len: 32,
            horizon_len: 128,
            d_model: 256,
            hidden_dim: 512,
            num_heads: 4,
            num_layers: 4,
            quantiles: default_quantiles(),
            use_freq: true,
            num_freq_classes: 3,
            max_positions: 512,
        }
    }
}

/// Nine deciles, 0.1 through 0.9
pub fn default_quantiles() -> Vec<f64> {
    (1..=9).map(|i| i as f64 / 10.0).collect()
}

impl DecoderConfig {
    /// Small model for fast tests and experimentation
    pub fn small() -> Self {
        Self {
            patch_len: 16,
            horizon_len: 16,
            d_model: 32,
            hidden_dim: 64,
            num_heads: 2,
            num_layers: 1,
            max_positions: 64,
            ..Default::default()
        }
    }

    /// Sets the patch and horizon lengths
    pub fn with_lengths(mut self, patch_len: usize, horizon_len: usize) -> Self {
        self.patch_len = patch_len;
        self.horizon_len = horizon_len;
        self
    }

    /// Sets the quantile grid
    pub fn with_quantiles(mut self, quantiles: Vec<f64>) -> Self {
        self.quantiles = quantiles;
        self
    }

    /// Disables frequency conditioning
    pub fn without_freq(mut self) -> Self {
        self.use_freq = false;
        self
    }

    /// Number of output channels per horizon step (mean + quantiles)
    pub fn num_outputs(&self) -> usize {
        self.quantiles.len() + 1
    }

    /// Checks configuration validity
    pub fn validate(&self) -> Result<()> {
        if self.patch_len == 0 {
            return Err(Error::InvalidConfiguration(
                "patch_len must be > 0".to_string(),
            ));
        }
        if self.horizon_len == 0 {
            return Err(Error::InvalidConfiguration(
                "horizon_len must be > 0".to_string(),
            ));
        }
        if self.d_model == 0 || self.hidden_dim == 0 {
            return Err(Error::InvalidConfiguration(
                "d_model and hidden_dim must be > 0".to_string(),
            ));
        }
        if self.num_heads == 0 || self.d_model % self.num_heads != 0 {
            return Err(Error::InvalidConfiguration(
                "d_model must be divisible by num_heads".to_string(),
            ));
        }
        if self.num_layers == 0 {
            return Err(Error::InvalidConfiguration(
                "num_layers must be > 0".to_string(),
            ));
        }
        if self.quantiles.is_empty() {
            return Err(Error::InvalidConfiguration(
                "quantiles must not be empty".to_string(),
            ));
        }
        for &q in &self.quantiles {
            if q <= 0.0 || q >= 1.0 {
                return Err(Error::InvalidConfiguration(format!(
                    "quantile {} must be in (0, 1)",
                    q
                )));
            }
        }
        if self.use_freq && self.num_freq_classes == 0 {
            return Err(Error::InvalidConfiguration(
                "num_freq_classes must be > 0 when use_freq is enabled".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DecoderConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.quantiles.len(), 9);
        assert_eq!(config.num_outputs(), 10);
    }

    #[test]
    fn test_small_preset() {
        let config = DecoderConfig::small();
        assert!(config.validate().is_ok());
        assert_eq!(config.patch_len, 16);
        assert_eq!(config.horizon_len, 16);
    }

    #[test]
    fn test_invalid_config() {
        let mut config = DecoderConfig::default();
        config.patch_len = 0;
        assert!(config.validate().is_err());

        let mut config = DecoderConfig::default();
        config.quantiles = vec![];
        assert!(config.validate().is_err());

        let mut config = DecoderConfig::default();
        config.quantiles = vec![1.5];
        assert!(config.validate().is_err());

        let mut config = DecoderConfig::default();
        config.num_heads = 3;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_serde_roundtrip() {
        let config = DecoderConfig::small().with_quantiles(vec![0.1, 0.5, 0.9]);
        let json = serde_json::to_string(&config).unwrap();
        let deserialized: DecoderConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized.patch_len, config.patch_len);
        assert_eq!(deserialized.quantiles, config.quantiles);
    }
}
