//! Patched time-series decoder: forward pass and autoregressive decoding
//!
//! The forward pass slices a raw series into patches, normalizes each patch
//! with masked statistics, projects patches into the model dimension, runs
//! the causal transformer stack and projects every output token into a
//! (horizon, mean + quantiles) forecast grid at the original scale.
//!
//! `decode` produces horizons longer than one forward call by feeding the
//! predicted mean back into the context and re-running the full pipeline.

use ndarray::{s, Array1, Array2, Array3, Array4};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::model::config::DecoderConfig;
use crate::model::embedding::CategoryEmbedding;
use crate::model::patching::{
    forward_transform, mask_sentinel_padding, patch_level_padding, patchify, reverse_transform,
};
use crate::model::position::{align_to_first_valid, broadcast_positions, PositionEmbedding};
use crate::model::residual::ResidualBlock;
use crate::model::stats::NormStats;
use crate::model::transformer::{SequenceModel, StackedTransformer};

/// Input bundle for one forward or decode call
#[derive(Debug, Clone)]
pub struct ForecastInputs {
    /// Raw series, shape (batch, time)
    pub series: Array2<f64>,
    /// Binary padding mask; for decode calls it covers context + horizon
    pub padding: Array2<f64>,
    /// Optional per-series frequency category
    pub freq: Option<Array1<usize>>,
}

impl ForecastInputs {
    pub fn new(series: Array2<f64>, padding: Array2<f64>) -> Self {
        Self {
            series,
            padding,
            freq: None,
        }
    }

    pub fn with_freq(mut self, freq: Array1<usize>) -> Self {
        self.freq = Some(freq);
        self
    }
}

/// Result of one forward pass
#[derive(Debug, Clone)]
pub struct ForwardOutput {
    /// Forecast grid, shape (batch, num_patches, horizon_len, 1 + num_quantiles);
    /// channel 0 is the mean
    pub forecast: Array4<f64>,
    /// Raw transformer output tokens, shape (batch, num_patches, d_model)
    pub tokens: Array3<f64>,
    /// Normalization statistics used by this call
    pub stats: NormStats,
}

/// Result of an autoregressive decode call
#[derive(Debug, Clone)]
pub struct DecodeOutput {
    /// Mean forecast, shape (batch, horizon_len)
    pub point_forecast: Array2<f64>,
    /// Mean and quantile forecast, shape (batch, horizon_len, 1 + num_quantiles)
    pub full_forecast: Array3<f64>,
}

impl DecodeOutput {
    /// Number of output channels (mean + quantiles)
    pub fn num_channels(&self) -> usize {
        self.full_forecast.dim().2
    }

    /// Forecast for quantile channel `idx` (0-based among the quantiles),
    /// shape (batch, horizon_len)
    pub fn quantile(&self, idx: usize) -> Array2<f64> {
        self.full_forecast.slice(s![.., .., idx + 1]).to_owned()
    }
}

struct Preprocessed {
    model_input: Array3<f64>,
    patch_padding: Array2<f64>,
    stats: NormStats,
}

/// Patch decoder for a time-series foundation model
#[derive(Debug, Clone)]
pub struct PatchedDecoder<M: SequenceModel = StackedTransformer> {
    config: DecoderConfig,
    input_proj: ResidualBlock,
    horizon_proj: ResidualBlock,
    position_emb: PositionEmbedding,
    freq_emb: Option<CategoryEmbedding>,
    transformer: M,
    training: bool,
}

impl PatchedDecoder<StackedTransformer> {
    /// Creates a decoder with the bundled transformer stack
    pub fn new(config: DecoderConfig) -> Result<Self> {
        let transformer = StackedTransformer::new(
            config.d_model,
            config.num_heads,
            config.hidden_dim,
            config.num_layers,
        );
        Self::with_transformer(config, transformer)
    }
}

impl<M: SequenceModel> PatchedDecoder<M> {
    /// Creates a decoder around a caller-supplied sequence model
    pub fn with_transformer(config: DecoderConfig, transformer: M) -> Result<Self> {
        config.validate()?;

        let input_proj = ResidualBlock::new(
            2 * config.patch_len,
            config.hidden_dim,
            config.d_model,
            false,
        );
        let horizon_proj = ResidualBlock::new(
            config.d_model,
            config.hidden_dim,
            config.horizon_len * config.num_outputs(),
            false,
        );
        let position_emb = PositionEmbedding::new(config.d_model, config.max_positions);
        let freq_emb = config
            .use_freq
            .then(|| CategoryEmbedding::new(config.num_freq_classes, config.d_model));

        info!(
            patch_len = config.patch_len,
            horizon_len = config.horizon_len,
            d_model = config.d_model,
            num_quantiles = config.quantiles.len(),
            "building patched decoder"
        );

        Ok(Self {
            config,
            input_proj,
            horizon_proj,
            position_emb,
            freq_emb,
            transformer,
            training: false,
        })
    }

    /// Model configuration
    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    /// Switches between training and inference behavior.
    ///
    /// Positional embeddings are aligned to each row's first valid patch in
    /// inference mode only; training batches carry no leading padding.
    pub fn set_training(&mut self, training: bool) {
        self.training = training;
    }

    /// Runs the full forward pass on a (batch, time) series.
    ///
    /// The series length must be a multiple of the patch length; the padding
    /// mask must match the series shape. When frequency conditioning is
    /// enabled, `inputs.freq` must be present.
    pub fn forward(&self, inputs: &ForecastInputs) -> Result<ForwardOutput> {
        let pre = self.preprocess(&inputs.series, &inputs.padding, None)?;
        let mut model_input = pre.model_input;

        if let Some(freq_emb) = &self.freq_emb {
            let freq = inputs.freq.as_ref().ok_or_else(|| {
                Error::InvalidInput(
                    "frequency category is required when use_freq is enabled".to_string(),
                )
            })?;
            if freq.len() != inputs.series.nrows() {
                return Err(Error::ShapeMismatch(format!(
                    "freq has {} entries for a batch of {}",
                    freq.len(),
                    inputs.series.nrows()
                )));
            }
            let f_emb = freq_emb.forward(freq)?;
            let (batch, num_patches, d_model) = model_input.dim();
            for b in 0..batch {
                for n in 0..num_patches {
                    for d in 0..d_model {
                        model_input[[b, n, d]] += f_emb[[b, d]];
                    }
                }
            }
        }

        let tokens = self.transformer.forward(&model_input, &pre.patch_padding);
        let forecast = self.postprocess(&tokens, &pre.stats);

        Ok(ForwardOutput {
            forecast,
            tokens,
            stats: pre.stats,
        })
    }

    /// Autoregressive decoding without attention caching.
    ///
    /// `inputs.series` is the (batch, context) history; `inputs.padding`
    /// must cover context + `horizon_len`. Each step feeds the trailing
    /// `max_len` positions of the growing series through a full forward
    /// pass, appends the last patch's first `output_patch_len` mean values,
    /// and retains the matching mean + quantile slice. Normalization
    /// statistics are recomputed from scratch every step.
    pub fn decode(
        &self,
        inputs: &ForecastInputs,
        horizon_len: usize,
        output_patch_len: Option<usize>,
        max_len: usize,
    ) -> Result<DecodeOutput> {
        let (batch, context_len) = inputs.series.dim();
        if inputs.padding.dim() != (batch, context_len + horizon_len) {
            return Err(Error::ShapeMismatch(format!(
                "padding length must match input length + horizon_len: {} != {} + {}",
                inputs.padding.ncols(),
                context_len,
                horizon_len
            )));
        }
        if horizon_len == 0 {
            return Err(Error::InvalidInput("horizon_len must be > 0".to_string()));
        }
        let output_patch_len = output_patch_len.unwrap_or(self.config.horizon_len);
        if output_patch_len == 0 || output_patch_len > self.config.horizon_len {
            return Err(Error::InvalidInput(format!(
                "output_patch_len {} must be in 1..={}",
                output_patch_len, self.config.horizon_len
            )));
        }
        if max_len == 0 {
            return Err(Error::InvalidInput("max_len must be > 0".to_string()));
        }

        let num_channels = self.config.num_outputs();
        let num_steps = (horizon_len + output_patch_len - 1) / output_patch_len;

        let mut final_out = inputs.series.clone();
        let mut full_outputs: Vec<Array3<f64>> = Vec::with_capacity(num_steps);

        for step in 0..num_steps {
            let cur_len = final_out.ncols();
            let window = max_len.min(cur_len);
            let start = cur_len - window;

            debug!(step, context_len = cur_len, window, "autoregressive decode step");

            let step_inputs = ForecastInputs {
                series: final_out.slice(s![.., start..cur_len]).to_owned(),
                padding: inputs.padding.slice(s![.., start..cur_len]).to_owned(),
                freq: inputs.freq.clone(),
            };
            let output = self.forward(&step_inputs)?;

            let last_patch = output.forecast.dim().1 - 1;

            // Mean channel extends the context; the full slice is retained
            let mut extended = Array2::zeros((batch, cur_len + output_patch_len));
            let mut chunk = Array3::zeros((batch, output_patch_len, num_channels));
            for b in 0..batch {
                for t in 0..cur_len {
                    extended[[b, t]] = final_out[[b, t]];
                }
                for h in 0..output_patch_len {
                    extended[[b, cur_len + h]] = output.forecast[[b, last_patch, h, 0]];
                    for q in 0..num_channels {
                        chunk[[b, h, q]] = output.forecast[[b, last_patch, h, q]];
                    }
                }
            }
            final_out = extended;
            full_outputs.push(chunk);
        }

        let point_forecast = final_out
            .slice(s![.., context_len..context_len + horizon_len])
            .to_owned();

        let mut full_forecast = Array3::zeros((batch, horizon_len, num_channels));
        for b in 0..batch {
            for h in 0..horizon_len {
                let chunk = &full_outputs[h / output_patch_len];
                for q in 0..num_channels {
                    full_forecast[[b, h, q]] = chunk[[b, h % output_patch_len, q]];
                }
            }
        }

        Ok(DecodeOutput {
            point_forecast,
            full_forecast,
        })
    }

    /// Builds the transformer input from a raw series.
    ///
    /// Returns model-dimension embeddings, patch-level padding and the
    /// normalization statistics. A caller-supplied position table is reused
    /// when given.
    fn preprocess(
        &self,
        series: &Array2<f64>,
        padding: &Array2<f64>,
        pos_emb: Option<&Array2<f64>>,
    ) -> Result<Preprocessed> {
        if series.dim() != padding.dim() {
            return Err(Error::ShapeMismatch(format!(
                "series shape {:?} does not match padding shape {:?}",
                series.dim(),
                padding.dim()
            )));
        }

        let patch_len = self.config.patch_len;
        let padding = mask_sentinel_padding(series, padding);
        let patched = patchify(series, patch_len)?;
        let patched_pads = patchify(&padding, patch_len)?;

        let (normalized, stats) = forward_transform(&patched, &patched_pads);

        // Padded positions must not leak signal into the projection
        let (batch, num_patches, _) = normalized.dim();
        let mut zeroed = normalized;
        for ((b, n, p), v) in zeroed.indexed_iter_mut() {
            *v *= 1.0 - patched_pads[[b, n, p]];
        }

        let mut concat = Array3::zeros((batch, num_patches, 2 * patch_len));
        for b in 0..batch {
            for n in 0..num_patches {
                for p in 0..patch_len {
                    concat[[b, n, p]] = zeroed[[b, n, p]];
                    concat[[b, n, patch_len + p]] = patched_pads[[b, n, p]];
                }
            }
        }
        let mut model_input = self.input_proj.forward(&concat);

        let patch_padding = patch_level_padding(&patched_pads);

        let table = match pos_emb {
            Some(table) => table.clone(),
            None => self.position_emb.forward(num_patches),
        };
        let mut positions = broadcast_positions(&table, batch);
        if !self.training {
            positions = align_to_first_valid(&patch_padding, &positions);
        }
        model_input = &model_input + &positions;

        Ok(Preprocessed {
            model_input,
            patch_padding,
            stats,
        })
    }

    /// Projects transformer tokens into the forecast grid at original scale
    fn postprocess(&self, tokens: &Array3<f64>, stats: &NormStats) -> Array4<f64> {
        let num_channels = self.config.num_outputs();
        let horizon = self.config.horizon_len;

        let flat = self.horizon_proj.forward(tokens);
        let (batch, num_patches, _) = flat.dim();

        let mut grid = Array4::zeros((batch, num_patches, horizon, num_channels));
        for b in 0..batch {
            for n in 0..num_patches {
                for h in 0..horizon {
                    for q in 0..num_channels {
                        grid[[b, n, h, q]] = flat[[b, n, h * num_channels + q]];
                    }
                }
            }
        }
        reverse_transform(&grid, stats)
    }
}
