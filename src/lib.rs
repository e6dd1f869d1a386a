//! # Patch Forecaster
//!
//! Forward-pass and decoding core of a patch-based time-series forecasting
//! transformer. A raw scalar series is sliced into fixed-length patches,
//! each patch is normalized with masked per-example statistics, the patches
//! run through a causal transformer stack, and every output token is
//! projected into point and quantile forecasts for a future horizon.
//! Horizons longer than one forward call are produced autoregressively by
//! feeding the predicted mean back into the context.
//!
//! ## Example
//!
//! ```rust
//! use ndarray::Array2;
//! use patch_forecaster::{DecoderConfig, ForecastInputs, PatchedDecoder};
//!
//! let config = DecoderConfig::small().without_freq();
//! let decoder = PatchedDecoder::new(config).unwrap();
//!
//! let series = Array2::from_shape_fn((1, 32), |(_, t)| (t as f64 * 0.3).sin());
//! let padding = Array2::zeros((1, 32 + 16));
//!
//! let forecast = decoder
//!     .decode(&ForecastInputs::new(series, padding), 16, None, 64)
//!     .unwrap();
//! assert_eq!(forecast.point_forecast.dim(), (1, 16));
//! ```

pub mod data;
pub mod error;
pub mod model;

pub use data::{align_context, decode_padding};
pub use error::{Error, Result};
pub use model::{
    default_quantiles, DecodeOutput, DecoderConfig, ForecastInputs, ForwardOutput, PatchedDecoder,
    QuantileLoss, SequenceModel, StackedTransformer, PAD_VAL,
};
