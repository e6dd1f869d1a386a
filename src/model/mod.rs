//! Patched decoder model
//!
//! Implements the patch-based forecasting architecture:
//! - Masked per-patch normalization statistics
//! - Patch extraction and forward/reverse normalization
//! - Positional alignment for right-padded contexts
//! - Causal transformer stack behind a replaceable interface
//! - Forecast head producing a mean + quantile grid
//! - Autoregressive long-horizon decoding

mod attention;
mod config;
mod decoder;
mod embedding;
mod losses;
mod patching;
mod position;
mod residual;
mod stats;
mod transformer;

pub use attention::MultiHeadAttention;
pub use config::{default_quantiles, DecoderConfig};
pub use decoder::{DecodeOutput, ForecastInputs, ForwardOutput, PatchedDecoder};
pub use embedding::CategoryEmbedding;
pub use losses::QuantileLoss;
pub use patching::{
    forward_transform, is_pad_sentinel, mask_sentinel_padding, patch_level_padding, patchify,
    reverse_transform, PAD_VAL, TOLERANCE,
};
pub use position::{align_to_first_valid, broadcast_positions, PositionEmbedding};
pub use residual::ResidualBlock;
pub use stats::{masked_mean_std, NormStats};
pub use transformer::{SequenceModel, StackedTransformer, TransformerBlock};
