//! Patch extraction and forward/reverse patch normalization
//!
//! A patch is a contiguous, non-overlapping slice of `patch_len` positions.
//! Positions holding the pad sentinel are treated as missing regardless of
//! the caller-supplied padding mask.

use ndarray::{Array2, Array3, Array4};

use crate::error::{Error, Result};
use crate::model::stats::{masked_mean_std, NormStats};

/// Sentinel value marking a missing input position independent of the mask
pub const PAD_VAL: f64 = 1_123_581_321.0;

/// Small numerical tolerance
pub const TOLERANCE: f64 = 1e-7;

/// Whether a value carries the pad sentinel
pub fn is_pad_sentinel(v: f64) -> bool {
    (v - PAD_VAL).abs() < TOLERANCE
}

/// Reshapes a (batch, time) series into (batch, num_patches, patch_len).
///
/// Fails when the series length is zero or not a multiple of `patch_len`;
/// callers must pre-pad the context to a patch boundary.
pub fn patchify(series: &Array2<f64>, patch_len: usize) -> Result<Array3<f64>> {
    let (batch, time_len) = series.dim();
    if patch_len == 0 || time_len == 0 || time_len % patch_len != 0 {
        return Err(Error::InvalidConfiguration(format!(
            "series length {} is not a non-zero multiple of patch length {}",
            time_len, patch_len
        )));
    }
    let num_patches = time_len / patch_len;

    let mut patched = Array3::zeros((batch, num_patches, patch_len));
    for b in 0..batch {
        for n in 0..num_patches {
            for p in 0..patch_len {
                patched[[b, n, p]] = series[[b, n * patch_len + p]];
            }
        }
    }
    Ok(patched)
}

/// Forces padding to 1 wherever the series holds the pad sentinel
pub fn mask_sentinel_padding(series: &Array2<f64>, padding: &Array2<f64>) -> Array2<f64> {
    let mut masked = padding.clone();
    for ((b, t), &v) in series.indexed_iter() {
        if is_pad_sentinel(v) {
            masked[[b, t]] = 1.0;
        }
    }
    masked
}

/// Collapses per-position padding into one validity bit per patch.
///
/// Uses the minimum over the patch, so a patch counts as valid as long as a
/// single position in it is observed.
pub fn patch_level_padding(patched_pads: &Array3<f64>) -> Array2<f64> {
    let (batch, num_patches, patch_len) = patched_pads.dim();
    let mut out = Array2::zeros((batch, num_patches));
    for b in 0..batch {
        for n in 0..num_patches {
            let mut min_pad = f64::INFINITY;
            for p in 0..patch_len {
                min_pad = min_pad.min(patched_pads[[b, n, p]]);
            }
            out[[b, n]] = min_pad;
        }
    }
    out
}

/// Normalizes patches with per-example masked statistics.
///
/// The standard deviation is floored at 1 when it falls below tolerance, and
/// the floored value is what the returned stats carry. Sentinel positions
/// pass through unchanged.
pub fn forward_transform(
    patched: &Array3<f64>,
    patched_pads: &Array3<f64>,
) -> (Array3<f64>, NormStats) {
    let mut stats = masked_mean_std(patched, patched_pads);
    for s in stats.std.iter_mut() {
        if *s < TOLERANCE {
            *s = 1.0;
        }
    }

    let (batch, num_patches, patch_len) = patched.dim();
    let mut normalized = Array3::zeros((batch, num_patches, patch_len));
    for b in 0..batch {
        let mu = stats.mean[b];
        let sigma = stats.std[b];
        for n in 0..num_patches {
            for p in 0..patch_len {
                let v = patched[[b, n, p]];
                normalized[[b, n, p]] = if is_pad_sentinel(v) {
                    PAD_VAL
                } else {
                    (v - mu) / sigma
                };
            }
        }
    }
    (normalized, stats)
}

/// Maps a normalized forecast grid back to the original scale.
///
/// `outputs` has shape (batch, num_patches, horizon, channels); mean and std
/// broadcast over the trailing three axes. Model outputs never carry the pad
/// sentinel, so no sentinel restoration happens here.
pub fn reverse_transform(outputs: &Array4<f64>, stats: &NormStats) -> Array4<f64> {
    let (batch, num_patches, horizon, channels) = outputs.dim();
    let mut rescaled = Array4::zeros((batch, num_patches, horizon, channels));
    for b in 0..batch {
        let mu = stats.mean[b];
        let sigma = stats.std[b];
        for n in 0..num_patches {
            for h in 0..horizon {
                for q in 0..channels {
                    rescaled[[b, n, h, q]] = outputs[[b, n, h, q]] * sigma + mu;
                }
            }
        }
    }
    rescaled
}
