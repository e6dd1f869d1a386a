//! Context preparation helpers
//!
//! The decoder requires series lengths that are multiples of the patch
//! length. These helpers front-pad arbitrary contexts to the next patch
//! boundary, marking the filler as padded.

use ndarray::Array2;

use crate::error::{Error, Result};

/// Front-pads a context and its mask to the next multiple of `patch_len`.
///
/// Filler values are 0 with padding bit 1, prepended so the real
/// observations stay right-aligned. Returns the series and mask unchanged
/// when the length is already aligned.
pub fn align_context(
    series: &Array2<f64>,
    padding: &Array2<f64>,
    patch_len: usize,
) -> Result<(Array2<f64>, Array2<f64>)> {
    if patch_len == 0 {
        return Err(Error::InvalidConfiguration(
            "patch_len must be > 0".to_string(),
        ));
    }
    if series.dim() != padding.dim() {
        return Err(Error::ShapeMismatch(format!(
            "series shape {:?} does not match padding shape {:?}",
            series.dim(),
            padding.dim()
        )));
    }

    let (batch, context_len) = series.dim();
    let target_len = ((context_len + patch_len - 1) / patch_len) * patch_len;
    let front = target_len - context_len;
    if front == 0 {
        return Ok((series.clone(), padding.clone()));
    }

    let mut padded_series = Array2::zeros((batch, target_len));
    let mut padded_mask = Array2::ones((batch, target_len));
    for b in 0..batch {
        for t in 0..context_len {
            padded_series[[b, front + t]] = series[[b, t]];
            padded_mask[[b, front + t]] = padding[[b, t]];
        }
    }
    Ok((padded_series, padded_mask))
}

/// Builds an all-observed padding mask covering context plus horizon
pub fn decode_padding(batch: usize, context_len: usize, horizon_len: usize) -> Array2<f64> {
    Array2::zeros((batch, context_len + horizon_len))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_align_context_pads_front() {
        let series = Array2::from_shape_fn((1, 5), |(_, t)| t as f64 + 1.0);
        let padding = Array2::zeros((1, 5));

        let (s, p) = align_context(&series, &padding, 4).unwrap();
        assert_eq!(s.dim(), (1, 8));
        // Three filler positions, all marked padded
        for t in 0..3 {
            assert_abs_diff_eq!(s[[0, t]], 0.0, epsilon = 1e-10);
            assert_abs_diff_eq!(p[[0, t]], 1.0, epsilon = 1e-10);
        }
        assert_abs_diff_eq!(s[[0, 3]], 1.0, epsilon = 1e-10);
        assert_abs_diff_eq!(s[[0, 7]], 5.0, epsilon = 1e-10);
        assert_abs_diff_eq!(p[[0, 7]], 0.0, epsilon = 1e-10);
    }

    #[test]
    fn test_align_context_already_aligned() {
        let series = Array2::from_elem((2, 8), 1.0);
        let padding = Array2::zeros((2, 8));

        let (s, p) = align_context(&series, &padding, 4).unwrap();
        assert_eq!(s.dim(), (2, 8));
        assert_eq!(p.dim(), (2, 8));
    }

    #[test]
    fn test_align_context_shape_check() {
        let series = Array2::zeros((1, 5));
        let padding = Array2::zeros((1, 4));
        assert!(align_context(&series, &padding, 4).is_err());
    }

    #[test]
    fn test_decode_padding_shape() {
        let p = decode_padding(3, 10, 6);
        assert_eq!(p.dim(), (3, 16));
        assert!(p.iter().all(|&v| v == 0.0));
    }
}
