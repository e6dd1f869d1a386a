//! Masked per-example normalization statistics
//!
//! Statistics are taken from a single reference patch per series: the first
//! patch containing at least three observed values, falling back to the last
//! patch when no patch qualifies.

use ndarray::{Array1, Array3};

/// Minimum number of observed values for a patch to anchor the statistics
const MIN_OBSERVED: f64 = 3.0;

/// Per-example normalization statistics
#[derive(Debug, Clone)]
pub struct NormStats {
    /// Per-example mean, shape (batch,)
    pub mean: Array1<f64>,
    /// Per-example standard deviation, shape (batch,)
    pub std: Array1<f64>,
}

/// Computes masked mean and standard deviation per batch row.
///
/// `inputs` and `padding` are patched arrays of shape (batch, num_patches,
/// patch_len); padding value 1 marks a missing position. For each row the
/// statistics come from the selected reference patch, computed over its
/// non-padded positions only. A patch with zero observed values yields
/// mean 0 and std 0 (the divisor is floored at 1).
pub fn masked_mean_std(inputs: &Array3<f64>, padding: &Array3<f64>) -> NormStats {
    let (batch, num_patches, patch_len) = inputs.dim();
    let mut mean = Array1::zeros(batch);
    let mut std = Array1::zeros(batch);

    for b in 0..batch {
        // Observed-value count per patch
        let mut observed = vec![0.0; num_patches];
        for n in 0..num_patches {
            for p in 0..patch_len {
                observed[n] += 1.0 - padding[[b, n, p]];
            }
        }

        let patch_idx = select_stats_patch(&observed);

        let mut num_valid = 0.0;
        let mut sum = 0.0;
        let mut sq_sum = 0.0;
        for p in 0..patch_len {
            let mask = 1.0 - padding[[b, patch_idx, p]];
            let v = inputs[[b, patch_idx, p]] * mask;
            num_valid += mask;
            sum += v;
            sq_sum += v * v;
        }
        if num_valid == 0.0 {
            num_valid = 1.0;
        }

        let mu = sum / num_valid;
        // Clamp variance at zero to guard against floating-point artifacts
        let var = (sq_sum / num_valid - mu * mu).max(0.0);

        mean[b] = mu;
        std[b] = var.sqrt();
    }

    NormStats { mean, std }
}

/// First patch index with enough observed values, else the last patch
fn select_stats_patch(observed: &[f64]) -> usize {
    observed
        .iter()
        .position(|&c| c >= MIN_OBSERVED)
        .unwrap_or(observed.len() - 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::Array3;

    #[test]
    fn test_unpadded_statistics() {
        // Single patch [1, 2, 3, 4]: mean 2.5, var 1.25
        let inputs = Array3::from_shape_vec((1, 1, 4), vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let padding = Array3::zeros((1, 1, 4));

        let stats = masked_mean_std(&inputs, &padding);
        assert_abs_diff_eq!(stats.mean[0], 2.5, epsilon = 1e-10);
        assert_abs_diff_eq!(stats.std[0], 1.25f64.sqrt(), epsilon = 1e-10);
    }

    #[test]
    fn test_skips_underpopulated_patch() {
        // First patch has only 2 observed values, second has 4
        let inputs = Array3::from_shape_vec(
            (1, 2, 4),
            vec![100.0, 100.0, 0.0, 0.0, 1.0, 2.0, 3.0, 4.0],
        )
        .unwrap();
        let mut padding = Array3::zeros((1, 2, 4));
        padding[[0, 0, 2]] = 1.0;
        padding[[0, 0, 3]] = 1.0;

        let stats = masked_mean_std(&inputs, &padding);
        assert_abs_diff_eq!(stats.mean[0], 2.5, epsilon = 1e-10);
    }

    #[test]
    fn test_falls_back_to_last_patch() {
        // No patch has 3 observed values; the last patch is used
        let inputs =
            Array3::from_shape_vec((1, 2, 2), vec![5.0, 5.0, 7.0, 9.0]).unwrap();
        let padding = Array3::zeros((1, 2, 2));

        let stats = masked_mean_std(&inputs, &padding);
        assert_abs_diff_eq!(stats.mean[0], 8.0, epsilon = 1e-10);
        assert_abs_diff_eq!(stats.std[0], 1.0, epsilon = 1e-10);
    }

    #[test]
    fn test_all_padded_yields_zero_std() {
        let inputs = Array3::from_elem((1, 1, 4), 42.0);
        let padding = Array3::ones((1, 1, 4));

        let stats = masked_mean_std(&inputs, &padding);
        assert_abs_diff_eq!(stats.mean[0], 0.0, epsilon = 1e-10);
        assert_abs_diff_eq!(stats.std[0], 0.0, epsilon = 1e-10);
        assert!(stats.std[0].is_finite());
    }

    #[test]
    fn test_per_row_selection() {
        // Row 0 anchors on patch 0, row 1 on patch 1
        let mut inputs = Array3::zeros((2, 2, 4));
        let mut padding = Array3::zeros((2, 2, 4));
        for p in 0..4 {
            inputs[[0, 0, p]] = 10.0;
            inputs[[1, 1, p]] = 20.0;
            padding[[1, 0, p]] = 1.0;
        }

        let stats = masked_mean_std(&inputs, &padding);
        assert_abs_diff_eq!(stats.mean[0], 10.0, epsilon = 1e-10);
        assert_abs_diff_eq!(stats.mean[1], 20.0, epsilon = 1e-10);
    }
}
