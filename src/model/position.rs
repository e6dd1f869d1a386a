//! Positional embeddings and alignment for right-padded contexts
//!
//! Training batches carry no leading padding, so positional embeddings are
//! added in natural order. At inference a context shorter than the window
//! arrives right-aligned; each row's embedding sequence is circularly
//! rotated so position 0 lands on the row's first valid patch.

use ndarray::{Array2, Array3};

/// Precomputed sinusoidal position embedding table
///
/// Positions beyond the precomputed range are computed on the fly.
#[derive(Debug, Clone)]
pub struct PositionEmbedding {
    d_model: usize,
    max_len: usize,
    cache: Array2<f64>,
}

impl PositionEmbedding {
    /// Creates a table of `max_len` precomputed positions
    pub fn new(d_model: usize, max_len: usize) -> Self {
        let mut cache = Array2::zeros((max_len, d_model));
        for pos in 0..max_len {
            fill_position(cache.row_mut(pos), pos, d_model);
        }
        Self {
            d_model,
            max_len,
            cache,
        }
    }

    /// Embedding dimension
    pub fn dim(&self) -> usize {
        self.d_model
    }

    /// Returns embeddings for positions 0..seq_len, shape (seq_len, d_model)
    pub fn forward(&self, seq_len: usize) -> Array2<f64> {
        let mut out = Array2::zeros((seq_len, self.d_model));
        for pos in 0..seq_len {
            if pos < self.max_len {
                out.row_mut(pos).assign(&self.cache.row(pos));
            } else {
                fill_position(out.row_mut(pos), pos, self.d_model);
            }
        }
        out
    }
}

fn fill_position(mut row: ndarray::ArrayViewMut1<f64>, pos: usize, d_model: usize) {
    for i in 0..(d_model / 2) {
        let angle = (pos as f64) / 10000_f64.powf((2.0 * i as f64) / d_model as f64);
        row[2 * i] = angle.sin();
        row[2 * i + 1] = angle.cos();
    }
}

/// Rotates each row's embedding sequence so that the embedding for position 0
/// aligns with the row's first valid patch.
///
/// `patch_padding` has shape (batch, num_patches) with 1 marking a fully
/// padded patch; `pos_emb` has shape (batch, num_patches, d_model). The shift
/// is a modular-index gather per row; an all-padded row is left unshifted.
pub fn align_to_first_valid(
    patch_padding: &Array2<f64>,
    pos_emb: &Array3<f64>,
) -> Array3<f64> {
    let (batch, num_patches, d_model) = pos_emb.dim();
    let mut shifted = Array3::zeros((batch, num_patches, d_model));

    for b in 0..batch {
        let first_valid = (0..num_patches)
            .find(|&n| patch_padding[[b, n]] < 0.5)
            .unwrap_or(0);
        for j in 0..num_patches {
            let src = (j + num_patches - first_valid) % num_patches;
            for d in 0..d_model {
                shifted[[b, j, d]] = pos_emb[[b, src, d]];
            }
        }
    }
    shifted
}

/// Repeats a (num_patches, d_model) table across the batch axis
pub fn broadcast_positions(pos_emb: &Array2<f64>, batch: usize) -> Array3<f64> {
    let (num_patches, d_model) = pos_emb.dim();
    let mut out = Array3::zeros((batch, num_patches, d_model));
    for b in 0..batch {
        for n in 0..num_patches {
            for d in 0..d_model {
                out[[b, n, d]] = pos_emb[[n, d]];
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::Array2;

    #[test]
    fn test_embedding_shapes() {
        let emb = PositionEmbedding::new(16, 8);
        let table = emb.forward(5);
        assert_eq!(table.dim(), (5, 16));
        // Position 0: sin(0) = 0, cos(0) = 1
        assert_abs_diff_eq!(table[[0, 0]], 0.0, epsilon = 1e-10);
        assert_abs_diff_eq!(table[[0, 1]], 1.0, epsilon = 1e-10);
    }

    #[test]
    fn test_positions_beyond_cache() {
        let emb = PositionEmbedding::new(16, 4);
        let table = emb.forward(10);
        let reference = PositionEmbedding::new(16, 16).forward(10);
        for pos in 0..10 {
            for d in 0..16 {
                assert_abs_diff_eq!(table[[pos, d]], reference[[pos, d]], epsilon = 1e-10);
            }
        }
    }

    #[test]
    fn test_shift_aligns_first_valid_patch() {
        let emb = PositionEmbedding::new(8, 16);
        let table = emb.forward(5);
        let batched = broadcast_positions(&table, 1);

        // Two leading padded patches
        let padding =
            Array2::from_shape_vec((1, 5), vec![1.0, 1.0, 0.0, 0.0, 0.0]).unwrap();
        let shifted = align_to_first_valid(&padding, &batched);

        // The first valid patch carries the position-0 embedding
        for d in 0..8 {
            assert_abs_diff_eq!(shifted[[0, 2, d]], table[[0, d]], epsilon = 1e-10);
            assert_abs_diff_eq!(shifted[[0, 3, d]], table[[1, d]], epsilon = 1e-10);
        }
    }

    #[test]
    fn test_no_leading_padding_is_identity() {
        let emb = PositionEmbedding::new(8, 16);
        let batched = broadcast_positions(&emb.forward(4), 2);

        let padding = Array2::zeros((2, 4));
        let shifted = align_to_first_valid(&padding, &batched);

        for b in 0..2 {
            for n in 0..4 {
                for d in 0..8 {
                    assert_abs_diff_eq!(
                        shifted[[b, n, d]],
                        batched[[b, n, d]],
                        epsilon = 1e-10
                    );
                }
            }
        }
    }

    #[test]
    fn test_all_padded_row_is_unshifted() {
        let emb = PositionEmbedding::new(8, 16);
        let batched = broadcast_positions(&emb.forward(3), 1);

        let padding = Array2::ones((1, 3));
        let shifted = align_to_first_valid(&padding, &batched);

        for n in 0..3 {
            for d in 0..8 {
                assert_abs_diff_eq!(shifted[[0, n, d]], batched[[0, n, d]], epsilon = 1e-10);
            }
        }
    }
}
