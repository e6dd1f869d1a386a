//! Categorical embedding table for per-series frequency conditioning

use ndarray::{Array1, Array2};
use ndarray_rand::rand_distr::Normal;
use ndarray_rand::RandomExt;

use crate::error::{Error, Result};

/// Lookup table mapping a small integer category to an embedding vector
#[derive(Debug, Clone)]
pub struct CategoryEmbedding {
    num_classes: usize,
    d_model: usize,
    table: Array2<f64>,
}

impl CategoryEmbedding {
    /// Creates a randomly initialized table of `num_classes` embeddings
    pub fn new(num_classes: usize, d_model: usize) -> Self {
        let scale = (1.0 / d_model as f64).sqrt();
        let table = Array2::random((num_classes, d_model), Normal::new(0.0, scale).unwrap());
        Self {
            num_classes,
            d_model,
            table,
        }
    }

    /// Number of categories in the table
    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    /// Looks up one embedding per batch row, shape (batch, d_model)
    pub fn forward(&self, categories: &Array1<usize>) -> Result<Array2<f64>> {
        let batch = categories.len();
        let mut out = Array2::zeros((batch, self.d_model));
        for b in 0..batch {
            let c = categories[b];
            if c >= self.num_classes {
                return Err(Error::InvalidInput(format!(
                    "category {} out of range (num_classes = {})",
                    c, self.num_classes
                )));
            }
            out.row_mut(b).assign(&self.table.row(c));
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array1;

    #[test]
    fn test_lookup_shapes() {
        let emb = CategoryEmbedding::new(3, 8);
        let categories = Array1::from_vec(vec![0, 2, 1]);
        let out = emb.forward(&categories).unwrap();
        assert_eq!(out.dim(), (3, 8));
    }

    #[test]
    fn test_same_category_same_vector() {
        let emb = CategoryEmbedding::new(3, 8);
        let out = emb.forward(&Array1::from_vec(vec![1, 1])).unwrap();
        for d in 0..8 {
            assert_eq!(out[[0, d]], out[[1, d]]);
        }
    }

    #[test]
    fn test_out_of_range_category() {
        let emb = CategoryEmbedding::new(3, 8);
        assert!(emb.forward(&Array1::from_vec(vec![3])).is_err());
    }
}
