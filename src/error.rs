//! Error types for the patch forecaster library

use thiserror::Error;

/// Result type alias for this crate
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the library
#[derive(Error, Debug)]
pub enum Error {
    /// Tensor shapes disagree with the call contract
    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    /// Invalid model configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
