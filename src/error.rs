//! Crate-level error type composing the per-module errors.

use thiserror::Error;

use crate::classifier::ClassifyError;
use crate::embedding::EmbeddingError;
use crate::features::FeatureError;
use crate::prototype::{PrototypeError, StoreError};

#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Prototype(#[from] PrototypeError),
    #[error(transparent)]
    Classify(#[from] ClassifyError),
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),
    #[error(transparent)]
    Feature(#[from] FeatureError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
