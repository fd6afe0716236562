//! Ranking Module
//!
//! Reranks the candidate pool with a GBDT relevance model.
//!
//! # Architecture
//! - **Model Layer**: ONNX inference with tract-onnx, heuristic fallback
//! - **Feature Layer**: six engineered features per (user, candidate) pair
//! - **Reranker**: scores the pool and sorts by descending relevance
//!
//! # Workflow
//! 1. Build the feature matrix from pool provenance and embeddings
//! 2. Run model inference → relevance scores
//! 3. Stable sort by score; any failure returns pool order

pub mod features;
pub mod model;
pub mod reranker;

pub use features::{build_feature_matrix, FEATURE_COUNT};
pub use model::{RankingModel, Scorer, ScorerKind};
pub use reranker::{GbdtReranker, Reranker};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RankingError {
    #[error("Model loading failed: {0}")]
    ModelLoadError(String),

    #[error("Feature extraction failed: {0}")]
    FeatureExtractionError(String),

    #[error("Model inference failed: {0}")]
    InferenceError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

pub type Result<T> = std::result::Result<T, RankingError>;
