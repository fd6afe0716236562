//! GBDT Model Inference Module
//!
//! Loads and runs the ONNX-exported LightGBM reranker using tract-onnx.
//! Supports both real ONNX models and fallback heuristic scoring.

use super::{RankingError, Result, FEATURE_COUNT};
use crate::models::ABSENT_RANK;
use ndarray::{Array1, Array2};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tract_onnx::prelude::{
    tvec, Framework, Graph, InferenceModelExt, SimplePlan, Tensor, TypedFact, TypedOp,
};
use tracing::{debug, info, warn};

/// Type alias for the optimized tract model
type TractModel = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Smoothing constant for reciprocal-rank fusion in the heuristic scorer.
const RRF_K: f32 = 60.0;

/// Weight of the embedding similarity feature in the heuristic scorer.
const SIMILARITY_WEIGHT: f32 = 0.01;

/// Scores a feature matrix, one relevance value per row.
#[cfg_attr(test, mockall::automock)]
pub trait Scorer: Send + Sync {
    fn predict(&self, features: Array2<f32>) -> Result<Array1<f32>>;
    fn kind(&self) -> ScorerKind;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScorerKind {
    Onnx,
    Heuristic,
}

/// GBDT Ranking Model
///
/// Wraps tract-onnx model with fallback to heuristic scoring if ONNX model unavailable.
pub struct RankingModel {
    /// ONNX model (None = use heuristic fallback)
    model: Option<Arc<TractModel>>,
    kind: ScorerKind,
}

impl RankingModel {
    /// Load ONNX model from file path
    ///
    /// Falls back to heuristic scoring if model file not found or loading fails.
    pub fn load<P: AsRef<Path>>(model_path: P) -> Self {
        let path = model_path.as_ref();

        match Self::try_load_onnx(path) {
            Ok(model) => {
                info!("Loaded ONNX reranker model from: {}", path.display());
                Self {
                    model: Some(Arc::new(model)),
                    kind: ScorerKind::Onnx,
                }
            }
            Err(e) => {
                warn!(
                    error = %e,
                    "Failed to load ONNX model from {}, falling back to heuristic scoring",
                    path.display()
                );
                Self::heuristic()
            }
        }
    }

    /// Create model with heuristic fallback (for testing/development)
    pub fn heuristic() -> Self {
        debug!("Using heuristic ranking model");
        Self {
            model: None,
            kind: ScorerKind::Heuristic,
        }
    }

    /// ONNX model inference
    fn predict_onnx(&self, features: &Array2<f32>) -> Result<Array1<f32>> {
        let model = self
            .model
            .as_ref()
            .ok_or_else(|| RankingError::InferenceError("ONNX model not loaded".to_string()))?;

        let batch_size = features.nrows();

        // Convert ndarray to tract tensor
        let input_array = tract_onnx::prelude::tract_ndarray::Array2::from_shape_fn(
            (batch_size, FEATURE_COUNT),
            |(i, j)| features[[i, j]],
        );
        let input = tvec!(Tensor::from(input_array).into());

        let outputs = model
            .run(input)
            .map_err(|e| RankingError::InferenceError(format!("ONNX inference failed: {}", e)))?;

        select_scores(
            outputs.iter().filter_map(|output| output.as_slice::<f32>().ok()),
            batch_size,
        )
    }

    /// Heuristic scoring (fallback when no ONNX model)
    ///
    /// Formula: `score = Σ 1 / (RRF_K + rank_a) + 1 / (RRF_K + global_rank) + 0.01 * cosine`
    ///
    /// Features layout:
    /// - [0..4]: per-algorithm ranks (CF, ALS, Popularity, Two-Tower); absent ranks add nothing
    /// - [4]: global pool rank
    /// - [5]: user-item cosine similarity
    fn predict_heuristic(&self, features: &Array2<f32>) -> Array1<f32> {
        let absent = ABSENT_RANK as f32;

        features
            .outer_iter()
            .map(|row| {
                let fused: f32 = row
                    .iter()
                    .take(4)
                    .filter(|&&rank| rank < absent)
                    .map(|&rank| 1.0 / (RRF_K + rank))
                    .sum();
                let pool_position = 1.0 / (RRF_K + row[4]);

                fused + pool_position + SIMILARITY_WEIGHT * row[5]
            })
            .collect()
    }

    /// Try to load ONNX model (private helper)
    fn try_load_onnx(path: &Path) -> std::result::Result<TractModel, Box<dyn std::error::Error>> {
        if !path.exists() {
            return Err(format!("Model file not found: {}", path.display()).into());
        }

        let model = tract_onnx::onnx()
            .model_for_path(path)?
            .into_optimized()?
            .into_runnable()?;

        Ok(model)
    }
}

/// Picks the relevance scores out of the model outputs.
///
/// Regressor exports emit one f32 per row; classifier exports emit an i64
/// label tensor followed by row-major [batch, 2] probabilities, of which the
/// positive-class column is the score. Non-f32 outputs are filtered out by
/// the caller.
fn select_scores<'a, I>(outputs: I, batch_size: usize) -> Result<Array1<f32>>
where
    I: IntoIterator<Item = &'a [f32]>,
{
    for values in outputs {
        if values.len() == batch_size {
            return Ok(Array1::from_iter(values.iter().copied()));
        }
        if values.len() == batch_size * 2 {
            return Ok(Array1::from_iter(values.iter().skip(1).step_by(2).copied()));
        }
    }

    Err(RankingError::InferenceError(
        "Model produced no score tensor matching the batch".to_string(),
    ))
}

impl Scorer for RankingModel {
    /// Predict relevance scores for batch of feature vectors
    ///
    /// # Arguments
    /// * `features` - 2D array (batch_size × FEATURE_COUNT)
    ///
    /// # Returns
    /// * Array of relevance scores (batch_size)
    fn predict(&self, features: Array2<f32>) -> Result<Array1<f32>> {
        if features.ncols() != FEATURE_COUNT {
            return Err(RankingError::InvalidInput(format!(
                "Expected {} features, got {}",
                FEATURE_COUNT,
                features.ncols()
            )));
        }

        let scores = match self.kind {
            ScorerKind::Onnx => self.predict_onnx(&features)?,
            ScorerKind::Heuristic => self.predict_heuristic(&features),
        };

        if scores.len() != features.nrows() {
            return Err(RankingError::InferenceError(format!(
                "Expected {} scores, got {}",
                features.nrows(),
                scores.len()
            )));
        }

        Ok(scores)
    }

    fn kind(&self) -> ScorerKind {
        self.kind
    }
}
