use super::{build_feature_matrix, RankingError, Result, Scorer, ScorerKind};
use crate::models::{CandidatePool, ItemId};
use ndarray::Array2;
use std::sync::Arc;
use tracing::{debug, error};

/// Reorders a candidate pool by predicted relevance.
///
/// Implementations never fail: on any scoring problem they return the pool order.
pub trait Reranker: Send + Sync {
    fn rerank(&self, user_id: i64, pool: &CandidatePool) -> Vec<ItemId>;
    fn name(&self) -> &'static str;
}

/// GBDT reranker over the six engineered features.
pub struct GbdtReranker {
    scorer: Arc<dyn Scorer>,
    user_embeddings: Arc<Array2<f32>>,
    item_embeddings: Arc<Array2<f32>>,
}

impl GbdtReranker {
    pub fn new(
        scorer: Arc<dyn Scorer>,
        user_embeddings: Arc<Array2<f32>>,
        item_embeddings: Arc<Array2<f32>>,
    ) -> Self {
        Self {
            scorer,
            user_embeddings,
            item_embeddings,
        }
    }

    pub fn scorer_kind(&self) -> ScorerKind {
        self.scorer.kind()
    }

    /// Scores every candidate and returns them by descending score.
    /// Equal scores keep pool order.
    pub fn score(&self, user_id: i64, pool: &CandidatePool) -> Result<Vec<ItemId>> {
        let user_index = usize::try_from(user_id)
            .ok()
            .filter(|&i| i < self.user_embeddings.nrows())
            .ok_or_else(|| {
                RankingError::FeatureExtractionError(format!("No embedding for user {}", user_id))
            })?;

        let features = build_feature_matrix(
            self.user_embeddings.row(user_index),
            &self.item_embeddings,
            pool,
        )?;
        let scores = self.scorer.predict(features)?;

        if scores.len() != pool.len() {
            return Err(RankingError::InferenceError(format!(
                "Scorer returned {} scores for {} candidates",
                scores.len(),
                pool.len()
            )));
        }

        let mut scored: Vec<(ItemId, f32)> = pool
            .items()
            .iter()
            .copied()
            .zip(scores.iter().map(|&s| if s.is_nan() { f32::NEG_INFINITY } else { s }))
            .collect();

        // NaN scores sort last
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));

        debug!(
            user_id,
            scored_count = scored.len(),
            top_score = scored.first().map(|c| c.1),
            "Scoring complete"
        );

        Ok(scored.into_iter().map(|(item, _)| item).collect())
    }
}

impl Reranker for GbdtReranker {
    fn rerank(&self, user_id: i64, pool: &CandidatePool) -> Vec<ItemId> {
        if pool.is_empty() {
            return Vec::new();
        }

        match self.score(user_id, pool) {
            Ok(ranked) => ranked,
            Err(e) => {
                error!(user_id, error = %e, "Reranking failed, keeping pool order");
                pool.items().to_vec()
            }
        }
    }

    fn name(&self) -> &'static str {
        match self.scorer.kind() {
            ScorerKind::Onnx => "gbdt_onnx",
            ScorerKind::Heuristic => "gbdt_heuristic",
        }
    }
}
