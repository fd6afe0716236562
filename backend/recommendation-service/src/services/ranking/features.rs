use super::{RankingError, Result};
use crate::models::CandidatePool;
use crate::utils::cosine_similarity;
use ndarray::{Array2, ArrayView1};

/// Features per (user, candidate) pair:
/// 0. CF rank (1-based, or 1001 if not from CF)
/// 1. ALS rank
/// 2. Popularity rank
/// 3. Two-Tower rank
/// 4. Global candidate rank (1-based position in the pool)
/// 5. User-item cosine similarity from embeddings
pub const FEATURE_COUNT: usize = 6;

const GLOBAL_RANK_COLUMN: usize = 4;
const SIMILARITY_COLUMN: usize = 5;

/// Builds the reranker feature matrix, one row per pooled candidate.
///
/// Rank columns come from the pool's provenance; a pool without provenance
/// leaves them at the absent-rank sentinel. Each candidate carries only the
/// rank from the stage that first pooled it: later generators are handed the
/// pool as their exclusion set, so agreement between algorithms is not
/// visible to the model.
pub fn build_feature_matrix(
    user_embedding: ArrayView1<f32>,
    item_embeddings: &Array2<f32>,
    pool: &CandidatePool,
) -> Result<Array2<f32>> {
    if item_embeddings.ncols() != user_embedding.len() {
        return Err(RankingError::FeatureExtractionError(format!(
            "User embedding dim {} does not match item embedding dim {}",
            user_embedding.len(),
            item_embeddings.ncols()
        )));
    }

    let mut features = Array2::<f32>::zeros((pool.len(), FEATURE_COUNT));

    for (i, &item_id) in pool.items().iter().enumerate() {
        let index = item_id as usize;
        if index >= item_embeddings.nrows() {
            return Err(RankingError::FeatureExtractionError(format!(
                "No embedding for item {}",
                item_id
            )));
        }

        let mut row = features.row_mut(i);
        for (column, rank) in pool.rank_features(i).into_iter().enumerate() {
            row[column] = rank as f32;
        }
        row[GLOBAL_RANK_COLUMN] = (i + 1) as f32;
        row[SIMILARITY_COLUMN] = cosine_similarity(user_embedding, item_embeddings.row(index));
    }

    Ok(features)
}
