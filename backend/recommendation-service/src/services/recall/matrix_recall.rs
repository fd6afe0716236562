use super::{take_unseen, CandidateGenerator};
use crate::artifacts::CandidateTable;
use crate::models::{Algorithm, ItemId};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::warn;

/// Per-user precomputed recall (ALS or Two-Tower top-N tables).
///
/// Row `user_id` holds that user's candidates, most relevant first.
pub struct MatrixRecall {
    algorithm: Algorithm,
    user_candidates: Arc<CandidateTable>,
}

impl MatrixRecall {
    pub fn als(user_candidates: Arc<CandidateTable>) -> Self {
        Self {
            algorithm: Algorithm::Als,
            user_candidates,
        }
    }

    pub fn two_tower(user_candidates: Arc<CandidateTable>) -> Self {
        Self {
            algorithm: Algorithm::TwoTower,
            user_candidates,
        }
    }
}

impl CandidateGenerator for MatrixRecall {
    fn generate(&self, user_id: i64, excluded: &HashSet<ItemId>, limit: usize) -> Vec<ItemId> {
        match self.user_candidates.row(user_id) {
            Some(row) => take_unseen(row.iter().copied(), excluded, limit),
            None => {
                warn!(
                    user_id,
                    algorithm = self.algorithm.as_str(),
                    "Candidate generation failed: user outside table"
                );
                Vec::new()
            }
        }
    }

    fn algorithm(&self) -> Algorithm {
        self.algorithm
    }
}
