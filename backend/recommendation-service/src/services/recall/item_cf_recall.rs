use super::{take_unseen, CandidateGenerator};
use crate::artifacts::{CandidateTable, LastClickTable};
use crate::models::{Algorithm, ItemId, NO_HISTORY};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// Item-based Collaborative Filtering Recall Strategy
///
/// Algorithm:
/// 1. Look up the user's most recent click (the seed item)
/// 2. Return the seed's precomputed similar-item row, in order
///
/// Users without a recorded click produce no candidates.
pub struct ItemCfRecall {
    last_clicks: Arc<LastClickTable>,
    similar_items: Arc<CandidateTable>,
}

impl ItemCfRecall {
    pub fn new(last_clicks: Arc<LastClickTable>, similar_items: Arc<CandidateTable>) -> Self {
        Self {
            last_clicks,
            similar_items,
        }
    }
}

impl CandidateGenerator for ItemCfRecall {
    fn generate(&self, user_id: i64, excluded: &HashSet<ItemId>, limit: usize) -> Vec<ItemId> {
        let Some(seed) = self.last_clicks.get(user_id) else {
            warn!(user_id, "Item-CF recall: user outside last-click table");
            return Vec::new();
        };

        if seed == NO_HISTORY {
            debug!(user_id, "Item-CF recall: user has no last click, returning empty");
            return Vec::new();
        }

        match self.similar_items.row(seed) {
            Some(row) => take_unseen(row.iter().copied(), excluded, limit),
            None => {
                warn!(
                    user_id,
                    seed_item = seed,
                    "Item-CF recall: seed item outside similarity table"
                );
                Vec::new()
            }
        }
    }

    fn algorithm(&self) -> Algorithm {
        Algorithm::ItemCf
    }
}
