use super::{take_unseen, CandidateGenerator};
use crate::models::{Algorithm, ItemId};
use std::collections::HashSet;
use std::sync::Arc;

/// Global popularity recall: the most-clicked items, same list for every user.
/// Walks the global popularity list; independent of user history.
pub struct PopularityRecall {
    items: Arc<Vec<ItemId>>,
}

impl PopularityRecall {
    pub fn new(items: Arc<Vec<ItemId>>) -> Self {
        Self { items }
    }

    /// The first `k` globally popular items.
    pub fn top(&self, k: usize) -> Vec<ItemId> {
        self.generate(-1, &HashSet::new(), k)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl CandidateGenerator for PopularityRecall {
    fn generate(&self, _user_id: i64, excluded: &HashSet<ItemId>, limit: usize) -> Vec<ItemId> {
        take_unseen(self.items.iter().map(|&item| i64::from(item)), excluded, limit)
    }

    fn algorithm(&self) -> Algorithm {
        Algorithm::Popularity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_popularity_ignores_user() {
        let recall = PopularityRecall::new(Arc::new(vec![5, 6, 7, 8]));
        let excluded: HashSet<ItemId> = [6].into_iter().collect();

        assert_eq!(recall.generate(0, &excluded, 2), vec![5, 7]);
        assert_eq!(recall.generate(123_456, &excluded, 2), vec![5, 7]);
        assert_eq!(recall.top(3), vec![5, 6, 7]);
    }
}
