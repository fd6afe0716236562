mod item_cf_recall;
mod matrix_recall;
mod popularity_recall;

use crate::config::ModelConfig;
use crate::models::{Algorithm, CandidatePool, ItemId, Provenance};
use std::collections::HashSet;
use tracing::{debug, warn};

pub use item_cf_recall::ItemCfRecall;
pub use matrix_recall::MatrixRecall;
pub use popularity_recall::PopularityRecall;

/// A precomputed candidate source.
///
/// Generators fail soft: a bad lookup yields an empty list, never an error.
pub trait CandidateGenerator: Send + Sync {
    /// Up to `limit` unique items for `user_id`, most relevant first,
    /// skipping anything in `excluded`.
    fn generate(&self, user_id: i64, excluded: &HashSet<ItemId>, limit: usize) -> Vec<ItemId>;
    fn algorithm(&self) -> Algorithm;
}

/// Lookup of the generator wired for each algorithm.
pub trait GeneratorSet {
    fn generator(&self, algorithm: Algorithm) -> Option<&dyn CandidateGenerator>;
}

/// Walks a precomputed row in order, collecting unseen items until `limit`.
/// Negative entries are row padding and are skipped.
pub(crate) fn take_unseen<I>(row: I, excluded: &HashSet<ItemId>, limit: usize) -> Vec<ItemId>
where
    I: IntoIterator<Item = i64>,
{
    let mut candidates = Vec::with_capacity(limit.min(256));
    let mut local: HashSet<ItemId> = HashSet::new();

    for raw in row {
        if candidates.len() >= limit {
            break;
        }
        let Ok(item) = ItemId::try_from(raw) else {
            continue;
        };
        if excluded.contains(&item) || !local.insert(item) {
            continue;
        }
        candidates.push(item);
    }

    candidates
}

/// One step of pool assembly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStage {
    pub algorithm: Algorithm,
    /// Most items the generator is asked for in this stage.
    pub per_call_cap: usize,
    /// Pool size this stage may grow the pool to.
    pub cumulative_cap: usize,
}

/// Per-algorithm and total caps for pool assembly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolLimits {
    pub item_cf: usize,
    pub als: usize,
    pub popularity: usize,
    pub two_tower: usize,
    pub total: usize,
}

impl Default for PoolLimits {
    fn default() -> Self {
        Self {
            item_cf: 300,
            als: 100,
            popularity: 200,
            two_tower: 200,
            total: 1000,
        }
    }
}

impl From<&ModelConfig> for PoolLimits {
    fn from(config: &ModelConfig) -> Self {
        Self {
            item_cf: config.max_candidates_cf,
            als: config.max_candidates_als,
            popularity: config.max_candidates_pop,
            two_tower: config.max_candidates_tt,
            total: config.final_candidate_pool,
        }
    }
}

/// Candidate pool builder: merges generators in fixed priority order
/// (CF, ALS, Popularity, Two-Tower, Popularity filler) into one
/// deduplicated pool, recording each item's source rank.
#[derive(Debug, Clone)]
pub struct CandidatePoolBuilder {
    stages: [PoolStage; 5],
    total: usize,
}

impl Default for CandidatePoolBuilder {
    fn default() -> Self {
        Self::new(PoolLimits::default())
    }
}

impl CandidatePoolBuilder {
    pub fn new(limits: PoolLimits) -> Self {
        let total = limits.total;
        let after_cf = limits.item_cf.min(total);
        let after_als = (after_cf + limits.als).min(total);
        let after_pop = (after_als + limits.popularity).min(total);
        let after_tt = (after_pop + limits.two_tower).min(total);

        let stages = [
            PoolStage {
                algorithm: Algorithm::ItemCf,
                per_call_cap: limits.item_cf,
                cumulative_cap: after_cf,
            },
            PoolStage {
                algorithm: Algorithm::Als,
                per_call_cap: limits.als,
                cumulative_cap: after_als,
            },
            PoolStage {
                algorithm: Algorithm::Popularity,
                per_call_cap: limits.popularity,
                cumulative_cap: after_pop,
            },
            PoolStage {
                algorithm: Algorithm::TwoTower,
                per_call_cap: limits.two_tower,
                cumulative_cap: after_tt,
            },
            PoolStage {
                algorithm: Algorithm::Popularity,
                per_call_cap: total,
                cumulative_cap: total,
            },
        ];

        Self { stages, total }
    }

    pub fn stages(&self) -> &[PoolStage] {
        &self.stages
    }

    pub fn max_pool_size(&self) -> usize {
        self.total
    }

    /// Runs every stage in order and returns the merged pool.
    pub fn build(&self, generators: &dyn GeneratorSet, user_id: i64) -> CandidatePool {
        let mut pool = CandidatePool::new();
        let mut contributed = [0u32; 4];

        for stage in &self.stages {
            if pool.len() >= self.total {
                break;
            }

            let Some(generator) = generators.generator(stage.algorithm) else {
                warn!(
                    algorithm = stage.algorithm.as_str(),
                    "Candidate generator not registered, skipping stage"
                );
                continue;
            };

            let limit = stage
                .per_call_cap
                .min(stage.cumulative_cap.saturating_sub(pool.len()));
            if limit == 0 {
                continue;
            }

            let produced = generator.generate(user_id, pool.seen(), limit);
            let column = stage.algorithm.feature_column();
            let before = pool.len();

            for item in produced {
                if pool.len() >= stage.cumulative_cap {
                    break;
                }
                let rank = contributed[column] + 1;
                let provenance = Provenance {
                    algorithm: stage.algorithm,
                    rank,
                };
                if pool.insert(item, Some(provenance)) {
                    contributed[column] = rank;
                }
            }

            debug!(
                user_id,
                algorithm = stage.algorithm.as_str(),
                added = pool.len() - before,
                pool_size = pool.len(),
                "Pool stage complete"
            );
        }

        debug!(user_id, pool_size = pool.len(), "Generated candidate pool");
        pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ABSENT_RANK;
    use std::collections::HashMap;

    struct FixedList {
        algorithm: Algorithm,
        items: Vec<ItemId>,
    }

    impl CandidateGenerator for FixedList {
        fn generate(&self, _user_id: i64, excluded: &HashSet<ItemId>, limit: usize) -> Vec<ItemId> {
            take_unseen(self.items.iter().map(|&i| i as i64), excluded, limit)
        }

        fn algorithm(&self) -> Algorithm {
            self.algorithm
        }
    }

    #[derive(Default)]
    struct FixedGenerators(HashMap<Algorithm, FixedList>);

    impl FixedGenerators {
        fn with(mut self, algorithm: Algorithm, items: Vec<ItemId>) -> Self {
            self.0.insert(algorithm, FixedList { algorithm, items });
            self
        }
    }

    impl GeneratorSet for FixedGenerators {
        fn generator(&self, algorithm: Algorithm) -> Option<&dyn CandidateGenerator> {
            self.0.get(&algorithm).map(|g| g as &dyn CandidateGenerator)
        }
    }

    #[test]
    fn test_take_unseen_skips_excluded_and_padding() {
        let excluded: HashSet<ItemId> = [2].into_iter().collect();
        let taken = take_unseen(vec![1, 2, -1, 3, 3, 4], &excluded, 3);

        assert_eq!(taken, vec![1, 3, 4]);
    }

    #[test]
    fn test_stage_caps() {
        let builder = CandidatePoolBuilder::default();
        let caps: Vec<(Algorithm, usize, usize)> = builder
            .stages()
            .iter()
            .map(|s| (s.algorithm, s.per_call_cap, s.cumulative_cap))
            .collect();

        assert_eq!(
            caps,
            vec![
                (Algorithm::ItemCf, 300, 300),
                (Algorithm::Als, 100, 400),
                (Algorithm::Popularity, 200, 600),
                (Algorithm::TwoTower, 200, 800),
                (Algorithm::Popularity, 1000, 1000),
            ]
        );
    }

    #[test]
    fn test_merge_order_and_dedup() {
        let generators = FixedGenerators::default()
            .with(Algorithm::ItemCf, vec![1, 2, 3])
            .with(Algorithm::Als, vec![2, 4])
            .with(Algorithm::Popularity, vec![5, 6]);

        let pool = CandidatePoolBuilder::default().build(&generators, 0);

        assert_eq!(pool.items(), &[1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_ranks_follow_stage_contributions() {
        let generators = FixedGenerators::default()
            .with(Algorithm::ItemCf, vec![1, 2])
            .with(Algorithm::Als, vec![2, 4])
            .with(Algorithm::Popularity, vec![5, 1, 6])
            .with(Algorithm::TwoTower, vec![7]);

        let pool = CandidatePoolBuilder::default().build(&generators, 0);

        assert_eq!(pool.items(), &[1, 2, 4, 5, 6, 7]);
        assert_eq!(pool.rank_features(0), [1, ABSENT_RANK, ABSENT_RANK, ABSENT_RANK]);
        // ALS also ranks item 2, but later stages never see pooled items.
        assert_eq!(pool.rank_features(1), [2, ABSENT_RANK, ABSENT_RANK, ABSENT_RANK]);
        assert_eq!(pool.rank_features(2), [ABSENT_RANK, 1, ABSENT_RANK, ABSENT_RANK]);
        assert_eq!(pool.rank_features(4), [ABSENT_RANK, ABSENT_RANK, 2, ABSENT_RANK]);
        assert_eq!(pool.rank_features(5), [ABSENT_RANK, ABSENT_RANK, ABSENT_RANK, 1]);
    }

    #[test]
    fn test_cumulative_caps_and_filler() {
        let limits = PoolLimits {
            item_cf: 2,
            als: 1,
            popularity: 1,
            two_tower: 1,
            total: 7,
        };
        let generators = FixedGenerators::default()
            .with(Algorithm::ItemCf, vec![1, 2, 3])
            .with(Algorithm::Als, vec![10, 11])
            .with(Algorithm::Popularity, vec![20, 21, 22, 23, 24])
            .with(Algorithm::TwoTower, vec![30, 31]);

        let pool = CandidatePoolBuilder::new(limits).build(&generators, 0);

        // CF 2, ALS 1, Pop 1, TT 1, then popularity fills to the total.
        assert_eq!(pool.items(), &[1, 2, 10, 20, 30, 21, 22]);
        assert_eq!(pool.count_from(Algorithm::Popularity), 3);
        // Filler continues popularity numbering.
        assert_eq!(pool.rank_features(6)[Algorithm::Popularity.feature_column()], 3);
    }

    #[test]
    fn test_pool_never_exceeds_total() {
        let limits = PoolLimits {
            total: 50,
            ..PoolLimits::default()
        };
        let generators = FixedGenerators::default()
            .with(Algorithm::ItemCf, (0..300).collect())
            .with(Algorithm::Popularity, (1000..2000).collect());

        let pool = CandidatePoolBuilder::new(limits).build(&generators, 0);

        assert_eq!(pool.len(), 50);
        assert_eq!(pool.count_from(Algorithm::ItemCf), 50);
    }

    #[test]
    fn test_empty_cf_still_fills_from_other_stages() {
        let generators = FixedGenerators::default()
            .with(Algorithm::ItemCf, vec![])
            .with(Algorithm::Als, vec![4])
            .with(Algorithm::TwoTower, vec![8]);

        let pool = CandidatePoolBuilder::default().build(&generators, 0);

        assert_eq!(pool.items(), &[4, 8]);
    }

    #[test]
    fn test_all_empty_yields_empty_pool() {
        let generators = FixedGenerators::default();

        let pool = CandidatePoolBuilder::default().build(&generators, 0);

        assert!(pool.is_empty());
    }

    #[test]
    fn test_build_is_deterministic() {
        let generators = FixedGenerators::default()
            .with(Algorithm::ItemCf, vec![9, 3, 9, 1])
            .with(Algorithm::Als, vec![3, 7, 2])
            .with(Algorithm::Popularity, vec![1, 2, 5, 6])
            .with(Algorithm::TwoTower, vec![6, 8]);
        let builder = CandidatePoolBuilder::default();

        let first = builder.build(&generators, 12);
        let second = builder.build(&generators, 12);

        assert_eq!(first, second);
        let unique: HashSet<_> = first.items().iter().collect();
        assert_eq!(unique.len(), first.len());
    }
}
