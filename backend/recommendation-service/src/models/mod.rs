use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Article identifier; indexes the item embedding table.
pub type ItemId = u32;

/// Value stored in the last-click table for users without history.
pub const NO_HISTORY: i64 = -1;

/// Rank feature value for a candidate that the algorithm did not produce.
/// Exceeds every real in-pool rank (the pool is capped well below it).
pub const ABSENT_RANK: u32 = 1001;

/// Candidate generation algorithms, in feature-column order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    ItemCf,
    Als,
    Popularity,
    TwoTower,
}

impl Algorithm {
    pub const ALL: [Algorithm; 4] = [
        Algorithm::ItemCf,
        Algorithm::Als,
        Algorithm::Popularity,
        Algorithm::TwoTower,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::ItemCf => "item_cf",
            Algorithm::Als => "als",
            Algorithm::Popularity => "popularity",
            Algorithm::TwoTower => "two_tower",
        }
    }

    /// Column of this algorithm's rank in the reranker feature matrix.
    pub fn feature_column(&self) -> usize {
        match self {
            Algorithm::ItemCf => 0,
            Algorithm::Als => 1,
            Algorithm::Popularity => 2,
            Algorithm::TwoTower => 3,
        }
    }
}

/// Where a pooled candidate came from: the stage's algorithm and the
/// candidate's 1-based rank among that algorithm's contributions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Provenance {
    pub algorithm: Algorithm,
    pub rank: u32,
}

/// Ordered, deduplicated candidate set for one request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CandidatePool {
    items: Vec<ItemId>,
    provenance: Vec<Option<Provenance>>,
    seen: HashSet<ItemId>,
}

impl CandidatePool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a pool without source provenance; every rank feature for it
    /// falls back to [`ABSENT_RANK`].
    pub fn from_items<I: IntoIterator<Item = ItemId>>(items: I) -> Self {
        let mut pool = Self::new();
        for item in items {
            pool.insert(item, None);
        }
        pool
    }

    /// Appends `item` unless it is already pooled. Returns whether it was added.
    pub fn insert(&mut self, item: ItemId, provenance: Option<Provenance>) -> bool {
        if !self.seen.insert(item) {
            return false;
        }
        self.items.push(item);
        self.provenance.push(provenance);
        true
    }

    pub fn contains(&self, item: &ItemId) -> bool {
        self.seen.contains(item)
    }

    pub fn seen(&self) -> &HashSet<ItemId> {
        &self.seen
    }

    pub fn items(&self) -> &[ItemId] {
        &self.items
    }

    pub fn into_items(self) -> Vec<ItemId> {
        self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Per-algorithm rank features for the candidate at `position`,
    /// in [`Algorithm::feature_column`] order.
    pub fn rank_features(&self, position: usize) -> [u32; 4] {
        let mut ranks = [ABSENT_RANK; 4];
        if let Some(Some(p)) = self.provenance.get(position) {
            ranks[p.algorithm.feature_column()] = p.rank;
        }
        ranks
    }

    /// Number of candidates contributed by `algorithm`.
    pub fn count_from(&self, algorithm: Algorithm) -> usize {
        self.provenance
            .iter()
            .filter(|p| matches!(p, Some(p) if p.algorithm == algorithm))
            .count()
    }
}

/// Request context for cold-start blending. Missing values mean "unknown".
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RequestContext {
    #[serde(default)]
    pub device: Option<i64>,
    #[serde(default)]
    pub os: Option<i64>,
    #[serde(default)]
    pub country: Option<String>,
}

impl RequestContext {
    pub fn device_or_unknown(&self) -> i64 {
        self.device.unwrap_or(-1)
    }

    pub fn os_or_unknown(&self) -> i64 {
        self.os.unwrap_or(-1)
    }

    /// Uppercased country code, empty when unknown.
    pub fn country_code(&self) -> String {
        self.country
            .as_deref()
            .map(|c| c.trim().to_ascii_uppercase())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationRequest {
    pub user_id: i64,
    #[serde(default)]
    pub k: Option<i64>,
    #[serde(default)]
    pub env: RequestContext,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserType {
    Warm,
    Cold,
}

/// Which path produced a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlgorithmTag {
    ContextualPopularity,
    GlobalPopularityFallback,
    EnsembleWithReranking,
    /// Warm path that produced nothing to rerank.
    Ensemble,
    #[serde(rename = "none")]
    Unavailable,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecommendationResponse {
    pub recommendations: Vec<ItemId>,
    pub user_type: UserType,
    pub algorithm: AlgorithmTag,
    pub ground_truth: Option<ItemId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candidate_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
