pub mod cold_start;
pub mod ranking;
pub mod recall;
pub mod recommendation;
pub mod registry;

pub use cold_start::{ColdStartHandler, ContextualPopularity, QuotaAllocation};
pub use ranking::{GbdtReranker, RankingModel, Reranker, Scorer};
pub use recall::{CandidateGenerator, CandidatePoolBuilder, GeneratorSet, PoolLimits};
pub use recommendation::{RecommendationService, ServiceStatus};
pub use registry::{ModelRegistry, RegistryStatus};
