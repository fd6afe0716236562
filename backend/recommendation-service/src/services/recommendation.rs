//! Request orchestration: warm/cold branching and response shaping.
//!
//! Warm users go through pool assembly and reranking. Cold users (no last
//! click, or an id outside the tables) are served by the cold-start handler,
//! falling back to global popularity when it fails.

use crate::artifacts::{Artifacts, LastClickTable};
use crate::config::Config;
use crate::error::{AppError, Result};
use crate::models::{
    AlgorithmTag, CandidatePool, ItemId, RecommendationRequest, RecommendationResponse,
    RequestContext, UserType,
};
use crate::services::ranking::{Scorer, ScorerKind};
use crate::services::recall::{CandidatePoolBuilder, PoolLimits};
use crate::services::registry::{ModelRegistry, RegistryStatus};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Serialize)]
pub struct ConfigSummary {
    pub environment: String,
    pub max_candidates: usize,
    pub max_recommendations: usize,
    pub default_recommendations: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuxiliaryData {
    pub last_clicks_loaded: bool,
    pub ground_truth_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceStatus {
    pub service_ready: bool,
    pub registry: RegistryStatus,
    pub scorer: Option<ScorerKind>,
    pub config: ConfigSummary,
    pub auxiliary_data: AuxiliaryData,
}

pub struct RecommendationService {
    config: Config,
    registry: ModelRegistry,
    pool_builder: CandidatePoolBuilder,
    last_clicks: Option<Arc<LastClickTable>>,
    ground_truth: HashMap<i64, ItemId>,
    scorer: Option<ScorerKind>,
}

impl RecommendationService {
    pub fn new(config: Config, registry: ModelRegistry) -> Self {
        let pool_builder = CandidatePoolBuilder::new(PoolLimits::from(&config.model));

        Self {
            config,
            registry,
            pool_builder,
            last_clicks: None,
            ground_truth: HashMap::new(),
            scorer: None,
        }
    }

    pub fn with_last_clicks(mut self, last_clicks: Arc<LastClickTable>) -> Self {
        self.last_clicks = Some(last_clicks);
        self
    }

    pub fn with_ground_truth(mut self, ground_truth: HashMap<i64, ItemId>) -> Self {
        self.ground_truth = ground_truth;
        self
    }

    /// Wires the registry and lookup tables from loaded artifacts.
    pub fn from_artifacts(config: Config, artifacts: Artifacts) -> Self {
        let registry = ModelRegistry::from_artifacts(&artifacts);
        let mut service = Self::new(config, registry)
            .with_last_clicks(artifacts.last_clicks.clone())
            .with_ground_truth(artifacts.ground_truth);
        service.scorer = Some(artifacts.scorer.kind());

        info!(
            generators = service.registry.candidate_generator_count(),
            ready = service.is_ready(),
            "Recommendation service initialized"
        );
        service
    }

    pub fn is_ready(&self) -> bool {
        self.registry.is_ready() && self.last_clicks.is_some()
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn recommend(&self, request: &RecommendationRequest) -> Result<RecommendationResponse> {
        let k = request
            .k
            .unwrap_or(self.config.api.default_recommendations as i64);
        self.get_recommendations(request.user_id, k, &request.env)
    }

    pub fn get_recommendations(
        &self,
        user_id: i64,
        k: i64,
        context: &RequestContext,
    ) -> Result<RecommendationResponse> {
        if !self.is_ready() {
            return Err(AppError::NotReady(
                "Recommendation service not ready".to_string(),
            ));
        }

        let k = self.clamp_k(k);
        let ground_truth = self.ground_truth.get(&user_id).copied();

        let response = if self.is_cold_user(user_id) {
            self.cold_recommendations(context, k, ground_truth)
        } else {
            self.warm_recommendations(user_id, k, ground_truth)
        };

        debug!(
            user_id,
            k,
            user_type = ?response.user_type,
            algorithm = ?response.algorithm,
            returned = response.recommendations.len(),
            "Request complete"
        );

        Ok(response)
    }

    /// Clamps `k` to `[1, max_recommendations]`.
    pub fn clamp_k(&self, k: i64) -> usize {
        let max = self.config.api.max_recommendations.max(1);
        usize::try_from(k).unwrap_or(0).clamp(1, max)
    }

    /// Cold when the user has no recorded click or lies outside the tables.
    pub fn is_cold_user(&self, user_id: i64) -> bool {
        if user_id < 0 || user_id > self.config.api.max_user_id {
            return true;
        }

        self.last_clicks
            .as_ref()
            .map_or(true, |clicks| !clicks.has_history(user_id))
    }

    pub fn build_candidate_pool(&self, user_id: i64) -> CandidatePool {
        let pool = self.pool_builder.build(&self.registry, user_id);
        info!(user_id, candidate_count = pool.len(), "Generated candidates");
        pool
    }

    fn warm_recommendations(
        &self,
        user_id: i64,
        k: usize,
        ground_truth: Option<ItemId>,
    ) -> RecommendationResponse {
        let pool = self.build_candidate_pool(user_id);

        if pool.is_empty() {
            warn!(user_id, "No candidates generated");
            return RecommendationResponse {
                recommendations: Vec::new(),
                user_type: UserType::Warm,
                algorithm: AlgorithmTag::Ensemble,
                ground_truth,
                candidate_count: None,
                error: Some("No candidates generated".to_string()),
            };
        }

        let mut ranked = match self.registry.reranker() {
            Some(reranker) => reranker.rerank(user_id, &pool),
            None => pool.items().to_vec(),
        };
        ranked.truncate(k);

        RecommendationResponse {
            recommendations: ranked,
            user_type: UserType::Warm,
            algorithm: AlgorithmTag::EnsembleWithReranking,
            ground_truth,
            candidate_count: Some(pool.len()),
            error: None,
        }
    }

    fn cold_recommendations(
        &self,
        context: &RequestContext,
        k: usize,
        ground_truth: Option<ItemId>,
    ) -> RecommendationResponse {
        let contextual = match self.registry.cold_start_handler() {
            Some(handler) => handler.recommend(context, k),
            None => Err(AppError::ColdStart(
                "No cold-start handler registered".to_string(),
            )),
        };

        match contextual {
            Ok(recommendations) if !recommendations.is_empty() => RecommendationResponse {
                recommendations,
                user_type: UserType::Cold,
                algorithm: AlgorithmTag::ContextualPopularity,
                ground_truth,
                candidate_count: None,
                error: None,
            },
            outcome => {
                match outcome {
                    Err(e) => {
                        error!(error = %e, "Cold-start failed, falling back to global popularity")
                    }
                    Ok(_) => warn!("Cold-start produced no items, falling back to global popularity"),
                }

                match self.registry.popularity().filter(|p| !p.is_empty()) {
                    Some(popularity) => RecommendationResponse {
                        recommendations: popularity.top(k),
                        user_type: UserType::Cold,
                        algorithm: AlgorithmTag::GlobalPopularityFallback,
                        ground_truth,
                        candidate_count: None,
                        error: None,
                    },
                    None => {
                        error!("No global popularity available for cold-start fallback");
                        RecommendationResponse {
                            recommendations: Vec::new(),
                            user_type: UserType::Cold,
                            algorithm: AlgorithmTag::Unavailable,
                            ground_truth,
                            candidate_count: None,
                            error: Some("No fallback available".to_string()),
                        }
                    }
                }
            }
        }
    }

    pub fn status(&self) -> ServiceStatus {
        ServiceStatus {
            service_ready: self.is_ready(),
            registry: self.registry.status(),
            scorer: self.scorer,
            config: ConfigSummary {
                environment: self.config.service.environment.clone(),
                max_candidates: self.pool_builder.max_pool_size(),
                max_recommendations: self.config.api.max_recommendations,
                default_recommendations: self.config.api.default_recommendations,
            },
            auxiliary_data: AuxiliaryData {
                last_clicks_loaded: self.last_clicks.is_some(),
                ground_truth_count: self.ground_truth.len(),
            },
        }
    }
}
