use crate::artifacts::{Artifacts, CandidateTable, LastClickTable};
use crate::models::{Algorithm, ItemId};
use crate::services::cold_start::{ColdStartHandler, ContextualPopularity};
use crate::services::ranking::{GbdtReranker, Reranker};
use crate::services::recall::{
    CandidateGenerator, GeneratorSet, ItemCfRecall, MatrixRecall, PopularityRecall,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

/// Typed set of pipeline components wired at startup.
///
/// A component slot left empty is reported as not loaded.
#[derive(Default)]
pub struct ModelRegistry {
    item_cf: Option<ItemCfRecall>,
    als: Option<MatrixRecall>,
    two_tower: Option<MatrixRecall>,
    popularity: Option<PopularityRecall>,
    reranker: Option<Box<dyn Reranker>>,
    cold_start: Option<Box<dyn ColdStartHandler>>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RegistryStatus {
    pub models: BTreeMap<&'static str, bool>,
    pub candidate_generators: usize,
    pub reranker_ready: bool,
    pub reranker: Option<&'static str>,
    pub cold_start_ready: bool,
    pub overall_ready: bool,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wires every component from loaded artifacts.
    pub fn from_artifacts(artifacts: &Artifacts) -> Self {
        let reranker = GbdtReranker::new(
            artifacts.scorer.clone(),
            artifacts.user_embeddings.clone(),
            artifacts.item_embeddings.clone(),
        );
        let cold_start = ContextualPopularity::new(
            artifacts.segments.clone(),
            Some(artifacts.popularity.clone()),
        );

        Self::new()
            .with_item_cf(artifacts.last_clicks.clone(), artifacts.cf_candidates.clone())
            .with_als(artifacts.als_candidates.clone())
            .with_two_tower(artifacts.two_tower_candidates.clone())
            .with_popularity(artifacts.popularity.clone())
            .with_reranker(Box::new(reranker))
            .with_cold_start_handler(Box::new(cold_start))
    }

    pub fn with_item_cf(
        mut self,
        last_clicks: Arc<LastClickTable>,
        similar_items: Arc<CandidateTable>,
    ) -> Self {
        self.item_cf = Some(ItemCfRecall::new(last_clicks, similar_items));
        info!("Registered candidate generator: {}", Algorithm::ItemCf.as_str());
        self
    }

    pub fn with_als(mut self, user_candidates: Arc<CandidateTable>) -> Self {
        self.als = Some(MatrixRecall::als(user_candidates));
        info!("Registered candidate generator: {}", Algorithm::Als.as_str());
        self
    }

    pub fn with_two_tower(mut self, user_candidates: Arc<CandidateTable>) -> Self {
        self.two_tower = Some(MatrixRecall::two_tower(user_candidates));
        info!("Registered candidate generator: {}", Algorithm::TwoTower.as_str());
        self
    }

    pub fn with_popularity(mut self, items: Arc<Vec<ItemId>>) -> Self {
        self.popularity = Some(PopularityRecall::new(items));
        info!("Registered candidate generator: {}", Algorithm::Popularity.as_str());
        self
    }

    pub fn with_reranker(mut self, reranker: Box<dyn Reranker>) -> Self {
        info!("Registered reranker: {}", reranker.name());
        self.reranker = Some(reranker);
        self
    }

    pub fn with_cold_start_handler(mut self, handler: Box<dyn ColdStartHandler>) -> Self {
        info!("Registered cold-start handler: {}", handler.name());
        self.cold_start = Some(handler);
        self
    }

    pub fn popularity(&self) -> Option<&PopularityRecall> {
        self.popularity.as_ref()
    }

    pub fn reranker(&self) -> Option<&dyn Reranker> {
        self.reranker.as_deref()
    }

    pub fn cold_start_handler(&self) -> Option<&dyn ColdStartHandler> {
        self.cold_start.as_deref()
    }

    pub fn candidate_generator_count(&self) -> usize {
        Algorithm::ALL
            .iter()
            .filter(|&&algorithm| self.generator(algorithm).is_some())
            .count()
    }

    /// Ready when every generator, the reranker and the cold-start handler are wired.
    pub fn is_ready(&self) -> bool {
        self.candidate_generator_count() == Algorithm::ALL.len()
            && self.reranker.is_some()
            && self.cold_start.is_some()
    }

    pub fn status(&self) -> RegistryStatus {
        let models = Algorithm::ALL
            .iter()
            .map(|&algorithm| (algorithm.as_str(), self.generator(algorithm).is_some()))
            .collect();

        RegistryStatus {
            models,
            candidate_generators: self.candidate_generator_count(),
            reranker_ready: self.reranker.is_some(),
            reranker: self.reranker.as_ref().map(|r| r.name()),
            cold_start_ready: self.cold_start.is_some(),
            overall_ready: self.is_ready(),
        }
    }
}

impl GeneratorSet for ModelRegistry {
    fn generator(&self, algorithm: Algorithm) -> Option<&dyn CandidateGenerator> {
        match algorithm {
            Algorithm::ItemCf => self.item_cf.as_ref().map(|g| g as &dyn CandidateGenerator),
            Algorithm::Als => self.als.as_ref().map(|g| g as &dyn CandidateGenerator),
            Algorithm::Popularity => self.popularity.as_ref().map(|g| g as &dyn CandidateGenerator),
            Algorithm::TwoTower => self.two_tower.as_ref().map(|g| g as &dyn CandidateGenerator),
        }
    }
}
