use crate::error::{AppError, Result};
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    pub service: ServiceConfig,
    pub model: ModelConfig,
    pub api: ApiConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_service_name")]
    pub name: String,
    /// development, staging, production
    #[serde(default = "default_environment")]
    pub environment: String,
    /// "text" or "json"
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_artifacts_dir")]
    pub artifacts_dir: PathBuf,

    #[serde(default = "default_reranker_model")]
    pub reranker_model: String,
    #[serde(default = "default_last_click_file")]
    pub last_click_file: String,
    #[serde(default = "default_cf_candidates_file")]
    pub cf_candidates_file: String,
    #[serde(default = "default_als_candidates_file")]
    pub als_candidates_file: String,
    #[serde(default = "default_two_tower_candidates_file")]
    pub two_tower_candidates_file: String,
    #[serde(default = "default_popularity_file")]
    pub popularity_file: String,
    #[serde(default = "default_segments_file")]
    pub segments_file: String,
    #[serde(default = "default_user_embeddings_file")]
    pub user_embeddings_file: String,
    #[serde(default = "default_item_embeddings_file")]
    pub item_embeddings_file: String,
    #[serde(default = "default_ground_truth_file")]
    pub ground_truth_file: String,

    #[serde(default = "default_max_candidates_cf")]
    pub max_candidates_cf: usize,
    #[serde(default = "default_max_candidates_als")]
    pub max_candidates_als: usize,
    #[serde(default = "default_max_candidates_pop")]
    pub max_candidates_pop: usize,
    #[serde(default = "default_max_candidates_tt")]
    pub max_candidates_tt: usize,
    #[serde(default = "default_final_candidate_pool")]
    pub final_candidate_pool: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_max_recommendations")]
    pub max_recommendations: usize,
    #[serde(default = "default_recommendations")]
    pub default_recommendations: usize,
    #[serde(default = "default_max_user_id")]
    pub max_user_id: i64,
}

fn default_service_name() -> String {
    "recommendation-service".to_string()
}
fn default_environment() -> String {
    "production".to_string()
}
fn default_log_format() -> String {
    "text".to_string()
}
fn default_artifacts_dir() -> PathBuf {
    PathBuf::from("artifacts")
}
fn default_reranker_model() -> String {
    "reranker.onnx".to_string()
}
fn default_last_click_file() -> String {
    "last_click.json".to_string()
}
fn default_cf_candidates_file() -> String {
    "cf_i2i_top300.json".to_string()
}
fn default_als_candidates_file() -> String {
    "als_top100.json".to_string()
}
fn default_two_tower_candidates_file() -> String {
    "tt_top200.json".to_string()
}
fn default_popularity_file() -> String {
    "pop_list.json".to_string()
}
fn default_segments_file() -> String {
    "top_lists.json".to_string()
}
fn default_user_embeddings_file() -> String {
    "user_embeddings.json".to_string()
}
fn default_item_embeddings_file() -> String {
    "item_embeddings.json".to_string()
}
fn default_ground_truth_file() -> String {
    "valid_clicks.json".to_string()
}
fn default_max_candidates_cf() -> usize {
    300
}
fn default_max_candidates_als() -> usize {
    100
}
fn default_max_candidates_pop() -> usize {
    200
}
fn default_max_candidates_tt() -> usize {
    200
}
fn default_final_candidate_pool() -> usize {
    1000
}
fn default_max_recommendations() -> usize {
    100
}
fn default_recommendations() -> usize {
    10
}
fn default_max_user_id() -> i64 {
    65_535
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            environment: default_environment(),
            log_format: default_log_format(),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            artifacts_dir: default_artifacts_dir(),
            reranker_model: default_reranker_model(),
            last_click_file: default_last_click_file(),
            cf_candidates_file: default_cf_candidates_file(),
            als_candidates_file: default_als_candidates_file(),
            two_tower_candidates_file: default_two_tower_candidates_file(),
            popularity_file: default_popularity_file(),
            segments_file: default_segments_file(),
            user_embeddings_file: default_user_embeddings_file(),
            item_embeddings_file: default_item_embeddings_file(),
            ground_truth_file: default_ground_truth_file(),
            max_candidates_cf: default_max_candidates_cf(),
            max_candidates_als: default_max_candidates_als(),
            max_candidates_pop: default_max_candidates_pop(),
            max_candidates_tt: default_max_candidates_tt(),
            final_candidate_pool: default_final_candidate_pool(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            max_recommendations: default_max_recommendations(),
            default_recommendations: default_recommendations(),
            max_user_id: default_max_user_id(),
        }
    }
}

impl ModelConfig {
    pub fn artifact_path(&self, filename: &str) -> PathBuf {
        self.artifacts_dir.join(filename)
    }
}

impl Config {
    pub fn from_env() -> std::result::Result<Self, envy::Error> {
        dotenv::dotenv().ok();

        Ok(Config {
            service: envy::prefixed("SERVICE_").from_env::<ServiceConfig>()?,
            model: envy::prefixed("MODEL_").from_env::<ModelConfig>()?,
            api: envy::prefixed("API_").from_env::<ApiConfig>()?,
        })
    }

    /// Checks that the artifacts directory and the critical files exist.
    pub fn validate(&self) -> Result<()> {
        if !self.model.artifacts_dir.exists() {
            return Err(AppError::Artifact(format!(
                "Artifacts directory not found: {}",
                self.model.artifacts_dir.display()
            )));
        }

        let critical_files = [
            &self.model.reranker_model,
            &self.model.last_click_file,
            &self.model.cf_candidates_file,
            &self.model.als_candidates_file,
            &self.model.popularity_file,
        ];

        for filename in critical_files {
            let path = self.model.artifact_path(filename);
            if !path.exists() {
                return Err(AppError::Artifact(format!(
                    "Critical model file not found: {}",
                    path.display()
                )));
            }
        }

        if self.api.max_recommendations == 0 {
            return Err(AppError::InvalidInput(
                "API_MAX_RECOMMENDATIONS must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}
