//! Startup artifact loading.
//!
//! Tables are read once and shared read-only for the process lifetime.
//! Formats by extension:
//! - `.json`: serde_json
//! - `.bin` / `.bincode`: bincode
//! - `.tbl`: memory-mapped candidate tables (see [`CandidateTable::open_mapped`])
//! - `.onnx`: the reranker model (tract)

mod tables;

pub use tables::{
    embeddings_from_rows, CandidateTable, GroundTruthRow, LastClickTable, RegionalEntry,
    SegmentTables, SegmentTablesFile,
};

use crate::config::ModelConfig;
use crate::error::{AppError, Result};
use crate::models::ItemId;
use crate::services::ranking::RankingModel;
use ndarray::Array2;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// Everything the service needs, loaded at process start.
pub struct Artifacts {
    pub last_clicks: Arc<LastClickTable>,
    pub cf_candidates: Arc<CandidateTable>,
    pub als_candidates: Arc<CandidateTable>,
    pub two_tower_candidates: Arc<CandidateTable>,
    pub popularity: Arc<Vec<ItemId>>,
    pub segments: Option<SegmentTables>,
    pub user_embeddings: Arc<Array2<f32>>,
    pub item_embeddings: Arc<Array2<f32>>,
    pub scorer: Arc<RankingModel>,
    pub ground_truth: HashMap<i64, ItemId>,
}

/// Reads a serialized table, choosing the decoder from the file extension.
pub fn read_table<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let file = File::open(path).map_err(|e| {
        AppError::Artifact(format!("Failed to open {}: {}", path.display(), e))
    })?;
    let reader = BufReader::new(file);

    match path.extension().and_then(|ext| ext.to_str()) {
        Some("bin") | Some("bincode") => Ok(bincode::deserialize_from(reader)?),
        Some("json") => Ok(serde_json::from_reader(reader)?),
        other => Err(AppError::Artifact(format!(
            "Unsupported artifact format {:?} for {}",
            other,
            path.display()
        ))),
    }
}

/// Reads a table that may legitimately be absent.
fn read_optional<T: DeserializeOwned>(path: &Path, label: &str) -> Option<T> {
    if !path.exists() {
        warn!("{} not found at {}, continuing without it", label, path.display());
        return None;
    }

    match read_table(path) {
        Ok(table) => Some(table),
        Err(e) => {
            warn!(error = %e, "{} could not be read, continuing without it", label);
            None
        }
    }
}

fn read_candidate_table(path: &Path, label: &str) -> Result<CandidateTable> {
    let table = if path.extension().and_then(|ext| ext.to_str()) == Some("tbl") {
        CandidateTable::open_mapped(path)
    } else {
        read_table::<Vec<Vec<i64>>>(path).and_then(CandidateTable::from_rows)
    }
    .map_err(|e| AppError::Artifact(format!("{}: {}", label, e)))?;
    info!("Loaded {} - shape: {:?}", label, table.shape());
    Ok(table)
}

fn read_embeddings(path: &Path, label: &str) -> Result<Array2<f32>> {
    let rows: Vec<Vec<f32>> = read_table(path)?;
    let embeddings =
        embeddings_from_rows(rows).map_err(|e| AppError::Artifact(format!("{}: {}", label, e)))?;
    info!("Loaded {} - shape: {:?}", label, embeddings.dim());
    Ok(embeddings)
}

impl Artifacts {
    /// Loads every artifact named in `config`.
    ///
    /// Missing required tables are fatal. Segment tables and ground truth
    /// are optional; the ONNX scorer degrades to the heuristic model.
    pub fn load(config: &ModelConfig) -> Result<Self> {
        info!("Loading models from {}", config.artifacts_dir.display());

        let last_clicks: Vec<i64> = read_table(&config.artifact_path(&config.last_click_file))?;
        info!("Loaded last clicks data for {} users", last_clicks.len());

        let cf_candidates = read_candidate_table(
            &config.artifact_path(&config.cf_candidates_file),
            "CF similarity matrix",
        )?;
        let als_candidates = read_candidate_table(
            &config.artifact_path(&config.als_candidates_file),
            "ALS recommendations",
        )?;
        let two_tower_candidates = read_candidate_table(
            &config.artifact_path(&config.two_tower_candidates_file),
            "Two-Tower recommendations",
        )?;

        let popularity: Vec<ItemId> = read_table(&config.artifact_path(&config.popularity_file))?;
        info!("Loaded popularity model - {} items", popularity.len());

        let segments = read_optional::<SegmentTablesFile>(
            &config.artifact_path(&config.segments_file),
            "Contextual popularity tables",
        )
        .map(SegmentTables::from);
        match &segments {
            Some(tables) => info!(
                "Loaded contextual popularity tables: {:?}",
                tables.loaded_tables()
            ),
            None => warn!("Contextual popularity tables not found, using global fallback only"),
        }

        let user_embeddings = read_embeddings(
            &config.artifact_path(&config.user_embeddings_file),
            "user embeddings",
        )?;
        let item_embeddings = read_embeddings(
            &config.artifact_path(&config.item_embeddings_file),
            "item embeddings",
        )?;
        if user_embeddings.ncols() != item_embeddings.ncols() {
            return Err(AppError::Artifact(format!(
                "User embedding dim {} does not match item embedding dim {}",
                user_embeddings.ncols(),
                item_embeddings.ncols()
            )));
        }

        let scorer = RankingModel::load(config.artifact_path(&config.reranker_model));

        let ground_truth: HashMap<i64, ItemId> = read_optional::<Vec<GroundTruthRow>>(
            &config.artifact_path(&config.ground_truth_file),
            "Ground truth",
        )
        .unwrap_or_default()
        .into_iter()
        .map(|row| (row.user_id, row.click_article_id))
        .collect();
        info!("Loaded ground truth for {} users", ground_truth.len());

        Ok(Self {
            last_clicks: Arc::new(LastClickTable::new(last_clicks)),
            cf_candidates: Arc::new(cf_candidates),
            als_candidates: Arc::new(als_candidates),
            two_tower_candidates: Arc::new(two_tower_candidates),
            popularity: Arc::new(popularity),
            segments,
            user_embeddings: Arc::new(user_embeddings),
            item_embeddings: Arc::new(item_embeddings),
            scorer: Arc::new(scorer),
            ground_truth,
        })
    }
}
