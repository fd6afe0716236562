use ndarray::{Array1, Array2};
use recommendation_service::artifacts::{CandidateTable, LastClickTable};
use recommendation_service::models::{
    Algorithm, AlgorithmTag, RecommendationRequest, RequestContext, UserType, ABSENT_RANK,
    NO_HISTORY,
};
use recommendation_service::services::cold_start::ContextualPopularity;
use recommendation_service::services::ranking::{
    GbdtReranker, RankingError, Reranker, Scorer, ScorerKind,
};
use recommendation_service::{AppError, Artifacts, Config, ModelRegistry, RecommendationService};
use serde_json::json;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

const SEED_ITEM: usize = 42;
const ITEM_COUNT: usize = 50;

struct FailingScorer;

impl Scorer for FailingScorer {
    fn predict(&self, _features: Array2<f32>) -> Result<Array1<f32>, RankingError> {
        Err(RankingError::InferenceError("feature shape mismatch".to_string()))
    }

    fn kind(&self) -> ScorerKind {
        ScorerKind::Onnx
    }
}

fn write_json(dir: &Path, name: &str, value: serde_json::Value) {
    fs::write(dir.join(name), value.to_string()).unwrap();
}

/// Artifact directory where user 0 last clicked item 42 and user 1 has no history.
///
/// CF: 42 -> [1,2,3]. ALS: user 0 -> [2,4]. Two-Tower: nothing for user 0.
fn write_artifacts(dir: &Path, with_segments: bool) {
    write_json(dir, "last_click.json", json!([SEED_ITEM, NO_HISTORY]));

    let mut cf_rows = vec![vec![-1_i64, -1, -1]; ITEM_COUNT];
    cf_rows[SEED_ITEM] = vec![1, 2, 3];
    write_json(dir, "cf_i2i_top300.json", json!(cf_rows));

    write_json(dir, "als_top100.json", json!([[2, 4], [7, 8]]));
    write_json(dir, "tt_top200.json", json!([[-1, -1], [9, 10]]));
    write_json(dir, "pop_list.json", json!([5, 6]));

    write_json(dir, "user_embeddings.json", json!([[1.0, 0.0], [0.0, 1.0]]));
    let items: Vec<Vec<f32>> = (0..ITEM_COUNT).map(|i| vec![1.0, i as f32]).collect();
    write_json(dir, "item_embeddings.json", json!(items));

    write_json(
        dir,
        "valid_clicks.json",
        json!([{"user_id": 0, "click_article_id": 17}]),
    );

    if with_segments {
        write_json(
            dir,
            "top_lists.json",
            json!({
                "by_os": {"1": [30, 31, 32]},
                "by_dev": {"0": [33, 34]},
                "by_os_reg": [{"id": 1, "country": "de", "items": [35, 36, 37]}],
                "by_dev_reg": [{"id": 0, "country": "DE", "items": [38, 39, 40]}]
            }),
        );
    }
}

fn config_for(dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.model.artifacts_dir = dir.path().to_path_buf();
    config
}

fn load_service(with_segments: bool) -> (TempDir, RecommendationService) {
    let dir = tempfile::tempdir().unwrap();
    write_artifacts(dir.path(), with_segments);

    let config = config_for(&dir);
    let artifacts = Artifacts::load(&config.model).unwrap();
    let service = RecommendationService::from_artifacts(config, artifacts);

    (dir, service)
}

#[test]
fn test_pool_merges_in_priority_order() {
    let (_dir, service) = load_service(false);

    let pool = service.build_candidate_pool(0);

    assert_eq!(pool.items(), &[1, 2, 3, 4, 5, 6]);
    assert_eq!(pool.count_from(Algorithm::ItemCf), 3);
    assert_eq!(pool.count_from(Algorithm::Als), 1);
    assert_eq!(pool.count_from(Algorithm::Popularity), 2);
    assert_eq!(pool.count_from(Algorithm::TwoTower), 0);

    // item 4 is ALS's first contribution, item 6 is popularity's second
    assert_eq!(pool.rank_features(3), [ABSENT_RANK, 1, ABSENT_RANK, ABSENT_RANK]);
    assert_eq!(pool.rank_features(5), [ABSENT_RANK, ABSENT_RANK, 2, ABSENT_RANK]);
}

#[test]
fn test_pool_is_deterministic() {
    let (_dir, service) = load_service(false);

    assert_eq!(service.build_candidate_pool(0), service.build_candidate_pool(0));
}

#[test]
fn test_warm_request_end_to_end() {
    let (_dir, service) = load_service(false);

    let response = service
        .get_recommendations(0, 4, &RequestContext::default())
        .unwrap();

    assert_eq!(response.user_type, UserType::Warm);
    assert_eq!(response.algorithm, AlgorithmTag::EnsembleWithReranking);
    assert_eq!(response.candidate_count, Some(6));
    assert_eq!(response.recommendations.len(), 4);
    assert_eq!(response.ground_truth, Some(17));
}

#[test]
fn test_cold_request_without_segments_uses_global_order() {
    let dir = tempfile::tempdir().unwrap();
    write_artifacts(dir.path(), false);
    write_json(dir.path(), "pop_list.json", json!((100..120).collect::<Vec<u32>>()));

    let config = config_for(&dir);
    let artifacts = Artifacts::load(&config.model).unwrap();
    assert!(artifacts.segments.is_none());
    let service = RecommendationService::from_artifacts(config, artifacts);

    let response = service
        .get_recommendations(1, 10, &RequestContext::default())
        .unwrap();

    assert_eq!(response.user_type, UserType::Cold);
    assert_eq!(response.algorithm, AlgorithmTag::ContextualPopularity);
    assert_eq!(response.recommendations, (100..110).collect::<Vec<_>>());
}

#[test]
fn test_cold_request_blends_context() {
    let (_dir, service) = load_service(true);
    let context = RequestContext {
        device: Some(0),
        os: Some(1),
        country: Some("de".to_string()),
    };

    let response = service.get_recommendations(1, 10, &context).unwrap();

    // quotas 2/2/3/3 then global backfill
    assert_eq!(
        response.recommendations,
        vec![30, 31, 33, 34, 35, 36, 37, 38, 39, 40]
    );
}

#[test]
fn test_unknown_context_returns_global_items() {
    let (_dir, service) = load_service(true);
    let context = RequestContext {
        device: Some(9999),
        os: Some(9999),
        country: Some("ZZ".to_string()),
    };

    let response = service.get_recommendations(1, 2, &context).unwrap();

    assert_eq!(response.recommendations, vec![5, 6]);
}

#[test]
fn test_out_of_range_user_is_cold() {
    let (_dir, service) = load_service(false);

    for user_id in [2, 65_536, -1] {
        let response = service
            .get_recommendations(user_id, 5, &RequestContext::default())
            .unwrap();
        assert_eq!(response.user_type, UserType::Cold, "user {}", user_id);
    }
}

#[test]
fn test_k_is_clamped() {
    let (_dir, service) = load_service(false);

    let low = service
        .get_recommendations(0, 0, &RequestContext::default())
        .unwrap();
    let high = service
        .get_recommendations(0, 1_000_000, &RequestContext::default())
        .unwrap();

    assert_eq!(low.recommendations.len(), 1);
    assert_eq!(high.recommendations.len(), 6);
}

#[test]
fn test_failing_scorer_keeps_pool_order() {
    let last_clicks = Arc::new(LastClickTable::new(vec![0]));
    let item_embeddings = Arc::new(Array2::<f32>::ones((10, 2)));
    let reranker = GbdtReranker::new(
        Arc::new(FailingScorer),
        Arc::new(Array2::ones((1, 2))),
        item_embeddings,
    );
    assert_eq!(reranker.name(), "gbdt_onnx");

    let popularity = Arc::new(vec![5, 6]);
    let registry = ModelRegistry::new()
        .with_item_cf(
            last_clicks.clone(),
            Arc::new(CandidateTable::from_rows(vec![vec![1, 2, 3]]).unwrap()),
        )
        .with_als(Arc::new(CandidateTable::from_rows(vec![vec![2, 4]]).unwrap()))
        .with_two_tower(Arc::new(CandidateTable::from_rows(vec![vec![7]]).unwrap()))
        .with_popularity(popularity.clone())
        .with_reranker(Box::new(reranker))
        .with_cold_start_handler(Box::new(ContextualPopularity::global_only(popularity)));
    let service =
        RecommendationService::new(Config::default(), registry).with_last_clicks(last_clicks);

    let response = service
        .get_recommendations(0, 10, &RequestContext::default())
        .unwrap();

    assert_eq!(response.recommendations, vec![1, 2, 3, 4, 5, 6, 7]);
    assert_eq!(response.algorithm, AlgorithmTag::EnsembleWithReranking);
}

#[test]
fn test_service_without_tables_is_not_ready() {
    let service = RecommendationService::new(Config::default(), ModelRegistry::new());

    let err = service
        .recommend(&RecommendationRequest {
            user_id: 0,
            k: Some(5),
            env: RequestContext::default(),
        })
        .unwrap_err();

    assert!(matches!(err, AppError::NotReady(_)));
    assert!(err.is_retryable());
}

#[test]
fn test_mapped_candidate_tables_serve_the_same_pool() {
    let dir = tempfile::tempdir().unwrap();
    write_artifacts(dir.path(), false);

    let mut config = config_for(&dir);
    for (json_name, tbl_name) in [
        ("cf_i2i_top300.json", "cf_i2i_top300.tbl"),
        ("als_top100.json", "als_top100.tbl"),
    ] {
        let rows: Vec<Vec<i64>> =
            serde_json::from_str(&fs::read_to_string(dir.path().join(json_name)).unwrap())
                .unwrap();
        CandidateTable::from_rows(rows)
            .unwrap()
            .write_mapped(&dir.path().join(tbl_name))
            .unwrap();
    }
    config.model.cf_candidates_file = "cf_i2i_top300.tbl".to_string();
    config.model.als_candidates_file = "als_top100.tbl".to_string();

    let artifacts = Artifacts::load(&config.model).unwrap();
    assert!(artifacts.cf_candidates.is_mapped());
    assert!(artifacts.als_candidates.is_mapped());
    let service = RecommendationService::from_artifacts(config, artifacts);

    assert_eq!(service.build_candidate_pool(0).items(), &[1, 2, 3, 4, 5, 6]);
}

#[test]
fn test_cold_request_without_any_popularity_reports_no_fallback() {
    let dir = tempfile::tempdir().unwrap();
    write_artifacts(dir.path(), false);
    write_json(dir.path(), "pop_list.json", json!([]));

    let config = config_for(&dir);
    let service = RecommendationService::from_artifacts(
        config.clone(),
        Artifacts::load(&config.model).unwrap(),
    );

    let response = service
        .get_recommendations(1, 5, &RequestContext::default())
        .unwrap();
    let value = serde_json::to_value(&response).unwrap();

    assert_eq!(response.algorithm, AlgorithmTag::Unavailable);
    assert_eq!(value["recommendations"], json!([]));
    assert_eq!(value["algorithm"], json!("none"));
    assert_eq!(value["error"], json!("No fallback available"));
}

#[test]
fn test_missing_required_table_fails_load() {
    let dir = tempfile::tempdir().unwrap();
    write_artifacts(dir.path(), false);
    fs::remove_file(dir.path().join("als_top100.json")).unwrap();

    let result = Artifacts::load(&config_for(&dir).model);

    assert!(matches!(result, Err(AppError::Artifact(_))));
}

#[test]
fn test_status_reports_heuristic_scorer() {
    let (_dir, service) = load_service(false);

    let status = serde_json::to_value(service.status()).unwrap();

    assert_eq!(status["service_ready"], json!(true));
    assert_eq!(status["scorer"], json!("heuristic"));
    assert_eq!(status["registry"]["candidate_generators"], json!(4));
    assert_eq!(status["auxiliary_data"]["ground_truth_count"], json!(1));
}

#[test]
fn test_response_json_shape() {
    let (_dir, service) = load_service(false);

    let cold = service
        .get_recommendations(1, 2, &RequestContext::default())
        .unwrap();
    let value = serde_json::to_value(cold).unwrap();

    assert_eq!(value["user_type"], json!("cold"));
    assert_eq!(value["algorithm"], json!("contextual_popularity"));
    assert_eq!(value["ground_truth"], json!(null));
    assert!(value.get("candidate_count").is_none());
    assert!(value.get("error").is_none());
}
