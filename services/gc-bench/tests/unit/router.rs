//! Routing tests against the in-process router

use axum::http::StatusCode;
use futures::future::join_all;
use gc_bench::{BenchConfig, MemoryMode};
use pretty_assertions::assert_eq;
use rstest::*;

use crate::{create_test_config, get, init_test_env, test_app};

#[fixture]
fn config() -> BenchConfig {
    init_test_env();
    create_test_config()
}

#[rstest]
#[tokio::test]
async fn test_root_returns_success_token(config: BenchConfig) {
    let app = test_app(&config, true);
    let (status, body) = get(app, "/").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "success");
}

#[rstest]
#[tokio::test]
async fn test_root_is_stateless_across_requests(config: BenchConfig) {
    let app = test_app(&config, true);
    for _ in 0..20 {
        let (status, body) = get(app.clone(), "/").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "success");
    }
}

#[rstest]
#[case(MemoryMode::Off)]
#[case(MemoryMode::Retained)]
#[case(MemoryMode::Transient)]
#[tokio::test]
async fn test_every_memory_mode_serves(mut config: BenchConfig, #[case] mode: MemoryMode) {
    config.workload.memory_mode = mode;
    let app = test_app(&config, true);
    let (status, body) = get(app, "/").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "success");
}

#[rstest]
#[tokio::test]
async fn test_custom_success_token(mut config: BenchConfig) {
    config.workload.success_token = "Hello".to_string();
    let (_, body) = get(test_app(&config, true), "/").await;
    assert_eq!(body, "Hello");
}

#[rstest]
#[tokio::test]
async fn test_exhaustion_fails_only_the_request(mut config: BenchConfig) {
    config.workload.memory_elements = usize::MAX;
    let app = test_app(&config, true);

    let (status, _) = get(app.clone(), "/").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

    let (status, _) = get(app, "/gc-stats").await;
    assert_eq!(status, StatusCode::OK);
}

#[rstest]
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_root_requests_at_depth_30(mut config: BenchConfig) {
    config.workload.cpu_depth = 30;
    let app = test_app(&config, true);

    let requests = (0..8).map(|_| get(app.clone(), "/"));
    for (status, body) in join_all(requests).await {
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "success");
    }
}

#[rstest]
#[tokio::test]
async fn test_stats_degrade_to_zero_report(config: BenchConfig) {
    let (status, body) = get(test_app(&config, true), "/gc-stats").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("num_collections: 0"));
    assert!(body.contains("pauses_ns: []"));
    assert!(body.contains("bytes_reclaimed: 0"));
}

#[rstest]
#[tokio::test]
async fn test_stats_as_json(config: BenchConfig) {
    let (status, body) = get(test_app(&config, true), "/gc-stats?format=json").await;
    assert_eq!(status, StatusCode::OK);

    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["num_collections"], 0);
    assert_eq!(json["pause_total_ns"], 0);
    assert_eq!(json["bytes_reclaimed"], 0);
    assert!(json["last_collection"].is_null());
    assert_eq!(json["pauses_ns"], serde_json::json!([]));
}

#[rstest]
#[case("/gc-stats?format=json&format=text")]
#[case("/gc-stats?format")]
#[case("/gc-stats?format=%ZZ")]
#[tokio::test]
async fn test_stats_unparseable_query_falls_back_to_text(
    config: BenchConfig,
    #[case] uri: &str,
) {
    let (status, body) = get(test_app(&config, true), uri).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("num_collections: 0"));
}

#[rstest]
#[case("/debug/pprof")]
#[case("/debug/pprof/")]
#[tokio::test]
async fn test_profiling_index_when_mounted(config: BenchConfig, #[case] uri: &str) {
    let (status, body) = get(test_app(&config, true), uri).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("/debug/pprof/heap"));
}

#[rstest]
#[case("/debug/pprof/heap", "live_bytes")]
#[case("/debug/pprof/runtime", "workers")]
#[tokio::test]
async fn test_profiles_are_served(config: BenchConfig, #[case] uri: &str, #[case] expected: &str) {
    let (status, body) = get(test_app(&config, true), uri).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains(expected), "{uri} body: {body}");
}

#[rstest]
#[tokio::test]
async fn test_profiling_absent_when_served_separately(config: BenchConfig) {
    let (status, _) = get(test_app(&config, false), "/debug/pprof/heap").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[rstest]
#[tokio::test]
async fn test_unknown_path_is_not_found(config: BenchConfig) {
    let (status, _) = get(test_app(&config, true), "/does-not-exist").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[rstest]
#[tokio::test]
async fn test_diagnostics_app_serves_profiles_only() {
    let app = gc_bench::server::create_diagnostics_app(crate::inactive_memory());
    let (status, _) = get(app.clone(), "/debug/pprof/cmdline").await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = get(app, "/").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
