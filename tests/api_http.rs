// tests/api_http.rs
//
// HTTP-level tests for the public API Router without opening sockets.
// We exercise the router directly via tower::ServiceExt::oneshot.
//
// Covered:
// - GET /health, /taxonomy, /weights
// - POST /analyze (success, context, 422 paths)
// - POST /score

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use serde_json::Value as Json;
use shuttle_axum::axum::{
    body::{self, Body},
    http::{Request, StatusCode},
    Router,
};
use tower::ServiceExt as _; // for `oneshot`

use safety_review_analyzer::ai_adapter::DisabledSuggester;
use safety_review_analyzer::api::{self, AppState};
use safety_review_analyzer::facility::InMemoryLocationProvider;
use safety_review_analyzer::{Analyzer, Taxonomy};

const BODY_LIMIT: usize = 1024 * 1024;

fn test_router() -> Router {
    api::router(AppState::offline().expect("offline state"))
}

fn router_with_locations() -> Router {
    let taxonomy = Arc::new(Taxonomy::builtin().expect("taxonomy"));
    let locations = InMemoryLocationProvider::from_json_str(include_str!("../config/locations.json"))
        .expect("locations");
    let analyzer = Arc::new(Analyzer::new(taxonomy, Arc::new(locations)));
    api::router(AppState::new(
        analyzer,
        Arc::new(DisabledSuggester),
        Duration::from_millis(100),
    ))
}

async fn get_json(app: Router, uri: &str) -> (StatusCode, Json) {
    let req = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .expect("build GET");
    let resp = app.oneshot(req).await.expect("oneshot GET");
    let status = resp.status();
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body");
    (status, serde_json::from_slice(&bytes).expect("json body"))
}

async fn post_json(app: Router, uri: &str, payload: Json) -> (StatusCode, Json) {
    let req = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(payload.to_string()))
        .expect("build POST");
    let resp = app.oneshot(req).await.expect("oneshot POST");
    let status = resp.status();
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body");
    (status, serde_json::from_slice(&bytes).expect("json body"))
}

#[tokio::test]
async fn api_health_returns_200_and_ok_body() {
    let req = Request::builder()
        .method("GET")
        .uri("/health")
        .body(Body::empty())
        .expect("build GET /health");

    let resp = test_router().oneshot(req).await.expect("oneshot /health");
    assert_eq!(resp.status(), StatusCode::OK);

    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body")
        .to_vec();
    assert_eq!(String::from_utf8(bytes).expect("utf8").trim(), "OK");
}

#[tokio::test]
async fn api_analyze_returns_recommendations_score_and_fallback() {
    let (status, v) = post_json(
        test_router(),
        "/analyze",
        json!({ "text": "It was dark and scary walking home; lots of trash.", "rating": 2 }),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "body: {v}");

    let kws: Vec<&str> = v["recommendations"]
        .as_array()
        .expect("recommendations array")
        .iter()
        .filter_map(|c| c["keyword"].as_str())
        .collect();
    for expected in ["unlit", "unsafe", "littered"] {
        assert!(kws.contains(&expected), "missing {expected} in {kws:?}");
    }
    assert_eq!(v["recommendations"][0]["source"], "text");

    // 40 baseline; NS 15, AC 25, Terr 35, Maint 30, Activity 40
    assert_eq!(v["score"]["total"], 25.5);
    assert_eq!(v["score"]["grade"], "E");
    assert_eq!(v["score"]["effective_rating"], 2);

    assert_eq!(v["suggestions"]["used"], false);
    assert_eq!(v["suggestions"]["provider"], "disabled");
    assert!(v["review_id"].as_str().is_some_and(|s| s.len() == 12));
}

#[tokio::test]
async fn api_analyze_blends_location_and_time() {
    let (status, v) = post_json(
        router_with_locations(),
        "/analyze",
        json!({
            "text": "Walked home after work",
            "location": "관악구 신림동",
            "time_of_day": "23:00"
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "body: {v}");

    let recs = v["recommendations"].as_array().expect("array");
    let lighting = recs
        .iter()
        .find(|c| c["category"] == "lighting")
        .expect("lighting candidate");
    assert_eq!(lighting["keyword"], "unlit");
    assert_eq!(lighting["source"], "public-data");
    assert!(recs
        .iter()
        .any(|c| c["keyword"] == "unsafe" && c["source"] == "public-data"));

    assert_eq!(v["context"]["time"]["period"], "night");
    assert_eq!(v["context"]["risk_level"], "high");
    assert!(!v["context"]["recommendations"]
        .as_array()
        .expect("array")
        .is_empty());
}

#[tokio::test]
async fn api_analyze_rejects_bad_input_with_422() {
    let cases = [
        (json!({ "text": "" }), "empty_text"),
        (json!({ "text": 42 }), "not_text"),
        (json!({ "rating": 3 }), "missing_text"),
        (json!({ "text": "abc" }), "too_short"),
        (json!({ "text": "dark street", "rating": 7 }), "rating_out_of_range"),
        (json!({ "text": "dark street", "keywords": [] }), "empty_keywords"),
    ];
    for (payload, code) in cases {
        let (status, v) = post_json(test_router(), "/analyze", payload.clone()).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY, "payload {payload}");
        assert_eq!(v["code"], code, "payload {payload}");
        assert!(v["error"].as_str().is_some());
    }
}

#[tokio::test]
async fn api_score_explicit_selection() {
    let (status, v) = post_json(
        test_router(),
        "/score",
        json!({ "rating": 4, "keywords": [{ "category": "emotional", "keyword": "reassuring" }] }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["total"], 91.0);
    assert_eq!(v["grade"], "A");
    assert_eq!(v["breakdown"]["emotional"]["delta"], 40.0);

    let (status, v) = post_json(test_router(), "/score", json!({ "rating": 4 })).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(v["code"], "empty_keywords");
}

#[tokio::test]
async fn api_taxonomy_and_weights_are_read_only_views() {
    let (status, v) = get_json(test_router(), "/taxonomy").await;
    assert_eq!(status, StatusCode::OK);
    let cats = v["categories"].as_array().expect("categories");
    assert_eq!(cats.len(), 7);
    assert_eq!(cats[0]["name"], "lighting");

    let (status, v) = get_json(test_router(), "/weights").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["weights"]["natural_surveillance"], 0.35);
    assert_eq!(v["weights"]["activity_support"], 0.1);
    assert_eq!(v["grade_thresholds"][0]["min_score"], 60.0);
}
