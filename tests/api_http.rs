// tests/api_http.rs
//
// HTTP-level tests for the public API Router without opening sockets.
// We exercise the router directly via tower::ServiceExt::oneshot.
//
// Covered:
// - GET /health
// - GET /reports (filters)
// - POST /reports/{id}/acknowledge
// - POST /clusters/recompute + GET /clusters
// - GET /summary

use std::sync::Arc;

use axum::{
    body::{self, Body},
    http::{Request, StatusCode},
    Router,
};
use chrono::{Duration, Utc};
use serde_json::Value as Json;
use tower::ServiceExt as _; // for `oneshot`

use municipal_monitor::alerts::{AlertPayload, AlertSink};
use municipal_monitor::api::{create_router, AppState};
use municipal_monitor::config::PipelineConfig;
use municipal_monitor::oracle::DisabledClassifier;
use municipal_monitor::pipeline::Pipeline;
use municipal_monitor::store::{MemoryStore, ReportStore};
use municipal_monitor::types::{Report, Sentiment};

const BODY_LIMIT: usize = 1024 * 1024; // 1MB, safe for tests

struct NullSink;
impl AlertSink for NullSink {
    fn deliver(&self, _: &AlertPayload) {}
}

// Recent timestamps so the reports fall inside the 7-day clustering window;
// larger `hours_ago` means older.
fn report(id: &str, category: &str, location: &str, priority: i64, hours_ago: i64) -> Report {
    Report {
        id: id.to_string(),
        text: format!("сообщение {id}"),
        category: category.to_string(),
        location: location.to_string(),
        sentiment: Sentiment::Negative,
        priority,
        metadata: serde_json::json!({}),
        created_at: Utc::now() - Duration::hours(hours_ago),
        acknowledged: false,
    }
}

/// Build the same Router the binary uses, seeded with a few reports.
fn test_router() -> (Router, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    for r in [
        report("a1", "ЖКХ", "Ленина", 3, 3),
        report("a2", "ЖКХ", "Ленина", 1, 2),
        report("a3", "Дороги", "Мира", 2, 1),
    ] {
        store.insert_report(r).expect("seed report");
    }

    let pipeline = Arc::new(
        Pipeline::new(
            PipelineConfig::default(),
            Arc::new(DisabledClassifier),
            store.clone(),
            Arc::new(NullSink),
        )
        .expect("pipeline"),
    );
    let state = AppState {
        store: store.clone(),
        pipeline,
    };
    (create_router(state), store)
}

async fn get_json(app: Router, uri: &str) -> Json {
    let req = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .expect("build GET");
    let resp = app.oneshot(req).await.expect("oneshot");
    assert!(resp.status().is_success(), "GET {uri} -> {}", resp.status());
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body")
        .to_vec();
    serde_json::from_slice(&bytes).expect("parse json")
}

#[tokio::test]
async fn api_health_returns_200_and_ok_body() {
    let (app, _) = test_router();

    let req = Request::builder()
        .method("GET")
        .uri("/health")
        .body(Body::empty())
        .expect("build GET /health");

    let resp = app.oneshot(req).await.expect("oneshot /health");
    assert_eq!(resp.status(), StatusCode::OK, "health should be 200");

    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body")
        .to_vec();
    let body = String::from_utf8(bytes).expect("utf8");
    assert_eq!(body.trim(), "ok");
}

#[tokio::test]
async fn api_reports_filters_are_conjunctive() {
    let (app, _) = test_router();
    // category=ЖКХ, url-encoded
    let v = get_json(app, "/reports?category=%D0%96%D0%9A%D0%A5&min_priority=2").await;
    let arr = v.as_array().expect("array");
    assert_eq!(arr.len(), 1);
    assert_eq!(arr[0]["id"], "a1");
}

#[tokio::test]
async fn api_reports_limit_and_order_newest_first() {
    let (app, _) = test_router();
    let v = get_json(app, "/reports?limit=2").await;
    let arr = v.as_array().expect("array");
    assert_eq!(arr.len(), 2);
    assert_eq!(arr[0]["id"], "a3", "newest first");
}

#[tokio::test]
async fn api_acknowledge_hides_report_from_default_listing() {
    let (app, store) = test_router();

    let req = Request::builder()
        .method("POST")
        .uri("/reports/a1/acknowledge")
        .body(Body::empty())
        .expect("build POST acknowledge");
    let resp = app.clone().oneshot(req).await.expect("oneshot acknowledge");
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    assert!(store.reports().iter().any(|r| r.id == "a1" && r.acknowledged));

    let v = get_json(app.clone(), "/reports").await;
    assert!(v.as_array().unwrap().iter().all(|r| r["id"] != "a1"));
    let v = get_json(app, "/reports?include_acknowledged=true").await;
    assert!(v.as_array().unwrap().iter().any(|r| r["id"] == "a1"));
}

#[tokio::test]
async fn api_acknowledge_unknown_id_is_404() {
    let (app, _) = test_router();
    let req = Request::builder()
        .method("POST")
        .uri("/reports/nope/acknowledge")
        .body(Body::empty())
        .expect("build POST acknowledge");
    let resp = app.oneshot(req).await.expect("oneshot acknowledge");
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn api_recompute_then_list_clusters() {
    let (app, _) = test_router();

    let req = Request::builder()
        .method("POST")
        .uri("/clusters/recompute")
        .body(Body::empty())
        .expect("build POST recompute");
    let resp = app.clone().oneshot(req).await.expect("oneshot recompute");
    assert!(resp.status().is_success());
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body")
        .to_vec();
    let v: Json = serde_json::from_slice(&bytes).expect("json");
    // Only (ЖКХ, Ленина) has two members; (Дороги, Мира) is a singleton.
    assert_eq!(v["clusters"], 1);

    let v = get_json(app, "/clusters").await;
    let arr = v.as_array().expect("array");
    assert_eq!(arr.len(), 1);
    assert_eq!(arr[0]["category"], "ЖКХ");
    assert_eq!(arr[0]["frequency"], 2);
    assert_eq!(arr[0]["severity"], 1);
}

#[tokio::test]
async fn api_summary_windows_to_last_day_with_top_categories() {
    let (app, store) = test_router();
    store.acknowledge("a3");
    // An old report: counted in the total, excluded from the 24h window.
    store
        .insert_report(report("old", "Дороги", "Вторчермет", 1, 48))
        .expect("seed old report");

    let v = get_json(app, "/summary").await;
    assert_eq!(v["reports_total"], 4);
    assert_eq!(v["reports_last_24h"], 3);
    // a1 (priority 3) is the only unacknowledged report at/above threshold 2.
    assert_eq!(v["critical_unacknowledged"], 1);

    let top = v["top_categories"].as_array().expect("array");
    assert_eq!(top[0]["category"], "ЖКХ");
    assert_eq!(top[0]["count"], 2);
    assert_eq!(top[1]["category"], "Дороги");
    assert_eq!(top[1]["count"], 1);
}
