// src/api.rs
//! Read-side HTTP surface: reports, clusters, a dashboard summary, and the
//! acknowledge mutation. Everything else in the system is background work.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tower_http::cors::CorsLayer;

use crate::pipeline::Pipeline;
use crate::store::ReportStore;
use crate::types::{Cluster, Report};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ReportStore>,
    pub pipeline: Arc<Pipeline>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/reports", get(list_reports))
        .route("/reports/{id}/acknowledge", post(acknowledge))
        .route("/clusters", get(list_clusters))
        .route("/clusters/recompute", post(recompute_clusters))
        .route("/summary", get(summary))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

#[derive(serde::Deserialize, Default)]
struct ReportsQuery {
    category: Option<String>,
    location: Option<String>,
    min_priority: Option<i64>,
    #[serde(default)]
    include_acknowledged: bool,
    limit: Option<usize>,
}

/// Newest first; filters are conjunctive.
async fn list_reports(
    State(state): State<AppState>,
    Query(q): Query<ReportsQuery>,
) -> Json<Vec<Report>> {
    let mut reports = state.store.reports();
    reports.retain(|r| {
        q.category.as_deref().is_none_or(|c| r.category == c)
            && q.location.as_deref().is_none_or(|l| r.location == l)
            && q.min_priority.is_none_or(|p| r.priority >= p)
            && (q.include_acknowledged || !r.acknowledged)
    });
    reports.reverse();
    if let Some(limit) = q.limit {
        reports.truncate(limit);
    }
    Json(reports)
}

async fn acknowledge(State(state): State<AppState>, Path(id): Path<String>) -> StatusCode {
    if state.store.acknowledge(&id) {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

/// Highest severity first, then frequency.
async fn list_clusters(State(state): State<AppState>) -> Json<Vec<Cluster>> {
    let mut clusters = state.store.clusters();
    clusters.sort_by(|a, b| {
        b.severity
            .cmp(&a.severity)
            .then(b.frequency.cmp(&a.frequency))
            .then(a.id.cmp(&b.id))
    });
    Json(clusters)
}

/// On-demand recompute, same operation the periodic task runs.
async fn recompute_clusters(State(state): State<AppState>) -> Json<serde_json::Value> {
    let n = state.pipeline.recompute_and_store_clusters();
    Json(serde_json::json!({ "clusters": n }))
}

#[derive(serde::Serialize, PartialEq, Eq, Debug)]
struct CategoryCount {
    category: String,
    count: usize,
}

#[derive(serde::Serialize)]
struct Summary {
    reports_total: usize,
    reports_last_24h: usize,
    critical_unacknowledged: usize,
    clusters_total: usize,
    max_cluster_severity: u8,
    /// Categories of the last 24 hours, most frequent first.
    top_categories: Vec<CategoryCount>,
}

async fn summary(State(state): State<AppState>) -> Json<Summary> {
    let reports = state.store.reports();
    let clusters = state.store.clusters();
    let critical = state.pipeline.config().alerts.critical_threshold;

    let cutoff = chrono::Utc::now() - chrono::Duration::hours(24);
    let recent: Vec<&Report> = reports.iter().filter(|r| r.created_at >= cutoff).collect();

    let mut by_category: std::collections::HashMap<&str, usize> = std::collections::HashMap::new();
    for r in &recent {
        *by_category.entry(r.category.as_str()).or_default() += 1;
    }
    let mut top_categories: Vec<CategoryCount> = by_category
        .into_iter()
        .map(|(category, count)| CategoryCount {
            category: category.to_string(),
            count,
        })
        .collect();
    top_categories.sort_by(|a, b| b.count.cmp(&a.count).then(a.category.cmp(&b.category)));
    top_categories.truncate(5);

    Json(Summary {
        reports_total: reports.len(),
        reports_last_24h: recent.len(),
        critical_unacknowledged: reports
            .iter()
            .filter(|r| r.priority >= critical && !r.acknowledged)
            .count(),
        clusters_total: clusters.len(),
        max_cluster_severity: clusters.iter().map(|c| c.severity).max().unwrap_or(0),
        top_categories,
    })
}
