//! Municipal Monitor — Binary Entrypoint
//! Boots the Axum HTTP server and the background ingest/cluster loops.
//!
//! See `README.md` for quickstart.

use std::sync::Arc;

use shuttle_axum::ShuttleAxum;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use municipal_monitor::api::{create_router, AppState};
use municipal_monitor::config::PipelineConfig;
use municipal_monitor::metrics::Metrics;
use municipal_monitor::oracle::{build_classifier, Classifier as _};
use municipal_monitor::pipeline::Pipeline;
use municipal_monitor::scheduler::{spawn_cluster_loop, spawn_ingest_loop};
use municipal_monitor::sources::load_sources;
use municipal_monitor::store::{BackupSink, MemoryStore};

/// Enable compact tracing logs in development only.
/// Activation requires BOTH:
///   - dev environment (debug build OR SHUTTLE_ENV in {local, development, dev})
///   - MONITOR_DEV_LOG=1
fn enable_dev_tracing() {
    let dev_flag = std::env::var("MONITOR_DEV_LOG")
        .ok()
        .is_some_and(|v| v == "1");

    let is_dev_env = cfg!(debug_assertions)
        || matches!(
            std::env::var("SHUTTLE_ENV")
                .unwrap_or_default()
                .to_ascii_lowercase()
                .as_str(),
            "local" | "development" | "dev"
        );

    if !(dev_flag && is_dev_env) {
        return;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("municipal_monitor=info,warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    enable_dev_tracing();

    let config = PipelineConfig::load_default().expect("Failed to load pipeline config");
    let metrics = Metrics::init(config.ingest.interval_secs);

    // Restore persisted state if a backup exists.
    let backup = BackupSink::new("cache/store_backup.json");
    let store = match backup.load() {
        Ok(Some(snapshot)) => Arc::new(MemoryStore::from_snapshot(snapshot)),
        Ok(None) => Arc::new(MemoryStore::new()),
        Err(e) => {
            tracing::warn!(error = ?e, "backup unreadable, starting empty");
            Arc::new(MemoryStore::new())
        }
    };

    let classifier = build_classifier();
    tracing::info!(provider = classifier.provider_name(), "classifier ready");

    let pipeline = Arc::new(
        Pipeline::new(
            config,
            classifier,
            store.clone(),
            Arc::new(municipal_monitor::alerts::TracingSink),
        )
        .expect("Failed to build pipeline"),
    );

    let sources = load_sources().expect("Failed to load sources config");
    spawn_ingest_loop(
        pipeline.clone(),
        sources,
        store.clone(),
        Some(backup),
    );
    spawn_cluster_loop(pipeline.clone());

    let state = AppState {
        store: store.clone(),
        pipeline,
    };
    let router = create_router(state).merge(metrics.router());

    Ok(router.into())
}
