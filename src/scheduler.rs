// src/scheduler.rs
//! Periodic drivers: the hourly ingest batch and the half-hourly cluster
//! recompute, each on its own tokio task.
//!
//! A failed batch does not retry immediately — the loop sleeps through a
//! longer error cooldown and lets the next period try again.

use metrics::counter;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::pipeline::Pipeline;
use crate::sources::{build_providers, SourceSpec};
use crate::store::{BackupSink, MemoryStore};

/// Spawn the ingest loop. Providers are rebuilt each tick so a source list
/// edit takes effect without restart on the next period.
pub fn spawn_ingest_loop(
    pipeline: Arc<Pipeline>,
    specs: Vec<SourceSpec>,
    store: Arc<MemoryStore>,
    backup: Option<BackupSink>,
) -> JoinHandle<()> {
    let interval = pipeline.config().ingest.interval_secs;
    let error_cooldown = pipeline.config().ingest.error_cooldown_secs;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(interval.max(1)));
        loop {
            ticker.tick().await;
            counter!("ingest_runs_total").increment(1);
            let providers = build_providers(&specs);
            if providers.is_empty() {
                tracing::warn!("no sources configured, skipping ingest tick");
                continue;
            }
            match pipeline.run_batch(&providers).await {
                Ok(stats) => {
                    if stats.persisted > 0 {
                        if let Some(sink) = &backup {
                            if let Err(e) = sink.save(&store.snapshot()) {
                                tracing::error!(error = ?e, "store backup failed");
                            }
                        }
                    }
                }
                Err(e) => {
                    // Batch-level fault: back off instead of busy-looping.
                    counter!("ingest_batch_errors_total").increment(1);
                    tracing::error!(error = ?e, cooldown_secs = error_cooldown, "ingest batch failed");
                    tokio::time::sleep(Duration::from_secs(error_cooldown)).await;
                }
            }
        }
    })
}

/// Spawn the cluster recompute loop. Reads committed reports only; needs no
/// coordination with ingestion beyond the store's own locking.
pub fn spawn_cluster_loop(pipeline: Arc<Pipeline>) -> JoinHandle<()> {
    let interval = pipeline.config().ingest.cluster_interval_secs;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(interval.max(1)));
        loop {
            ticker.tick().await;
            pipeline.recompute_and_store_clusters();
        }
    })
}
