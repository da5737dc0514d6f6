// src/pipeline.rs
//! Batch ingestion pipeline: fetch → normalize → content-log → dedup →
//! oracle → adapt → persist → alert, per source, skip-and-continue.
//!
//! Single-threaded and batch-oriented on purpose. The oracle call dominates
//! latency; everything else is cheap local work. No shared mutable state
//! crosses sources within a batch except the batch-local dedup set, which is
//! owned by the batch and dropped at its end.

use chrono::Utc;
use metrics::{counter, describe_counter, describe_gauge, gauge};
use once_cell::sync::OnceCell;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;

use crate::alerts::{AlertGate, AlertSink};
use crate::cluster::recompute_clusters;
use crate::config::PipelineConfig;
use crate::content::ContentClassifier;
use crate::dedup::{BatchDedup, WindowDedup};
use crate::normalize::Normalizer;
use crate::oracle::{adapter, Classifier as _, DynClassifier};
use crate::sources::SpanProvider;
use crate::store::{InsertOutcome, ReportStore};
use crate::types::RawSpan;

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("ingest_spans_total", "Raw spans fetched from providers.");
        describe_counter!(
            "ingest_rejected_total",
            "Spans dropped at normalize/length stage."
        );
        describe_counter!("ingest_dedup_total", "Spans suppressed as duplicates.");
        describe_counter!(
            "ingest_oracle_empty_total",
            "Spans for which the oracle returned nothing parseable."
        );
        describe_counter!("reports_created_total", "Reports persisted.");
        describe_counter!(
            "ingest_content_type_total",
            "Span content types from the keyword heuristic."
        );
        describe_counter!("ingest_provider_errors_total", "Provider fetch errors.");
        describe_counter!("ingest_runs_total", "Ingest scheduler ticks.");
        describe_counter!(
            "ingest_batch_errors_total",
            "Batch-level ingest failures (scheduler backs off)."
        );
        describe_counter!("alerts_fired_total", "High-priority signals delivered.");
        describe_counter!(
            "alerts_suppressed_total",
            "High-priority signals suppressed by cooldown."
        );
        describe_gauge!("clusters_current", "Clusters in the materialized set.");
        describe_gauge!(
            "ingest_last_run_ts",
            "Unix ts when the ingest batch last completed."
        );
    });
}

/// Per-batch outcome counts, for the log line at batch end.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchStats {
    pub fetched: usize,
    pub rejected: usize,
    pub duplicates: usize,
    pub oracle_empty: usize,
    pub persisted: usize,
}

pub struct Pipeline {
    config: PipelineConfig,
    normalizer: Normalizer,
    content: ContentClassifier,
    classifier: DynClassifier,
    store: Arc<dyn ReportStore>,
    // Process-lifetime state, shared with nothing else.
    window_dedup: Mutex<WindowDedup>,
    alert_gate: Mutex<AlertGate>,
    alert_sink: Arc<dyn AlertSink>,
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        classifier: DynClassifier,
        store: Arc<dyn ReportStore>,
        alert_sink: Arc<dyn AlertSink>,
    ) -> Result<Self> {
        ensure_metrics_described();
        let normalizer = Normalizer::new(&config.normalizer)?;
        let content = ContentClassifier::new(&config.content);
        let window_dedup = Mutex::new(WindowDedup::new(config.dedup.window_secs));
        let alert_gate = Mutex::new(AlertGate::new(&config.alerts));
        Ok(Self {
            config,
            normalizer,
            content,
            classifier,
            store,
            window_dedup,
            alert_gate,
            alert_sink,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run one ingestion batch over the given providers. Per-item faults are
    /// recovered locally; a provider that fails to fetch is skipped. Only
    /// returns `Err` for batch-level faults the scheduler should back off on.
    pub async fn run_batch(&self, providers: &[Box<dyn SpanProvider>]) -> Result<BatchStats> {
        let mut stats = BatchStats::default();
        let mut batch_dedup = BatchDedup::new();
        let delay = Duration::from_millis(self.config.ingest.source_delay_ms);

        for (i, provider) in providers.iter().enumerate() {
            if i > 0 {
                // Fixed pause between sources; external endpoints rate-limit.
                tokio::time::sleep(delay).await;
            }
            let spans = match provider.fetch_latest().await {
                Ok(s) => s,
                Err(e) => {
                    counter!("ingest_provider_errors_total").increment(1);
                    tracing::warn!(source = provider.name(), error = ?e, "provider fetch failed");
                    continue;
                }
            };
            stats.fetched += spans.len();
            counter!("ingest_spans_total").increment(spans.len() as u64);

            for span in &spans {
                self.process_span(span, &mut batch_dedup, &mut stats).await;
            }
        }

        gauge!("ingest_last_run_ts").set(Utc::now().timestamp() as f64);
        tracing::info!(
            fetched = stats.fetched,
            rejected = stats.rejected,
            duplicates = stats.duplicates,
            oracle_empty = stats.oracle_empty,
            persisted = stats.persisted,
            "ingest batch done"
        );
        Ok(stats)
    }

    /// One span through the whole chain. Never returns an error — every fault
    /// here is per-item and recovered by skipping.
    async fn process_span(
        &self,
        span: &RawSpan,
        batch_dedup: &mut BatchDedup,
        stats: &mut BatchStats,
    ) {
        let Some(clean) = self.normalizer.normalize(span) else {
            stats.rejected += 1;
            counter!("ingest_rejected_total").increment(1);
            return;
        };

        // Advisory only: the content type is logged, never used to gate.
        let content_type = self.content.classify_and_count(&clean.text);
        if !self.content.admit(&clean.text) {
            stats.rejected += 1;
            counter!("ingest_rejected_total").increment(1);
            return;
        }
        tracing::debug!(
            content_type = content_type.as_str(),
            source = %clean.source_url,
            "span admitted"
        );

        if !batch_dedup.check_and_admit(&clean.text, &self.config.dedup) {
            stats.duplicates += 1;
            counter!("ingest_dedup_total").increment(1);
            return;
        }
        // Check only; the window fingerprint is recorded after a report is
        // committed. A span that yields nothing (oracle outage, quota) stays
        // eligible for the next batch instead of being suppressed for the
        // whole window.
        {
            let mut window = self.window_dedup.lock().expect("window dedup poisoned");
            if window.is_duplicate(clean.fetched_at, &clean.text, &self.config.dedup) {
                stats.duplicates += 1;
                counter!("ingest_dedup_total").increment(1);
                return;
            }
        }

        let oracle_input: String = clean
            .text
            .chars()
            .take(self.config.adapter.max_oracle_input_chars)
            .collect();
        let results = self
            .classifier
            .classify(
                &oracle_input,
                &clean.source_url,
                &clean.source_url,
                &clean.fetched_at.to_rfc3339(),
            )
            .await;

        let Some(reports) = adapter::adapt_all(
            &results,
            &clean.text,
            &clean.source_url,
            clean.fetched_at,
            &self.config.adapter,
        ) else {
            stats.oracle_empty += 1;
            counter!("ingest_oracle_empty_total").increment(1);
            return;
        };

        let mut committed = false;
        for report in reports {
            match self.store.insert_report(report.clone()) {
                Ok(InsertOutcome::Inserted) => {
                    committed = true;
                    stats.persisted += 1;
                    counter!("reports_created_total").increment(1);
                    let mut gate = self.alert_gate.lock().expect("alert gate poisoned");
                    gate.observe(&report, Utc::now(), self.alert_sink.as_ref());
                }
                Ok(InsertOutcome::AlreadyExists) => {
                    committed = true;
                    stats.duplicates += 1;
                    counter!("ingest_dedup_total").increment(1);
                }
                Err(e) => {
                    // Per-item persistence failure: log and move to next span.
                    tracing::error!(report_id = %report.id, error = ?e, "report insert failed");
                }
            }
        }
        if committed {
            let mut window = self.window_dedup.lock().expect("window dedup poisoned");
            window.admit(clean.fetched_at, &clean.text, &self.config.dedup);
        }
    }

    /// Recompute and atomically swap the materialized cluster set.
    pub fn recompute_and_store_clusters(&self) -> usize {
        let reports = self.store.reports();
        let clusters = recompute_clusters(&reports, Utc::now(), &self.config.cluster);
        let n = clusters.len();
        self.store.replace_clusters(clusters);
        gauge!("clusters_current").set(n as f64);
        tracing::info!(clusters = n, "cluster set recomputed");
        n
    }
}
