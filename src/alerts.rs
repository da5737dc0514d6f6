// src/alerts.rs
//! High-priority alert signal: fired once per qualifying report, throttled
//! per (category, location) key.
//!
//! The gate owns only the per-key `last_alert_time` map, process-lifetime
//! state. Fan-out is behind [`AlertSink`]; the default sink writes a
//! structured log line and bumps a counter.

use chrono::{DateTime, Duration, Utc};
use metrics::counter;
use std::collections::HashMap;

use crate::config::AlertConfig;
use crate::types::Report;

/// What a sink receives when a signal fires.
#[derive(Debug, Clone)]
pub struct AlertPayload {
    pub report_id: String,
    pub category: String,
    pub location: String,
    pub priority: i64,
    pub text: String,
    pub timestamp_iso: String,
}

impl AlertPayload {
    fn from_report(report: &Report, now: DateTime<Utc>) -> Self {
        Self {
            report_id: report.id.clone(),
            category: report.category.clone(),
            location: report.location.clone(),
            priority: report.priority,
            text: report.text.clone(),
            timestamp_iso: now.to_rfc3339(),
        }
    }
}

pub trait AlertSink: Send + Sync {
    fn deliver(&self, payload: &AlertPayload);
}

/// Default sink: structured log + counter. Dashboards tail the log.
#[derive(Debug, Default)]
pub struct TracingSink;

impl AlertSink for TracingSink {
    fn deliver(&self, payload: &AlertPayload) {
        counter!("alerts_fired_total").increment(1);
        tracing::warn!(
            report_id = %payload.report_id,
            category = %payload.category,
            location = %payload.location,
            priority = payload.priority,
            "high-priority report"
        );
    }
}

/// Cooldown gate over (category, location). First alert for a key always
/// passes; inside the cooldown further alerts for the same key are suppressed;
/// a different key is independent.
#[derive(Debug)]
pub struct AlertGate {
    critical_threshold: i64,
    cooldown: Duration,
    last_alert: HashMap<(String, String), DateTime<Utc>>,
}

impl AlertGate {
    pub fn new(cfg: &AlertConfig) -> Self {
        Self {
            critical_threshold: cfg.critical_threshold,
            cooldown: Duration::seconds(cfg.cooldown_secs.max(0)),
            last_alert: HashMap::new(),
        }
    }

    /// Evaluate a freshly persisted report. Delivers to the sink at most once
    /// per qualifying report and records the key's alert time on delivery.
    pub fn observe(&mut self, report: &Report, now: DateTime<Utc>, sink: &dyn AlertSink) -> bool {
        if report.priority < self.critical_threshold {
            return false;
        }
        let key = (report.category.clone(), report.location.clone());
        if let Some(last) = self.last_alert.get(&key) {
            if now.signed_duration_since(*last) < self.cooldown {
                counter!("alerts_suppressed_total").increment(1);
                return false;
            }
        }
        sink.deliver(&AlertPayload::from_report(report, now));
        self.last_alert.insert(key, now);
        true
    }
}
