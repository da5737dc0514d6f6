// src/cluster.rs
//! Clustering Engine: groups reports by (category, location) over a trailing
//! window and materializes [`Cluster`] aggregates.
//!
//! Clusters are a view, never the source of truth — the whole set is
//! recomputed and swapped wholesale each period, so it is always safe to drop
//! and rebuild. Grouping is exact string match on `location`; free-text
//! spellings of the same place do not merge. Known limitation, left visible
//! rather than special-cased.

use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;

use crate::config::ClusterPolicy;
use crate::types::{stable_id, Cluster, Report};

/// Recompute the full cluster set from the reports whose `created_at` falls
/// within the trailing window ending at `now`. Idempotent over an unchanged
/// report set; output ordering is deterministic (grouped keys sort
/// lexicographically, examples sort by `created_at` then `id`).
pub fn recompute_clusters(reports: &[Report], now: DateTime<Utc>, policy: &ClusterPolicy) -> Vec<Cluster> {
    let window = Duration::seconds(policy.window_secs.min(i64::MAX as u64) as i64);
    let cutoff = now - window;

    // BTreeMap keeps group iteration order stable across runs.
    let mut groups: BTreeMap<(String, String), Vec<&Report>> = BTreeMap::new();
    for report in reports {
        if report.created_at < cutoff || report.created_at > now {
            continue;
        }
        groups
            .entry((report.category.clone(), report.location.clone()))
            .or_default()
            .push(report);
    }

    let mut clusters = Vec::new();
    for ((category, location), mut members) in groups {
        // Singletons are not clusters.
        if members.len() < 2 {
            continue;
        }
        members.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

        let frequency = members.len();
        let severity = policy.severity_for(frequency);
        let first_seen = members.first().map(|r| r.created_at).unwrap_or(now);
        let last_seen = members.last().map(|r| r.created_at).unwrap_or(now);
        let example_texts: Vec<String> = members
            .iter()
            .take(policy.max_examples)
            .map(|r| r.text.clone())
            .collect();

        clusters.push(Cluster {
            id: stable_id(&[&category, &location]),
            category,
            location,
            frequency,
            severity,
            example_texts,
            first_seen,
            last_seen,
        });
    }
    clusters
}
