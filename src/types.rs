// src/types.rs
//! Core data model: spans flowing through the ingestion pipeline and the
//! persisted `Report` / derived `Cluster` records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where a raw span came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SourceType {
    Web,
    Channel,
    Group,
}

/// A raw scraped text block as delivered by the scraping collaborator.
/// Transient; never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawSpan {
    pub source_url: String,
    pub source_type: SourceType,
    pub fetched_at: DateTime<Utc>,
    pub text: String,
}

/// A span that survived normalization: boilerplate stripped, length in bounds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanSpan {
    pub text: String,
    pub source_url: String,
    pub fetched_at: DateTime<Utc>,
}

/// Three-way sentiment as stored on a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Negative,
    Neutral,
}

/// A validated, persisted report. Immutable after insert except `acknowledged`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub id: String,
    /// Short text body, <=500 chars.
    pub text: String,
    /// Never empty; the adapter substitutes a fallback label when the oracle
    /// omits a category.
    pub category: String,
    /// Free text or the configured fallback locality.
    pub location: String,
    pub sentiment: Sentiment,
    /// Coerced integer, 0..=5.
    pub priority: i64,
    /// Verbatim oracle response plus source/timing context, kept for audit.
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    /// Status field mutated by downstream consumers.
    #[serde(default)]
    pub acknowledged: bool,
}

/// Materialized grouping of reports sharing (category, location) within the
/// clustering window. Recomputable; never the source of truth.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cluster {
    pub id: String,
    pub category: String,
    pub location: String,
    /// Always > 1; singleton groups are not clusters.
    pub frequency: usize,
    /// 1..=3, monotonic non-decreasing in frequency.
    pub severity: u8,
    /// Up to 3 earliest-seen report texts, stable across re-runs.
    pub example_texts: Vec<String>,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

/// Stable short hex id over the given parts. Uses sha2 so ids survive process
/// restarts (unlike `DefaultHasher` output).
pub fn stable_id(parts: &[&str]) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    for p in parts {
        hasher.update(p.as_bytes());
        hasher.update([0u8]); // separator so ("ab","c") != ("a","bc")
    }
    let digest = hasher.finalize();
    let mut out = String::with_capacity(16);
    for b in digest.iter().take(8) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}
