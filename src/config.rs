// src/config.rs
//! Pipeline configuration: one TOML file with compiled-in defaults for every
//! section, so the service boots without any config present.
//!
//! Resolution order: `$MONITOR_CONFIG_PATH` → `config/pipeline.toml` →
//! built-in defaults. Policy numbers (severity steps, prefix length, cooldown)
//! are tunables, not invariants; only monotonicity and bounds are enforced
//! after load.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

pub const ENV_CONFIG_PATH: &str = "MONITOR_CONFIG_PATH";
pub const DEFAULT_CONFIG_PATH: &str = "config/pipeline.toml";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub normalizer: NormalizerConfig,
    #[serde(default)]
    pub content: ContentConfig,
    #[serde(default)]
    pub dedup: DedupConfig,
    #[serde(default)]
    pub adapter: AdapterConfig,
    #[serde(default)]
    pub cluster: ClusterPolicy,
    #[serde(default)]
    pub alerts: AlertConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NormalizerConfig {
    /// Spans shorter than this after stripping are rejected as uninformative.
    pub min_chars: usize,
    /// Spans longer than this are rejected as non-report dumps.
    pub max_chars: usize,
    /// Extra boilerplate line patterns (regex), merged with the built-in set.
    #[serde(default)]
    pub extra_patterns: Vec<String>,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            min_chars: 30,
            max_chars: 8000,
            extra_patterns: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContentConfig {
    /// Spans shorter than this are not worth an oracle call.
    pub min_chars: usize,
    /// Keyword sets for the content-type heuristic; data, not code.
    #[serde(default)]
    pub keywords: crate::content::KeywordSets,
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            min_chars: 30,
            keywords: crate::content::KeywordSets::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DedupConfig {
    /// Normalized texts shorter than this are never fingerprinted (treated as
    /// always-distinct to avoid over-suppressing short legitimate reports).
    pub min_chars: usize,
    /// Fingerprint covers only this many leading normalized chars. Catches
    /// republished near-duplicates cheaply; misses duplicates that differ only
    /// in their opening sentence. Accepted trade-off.
    pub prefix_chars: usize,
    /// Long-lived dedup scope, seconds. Default 7 days.
    pub window_secs: u64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            min_chars: 30,
            prefix_chars: 100,
            window_secs: 7 * 24 * 3600,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AdapterConfig {
    /// Substituted when the oracle omits or nulls `category`.
    pub fallback_category: String,
    /// Substituted when the oracle returns an object with no usable fields.
    pub null_bag_category: String,
    /// Substituted when the oracle omits `location`.
    pub fallback_location: String,
    /// Report text cap.
    pub max_text_chars: usize,
    /// Oracle input cap (chars sent per classify call).
    pub max_oracle_input_chars: usize,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            fallback_category: "Другое".to_string(),
            null_bag_category: "Новости".to_string(),
            fallback_location: "Екатеринбург".to_string(),
            max_text_chars: 500,
            max_oracle_input_chars: 1200,
        }
    }
}

/// One severity step: groups with `frequency >= min_frequency` get at least
/// `severity`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct SeverityStep {
    pub min_frequency: usize,
    pub severity: u8,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClusterPolicy {
    /// Trailing window for cluster recomputation, seconds. Default 7 days.
    pub window_secs: u64,
    /// Step function mapping frequency to severity. Normalized on load to be
    /// monotonic and bounded to 1..=3.
    #[serde(default = "ClusterPolicy::default_steps")]
    pub severity_steps: Vec<SeverityStep>,
    /// Max example texts per cluster.
    pub max_examples: usize,
}

impl ClusterPolicy {
    fn default_steps() -> Vec<SeverityStep> {
        vec![
            SeverityStep {
                min_frequency: 2,
                severity: 1,
            },
            SeverityStep {
                min_frequency: 3,
                severity: 2,
            },
            SeverityStep {
                min_frequency: 5,
                severity: 3,
            },
        ]
    }

    /// Sort steps, clamp severities to 1..=3, and force monotonicity so a
    /// malformed config cannot produce a severity that decreases with
    /// frequency.
    pub fn normalize(&mut self) {
        if self.severity_steps.is_empty() {
            self.severity_steps = Self::default_steps();
        }
        self.severity_steps.sort_by_key(|s| s.min_frequency);
        let mut floor = 1u8;
        for step in &mut self.severity_steps {
            step.severity = step.severity.clamp(1, 3).max(floor);
            floor = step.severity;
        }
        if self.max_examples == 0 {
            self.max_examples = 3;
        }
    }

    /// Severity for a group of the given size. Groups below the first step
    /// (i.e. singletons) are not clusters; callers drop them before asking.
    pub fn severity_for(&self, frequency: usize) -> u8 {
        let mut sev = 1u8;
        for step in &self.severity_steps {
            if frequency >= step.min_frequency {
                sev = step.severity;
            }
        }
        sev
    }
}

impl Default for ClusterPolicy {
    fn default() -> Self {
        Self {
            window_secs: 7 * 24 * 3600,
            severity_steps: Self::default_steps(),
            max_examples: 3,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AlertConfig {
    /// Reports with priority >= this fire the high-priority signal.
    pub critical_threshold: i64,
    /// Per-(category, location) cooldown, seconds.
    pub cooldown_secs: i64,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            critical_threshold: 2,
            cooldown_secs: 1800,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct IngestConfig {
    /// Batch period, seconds. Default hourly.
    pub interval_secs: u64,
    /// Fixed delay between sources within a batch, milliseconds.
    pub source_delay_ms: u64,
    /// Longer cooldown applied after a batch-level failure, seconds.
    pub error_cooldown_secs: u64,
    /// Cluster recomputation period, seconds. Default 30 minutes.
    pub cluster_interval_secs: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            interval_secs: 3600,
            source_delay_ms: 2000,
            error_cooldown_secs: 300,
            cluster_interval_secs: 1800,
        }
    }
}

impl PipelineConfig {
    /// Load using env override + default path; absent file means defaults.
    pub fn load_default() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            return Self::from_path(&PathBuf::from(p));
        }
        let default = Path::new(DEFAULT_CONFIG_PATH);
        if default.exists() {
            return Self::from_path(default);
        }
        let mut cfg = Self::default();
        cfg.cluster.normalize();
        Ok(cfg)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading pipeline config at {}", path.display()))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let mut cfg: PipelineConfig = toml::from_str(s).context("parsing pipeline config")?;
        cfg.cluster.normalize();
        Ok(cfg)
    }
}
