// src/dedup.rs
//! Deduplicator: bounded-prefix fingerprinting over comparison-normalized text.
//!
//! Two scopes, two concerns:
//! - [`BatchDedup`] lives for one ingestion batch and prevents redundant
//!   oracle calls on near-identical spans within the batch.
//! - [`WindowDedup`] is the longer-lived (default 7-day) scope that suppresses
//!   republished copies across batches; entries expire with the window.
//!
//! The fingerprint covers only a bounded prefix of the normalized text
//! (default 100 chars). Republished wire stories usually share their lead, so
//! this catches them cheaply; duplicates that differ only in their opening
//! sentence slip through, and genuinely different reports sharing a prefix are
//! (rarely) suppressed. Both are accepted trade-offs — exact full-text hashing
//! would defeat the point of catching copies with minor formatting drift.

use chrono::{DateTime, Duration, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{HashMap, HashSet};

use crate::config::DedupConfig;
use crate::types::stable_id;

// Embedded timestamps vary across otherwise-identical republished copies;
// strip them before comparing.
static RE_DATETIME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d{4}-\d{2}-\d{2}[ T]\d{2}:\d{2}(:\d{2})?").unwrap());
static RE_CLOCK: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\d{1,2}:\d{2}\b").unwrap());
static RE_DATE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\d{1,2}\.\d{2}\.\d{4}\b").unwrap());
static RE_WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Case-fold, strip embedded dates/clock-times, collapse whitespace.
pub fn normalize_for_comparison(text: &str) -> String {
    let mut out = text.to_lowercase();
    out = RE_DATETIME.replace_all(&out, " ").into_owned();
    out = RE_CLOCK.replace_all(&out, " ").into_owned();
    out = RE_DATE.replace_all(&out, " ").into_owned();
    out = RE_WS.replace_all(&out, " ").into_owned();
    out.trim().to_string()
}

/// Stable hash of a bounded-length prefix of the normalized text. `None` when
/// the normalized text is below the minimum length — short spans are never
/// fingerprinted (always treated as distinct).
pub fn fingerprint(text: &str, cfg: &DedupConfig) -> Option<String> {
    let norm = normalize_for_comparison(text);
    if norm.chars().count() < cfg.min_chars {
        return None;
    }
    let prefix: String = norm.chars().take(cfg.prefix_chars).collect();
    Some(stable_id(&[&prefix]))
}

/// Batch-local fingerprint set. Exclusively owned by one ingestion batch and
/// discarded at batch end.
#[derive(Debug, Default)]
pub struct BatchDedup {
    seen: HashSet<String>,
}

impl BatchDedup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_duplicate(&self, text: &str, cfg: &DedupConfig) -> bool {
        match fingerprint(text, cfg) {
            Some(fp) => self.seen.contains(&fp),
            None => false,
        }
    }

    /// Record the span's fingerprint. Short spans are a no-op.
    pub fn admit(&mut self, text: &str, cfg: &DedupConfig) {
        if let Some(fp) = fingerprint(text, cfg) {
            self.seen.insert(fp);
        }
    }

    /// Combined check: returns `true` if the span is new (and records it),
    /// `false` if it is a duplicate within this batch.
    pub fn check_and_admit(&mut self, text: &str, cfg: &DedupConfig) -> bool {
        match fingerprint(text, cfg) {
            Some(fp) => self.seen.insert(fp),
            None => true,
        }
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

/// Longer-lived dedup scope keyed the same way, with TTL equal to the dedup
/// window. Survives across batches within the process lifetime.
#[derive(Debug)]
pub struct WindowDedup {
    seen: HashMap<String, DateTime<Utc>>,
    window: Duration,
}

impl WindowDedup {
    pub fn new(window_secs: u64) -> Self {
        Self {
            seen: HashMap::new(),
            window: Duration::seconds(window_secs.min(i64::MAX as u64) as i64),
        }
    }

    /// Returns `true` if a live fingerprint for the span already exists.
    /// Records nothing — admission is a separate, explicit step so callers
    /// can defer it until the span actually produced a committed record.
    pub fn is_duplicate(&mut self, now: DateTime<Utc>, text: &str, cfg: &DedupConfig) -> bool {
        self.evict_expired(now);
        match fingerprint(text, cfg) {
            Some(fp) => self.seen.contains_key(&fp),
            None => false,
        }
    }

    /// Record the span's fingerprint at `now`. Short spans are a no-op;
    /// re-admission keeps the first-seen timestamp.
    pub fn admit(&mut self, now: DateTime<Utc>, text: &str, cfg: &DedupConfig) {
        if let Some(fp) = fingerprint(text, cfg) {
            self.seen.entry(fp).or_insert(now);
        }
    }

    /// Combined check-then-record, for callers without a deferred-commit step.
    pub fn check_and_admit(&mut self, now: DateTime<Utc>, text: &str, cfg: &DedupConfig) -> bool {
        if self.is_duplicate(now, text, cfg) {
            return false;
        }
        self.admit(now, text, cfg);
        true
    }

    fn evict_expired(&mut self, now: DateTime<Utc>) {
        let window = self.window;
        self.seen.retain(|_, ts| now.signed_duration_since(*ts) <= window);
    }

    pub fn clear(&mut self) {
        self.seen.clear();
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn cfg() -> DedupConfig {
        DedupConfig::default()
    }

    #[test]
    fn comparison_normalization_strips_times() {
        let a = normalize_for_comparison("Авария на сетях, свет отключён с 10:32 на Ленина");
        let b = normalize_for_comparison("Авария на сетях, свет отключён с 10:45 на Ленина");
        assert_eq!(a, b);
    }

    #[test]
    fn identical_prefixes_are_duplicates_in_batch() {
        let c = cfg();
        let mut batch = BatchDedup::new();
        // Lead is longer than the 100-char fingerprint prefix, so the two
        // texts share their entire fingerprinted region.
        let lead = "Прорыв теплотрассы на улице Мира, без тепла остались двенадцать жилых домов, ремонт по плану продлится до позднего вечера";
        let copy = format!("{} Дополнение редакции с новыми подробностями.", lead);

        assert!(batch.check_and_admit(lead, &c));
        assert!(!batch.check_and_admit(&copy, &c), "shared 100-char prefix");
    }

    #[test]
    fn short_spans_are_never_fingerprinted() {
        let c = cfg();
        let mut batch = BatchDedup::new();
        assert!(batch.check_and_admit("короткий текст", &c));
        assert!(batch.check_and_admit("короткий текст", &c));
        assert!(batch.is_empty());
    }

    #[test]
    fn window_dedup_expires_entries() {
        let c = cfg();
        let mut win = WindowDedup::new(3600);
        let t0 = Utc.with_ymd_and_hms(2025, 11, 3, 8, 0, 0).unwrap();
        let text = "Свалка строительного мусора у дома на Победы растёт уже вторую неделю подряд";

        assert!(win.check_and_admit(t0, text, &c));
        assert!(!win.check_and_admit(t0 + Duration::minutes(30), text, &c));
        assert!(win.check_and_admit(t0 + Duration::hours(2), text, &c));
    }

    #[test]
    fn window_check_records_nothing_until_admitted() {
        let c = cfg();
        let mut win = WindowDedup::new(3600);
        let t0 = Utc.with_ymd_and_hms(2025, 11, 3, 8, 0, 0).unwrap();
        let text = "Котельная на Эльмаше остановлена на внеплановый ремонт, без тепла три квартала";

        assert!(!win.is_duplicate(t0, text, &c));
        // A second check still passes: the span was never admitted.
        assert!(!win.is_duplicate(t0 + Duration::minutes(10), text, &c));
        win.admit(t0, text, &c);
        assert!(win.is_duplicate(t0 + Duration::minutes(20), text, &c));
    }

    #[test]
    fn window_clear_resets_state() {
        let c = cfg();
        let mut win = WindowDedup::new(3600);
        let t0 = Utc.with_ymd_and_hms(2025, 11, 3, 8, 0, 0).unwrap();
        let text = "Лифт в девятиэтажке на Ботанике не работает с прошлой пятницы, жители жалуются";
        assert!(win.check_and_admit(t0, text, &c));
        win.clear();
        assert!(win.check_and_admit(t0, text, &c));
    }
}
