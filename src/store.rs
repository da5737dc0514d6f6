// src/store.rs
//! Report and cluster storage: a process-local store behind a trait, plus an
//! optional JSON snapshot sink so state survives restarts.
//!
//! Inserts are serialized per record (idempotent on id); the cluster set is
//! replaced wholesale under one write lock so readers never observe a
//! half-updated view. Retention is someone else's job — nothing here deletes
//! reports.

use std::collections::HashMap;
use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::types::{Cluster, Report};

/// Outcome of an insert attempt; duplicates by id are a no-op, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    AlreadyExists,
}

pub trait ReportStore: Send + Sync {
    /// Atomic per-record insert. A second insert with the same id is a no-op.
    fn insert_report(&self, report: Report) -> Result<InsertOutcome>;
    /// All reports, stable order: `created_at` ascending, tie-broken by id.
    fn reports(&self) -> Vec<Report>;
    fn report_count(&self) -> usize;
    /// Mark a report acknowledged. `false` when the id is unknown.
    fn acknowledge(&self, id: &str) -> bool;
    /// Replace the materialized cluster set wholesale.
    fn replace_clusters(&self, clusters: Vec<Cluster>);
    fn clusters(&self) -> Vec<Cluster>;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    reports: RwLock<HashMap<String, Report>>,
    clusters: RwLock<Vec<Cluster>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed from a snapshot taken by [`BackupSink`].
    pub fn from_snapshot(snapshot: StoreSnapshot) -> Self {
        let reports = snapshot
            .reports
            .into_iter()
            .map(|r| (r.id.clone(), r))
            .collect();
        Self {
            reports: RwLock::new(reports),
            clusters: RwLock::new(snapshot.clusters),
        }
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            reports: self.reports(),
            clusters: self.clusters(),
        }
    }
}

impl ReportStore for MemoryStore {
    fn insert_report(&self, report: Report) -> Result<InsertOutcome> {
        let mut map = self.reports.write().expect("report lock poisoned");
        if map.contains_key(&report.id) {
            return Ok(InsertOutcome::AlreadyExists);
        }
        map.insert(report.id.clone(), report);
        Ok(InsertOutcome::Inserted)
    }

    fn reports(&self) -> Vec<Report> {
        let map = self.reports.read().expect("report lock poisoned");
        let mut out: Vec<Report> = map.values().cloned().collect();
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        out
    }

    fn report_count(&self) -> usize {
        self.reports.read().expect("report lock poisoned").len()
    }

    fn acknowledge(&self, id: &str) -> bool {
        let mut map = self.reports.write().expect("report lock poisoned");
        match map.get_mut(id) {
            Some(r) => {
                r.acknowledged = true;
                true
            }
            None => false,
        }
    }

    fn replace_clusters(&self, clusters: Vec<Cluster>) {
        let mut guard = self.clusters.write().expect("cluster lock poisoned");
        *guard = clusters;
    }

    fn clusters(&self) -> Vec<Cluster> {
        self.clusters.read().expect("cluster lock poisoned").clone()
    }
}

/// Serializable point-in-time image of the store.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct StoreSnapshot {
    #[serde(default)]
    pub reports: Vec<Report>,
    #[serde(default)]
    pub clusters: Vec<Cluster>,
}

/// Writes store snapshots to disk, tmp-then-rename so a crash mid-write never
/// leaves a truncated file.
#[derive(Debug, Clone)]
pub struct BackupSink {
    path: PathBuf,
}

impl BackupSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn save(&self, snapshot: &StoreSnapshot) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating backup dir {}", parent.display()))?;
        }
        let json = serde_json::to_string(snapshot).context("serializing store snapshot")?;
        let tmp = self.path.with_extension("json.tmp");
        let mut f = fs::File::create(&tmp)
            .with_context(|| format!("creating backup tmp file {}", tmp.display()))?;
        f.write_all(json.as_bytes()).context("writing backup")?;
        fs::rename(&tmp, &self.path).context("committing backup")?;
        Ok(())
    }

    /// `None` when no backup exists yet; parse errors are real errors.
    pub fn load(&self) -> Result<Option<StoreSnapshot>> {
        if !Path::new(&self.path).exists() {
            return Ok(None);
        }
        let s = fs::read_to_string(&self.path)
            .with_context(|| format!("reading backup {}", self.path.display()))?;
        let snapshot = serde_json::from_str(&s).context("parsing backup snapshot")?;
        Ok(Some(snapshot))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Sentiment;
    use chrono::{TimeZone, Utc};

    fn report(id: &str, hour: u32) -> Report {
        Report {
            id: id.to_string(),
            text: "текст".into(),
            category: "ЖКХ".into(),
            location: "Ленина".into(),
            sentiment: Sentiment::Neutral,
            priority: 2,
            metadata: serde_json::json!({}),
            created_at: Utc.with_ymd_and_hms(2025, 11, 3, hour, 0, 0).unwrap(),
            acknowledged: false,
        }
    }

    #[test]
    fn duplicate_insert_is_noop() {
        let store = MemoryStore::new();
        assert_eq!(
            store.insert_report(report("a", 1)).unwrap(),
            InsertOutcome::Inserted
        );
        assert_eq!(
            store.insert_report(report("a", 2)).unwrap(),
            InsertOutcome::AlreadyExists
        );
        assert_eq!(store.report_count(), 1);
        // The original record wins.
        assert_eq!(store.reports()[0].created_at.time().to_string(), "01:00:00");
    }

    #[test]
    fn reports_come_back_in_stable_order() {
        let store = MemoryStore::new();
        store.insert_report(report("b", 2)).unwrap();
        store.insert_report(report("z", 1)).unwrap();
        store.insert_report(report("a", 2)).unwrap();
        let ids: Vec<String> = store.reports().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["z", "a", "b"]);
    }

    #[test]
    fn acknowledge_flips_flag_once_known() {
        let store = MemoryStore::new();
        store.insert_report(report("a", 1)).unwrap();
        assert!(store.acknowledge("a"));
        assert!(!store.acknowledge("missing"));
        assert!(store.reports()[0].acknowledged);
    }

    #[test]
    fn cluster_swap_is_wholesale() {
        let store = MemoryStore::new();
        store.replace_clusters(vec![Cluster {
            id: "x".into(),
            category: "ЖКХ".into(),
            location: "Ленина".into(),
            frequency: 2,
            severity: 1,
            example_texts: vec![],
            first_seen: Utc::now(),
            last_seen: Utc::now(),
        }]);
        assert_eq!(store.clusters().len(), 1);
        store.replace_clusters(Vec::new());
        assert!(store.clusters().is_empty());
    }

    #[test]
    fn backup_roundtrip_restores_state() {
        let dir = tempfile::tempdir().unwrap();
        let sink = BackupSink::new(dir.path().join("backup.json"));
        let store = MemoryStore::new();
        store.insert_report(report("a", 1)).unwrap();
        store.insert_report(report("b", 2)).unwrap();
        sink.save(&store.snapshot()).unwrap();

        let restored = MemoryStore::from_snapshot(sink.load().unwrap().unwrap());
        assert_eq!(restored.report_count(), 2);
    }

    #[test]
    fn load_without_backup_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let sink = BackupSink::new(dir.path().join("missing.json"));
        assert!(sink.load().unwrap().is_none());
    }
}
