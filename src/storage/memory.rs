//! In-memory storage for tests and dry runs.
//!
//! Uses `HashMap`s behind `std::sync::RwLock`. Nothing survives the process.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::{AppError, Result};
use crate::models::{FileRecord, Fingerprint};
use crate::storage::{FingerprintStore, SnapshotArchive, SnapshotEntry, apply_alert};

type RecordKey = (String, String);

/// In-memory store implementing both storage contracts.
#[derive(Default)]
pub struct MemoryStorage {
    records: RwLock<HashMap<RecordKey, FileRecord>>,
    snapshots: RwLock<HashMap<Fingerprint, (String, DateTime<Utc>)>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of archived bodies.
    pub fn snapshot_count(&self) -> usize {
        self.snapshots.read().map(|s| s.len()).unwrap_or(0)
    }

    /// Archive a body with an explicit timestamp.
    pub fn put_at(&self, fingerprint: &Fingerprint, body: &str, stored_at: DateTime<Utc>) {
        if let Ok(mut snapshots) = self.snapshots.write() {
            snapshots
                .entry(fingerprint.clone())
                .or_insert_with(|| (body.to_string(), stored_at));
        }
    }
}

fn poisoned<T>(_: T) -> AppError {
    AppError::store("in-memory store lock poisoned")
}

#[async_trait]
impl FingerprintStore for MemoryStorage {
    async fn get(&self, domain: &str, url: &str) -> Result<Option<FileRecord>> {
        let records = self.records.read().map_err(poisoned)?;
        Ok(records
            .get(&(domain.to_string(), url.to_string()))
            .cloned())
    }

    async fn list_by_domain(&self, domain: &str) -> Result<Vec<FileRecord>> {
        let records = self.records.read().map_err(poisoned)?;
        let mut list: Vec<FileRecord> = records
            .values()
            .filter(|r| r.domain == domain)
            .cloned()
            .collect();
        list.sort_by(|a, b| a.url.cmp(&b.url));
        Ok(list)
    }

    async fn upsert(&self, record: &FileRecord) -> Result<()> {
        let mut records = self.records.write().map_err(poisoned)?;
        records.insert(
            (record.domain.clone(), record.url.clone()),
            record.clone(),
        );
        Ok(())
    }

    async fn record_alert(
        &self,
        domain: &str,
        url: &str,
        fingerprint: &Fingerprint,
    ) -> Result<FileRecord> {
        let mut records = self.records.write().map_err(poisoned)?;
        let record = records
            .get_mut(&(domain.to_string(), url.to_string()))
            .ok_or_else(|| AppError::RecordNotFound {
                domain: domain.to_string(),
                url: url.to_string(),
            })?;
        apply_alert(record, fingerprint)?;
        Ok(record.clone())
    }

    async fn list_domains(&self) -> Result<Vec<String>> {
        let records = self.records.read().map_err(poisoned)?;
        let mut domains: Vec<String> = records.keys().map(|(d, _)| d.clone()).collect();
        domains.sort();
        domains.dedup();
        Ok(domains)
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl SnapshotArchive for MemoryStorage {
    async fn get(&self, fingerprint: &Fingerprint) -> Result<Option<String>> {
        let snapshots = self.snapshots.read().map_err(poisoned)?;
        Ok(snapshots.get(fingerprint).map(|(body, _)| body.clone()))
    }

    async fn put(&self, fingerprint: &Fingerprint, body: &str) -> Result<bool> {
        let mut snapshots = self.snapshots.write().map_err(poisoned)?;
        if snapshots.contains_key(fingerprint) {
            return Ok(false);
        }
        snapshots.insert(fingerprint.clone(), (body.to_string(), Utc::now()));
        Ok(true)
    }

    async fn contains(&self, fingerprint: &Fingerprint) -> Result<bool> {
        let snapshots = self.snapshots.read().map_err(poisoned)?;
        Ok(snapshots.contains_key(fingerprint))
    }

    async fn list(&self) -> Result<Vec<SnapshotEntry>> {
        let snapshots = self.snapshots.read().map_err(poisoned)?;
        let mut list: Vec<SnapshotEntry> = snapshots
            .iter()
            .map(|(fp, (_, stored_at))| SnapshotEntry {
                fingerprint: fp.clone(),
                stored_at: *stored_at,
            })
            .collect();
        list.sort_by(|a, b| a.fingerprint.cmp(&b.fingerprint));
        Ok(list)
    }

    async fn remove(&self, fingerprint: &Fingerprint) -> Result<bool> {
        let mut snapshots = self.snapshots.write().map_err(poisoned)?;
        Ok(snapshots.remove(fingerprint).is_some())
    }
}
