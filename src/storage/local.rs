//! Local filesystem storage implementation.
//!
//! Implements both [`FingerprintStore`] and [`SnapshotArchive`] on a single
//! root directory. Every write goes to a uniquely named temp file that is
//! then renamed over the target, so readers never observe a torn document.
//!
//! ## Storage Layout
//!
//! ```text
//! {root}/
//! ├── records/
//! │   └── {key}.json        # url -> FileRecord for one domain, see `storage_key`
//! └── snapshots/
//!     └── {fp[0..2]}/
//!         └── {fp}          # raw body
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::error::{AppError, Result};
use crate::models::{FileRecord, Fingerprint};
use crate::storage::{FingerprintStore, SnapshotArchive, SnapshotEntry, apply_alert};
use crate::utils::storage_key;

const RECORDS_DIR: &str = "records";
const SNAPSHOTS_DIR: &str = "snapshots";

/// On-disk document holding one domain's records.
#[derive(Debug, Default, Serialize, Deserialize)]
struct DomainRecords {
    domain: String,
    #[serde(default)]
    records: BTreeMap<String, FileRecord>,
}

/// Local filesystem storage backend.
pub struct LocalStorage {
    root_dir: PathBuf,
    /// Serializes read-modify-write of record documents.
    write_lock: Mutex<()>,
    tmp_counter: AtomicU64,
}

impl LocalStorage {
    /// Create a new LocalStorage rooted at the given directory.
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            write_lock: Mutex::new(()),
            tmp_counter: AtomicU64::new(0),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root_dir
    }

    fn records_path(&self, domain: &str) -> PathBuf {
        let file_name = format!("{}.json", storage_key(domain));
        self.root_dir.join(RECORDS_DIR).join(file_name)
    }

    fn snapshot_path(&self, fingerprint: &Fingerprint) -> PathBuf {
        let fp = fingerprint.as_str();
        let shard = &fp[..fp.len().min(2)];
        self.root_dir.join(SNAPSHOTS_DIR).join(shard).join(fp)
    }

    /// Ensure parent directory exists.
    async fn ensure_dir(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    /// Write bytes atomically (write to temp, then rename).
    async fn write_bytes(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        Self::ensure_dir(path).await?;

        let nonce = self.tmp_counter.fetch_add(1, Ordering::Relaxed);
        let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
        tmp_name.push(format!(".{}.{}.tmp", std::process::id(), nonce));
        let tmp = path.with_file_name(tmp_name);

        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        if let Err(e) = tokio::fs::rename(&tmp, path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(AppError::Io(e));
        }
        Ok(())
    }

    /// Read bytes, returning None if file doesn't exist.
    async fn read_bytes(path: &Path) -> Result<Option<Vec<u8>>> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::Io(e)),
        }
    }

    async fn load_domain(&self, domain: &str) -> Result<DomainRecords> {
        let path = self.records_path(domain);
        match Self::read_bytes(&path).await.map_err(unavailable)? {
            Some(bytes) => {
                let doc: DomainRecords = serde_json::from_slice(&bytes).map_err(|e| {
                    AppError::store(format!("corrupt record file {}: {}", path.display(), e))
                })?;
                if doc.domain != domain {
                    return Err(AppError::store(format!(
                        "record file {} belongs to '{}', not '{}'",
                        path.display(),
                        doc.domain,
                        domain
                    )));
                }
                Ok(doc)
            }
            None => Ok(DomainRecords {
                domain: domain.to_string(),
                records: BTreeMap::new(),
            }),
        }
    }

    async fn save_domain(&self, doc: &DomainRecords) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(doc)?;
        self.write_bytes(&self.records_path(&doc.domain), &bytes)
            .await
            .map_err(unavailable)
    }
}

/// Map filesystem failures to the store taxonomy.
fn unavailable(error: AppError) -> AppError {
    match error {
        AppError::Io(e) => AppError::store(e),
        other => other,
    }
}

#[async_trait]
impl FingerprintStore for LocalStorage {
    async fn get(&self, domain: &str, url: &str) -> Result<Option<FileRecord>> {
        let doc = self.load_domain(domain).await?;
        Ok(doc.records.get(url).cloned())
    }

    async fn list_by_domain(&self, domain: &str) -> Result<Vec<FileRecord>> {
        let doc = self.load_domain(domain).await?;
        Ok(doc.records.into_values().collect())
    }

    async fn upsert(&self, record: &FileRecord) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut doc = self.load_domain(&record.domain).await?;
        doc.records.insert(record.url.clone(), record.clone());
        self.save_domain(&doc).await
    }

    async fn record_alert(
        &self,
        domain: &str,
        url: &str,
        fingerprint: &Fingerprint,
    ) -> Result<FileRecord> {
        let _guard = self.write_lock.lock().await;
        let mut doc = self.load_domain(domain).await?;
        let record = doc
            .records
            .get_mut(url)
            .ok_or_else(|| AppError::RecordNotFound {
                domain: domain.to_string(),
                url: url.to_string(),
            })?;
        apply_alert(record, fingerprint)?;
        let updated = record.clone();
        self.save_domain(&doc).await?;
        Ok(updated)
    }

    async fn list_domains(&self) -> Result<Vec<String>> {
        let dir = self.root_dir.join(RECORDS_DIR);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(AppError::store(e)),
        };

        let mut domains = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(AppError::store)? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let bytes = tokio::fs::read(&path).await.map_err(AppError::store)?;
            match serde_json::from_slice::<DomainRecords>(&bytes) {
                Ok(doc) => domains.push(doc.domain),
                Err(e) => log::warn!("Skipping unreadable record file {}: {}", path.display(), e),
            }
        }
        domains.sort();
        Ok(domains)
    }

    async fn ping(&self) -> Result<()> {
        for dir in [RECORDS_DIR, SNAPSHOTS_DIR] {
            tokio::fs::create_dir_all(self.root_dir.join(dir))
                .await
                .map_err(|e| {
                    AppError::store(format!("{} not writable: {}", self.root_dir.display(), e))
                })?;
        }
        Ok(())
    }
}

#[async_trait]
impl SnapshotArchive for LocalStorage {
    async fn get(&self, fingerprint: &Fingerprint) -> Result<Option<String>> {
        let path = self.snapshot_path(fingerprint);
        match Self::read_bytes(&path).await.map_err(unavailable)? {
            Some(bytes) => String::from_utf8(bytes).map(Some).map_err(|e| {
                AppError::store(format!("snapshot {} is not UTF-8: {}", fingerprint.short(), e))
            }),
            None => Ok(None),
        }
    }

    async fn put(&self, fingerprint: &Fingerprint, body: &str) -> Result<bool> {
        let path = self.snapshot_path(fingerprint);
        if tokio::fs::try_exists(&path).await.map_err(AppError::store)? {
            return Ok(false);
        }
        self.write_bytes(&path, body.as_bytes())
            .await
            .map_err(unavailable)?;
        Ok(true)
    }

    async fn contains(&self, fingerprint: &Fingerprint) -> Result<bool> {
        tokio::fs::try_exists(self.snapshot_path(fingerprint))
            .await
            .map_err(AppError::store)
    }

    async fn list(&self) -> Result<Vec<SnapshotEntry>> {
        let root = self.root_dir.join(SNAPSHOTS_DIR);
        let mut shards = match tokio::fs::read_dir(&root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(AppError::store(e)),
        };

        let mut result = Vec::new();
        while let Some(shard) = shards.next_entry().await.map_err(AppError::store)? {
            if !shard.file_type().await.map_err(AppError::store)?.is_dir() {
                continue;
            }
            let mut files = tokio::fs::read_dir(shard.path())
                .await
                .map_err(AppError::store)?;
            while let Some(file) = files.next_entry().await.map_err(AppError::store)? {
                let name = file.file_name().to_string_lossy().to_string();
                if name.ends_with(".tmp") {
                    continue;
                }
                let modified = file
                    .metadata()
                    .await
                    .and_then(|m| m.modified())
                    .map_err(AppError::store)?;
                result.push(SnapshotEntry {
                    fingerprint: Fingerprint::from_hex(name),
                    stored_at: DateTime::<Utc>::from(modified),
                });
            }
        }
        result.sort_by(|a, b| a.fingerprint.cmp(&b.fingerprint));
        Ok(result)
    }

    async fn remove(&self, fingerprint: &Fingerprint) -> Result<bool> {
        match tokio::fs::remove_file(self.snapshot_path(fingerprint)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(AppError::store(e)),
        }
    }
}
