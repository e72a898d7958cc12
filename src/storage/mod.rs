//! Storage abstractions for fingerprint state and archived bodies.
//!
//! Two contracts, both shared by every domain worker:
//! - [`FingerprintStore`]: `(domain, url) -> FileRecord`, atomic per key
//! - [`SnapshotArchive`]: content-addressed bodies keyed by fingerprint
//!
//! ## Directory Structure
//!
//! ```text
//! storage/
//! ├── records/              # One document per domain
//! │   ├── example.com.json
//! │   └── cdn.example.org.json
//! └── snapshots/            # Immutable bodies, sharded by fingerprint prefix
//!     ├── 3f/
//!     │   └── 3fa1...e9
//!     └── c0/
//!         └── c04d...17
//! ```

pub mod local;
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::{FileRecord, Fingerprint};

// Re-export for convenience
pub use local::LocalStorage;
pub use memory::MemoryStorage;

/// An archived body as listed by [`SnapshotArchive::list`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotEntry {
    pub fingerprint: Fingerprint,
    pub stored_at: DateTime<Utc>,
}

/// Persistent mapping of `(domain, url)` to its [`FileRecord`].
///
/// Each `upsert` and `record_alert` is all-or-nothing for its key. A scan
/// over many URLs is not transactional as a whole.
#[async_trait]
pub trait FingerprintStore: Send + Sync {
    /// Fetch one record.
    async fn get(&self, domain: &str, url: &str) -> Result<Option<FileRecord>>;

    /// All records held for a domain.
    async fn list_by_domain(&self, domain: &str) -> Result<Vec<FileRecord>>;

    /// Insert or replace the record for `(record.domain, record.url)`.
    async fn upsert(&self, record: &FileRecord) -> Result<()>;

    /// Set `last_alerted_fingerprint` on an existing record.
    ///
    /// Fails with `RecordNotFound` when the key is absent and with
    /// `InvalidAlert` when `fingerprint` is not the record's current one.
    async fn record_alert(
        &self,
        domain: &str,
        url: &str,
        fingerprint: &Fingerprint,
    ) -> Result<FileRecord>;

    /// Every domain with at least one record.
    async fn list_domains(&self) -> Result<Vec<String>>;

    /// Cheap reachability probe.
    async fn ping(&self) -> Result<()>;
}

/// Content-addressed storage of file bodies.
#[async_trait]
pub trait SnapshotArchive: Send + Sync {
    /// Body stored under a fingerprint, if any.
    async fn get(&self, fingerprint: &Fingerprint) -> Result<Option<String>>;

    /// Store a body. Returns `false` if it was already present.
    async fn put(&self, fingerprint: &Fingerprint, body: &str) -> Result<bool>;

    async fn contains(&self, fingerprint: &Fingerprint) -> Result<bool>;

    async fn list(&self) -> Result<Vec<SnapshotEntry>>;

    /// Delete a body. Returns `false` if it was not present.
    async fn remove(&self, fingerprint: &Fingerprint) -> Result<bool>;
}

/// Shared `record_alert` rule: only the current fingerprint may be marked.
pub(crate) fn apply_alert(record: &mut FileRecord, fingerprint: &Fingerprint) -> Result<()> {
    if record.current_fingerprint != *fingerprint {
        return Err(crate::error::AppError::InvalidAlert {
            url: record.url.clone(),
            fingerprint: fingerprint.to_string(),
        });
    }
    record.last_alerted_fingerprint = Some(fingerprint.clone());
    Ok(())
}
