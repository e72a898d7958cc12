// src/pipeline/registrar.rs

//! Commits per-URL scan outcomes back into storage.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::{FileRecord, Fingerprint};
use crate::storage::{FingerprintStore, SnapshotArchive};

/// Writes the post-scan state of one URL.
#[derive(Clone)]
pub struct Registrar {
    store: Arc<dyn FingerprintStore>,
    archive: Arc<dyn SnapshotArchive>,
}

impl Registrar {
    pub fn new(store: Arc<dyn FingerprintStore>, archive: Arc<dyn SnapshotArchive>) -> Self {
        Self { store, archive }
    }

    /// Archive the body and advance the record for `(domain, url)`.
    ///
    /// `observed_at` is the scan's timestamp. Replaying the same commit
    /// leaves the store unchanged. `last_alerted_fingerprint` only moves
    /// when `alerted` is set.
    pub async fn commit(
        &self,
        domain: &str,
        url: &str,
        fingerprint: &Fingerprint,
        body: &str,
        alerted: bool,
        observed_at: DateTime<Utc>,
    ) -> Result<FileRecord> {
        // Archive before the record points at it
        self.archive.put(fingerprint, body).await?;

        let record = match self.store.get(domain, url).await? {
            None => FileRecord::first_observation(domain, url, fingerprint.clone(), observed_at),
            Some(mut record) => {
                if record.last_seen_at < observed_at {
                    record.last_seen_at = observed_at;
                }
                if record.current_fingerprint != *fingerprint {
                    record.current_fingerprint = fingerprint.clone();
                    record.last_modified_at = observed_at;
                }
                record
            }
        };

        let record = if alerted {
            FileRecord {
                last_alerted_fingerprint: Some(fingerprint.clone()),
                ..record
            }
        } else {
            record
        };

        self.store.upsert(&record).await?;
        log::debug!(
            "[{}] committed {} at {}{}",
            domain,
            url,
            fingerprint.short(),
            if alerted { " (alerted)" } else { "" }
        );
        Ok(record)
    }
}
