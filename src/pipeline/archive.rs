// src/pipeline/archive.rs

//! Retention for archived snapshot bodies.

use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::error::Result;
use crate::models::Fingerprint;
use crate::storage::{FingerprintStore, SnapshotArchive};

/// Outcome of a pruning pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PruneReport {
    pub examined: usize,
    pub removed: usize,
    /// Kept because a record still references them
    pub referenced: usize,
    /// Unreferenced but inside the retention window
    pub retained: usize,
}

/// Remove snapshots that no record references and that are older than
/// `retention`.
///
/// A snapshot counts as referenced while any record holds it as current or
/// last alerted fingerprint.
pub async fn prune_snapshots(
    store: &dyn FingerprintStore,
    archive: &dyn SnapshotArchive,
    retention: Duration,
    now: DateTime<Utc>,
) -> Result<PruneReport> {
    let mut referenced: HashSet<Fingerprint> = HashSet::new();
    for domain in store.list_domains().await? {
        for record in store.list_by_domain(&domain).await? {
            referenced.insert(record.current_fingerprint);
            if let Some(alerted) = record.last_alerted_fingerprint {
                referenced.insert(alerted);
            }
        }
    }

    let cutoff = now - retention;
    let mut report = PruneReport::default();
    for entry in archive.list().await? {
        report.examined += 1;
        if referenced.contains(&entry.fingerprint) {
            report.referenced += 1;
        } else if entry.stored_at >= cutoff {
            report.retained += 1;
        } else if archive.remove(&entry.fingerprint).await? {
            report.removed += 1;
        }
    }

    log::info!(
        "Pruned {} of {} snapshots ({} referenced, {} within retention)",
        report.removed,
        report.examined,
        report.referenced,
        report.retained
    );
    Ok(report)
}
