// src/pipeline/stats.rs

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::error::Result;
use crate::storage::FingerprintStore;

/// Tracking statistics for one domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DomainStats {
    pub domain: String,
    pub total_files: usize,
    /// Files seen in the most recent scan
    pub active_files: usize,
    /// Files first seen within the last 24 hours
    pub new_last_24h: usize,
    /// Files whose current version has been alerted
    pub alerted_files: usize,
    pub last_scan_at: Option<DateTime<Utc>>,
}

/// Compute statistics for a domain as of `now`.
pub async fn domain_stats(
    store: &dyn FingerprintStore,
    domain: &str,
    now: DateTime<Utc>,
) -> Result<DomainStats> {
    let records = store.list_by_domain(domain).await?;
    let last_scan_at = records.iter().map(|r| r.last_seen_at).max();
    let since = now - Duration::hours(24);

    Ok(DomainStats {
        domain: domain.to_string(),
        total_files: records.len(),
        active_files: records
            .iter()
            .filter(|r| Some(r.last_seen_at) == last_scan_at)
            .count(),
        new_last_24h: records.iter().filter(|r| r.first_seen_at >= since).count(),
        alerted_files: records.iter().filter(|r| r.is_alerted()).count(),
        last_scan_at,
    })
}
