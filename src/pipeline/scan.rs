// src/pipeline/scan.rs

//! One domain's scan cycle.
//!
//! ```text
//! observed set ─► classify ─► gate ─► diff/analyze ─► notify ─► commit
//!                    ▲                                            │
//!                    └──────────── FingerprintStore ◄─────────────┘
//! ```
//!
//! The whole cycle runs under the domain's lease. Stored state is read once
//! up front; a store failure there aborts before anything is written. After
//! that, URLs are notified and committed one at a time in classifier order.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{AppError, Result};
use crate::models::{
    AlertDecision, AlertKind, Classification, FileRecord, ObservedFile, ObservedSet,
};
use crate::pipeline::classify::classify;
use crate::pipeline::diff::diff_against_archive;
use crate::pipeline::gate::should_alert;
use crate::pipeline::lease::DomainLeases;
use crate::pipeline::registrar::Registrar;
use crate::services::{Analyzer, Notifier};
use crate::storage::{FingerprintStore, SnapshotArchive};
use crate::utils::file_name;

const DEFAULT_NOTIFY_TIMEOUT: Duration = Duration::from_secs(10);

/// Per-domain result of one scan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanSummary {
    pub domain: String,
    pub new_count: usize,
    pub modified_count: usize,
    pub unchanged_count: usize,
    /// Candidates that passed the dedup gate
    pub alerted_count: usize,
    /// Alerts whose delivery failed or timed out
    pub notify_failures: usize,
}

/// Change-detection engine shared by all domain workers.
pub struct ScanEngine {
    store: Arc<dyn FingerprintStore>,
    archive: Arc<dyn SnapshotArchive>,
    notifier: Arc<dyn Notifier>,
    registrar: Registrar,
    leases: DomainLeases,
    analyzer: Option<Analyzer>,
    notify_timeout: Duration,
}

impl ScanEngine {
    pub fn new(
        store: Arc<dyn FingerprintStore>,
        archive: Arc<dyn SnapshotArchive>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            registrar: Registrar::new(Arc::clone(&store), Arc::clone(&archive)),
            store,
            archive,
            notifier,
            leases: DomainLeases::new(),
            analyzer: None,
            notify_timeout: DEFAULT_NOTIFY_TIMEOUT,
        }
    }

    /// Attach a content analyzer to every firing alert.
    pub fn with_analyzer(mut self, analyzer: Analyzer) -> Self {
        self.analyzer = Some(analyzer);
        self
    }

    /// Upper bound on a single notification delivery.
    pub fn with_notify_timeout(mut self, timeout: Duration) -> Self {
        self.notify_timeout = timeout;
        self
    }

    pub fn leases(&self) -> &DomainLeases {
        &self.leases
    }

    /// Probe the fingerprint store.
    pub async fn ping(&self) -> Result<()> {
        self.store.ping().await.map_err(into_store_error)
    }

    /// Classify and alert one domain's observed file set.
    ///
    /// `scanned_at` stamps every record touched by this scan.
    pub async fn scan_domain(
        &self,
        observed: ObservedSet,
        scanned_at: DateTime<Utc>,
    ) -> Result<ScanSummary> {
        let observed = observed.validate()?;
        let domain = observed.domain.clone();
        let _lease = self.leases.try_acquire(&domain)?;

        let records = self
            .store
            .list_by_domain(&domain)
            .await
            .map_err(into_store_error)?;
        let classification = classify(&observed, &records);

        let files: HashMap<&str, &ObservedFile> = observed
            .files
            .iter()
            .map(|f| (f.url.as_str(), f))
            .collect();
        let known: HashMap<&str, &FileRecord> =
            records.iter().map(|r| (r.url.as_str(), r)).collect();

        let mut summary = ScanSummary {
            domain: domain.clone(),
            new_count: classification.new_files.len(),
            modified_count: classification.modified_files.len(),
            unchanged_count: classification.unchanged_files.len(),
            ..ScanSummary::default()
        };

        // Each URL is decided, delivered and committed before the next one,
        // so a cancelled cycle keeps whatever it already committed.
        for (url, class) in classification.in_order() {
            let Some(file) = files.get(url) else {
                continue;
            };
            let record = known.get(url).copied();
            let decision = match class.alert_kind() {
                Some(kind) if should_alert(record, &file.fingerprint, kind) => {
                    Some(self.decide(&domain, file, record, class, kind).await?)
                }
                _ => None,
            };

            if let Some(decision) = &decision {
                summary.alerted_count += 1;
                // Delivery failure does not withhold the alerted state.
                if let Err(e) = self.deliver(&domain, decision).await {
                    summary.notify_failures += 1;
                    log::warn!("[{}] {}", domain, e);
                }
            }

            self.registrar
                .commit(
                    &domain,
                    url,
                    &file.fingerprint,
                    &file.body,
                    decision.is_some(),
                    scanned_at,
                )
                .await
                .map_err(into_store_error)?;
        }

        log::info!(
            "[{}] {} new, {} modified, {} unchanged, {} alerted{}",
            domain,
            summary.new_count,
            summary.modified_count,
            summary.unchanged_count,
            summary.alerted_count,
            if summary.notify_failures > 0 {
                format!(" ({} delivery failures)", summary.notify_failures)
            } else {
                String::new()
            }
        );
        Ok(summary)
    }

    /// Mark a URL's current fingerprint as alerted without notifying.
    pub async fn acknowledge(&self, domain: &str, url: &str) -> Result<FileRecord> {
        let _lease = self.leases.try_acquire(domain)?;
        let record = self
            .store
            .get(domain, url)
            .await?
            .ok_or_else(|| AppError::RecordNotFound {
                domain: domain.to_string(),
                url: url.to_string(),
            })?;
        self.store
            .record_alert(domain, url, &record.current_fingerprint)
            .await
    }

    /// Build the alert for a file that passed the gate.
    async fn decide(
        &self,
        domain: &str,
        file: &ObservedFile,
        record: Option<&FileRecord>,
        class: Classification,
        kind: AlertKind,
    ) -> Result<AlertDecision> {
        let previous = record.map(|r| r.current_fingerprint.clone());
        let diff = match (&previous, class) {
            (Some(old), Classification::Modified) => Some(
                diff_against_archive(self.archive.as_ref(), domain, &file.url, old, &file.body)
                    .await
                    .map_err(into_store_error)?,
            ),
            _ => None,
        };

        Ok(AlertDecision {
            url: file.url.clone(),
            file_name: file_name(&file.url),
            fingerprint: file.fingerprint.clone(),
            kind,
            previous_fingerprint: previous,
            diff,
            analysis: self.analyzer.as_ref().map(|a| a.analyze(&file.body)),
        })
    }

    async fn deliver(&self, domain: &str, decision: &AlertDecision) -> Result<()> {
        match tokio::time::timeout(self.notify_timeout, self.notifier.notify(domain, decision))
            .await
        {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e @ AppError::NotificationFailed { .. })) => Err(e),
            Ok(Err(e)) => Err(AppError::notification(&decision.url, e)),
            Err(_) => Err(AppError::notification(
                &decision.url,
                format!("timed out after {:?}", self.notify_timeout),
            )),
        }
    }
}

/// Collapse storage-layer failures into `StoreUnavailable`.
fn into_store_error(error: AppError) -> AppError {
    match error {
        AppError::StoreUnavailable(_) => error,
        AppError::Io(e) => AppError::store(e),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AnalysisConfig, FileDiff, Fingerprint, RiskLevel};
    use crate::pipeline::diff::apply_unified;
    use crate::services::RecordingNotifier;
    use crate::storage::MemoryStorage;
    use async_trait::async_trait;
    use chrono::Duration as ChronoDuration;
    use std::sync::Mutex;

    const DOMAIN: &str = "example.com";
    const A_JS: &str = "https://example.com/a.js";

    struct Harness {
        engine: ScanEngine,
        storage: Arc<MemoryStorage>,
        notifier: Arc<RecordingNotifier>,
    }

    fn harness_with(notifier: RecordingNotifier) -> Harness {
        let storage = Arc::new(MemoryStorage::new());
        let notifier = Arc::new(notifier);
        let engine = ScanEngine::new(storage.clone(), storage.clone(), notifier.clone());
        Harness {
            engine,
            storage,
            notifier,
        }
    }

    fn harness() -> Harness {
        harness_with(RecordingNotifier::default())
    }

    fn observe(files: &[(&str, &str)]) -> ObservedSet {
        ObservedSet::new(
            DOMAIN,
            files
                .iter()
                .map(|(url, body)| ObservedFile::from_body(*url, *body))
                .collect(),
        )
    }

    async fn record(storage: &MemoryStorage, url: &str) -> FileRecord {
        FingerprintStore::get(storage, DOMAIN, url)
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn test_fresh_domain_alerts_every_file_once() {
        let h = harness();
        let set = observe(&[
            ("https://example.com/a.js", "a"),
            ("https://example.com/b.js", "b"),
            ("https://example.com/c.js", "c"),
        ]);

        let summary = h.engine.scan_domain(set, Utc::now()).await.unwrap();
        assert_eq!(summary.new_count, 3);
        assert_eq!(summary.alerted_count, 3);
        assert_eq!(h.notifier.count(), 3);

        let urls: Vec<String> = h.notifier.sent().into_iter().map(|(_, a)| a.url).collect();
        assert_eq!(
            urls,
            vec![
                "https://example.com/a.js",
                "https://example.com/b.js",
                "https://example.com/c.js"
            ]
        );
    }

    #[tokio::test]
    async fn test_same_fingerprint_twice_is_silent() {
        let h = harness();
        let t0 = Utc::now();
        h.engine.scan_domain(observe(&[(A_JS, "v1")]), t0).await.unwrap();

        let summary = h
            .engine
            .scan_domain(observe(&[(A_JS, "v1")]), t0 + ChronoDuration::hours(1))
            .await
            .unwrap();
        assert_eq!(summary.unchanged_count, 1);
        assert_eq!(summary.alerted_count, 0);
        assert_eq!(h.notifier.count(), 1);
    }

    #[tokio::test]
    async fn test_four_scan_oscillation_scenario() {
        let h = harness();
        let t0 = Utc::now();
        let h1 = Fingerprint::of("console.log(1);\n");
        let h2 = Fingerprint::of("console.log(2);\n");

        // 1: new
        let s1 = h
            .engine
            .scan_domain(observe(&[(A_JS, "console.log(1);\n")]), t0)
            .await
            .unwrap();
        assert_eq!((s1.new_count, s1.alerted_count), (1, 1));
        let r = record(&h.storage, A_JS).await;
        assert_eq!(r.current_fingerprint, h1);
        assert_eq!(r.last_alerted_fingerprint, Some(h1.clone()));

        // 2: unchanged
        let s2 = h
            .engine
            .scan_domain(
                observe(&[(A_JS, "console.log(1);\n")]),
                t0 + ChronoDuration::hours(1),
            )
            .await
            .unwrap();
        assert_eq!((s2.unchanged_count, s2.alerted_count), (1, 0));

        // 3: modified with diff h1 -> h2
        let s3 = h
            .engine
            .scan_domain(
                observe(&[(A_JS, "console.log(2);\n")]),
                t0 + ChronoDuration::hours(2),
            )
            .await
            .unwrap();
        assert_eq!((s3.modified_count, s3.alerted_count), (1, 1));
        let (_, alert) = h.notifier.sent().pop().unwrap();
        assert_eq!(alert.previous_fingerprint, Some(h1.clone()));
        assert!(matches!(alert.diff, Some(FileDiff::Unified(_))));
        let text = alert.diff.as_ref().and_then(|d| d.text()).unwrap();
        assert_eq!(
            apply_unified("console.log(1);\n", text).unwrap(),
            "console.log(2);\n"
        );
        let r = record(&h.storage, A_JS).await;
        assert_eq!(r.current_fingerprint, h2);
        assert_eq!(r.last_alerted_fingerprint, Some(h2.clone()));

        // 4: back to h1, compared against alerted h2, fires again
        let s4 = h
            .engine
            .scan_domain(
                observe(&[(A_JS, "console.log(1);\n")]),
                t0 + ChronoDuration::hours(3),
            )
            .await
            .unwrap();
        assert_eq!((s4.modified_count, s4.alerted_count), (1, 1));
        assert_eq!(h.notifier.count(), 3);
        let r = record(&h.storage, A_JS).await;
        assert_eq!(r.last_alerted_fingerprint, Some(h1));
        assert_eq!(r.first_seen_at, t0);
        assert_eq!(r.last_modified_at, t0 + ChronoDuration::hours(3));
    }

    #[tokio::test]
    async fn test_modified_back_to_last_alerted_is_suppressed() {
        let h = harness();
        let t0 = Utc::now();
        h.engine.scan_domain(observe(&[(A_JS, "v1")]), t0).await.unwrap();

        // Content moved to v2 without an alert being recorded
        let mut r = record(&h.storage, A_JS).await;
        r.current_fingerprint = Fingerprint::of("v2");
        h.storage.upsert(&r).await.unwrap();

        let summary = h
            .engine
            .scan_domain(observe(&[(A_JS, "v1")]), t0 + ChronoDuration::hours(1))
            .await
            .unwrap();
        assert_eq!(summary.modified_count, 1);
        assert_eq!(summary.alerted_count, 0);
        assert_eq!(
            record(&h.storage, A_JS).await.current_fingerprint,
            Fingerprint::of("v1")
        );
    }

    #[tokio::test]
    async fn test_missing_baseline_still_alerts() {
        let h = harness();
        let t0 = Utc::now();
        let stale = FileRecord::first_observation(DOMAIN, A_JS, Fingerprint::of("old"), t0);
        h.storage.upsert(&stale).await.unwrap();

        let summary = h
            .engine
            .scan_domain(observe(&[(A_JS, "new")]), t0 + ChronoDuration::hours(1))
            .await
            .unwrap();
        assert_eq!(summary.alerted_count, 1);
        let (_, alert) = h.notifier.sent().pop().unwrap();
        assert_eq!(alert.diff, Some(FileDiff::NoBaseline));
    }

    #[tokio::test]
    async fn test_notification_failure_still_commits_alert() {
        let h = harness_with(RecordingNotifier::failing());
        let summary = h
            .engine
            .scan_domain(observe(&[(A_JS, "v1")]), Utc::now())
            .await
            .unwrap();
        assert_eq!(summary.alerted_count, 1);
        assert_eq!(summary.notify_failures, 1);
        assert_eq!(
            record(&h.storage, A_JS).await.last_alerted_fingerprint,
            Some(Fingerprint::of("v1"))
        );
    }

    #[tokio::test]
    async fn test_hanging_notifier_times_out_and_still_commits() {
        let storage = Arc::new(MemoryStorage::new());
        let notifier = Arc::new(RecordingNotifier::slow(Duration::from_secs(3600)));
        let engine = ScanEngine::new(storage.clone(), storage.clone(), notifier.clone())
            .with_notify_timeout(Duration::from_millis(100));

        let summary = engine
            .scan_domain(observe(&[(A_JS, "v1")]), Utc::now())
            .await
            .unwrap();
        assert_eq!(summary.alerted_count, 1);
        assert_eq!(summary.notify_failures, 1);
        assert_eq!(notifier.count(), 0);
        assert_eq!(
            record(&storage, A_JS).await.last_alerted_fingerprint,
            Some(Fingerprint::of("v1"))
        );
    }

    #[tokio::test]
    async fn test_cancelled_scan_keeps_committed_urls() {
        let storage = Arc::new(MemoryStorage::new());
        let notifier = Arc::new(RecordingNotifier::slow(Duration::from_millis(300)));
        let engine = ScanEngine::new(storage.clone(), storage.clone(), notifier.clone());
        let files = [
            ("https://example.com/a.js", "a"),
            ("https://example.com/b.js", "b"),
            ("https://example.com/c.js", "c"),
        ];
        let t0 = Utc::now();

        // Cancelled while b.js is being delivered
        let cancelled = tokio::time::timeout(
            Duration::from_millis(450),
            engine.scan_domain(observe(&files), t0),
        )
        .await;
        assert!(cancelled.is_err());
        assert!(!engine.leases().is_held(DOMAIN));

        let committed = storage.list_by_domain(DOMAIN).await.unwrap();
        assert_eq!(committed.len(), 1);
        assert_eq!(committed[0].url, "https://example.com/a.js");
        assert!(committed[0].is_alerted());

        let summary = engine
            .scan_domain(observe(&files), t0 + ChronoDuration::hours(1))
            .await
            .unwrap();
        assert_eq!((summary.new_count, summary.unchanged_count), (2, 1));
        assert_eq!(summary.alerted_count, 2);

        let urls: Vec<String> = notifier.sent().into_iter().map(|(_, a)| a.url).collect();
        assert_eq!(
            urls,
            vec![
                "https://example.com/a.js",
                "https://example.com/b.js",
                "https://example.com/c.js"
            ]
        );
        assert_eq!(storage.list_by_domain(DOMAIN).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_held_lease_is_domain_busy() {
        let h = harness();
        let _held = h.engine.leases().try_acquire(DOMAIN).unwrap();
        let err = h
            .engine
            .scan_domain(observe(&[(A_JS, "v1")]), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::DomainBusy(_)));
        assert!(
            h.storage
                .list_by_domain(DOMAIN)
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn test_invalid_observed_set_is_rejected() {
        let h = harness();
        let mut set = observe(&[(A_JS, "v1")]);
        set.files[0].body = "tampered".into();
        let err = h.engine.scan_domain(set, Utc::now()).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_analysis_attached_when_enabled() {
        let storage = Arc::new(MemoryStorage::new());
        let notifier = Arc::new(RecordingNotifier::default());
        let engine = ScanEngine::new(storage.clone(), storage.clone(), notifier.clone())
            .with_analyzer(Analyzer::new(&AnalysisConfig::default()).unwrap());

        engine
            .scan_domain(observe(&[(A_JS, "const password = 'x';\n")]), Utc::now())
            .await
            .unwrap();
        let (_, alert) = notifier.sent().pop().unwrap();
        let analysis = alert.analysis.unwrap();
        assert_eq!(analysis.risk_level, RiskLevel::Low);
        assert_eq!(analysis.findings[0].keyword, "password");
        assert_eq!(alert.file_name, "a.js");
    }

    #[tokio::test]
    async fn test_acknowledge_marks_current_fingerprint() {
        let h = harness();
        let t0 = Utc::now();
        let stale = FileRecord::first_observation(DOMAIN, A_JS, Fingerprint::of("v1"), t0);
        h.storage.upsert(&stale).await.unwrap();

        let acked = h.engine.acknowledge(DOMAIN, A_JS).await.unwrap();
        assert_eq!(acked.last_alerted_fingerprint, Some(Fingerprint::of("v1")));

        let summary = h
            .engine
            .scan_domain(observe(&[(A_JS, "v2")]), t0 + ChronoDuration::hours(1))
            .await
            .unwrap();
        assert_eq!(summary.alerted_count, 1);

        let err = h
            .engine
            .acknowledge(DOMAIN, "https://example.com/none.js")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::RecordNotFound { .. }));
    }

    /// Store that can refuse reads and records upsert order.
    #[derive(Default)]
    struct ProbeStore {
        inner: MemoryStorage,
        down: bool,
        upserts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl FingerprintStore for ProbeStore {
        async fn get(&self, domain: &str, url: &str) -> Result<Option<FileRecord>> {
            FingerprintStore::get(&self.inner, domain, url).await
        }

        async fn list_by_domain(&self, domain: &str) -> Result<Vec<FileRecord>> {
            if self.down {
                return Err(AppError::store("connection refused"));
            }
            self.inner.list_by_domain(domain).await
        }

        async fn upsert(&self, record: &FileRecord) -> Result<()> {
            self.upserts.lock().unwrap().push(record.url.clone());
            self.inner.upsert(record).await
        }

        async fn record_alert(
            &self,
            domain: &str,
            url: &str,
            fingerprint: &Fingerprint,
        ) -> Result<FileRecord> {
            self.inner.record_alert(domain, url, fingerprint).await
        }

        async fn list_domains(&self) -> Result<Vec<String>> {
            self.inner.list_domains().await
        }

        async fn ping(&self) -> Result<()> {
            if self.down {
                return Err(AppError::store("connection refused"));
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_store_unavailable_aborts_before_commit() {
        let store = Arc::new(ProbeStore {
            down: true,
            ..ProbeStore::default()
        });
        let archive = Arc::new(MemoryStorage::new());
        let notifier = Arc::new(RecordingNotifier::default());
        let engine = ScanEngine::new(store.clone(), archive.clone(), notifier.clone());

        let err = engine
            .scan_domain(observe(&[(A_JS, "v1")]), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::StoreUnavailable(_)));
        assert!(store.upserts.lock().unwrap().is_empty());
        assert_eq!(notifier.count(), 0);
        assert_eq!(archive.snapshot_count(), 0);
        assert!(engine.ping().await.is_err());
    }

    #[tokio::test]
    async fn test_commits_follow_classifier_order() {
        let store = Arc::new(ProbeStore::default());
        let archive = Arc::new(MemoryStorage::new());
        let notifier = Arc::new(RecordingNotifier::default());
        let engine = ScanEngine::new(store.clone(), archive, notifier);
        let t0 = Utc::now();

        engine
            .scan_domain(
                observe(&[
                    ("https://example.com/x.js", "x"),
                    ("https://example.com/y.js", "y"),
                ]),
                t0,
            )
            .await
            .unwrap();
        store.upserts.lock().unwrap().clear();

        // y modified, z new, x unchanged
        engine
            .scan_domain(
                observe(&[
                    ("https://example.com/x.js", "x"),
                    ("https://example.com/y.js", "y2"),
                    ("https://example.com/z.js", "z"),
                ]),
                t0 + ChronoDuration::hours(1),
            )
            .await
            .unwrap();
        assert_eq!(
            *store.upserts.lock().unwrap(),
            vec![
                "https://example.com/z.js",
                "https://example.com/y.js",
                "https://example.com/x.js"
            ]
        );
    }
}
