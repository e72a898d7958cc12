// src/pipeline/runner.rs

//! Bounded-parallel scan batches and the watch loop.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::stream::{self, StreamExt};

use crate::error::{AppError, Result};
use crate::models::ScanConfig;
use crate::pipeline::scan::{ScanEngine, ScanSummary};
use crate::pipeline::scheduler::Scheduler;
use crate::services::Extractor;

/// Outcome of one batch over several domains.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub summaries: Vec<ScanSummary>,
    pub failures: Vec<(String, AppError)>,
}

impl BatchReport {
    pub fn alerted(&self) -> usize {
        self.summaries.iter().map(|s| s.alerted_count).sum()
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// Take out the first failure that means the store itself is unusable.
    pub fn take_store_failure(&mut self) -> Option<(String, AppError)> {
        let index = self.failures.iter().position(|(_, e)| e.is_store_failure())?;
        Some(self.failures.swap_remove(index))
    }
}

/// Runs extraction and scan cycles for many domains.
pub struct ScanRunner {
    engine: Arc<ScanEngine>,
    extractor: Arc<dyn Extractor>,
    max_concurrent: usize,
    extract_timeout: Duration,
    cycle_timeout: Duration,
}

impl ScanRunner {
    pub fn new(engine: Arc<ScanEngine>, extractor: Arc<dyn Extractor>, config: &ScanConfig) -> Self {
        Self {
            engine,
            extractor,
            max_concurrent: config.max_concurrent.max(1),
            extract_timeout: config.extract_timeout(),
            cycle_timeout: config.cycle_timeout(),
        }
    }

    /// Extract and scan one domain.
    ///
    /// Extraction happens before the lease is taken, and is skipped when a
    /// scan of the domain is already running. The scan itself is cancelled
    /// at `cycle_timeout`; commits already made stay valid.
    pub async fn run_domain(&self, domain: &str) -> Result<ScanSummary> {
        if self.engine.leases().is_held(domain) {
            return Err(AppError::DomainBusy(domain.to_string()));
        }

        let observed = tokio::time::timeout(self.extract_timeout, self.extractor.extract(domain))
            .await
            .map_err(|_| {
                AppError::extraction(
                    domain,
                    format!("timed out after {}s", self.extract_timeout.as_secs()),
                )
            })??;

        tokio::time::timeout(
            self.cycle_timeout,
            self.engine.scan_domain(observed, Utc::now()),
        )
        .await
        .map_err(|_| AppError::timeout(format!("scan of {domain}"), self.cycle_timeout.as_secs()))?
    }

    /// Scan `domains` with at most `max_concurrent` in flight.
    ///
    /// A failing domain never aborts the others.
    pub async fn run_batch(&self, domains: &[String]) -> BatchReport {
        let mut report = BatchReport::default();
        let mut results = stream::iter(domains)
            .map(|domain| async move { (domain.clone(), self.run_domain(domain).await) })
            .buffer_unordered(self.max_concurrent);

        while let Some((domain, result)) = results.next().await {
            match result {
                Ok(summary) => report.summaries.push(summary),
                Err(error) => {
                    log::error!("[{}] scan failed: {}", domain, error);
                    report.failures.push((domain, error));
                }
            }
        }

        log::info!(
            "Batch complete: {} domains ok, {} failed, {} alerts",
            report.summaries.len(),
            report.failures.len(),
            report.alerted()
        );
        report
    }

    /// Run due domains until `shutdown` resolves.
    ///
    /// Returns an error when the store stops answering its health probe or
    /// a domain in the batch failed on the store.
    pub async fn run_until<F>(&self, scheduler: &mut Scheduler, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        if scheduler.is_empty() {
            log::warn!("No domains configured; nothing to watch");
            return Ok(());
        }

        loop {
            if let Err(e) = self.engine.ping().await {
                log::error!("Store unreachable, stopping scheduler: {}", e);
                return Err(e);
            }

            let now = Utc::now();
            let due = scheduler.due(now);
            if !due.is_empty() {
                let mut report = tokio::select! {
                    report = self.run_batch(&due) => report,
                    _ = &mut shutdown => {
                        log::info!("Shutdown requested during batch");
                        return Ok(());
                    }
                };
                for domain in &due {
                    scheduler.mark_ran(domain, now);
                }
                if let Some((domain, e)) = report.take_store_failure() {
                    log::error!("[{}] store failure, stopping scheduler: {}", domain, e);
                    return Err(e);
                }
            }

            let wait = scheduler
                .next_due()
                .and_then(|next| (next - Utc::now()).to_std().ok())
                .unwrap_or(Duration::ZERO);
            log::debug!("Next scan in {}s", wait.as_secs());

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = &mut shutdown => {
                    log::info!("Shutdown requested");
                    return Ok(());
                }
            }
        }
    }
}
