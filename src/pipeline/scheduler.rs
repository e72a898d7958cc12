// src/pipeline/scheduler.rs

//! Explicit per-domain run schedule.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::{AppError, Result};

/// Next run time of one domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleEntry {
    pub domain: String,
    pub next_run: DateTime<Utc>,
}

/// Ordered list of domains, each with its own next-run timestamp.
#[derive(Debug, Clone)]
pub struct Scheduler {
    entries: Vec<ScheduleEntry>,
    interval: chrono::Duration,
}

impl Scheduler {
    /// Schedule every domain to run at `start`, then every `interval`.
    pub fn new(domains: &[String], interval: Duration, start: DateTime<Utc>) -> Result<Self> {
        let interval = chrono::Duration::from_std(interval)
            .map_err(|e| AppError::config(format!("scan interval: {e}")))?;
        let entries = domains
            .iter()
            .map(|domain| ScheduleEntry {
                domain: domain.clone(),
                next_run: start,
            })
            .collect();
        Ok(Self { entries, interval })
    }

    pub fn entries(&self) -> &[ScheduleEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Domains due at `now`, in schedule order.
    pub fn due(&self, now: DateTime<Utc>) -> Vec<String> {
        self.entries
            .iter()
            .filter(|e| e.next_run <= now)
            .map(|e| e.domain.clone())
            .collect()
    }

    /// Push a domain's next run to one interval after `at`.
    pub fn mark_ran(&mut self, domain: &str, at: DateTime<Utc>) {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.domain == domain) {
            entry.next_run = at + self.interval;
        }
    }

    /// Earliest upcoming run.
    pub fn next_due(&self) -> Option<DateTime<Utc>> {
        self.entries.iter().map(|e| e.next_run).min()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn domains() -> Vec<String> {
        vec!["b.example".into(), "a.example".into()]
    }

    #[test]
    fn test_all_due_at_start_in_order() {
        let start = Utc::now();
        let scheduler = Scheduler::new(&domains(), Duration::from_secs(60), start).unwrap();
        assert_eq!(scheduler.due(start), vec!["b.example", "a.example"]);
        assert_eq!(scheduler.next_due(), Some(start));
    }

    #[test]
    fn test_mark_ran_advances_only_that_domain() {
        let start = Utc::now();
        let mut scheduler = Scheduler::new(&domains(), Duration::from_secs(60), start).unwrap();
        scheduler.mark_ran("b.example", start);

        assert_eq!(scheduler.due(start), vec!["a.example"]);
        scheduler.mark_ran("a.example", start + chrono::Duration::seconds(10));
        assert_eq!(
            scheduler.next_due(),
            Some(start + chrono::Duration::seconds(60))
        );
        assert!(scheduler.due(start + chrono::Duration::seconds(59)).is_empty());
        assert_eq!(
            scheduler.due(start + chrono::Duration::seconds(70)),
            vec!["b.example", "a.example"]
        );
    }

    #[test]
    fn test_empty_schedule() {
        let scheduler = Scheduler::new(&[], Duration::from_secs(60), Utc::now()).unwrap();
        assert!(scheduler.is_empty());
        assert_eq!(scheduler.next_due(), None);
    }
}
