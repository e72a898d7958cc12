// src/pipeline/lease.rs

//! Per-domain mutual exclusion for scan cycles.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::error::{AppError, Result};

/// Registry of per-domain leases, shared by every worker.
#[derive(Default)]
pub struct DomainLeases {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

/// Held for the duration of one domain's classify-to-commit cycle.
/// Released on drop.
#[derive(Debug)]
pub struct DomainLease {
    domain: String,
    _guard: OwnedMutexGuard<()>,
}

impl DomainLease {
    pub fn domain(&self) -> &str {
        &self.domain
    }
}

impl DomainLeases {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the lease for `domain` without waiting.
    ///
    /// Fails with `DomainBusy` while another scan of the domain holds it.
    pub fn try_acquire(&self, domain: &str) -> Result<DomainLease> {
        let lock = {
            // The map holds no invariant a panicking holder could break.
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks
                .entry(domain.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };

        let guard = lock
            .try_lock_owned()
            .map_err(|_| AppError::DomainBusy(domain.to_string()))?;

        Ok(DomainLease {
            domain: domain.to_string(),
            _guard: guard,
        })
    }

    /// Whether a scan of `domain` is in progress.
    pub fn is_held(&self, domain: &str) -> bool {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(domain)
            .is_some_and(|lock| lock.try_lock().is_err())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_acquire_is_busy() {
        let leases = DomainLeases::new();
        let lease = leases.try_acquire("example.com").unwrap();
        assert_eq!(lease.domain(), "example.com");
        assert!(leases.is_held("example.com"));

        let err = leases.try_acquire("example.com").unwrap_err();
        assert!(matches!(err, AppError::DomainBusy(d) if d == "example.com"));
    }

    #[test]
    fn test_other_domains_are_independent() {
        let leases = DomainLeases::new();
        let _a = leases.try_acquire("a.example").unwrap();
        assert!(leases.try_acquire("b.example").is_ok());
    }

    #[test]
    fn test_drop_releases() {
        let leases = DomainLeases::new();
        drop(leases.try_acquire("example.com").unwrap());
        assert!(!leases.is_held("example.com"));
        assert!(leases.try_acquire("example.com").is_ok());
    }

    #[test]
    fn test_poisoned_registry_still_grants_leases() {
        let leases = DomainLeases::new();
        let held = leases.try_acquire("a.example").unwrap();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _locks = leases.locks.lock().unwrap();
            panic!("worker died while holding the registry");
        }));
        assert!(result.is_err());
        assert!(leases.locks.is_poisoned());

        assert!(leases.is_held("a.example"));
        assert!(leases.try_acquire("b.example").is_ok());
        drop(held);
        assert!(leases.try_acquire("a.example").is_ok());
    }
}
