//! Change-detection pipeline.
//!
//! - `classify` / `gate` / `diff` / `registrar`: the per-file stages
//! - `scan`: one domain's cycle under its lease
//! - `runner` / `scheduler`: bounded-parallel batches and the watch loop
//! - `stats` / `archive`: reporting and snapshot retention

pub mod archive;
pub mod classify;
pub mod diff;
pub mod gate;
pub mod lease;
pub mod registrar;
pub mod runner;
pub mod scan;
pub mod scheduler;
pub mod stats;

pub use archive::{PruneReport, prune_snapshots};
pub use classify::classify;
pub use diff::{apply_unified, diff_against_archive, unified_diff};
pub use gate::should_alert;
pub use lease::{DomainLease, DomainLeases};
pub use registrar::Registrar;
pub use runner::{BatchReport, ScanRunner};
pub use scan::{ScanEngine, ScanSummary};
pub use scheduler::{ScheduleEntry, Scheduler};
pub use stats::{DomainStats, domain_stats};
