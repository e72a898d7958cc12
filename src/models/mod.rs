// src/models/mod.rs

//! Domain models for the watcher.
//!
//! Typed records exchanged between the extractor, the change-detection
//! pipeline, the stores, and the notifier.

mod alert;
mod analysis;
pub mod config;
mod observation;
mod record;

// Re-export all public types
pub use alert::{AlertDecision, AlertKind, Classification, ClassificationResult, FileDiff};
pub use analysis::{Analysis, Finding, RiskLevel};
pub use config::{
    AnalysisConfig, Config, ExtractorConfig, LoggingConfig, NotifierConfig, NotifierKind,
    ScanConfig, StorageConfig,
};
pub use observation::{ObservedFile, ObservedSet};
pub use record::{FileRecord, Fingerprint};
