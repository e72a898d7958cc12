//! Service layer for the watcher.
//!
//! This module contains the collaborators around the core:
//! - Observed set sources (`Extractor`, `ManifestExtractor`)
//! - Alert delivery (`Notifier`, `LogNotifier`, `WebhookNotifier`)
//! - Body analysis (`Analyzer`)

mod analyzer;
mod extractor;
mod notifier;

pub use analyzer::Analyzer;
pub use extractor::{Extractor, ManifestExtractor};
#[cfg(test)]
pub(crate) use notifier::RecordingNotifier;
#[cfg(feature = "webhook")]
pub use notifier::WebhookNotifier;
pub use notifier::{LogNotifier, Notifier, WebhookPayload, build_notifier};
