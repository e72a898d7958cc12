// src/services/extractor.rs

//! Inbound collaborator: supplies the observed file set of a domain.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::{AppError, Result};
use crate::models::{Fingerprint, ObservedFile, ObservedSet};
use crate::utils::storage_key;

/// Source of observed script assets for a domain.
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Current observed set for `domain`.
    ///
    /// Any failure is reported as `ExtractionUnavailable`.
    async fn extract(&self, domain: &str) -> Result<ObservedSet>;
}

#[derive(Debug, Deserialize)]
struct Manifest {
    #[serde(default)]
    domain: Option<String>,
    files: Vec<ManifestEntry>,
}

#[derive(Debug, Deserialize)]
struct ManifestEntry {
    url: String,
    body: String,
    #[serde(default)]
    fingerprint: Option<String>,
}

/// Reads `<manifest_dir>/<storage_key(domain)>.json` files written by an external
/// scraper.
///
/// ```json
/// { "domain": "example.com",
///   "files": [ { "url": "https://example.com/app.js", "body": "..." } ] }
/// ```
///
/// `fingerprint` may be given per file; it is checked against the body.
pub struct ManifestExtractor {
    manifest_dir: PathBuf,
}

impl ManifestExtractor {
    pub fn new(manifest_dir: impl AsRef<Path>) -> Self {
        Self {
            manifest_dir: manifest_dir.as_ref().to_path_buf(),
        }
    }

    /// Manifest path for a domain.
    pub fn manifest_path(&self, domain: &str) -> PathBuf {
        self.manifest_dir.join(format!("{}.json", storage_key(domain)))
    }
}

#[async_trait]
impl Extractor for ManifestExtractor {
    async fn extract(&self, domain: &str) -> Result<ObservedSet> {
        let path = self.manifest_path(domain);
        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| AppError::extraction(domain, format!("{}: {}", path.display(), e)))?;

        let manifest: Manifest = serde_json::from_str(&content)
            .map_err(|e| AppError::extraction(domain, format!("{}: {}", path.display(), e)))?;

        if let Some(declared) = manifest.domain.as_deref().filter(|d| *d != domain) {
            return Err(AppError::extraction(
                domain,
                format!("manifest declares domain '{declared}'"),
            ));
        }

        let files = manifest
            .files
            .into_iter()
            .map(|entry| ObservedFile {
                fingerprint: entry
                    .fingerprint
                    .map(Fingerprint::from_hex)
                    .unwrap_or_else(|| Fingerprint::of(&entry.body)),
                url: entry.url,
                body: entry.body,
            })
            .collect();

        ObservedSet::new(domain, files)
            .validate()
            .map_err(|e| AppError::extraction(domain, e))
    }
}
