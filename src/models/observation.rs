// src/models/observation.rs

//! Observed file sets handed over by the extractor.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{AppError, Result};
use crate::models::Fingerprint;
use crate::models::config::validate_domain;

/// One script asset as seen during a scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservedFile {
    pub url: String,
    pub fingerprint: Fingerprint,
    pub body: String,
}

impl ObservedFile {
    /// Build an observation, fingerprinting the body.
    pub fn from_body(url: impl Into<String>, body: impl Into<String>) -> Self {
        let body = body.into();
        Self {
            url: url.into(),
            fingerprint: Fingerprint::of(&body),
            body,
        }
    }
}

/// Everything the extractor saw for one domain in one scan.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObservedSet {
    pub domain: String,
    #[serde(default)]
    pub files: Vec<ObservedFile>,
}

impl ObservedSet {
    pub fn new(domain: impl Into<String>, files: Vec<ObservedFile>) -> Self {
        Self {
            domain: domain.into(),
            files,
        }
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Check the set at the collaborator boundary.
    ///
    /// URLs must be absolute http(s), each fingerprint must be the hash of
    /// its body, and a URL may only repeat with the same fingerprint.
    /// Exact repeats are dropped, keeping the first position.
    pub fn validate(mut self) -> Result<Self> {
        validate_domain(&self.domain)?;

        let mut seen: HashMap<String, Fingerprint> = HashMap::new();
        let mut files = Vec::with_capacity(self.files.len());

        for file in self.files {
            let parsed = Url::parse(&file.url)?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(AppError::validation(format!(
                    "{}: unsupported scheme '{}'",
                    file.url,
                    parsed.scheme()
                )));
            }

            if !file.fingerprint.is_well_formed() {
                return Err(AppError::validation(format!(
                    "{}: fingerprint is not a SHA-256 hex digest",
                    file.url
                )));
            }
            let actual = Fingerprint::of(&file.body);
            if actual != file.fingerprint {
                return Err(AppError::validation(format!(
                    "{}: fingerprint {} does not match body ({})",
                    file.url,
                    file.fingerprint.short(),
                    actual.short()
                )));
            }

            match seen.get(&file.url) {
                Some(existing) if *existing == file.fingerprint => continue,
                Some(_) => {
                    return Err(AppError::validation(format!(
                        "{}: listed twice with different content",
                        file.url
                    )));
                }
                None => {
                    seen.insert(file.url.clone(), file.fingerprint.clone());
                    files.push(file);
                }
            }
        }

        self.files = files;
        Ok(self)
    }
}
