// src/models/record.rs

//! Fingerprints and the persisted per-URL file record.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Content hash identifying one version of a file body.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Fingerprint a body: lowercase hex SHA-256 of its bytes.
    pub fn of(body: &str) -> Self {
        Self(hex::encode(Sha256::digest(body.as_bytes())))
    }

    /// Wrap an already computed fingerprint.
    pub fn from_hex(value: impl Into<String>) -> Self {
        Self(value.into().to_ascii_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 16 characters, for log lines and messages.
    pub fn short(&self) -> &str {
        self.0
            .char_indices()
            .nth(16)
            .map_or(&self.0[..], |(i, _)| &self.0[..i])
    }

    /// Whether this looks like a SHA-256 hex digest.
    pub fn is_well_formed(&self) -> bool {
        self.0.len() == 64 && self.0.bytes().all(|b| b.is_ascii_hexdigit())
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Last known state of one script URL under one domain.
///
/// Keyed by `(domain, url)`. `last_alerted_fingerprint` is only ever set to
/// a fingerprint the record held as `current_fingerprint`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub domain: String,
    pub url: String,
    pub current_fingerprint: Fingerprint,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_alerted_fingerprint: Option<Fingerprint>,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub last_modified_at: DateTime<Utc>,
}

impl FileRecord {
    /// A record for a URL observed for the first time.
    pub fn first_observation(
        domain: impl Into<String>,
        url: impl Into<String>,
        fingerprint: Fingerprint,
        observed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            domain: domain.into(),
            url: url.into(),
            current_fingerprint: fingerprint,
            last_alerted_fingerprint: None,
            first_seen_at: observed_at,
            last_seen_at: observed_at,
            last_modified_at: observed_at,
        }
    }

    /// Whether the current version has already been reported.
    pub fn is_alerted(&self) -> bool {
        self.last_alerted_fingerprint.as_ref() == Some(&self.current_fingerprint)
    }
}
