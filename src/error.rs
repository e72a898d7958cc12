// src/error.rs

//! Unified error handling for the watcher.

use std::fmt;

use thiserror::Error;

/// Result type alias for watcher operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// The extractor could not supply an observed file set for a domain
    #[error("Extraction unavailable for {domain}: {message}")]
    ExtractionUnavailable { domain: String, message: String },

    /// Fingerprint store or snapshot archive could not be reached
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// No archived body exists for the prior fingerprint
    #[error("No diff baseline for {url} at {fingerprint}")]
    DiffBaselineMissing { url: String, fingerprint: String },

    /// Outbound notification delivery failed
    #[error("Notification failed for {url}: {message}")]
    NotificationFailed { url: String, message: String },

    /// Another scan of the same domain holds the lease
    #[error("Domain {0} is already being scanned")]
    DomainBusy(String),

    /// No file record exists for the key
    #[error("No record for {url} under {domain}")]
    RecordNotFound { domain: String, url: String },

    /// Alert fingerprint does not match the record's current fingerprint
    #[error("Cannot record alert for {url}: fingerprint {fingerprint} is not current")]
    InvalidAlert { url: String, fingerprint: String },

    /// An awaited step exceeded its time budget
    #[error("Timed out after {secs}s: {context}")]
    Timeout { context: String, secs: u64 },

    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed
    #[cfg(feature = "webhook")]
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),
}

impl AppError {
    /// Create an extraction error for a domain.
    pub fn extraction(domain: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::ExtractionUnavailable {
            domain: domain.into(),
            message: message.to_string(),
        }
    }

    /// Create a store error.
    pub fn store(message: impl fmt::Display) -> Self {
        Self::StoreUnavailable(message.to_string())
    }

    /// Create a notification error.
    pub fn notification(url: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::NotificationFailed {
            url: url.into(),
            message: message.to_string(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a timeout error.
    pub fn timeout(context: impl Into<String>, secs: u64) -> Self {
        Self::Timeout {
            context: context.into(),
            secs,
        }
    }

    /// Whether this error means the backing store cannot be used at all.
    pub fn is_store_failure(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_) | Self::Io(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_failures_are_classified() {
        assert!(AppError::store("disk gone").is_store_failure());
        assert!(!AppError::extraction("example.com", "404").is_store_failure());
        assert!(!AppError::DomainBusy("example.com".into()).is_store_failure());
    }

    #[test]
    fn messages_carry_context() {
        let err = AppError::notification("https://example.com/a.js", "502 Bad Gateway");
        assert_eq!(
            err.to_string(),
            "Notification failed for https://example.com/a.js: 502 Bad Gateway"
        );
    }
}
