//! Application configuration structures.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Domains to watch, in scan order
    #[serde(default)]
    pub domains: Vec<String>,

    /// Scan cadence and worker pool settings
    #[serde(default)]
    pub scan: ScanConfig,

    /// Persistence settings
    #[serde(default)]
    pub storage: StorageConfig,

    /// Outbound notification settings
    #[serde(default)]
    pub notifier: NotifierConfig,

    /// Inbound observed-set source
    #[serde(default)]
    pub extractor: ExtractorConfig,

    /// Content analysis attached to alerts
    #[serde(default)]
    pub analysis: AnalysisConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        for domain in &self.domains {
            validate_domain(domain)?;
        }
        let mut seen = std::collections::HashSet::new();
        for domain in &self.domains {
            if !seen.insert(domain.as_str()) {
                return Err(AppError::validation(format!(
                    "domain '{domain}' is listed twice"
                )));
            }
        }
        if self.scan.interval_secs == 0 {
            return Err(AppError::validation("scan.interval_secs must be > 0"));
        }
        if self.scan.max_concurrent == 0 {
            return Err(AppError::validation("scan.max_concurrent must be > 0"));
        }
        if self.scan.cycle_timeout_secs == 0 {
            return Err(AppError::validation("scan.cycle_timeout_secs must be > 0"));
        }
        if self.scan.extract_timeout_secs == 0 {
            return Err(AppError::validation(
                "scan.extract_timeout_secs must be > 0",
            ));
        }
        if self.notifier.timeout_secs == 0 {
            return Err(AppError::validation("notifier.timeout_secs must be > 0"));
        }
        match self.notifier.kind {
            NotifierKind::Log => {}
            NotifierKind::Webhook => match &self.notifier.webhook_url {
                Some(raw) => {
                    url::Url::parse(raw)?;
                }
                None => {
                    return Err(AppError::validation(
                        "notifier.webhook_url is required when kind = \"webhook\"",
                    ));
                }
            },
        }
        Ok(())
    }
}

/// Check that a domain is usable as a scan unit and a storage key.
pub fn validate_domain(domain: &str) -> Result<()> {
    if domain.trim().is_empty() {
        return Err(AppError::validation("domain must not be empty"));
    }
    let valid = domain
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | ':'));
    if !valid || domain.starts_with('.') {
        return Err(AppError::validation(format!(
            "domain '{domain}' contains invalid characters"
        )));
    }
    Ok(())
}

/// Scan cadence and worker pool settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Seconds between scans of the same domain
    #[serde(default = "defaults::interval")]
    pub interval_secs: u64,

    /// Maximum domains scanned in parallel
    #[serde(default = "defaults::max_concurrent")]
    pub max_concurrent: usize,

    /// Upper bound for one domain's classify-to-commit cycle
    #[serde(default = "defaults::cycle_timeout")]
    pub cycle_timeout_secs: u64,

    /// Upper bound for obtaining a domain's observed set
    #[serde(default = "defaults::extract_timeout")]
    pub extract_timeout_secs: u64,
}

impl ScanConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn cycle_timeout(&self) -> Duration {
        Duration::from_secs(self.cycle_timeout_secs)
    }

    pub fn extract_timeout(&self) -> Duration {
        Duration::from_secs(self.extract_timeout_secs)
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            interval_secs: defaults::interval(),
            max_concurrent: defaults::max_concurrent(),
            cycle_timeout_secs: defaults::cycle_timeout(),
            extract_timeout_secs: defaults::extract_timeout(),
        }
    }
}

/// Persistence settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root directory for records and snapshots
    #[serde(default = "defaults::storage_root")]
    pub root: PathBuf,

    /// Days an unreferenced snapshot is kept before pruning
    #[serde(default = "defaults::retention_days")]
    pub snapshot_retention_days: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: defaults::storage_root(),
            snapshot_retention_days: defaults::retention_days(),
        }
    }
}

/// Which notifier delivers alerts.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum NotifierKind {
    /// Write alerts to the log only
    #[default]
    Log,
    /// POST alerts as JSON to a webhook
    Webhook,
}

/// Outbound notification settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifierConfig {
    #[serde(default)]
    pub kind: NotifierKind,

    /// Target URL for webhook delivery
    #[serde(default)]
    pub webhook_url: Option<String>,

    /// Per-notification delivery timeout in seconds
    #[serde(default = "defaults::notify_timeout")]
    pub timeout_secs: u64,

    /// User-Agent header for webhook requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,
}

impl NotifierConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            kind: NotifierKind::default(),
            webhook_url: None,
            timeout_secs: defaults::notify_timeout(),
            user_agent: defaults::user_agent(),
        }
    }
}

/// Inbound observed-set source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractorConfig {
    /// Directory holding one `<domain>.json` manifest per domain
    #[serde(default = "defaults::manifest_dir")]
    pub manifest_dir: PathBuf,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            manifest_dir: defaults::manifest_dir(),
        }
    }
}

/// Content analysis settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default = "defaults::analysis_enabled")]
    pub enabled: bool,

    /// Keywords that mark a line as potentially sensitive
    #[serde(default = "defaults::keywords")]
    pub keywords: Vec<String>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            enabled: defaults::analysis_enabled(),
            keywords: defaults::keywords(),
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "defaults::log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::log_level(),
        }
    }
}

mod defaults {
    use std::path::PathBuf;

    // Scan defaults
    pub fn interval() -> u64 {
        3600
    }
    pub fn max_concurrent() -> usize {
        4
    }
    pub fn cycle_timeout() -> u64 {
        300
    }
    pub fn extract_timeout() -> u64 {
        120
    }

    // Storage defaults
    pub fn storage_root() -> PathBuf {
        PathBuf::from("storage")
    }
    pub fn retention_days() -> u32 {
        30
    }

    // Notifier defaults
    pub fn notify_timeout() -> u64 {
        10
    }
    pub fn user_agent() -> String {
        "Mozilla/5.0 (compatible; scriptwatch/0.1)".into()
    }

    // Extractor defaults
    pub fn manifest_dir() -> PathBuf {
        PathBuf::from("observed")
    }

    // Analysis defaults
    pub fn analysis_enabled() -> bool {
        true
    }
    pub fn keywords() -> Vec<String> {
        [
            "api_key",
            "apikey",
            "secret",
            "password",
            "token",
            "auth",
            "credential",
            "private",
            "internal",
            "admin",
            "access_key",
            "secret_key",
            "jwt",
            "bearer",
            "oauth",
            "endpoint",
            "database",
            "connection",
            "config",
            "aws_key",
            "aws_secret",
            "s3_bucket",
            "github_token",
        ]
        .into_iter()
        .map(String::from)
        .collect()
    }

    pub fn log_level() -> String {
        "info".into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_default_config_ok() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn validate_rejects_zero_concurrency() {
        let mut config = Config::default();
        config.scan.max_concurrent = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_webhook_without_url() {
        let mut config = Config::default();
        config.notifier.kind = NotifierKind::Webhook;
        assert!(config.validate().is_err());

        config.notifier.webhook_url = Some("https://hooks.example.com/T000".into());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_bad_and_duplicate_domains() {
        let mut config = Config::default();
        config.domains = vec!["example.com".into(), "bad domain".into()];
        assert!(config.validate().is_err());

        config.domains = vec!["example.com".into(), "example.com".into()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn parses_partial_toml_with_defaults() {
        let config: Config = toml::from_str(
            r#"
            domains = ["example.com", "cdn.example.org"]

            [scan]
            max_concurrent = 2

            [notifier]
            kind = "webhook"
            webhook_url = "https://hooks.example.com/abc"
            "#,
        )
        .unwrap();

        assert_eq!(config.domains.len(), 2);
        assert_eq!(config.scan.max_concurrent, 2);
        assert_eq!(config.scan.interval_secs, 3600);
        assert_eq!(config.notifier.kind, NotifierKind::Webhook);
        assert!(config.analysis.keywords.contains(&"api_key".to_string()));
        assert!(config.validate().is_ok());
    }
}
