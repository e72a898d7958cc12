// src/services/notifier.rs

//! Outbound collaborator: delivers alert decisions.

use async_trait::async_trait;
use serde::Serialize;

use crate::error::Result;
use crate::models::{AlertDecision, NotifierConfig, NotifierKind};

/// Delivers one alert for a domain.
///
/// A failed delivery is returned as `NotificationFailed`; it never blocks
/// the commit of the alerted state.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, domain: &str, alert: &AlertDecision) -> Result<()>;
}

/// Writes alerts to the log.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, domain: &str, alert: &AlertDecision) -> Result<()> {
        let risk = alert
            .analysis
            .as_ref()
            .map(|a| format!(" risk={}", a.risk_level))
            .unwrap_or_default();
        log::info!(
            "[{}] {} file {} ({}) {}{}",
            domain,
            alert.kind,
            alert.file_name,
            alert.fingerprint.short(),
            alert.url,
            risk
        );
        if let Some(diff) = &alert.diff {
            log::info!("[{}] diff for {}:\n{}", domain, alert.url, diff);
        }
        Ok(())
    }
}

/// JSON body posted by [`WebhookNotifier`].
#[derive(Debug, Serialize)]
pub struct WebhookPayload<'a> {
    pub domain: &'a str,
    #[serde(flatten)]
    pub alert: &'a AlertDecision,
}

#[cfg(feature = "webhook")]
pub use webhook::WebhookNotifier;

#[cfg(feature = "webhook")]
mod webhook {
    use super::*;

    use crate::error::AppError;

    /// POSTs each alert as JSON to a configured URL.
    pub struct WebhookNotifier {
        client: reqwest::Client,
        url: String,
    }

    impl WebhookNotifier {
        pub fn new(config: &NotifierConfig) -> Result<Self> {
            let url = config
                .webhook_url
                .clone()
                .ok_or_else(|| AppError::config("notifier.webhook_url is required"))?;
            let client = reqwest::Client::builder()
                .user_agent(&config.user_agent)
                .timeout(config.timeout())
                .build()?;
            Ok(Self { client, url })
        }
    }

    #[async_trait]
    impl Notifier for WebhookNotifier {
        async fn notify(&self, domain: &str, alert: &AlertDecision) -> Result<()> {
            let payload = WebhookPayload { domain, alert };
            self.client
                .post(&self.url)
                .json(&payload)
                .send()
                .await
                .and_then(|response| response.error_for_status())
                .map_err(|e| AppError::notification(&alert.url, e))?;
            Ok(())
        }
    }
}

/// Build the notifier selected by configuration.
pub fn build_notifier(config: &NotifierConfig) -> Result<Box<dyn Notifier>> {
    match config.kind {
        NotifierKind::Log => Ok(Box::new(LogNotifier)),
        #[cfg(feature = "webhook")]
        NotifierKind::Webhook => Ok(Box::new(WebhookNotifier::new(config)?)),
        #[cfg(not(feature = "webhook"))]
        NotifierKind::Webhook => Err(crate::error::AppError::config(
            "webhook notifier requires the `webhook` feature",
        )),
    }
}

#[cfg(test)]
pub(crate) use recording::RecordingNotifier;
