// src/pipeline/gate.rs

//! Dedup gate for notification candidates.
//!
//! Dedup keys on the last *alerted* fingerprint of a URL, not on its
//! current fingerprint. Only an exact repeat of the last alerted version is
//! suppressed, so content that oscillates A -> B -> A alerts on every
//! transition away from what was last reported.

use crate::models::{AlertKind, FileRecord, Fingerprint};

/// Decide whether a candidate version warrants a notification.
pub fn should_alert(
    record: Option<&FileRecord>,
    candidate: &Fingerprint,
    kind: AlertKind,
) -> bool {
    let last_alerted = record.and_then(|r| r.last_alerted_fingerprint.as_ref());
    let fire = last_alerted != Some(candidate);

    if !fire {
        log::debug!(
            "Suppressing {} alert for {}: {} already reported",
            kind,
            record.map(|r| r.url.as_str()).unwrap_or("?"),
            candidate.short()
        );
    }
    fire
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record(current: &str, alerted: Option<&str>) -> FileRecord {
        let mut r = FileRecord::first_observation(
            "example.com",
            "https://example.com/a.js",
            Fingerprint::of(current),
            Utc::now(),
        );
        r.last_alerted_fingerprint = alerted.map(Fingerprint::of);
        r
    }

    #[test]
    fn test_unknown_url_always_alerts() {
        assert!(should_alert(None, &Fingerprint::of("a"), AlertKind::New));
    }

    #[test]
    fn test_never_alerted_record_alerts() {
        let r = record("a", None);
        assert!(should_alert(Some(&r), &Fingerprint::of("b"), AlertKind::Modified));
    }

    #[test]
    fn test_repeat_of_last_alerted_is_suppressed() {
        let r = record("a", Some("b"));
        assert!(!should_alert(Some(&r), &Fingerprint::of("b"), AlertKind::Modified));
    }

    #[test]
    fn test_revert_to_older_alerted_version_alerts() {
        // h1 alerted, then h2 alerted; h1 reappears
        let r = record("h2", Some("h2"));
        assert!(should_alert(Some(&r), &Fingerprint::of("h1"), AlertKind::Modified));
    }
}
