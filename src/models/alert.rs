// src/models/alert.rs

//! Per-scan classification output and alert decisions.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::models::{Analysis, Fingerprint};

/// Why a file is a notification candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    New,
    Modified,
}

impl AlertKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::New => "new",
            AlertKind::Modified => "modified",
        }
    }
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of classifying one URL against stored state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Classification {
    New,
    Modified,
    Unchanged,
}

impl Classification {
    /// The alert kind, if this classification is a candidate.
    pub fn alert_kind(&self) -> Option<AlertKind> {
        match self {
            Classification::New => Some(AlertKind::New),
            Classification::Modified => Some(AlertKind::Modified),
            Classification::Unchanged => None,
        }
    }
}

/// Partition of one domain's observed URLs. Not persisted.
///
/// Each group keeps the insertion order of the observed set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ClassificationResult {
    pub new_files: Vec<String>,
    pub modified_files: Vec<String>,
    pub unchanged_files: Vec<String>,
}

impl ClassificationResult {
    /// All URLs with their class: new, then modified, then unchanged.
    ///
    /// This is also the order in which commits are applied.
    pub fn in_order(&self) -> impl Iterator<Item = (&str, Classification)> + '_ {
        let new = self
            .new_files
            .iter()
            .map(|u| (u.as_str(), Classification::New));
        let modified = self
            .modified_files
            .iter()
            .map(|u| (u.as_str(), Classification::Modified));
        let unchanged = self
            .unchanged_files
            .iter()
            .map(|u| (u.as_str(), Classification::Unchanged));
        new.chain(modified).chain(unchanged)
    }

    pub fn total(&self) -> usize {
        self.new_files.len() + self.modified_files.len() + self.unchanged_files.len()
    }

    /// Check if there are any candidates.
    pub fn has_changes(&self) -> bool {
        !self.new_files.is_empty() || !self.modified_files.is_empty()
    }
}

/// Textual diff attached to a modified-file alert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "text", rename_all = "snake_case")]
pub enum FileDiff {
    /// Unified line diff from the archived prior body
    Unified(String),
    /// The prior body was never archived
    NoBaseline,
}

impl FileDiff {
    pub fn text(&self) -> Option<&str> {
        match self {
            FileDiff::Unified(text) => Some(text),
            FileDiff::NoBaseline => None,
        }
    }
}

impl fmt::Display for FileDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileDiff::Unified(text) => f.write_str(text),
            FileDiff::NoBaseline => f.write_str("(no baseline available)"),
        }
    }
}

/// A notification that passed the dedup gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertDecision {
    pub url: String,
    pub file_name: String,
    pub fingerprint: Fingerprint,
    pub kind: AlertKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_fingerprint: Option<Fingerprint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff: Option<FileDiff>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis: Option<Analysis>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_order_groups_then_preserves_insertion() {
        let result = ClassificationResult {
            new_files: vec!["n1".into(), "n2".into()],
            modified_files: vec!["m1".into()],
            unchanged_files: vec!["u1".into()],
        };
        let order: Vec<_> = result.in_order().collect();
        assert_eq!(
            order,
            vec![
                ("n1", Classification::New),
                ("n2", Classification::New),
                ("m1", Classification::Modified),
                ("u1", Classification::Unchanged),
            ]
        );
        assert_eq!(result.total(), 4);
        assert!(result.has_changes());
    }

    #[test]
    fn file_diff_serializes_with_status() {
        let json = serde_json::to_value(FileDiff::NoBaseline).unwrap();
        assert_eq!(json["status"], "no_baseline");

        let json = serde_json::to_value(FileDiff::Unified("@@".into())).unwrap();
        assert_eq!(json["status"], "unified");
        assert_eq!(json["text"], "@@");
    }
}
