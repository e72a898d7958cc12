//! Content analysis results attached to alerts.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Coarse risk rating derived from the number of sensitive findings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    /// More than five findings is high, more than two is medium.
    pub fn from_finding_count(count: usize) -> Self {
        if count > 5 {
            RiskLevel::High
        } else if count > 2 {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RiskLevel::Low => "LOW",
            RiskLevel::Medium => "MEDIUM",
            RiskLevel::High => "HIGH",
        };
        f.write_str(s)
    }
}

/// A potentially sensitive match in a script body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    /// Keyword or credential class that matched
    pub keyword: String,
    /// 1-based line number
    pub line: usize,
    /// Trimmed excerpt of the matching line
    pub excerpt: String,
}

/// Summary of what a script body exposes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Analysis {
    pub risk_level: RiskLevel,
    pub findings: Vec<Finding>,
    pub endpoints: Vec<String>,
    pub size_bytes: usize,
    pub line_count: usize,
}
