//! Report rows, keys, and lifecycle status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique identity of a report: `(type, version)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReportKey {
    pub report_type: String,
    pub version: u32,
}

impl ReportKey {
    pub fn new(report_type: impl Into<String>, version: u32) -> Self {
        Self {
            report_type: report_type.into(),
            version,
        }
    }

    /// A key an operator may target: non-empty type, positive version.
    pub fn is_valid(&self) -> bool {
        !self.report_type.trim().is_empty() && self.version > 0
    }
}

impl std::fmt::Display for ReportKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} v{}", self.report_type, self.version)
    }
}

/// Lifecycle status of a persisted report row.
///
/// `Pending → Generated → Submitted`, with `Failed` reachable from any
/// state and left only by a rerun.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Pending,
    Generated,
    Submitted,
    Failed,
}

impl ReportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Generated => "generated",
            Self::Submitted => "submitted",
            Self::Failed => "failed",
        }
    }

    /// Still waiting on generation or submission.
    pub fn is_in_progress(&self) -> bool {
        matches!(self, Self::Pending | Self::Generated)
    }
}

impl std::fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ReportStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "generated" => Ok(Self::Generated),
            "submitted" => Ok(Self::Submitted),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Unknown report status: {}", s)),
        }
    }
}

/// A persisted report row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportRow {
    pub id: i64,
    pub report_type: String,
    pub version: u32,
    pub status: ReportStatus,
    /// Serialized report content, `None` until first generated.
    pub payload: Option<String>,
    /// Lowercase hex SHA-256 of `payload`.
    pub payload_hash: Option<String>,
    pub generated_at: Option<DateTime<Utc>>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ReportRow {
    pub fn key(&self) -> ReportKey {
        ReportKey::new(&self.report_type, self.version)
    }
}
