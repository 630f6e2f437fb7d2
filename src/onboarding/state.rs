//! Aggregate onboarding status and the persisted pipeline marker.

use serde::{Deserialize, Serialize};

use crate::reports::ReportStatus;

/// The single onboarding status shown to operators.
///
/// Derived on every read from the required report rows and the queue; it is
/// never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnboardingStatus {
    NotStarted,
    Running,
    NeedsAttention,
    Paused,
    Completed,
}

impl OnboardingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::Running => "running",
            Self::NeedsAttention => "needs_attention",
            Self::Paused => "paused",
            Self::Completed => "completed",
        }
    }
}

impl Default for OnboardingStatus {
    fn default() -> Self {
        Self::NotStarted
    }
}

impl std::fmt::Display for OnboardingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transition marker written only by the coordinator.
///
/// Stored in the `settings` table under key `"onboarding_status"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineMarker {
    Running,
    Completed,
    /// The job queue was unavailable when work had to be scheduled.
    Failed,
}

impl PipelineMarker {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn from_setting(value: &serde_json::Value) -> Option<Self> {
        serde_json::from_value(value.clone()).ok()
    }
}

impl std::fmt::Display for PipelineMarker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Derive the aggregate status.
///
/// `rows` holds one entry per required report, in registry order; `None`
/// means the row was never persisted and counts as pending. `queue_active`
/// is true when a coordinator or runner job is pending.
///
/// Decision order: all submitted → `Completed`; any failed →
/// `NeedsAttention`; queue active → `Running`; some row persisted and still
/// pending or generated → `Paused`; otherwise `NotStarted`.
pub fn derive_status(rows: &[Option<ReportStatus>], queue_active: bool) -> OnboardingStatus {
    if rows.iter().all(|s| *s == Some(ReportStatus::Submitted)) {
        return OnboardingStatus::Completed;
    }

    if rows.iter().any(|s| *s == Some(ReportStatus::Failed)) {
        return OnboardingStatus::NeedsAttention;
    }

    if queue_active {
        return OnboardingStatus::Running;
    }

    let any_persisted = rows.iter().any(Option::is_some);
    let any_in_progress = rows
        .iter()
        .any(|s| s.is_none_or(|s| s.is_in_progress()));
    if any_persisted && any_in_progress {
        return OnboardingStatus::Paused;
    }

    OnboardingStatus::NotStarted
}
