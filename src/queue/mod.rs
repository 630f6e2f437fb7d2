//! Job queue adapter — typed pipeline jobs over a hook/args/group queue.
//!
//! The queue engine stores jobs as `(hook, args, group)` triples. The
//! pipeline never touches hook strings directly: it enqueues and receives
//! [`PipelineJob`] values, and the adapter does the encoding.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::QueueError;
use crate::reports::ReportKey;

/// Row id of a queued job.
pub type JobId = i64;

/// Registered hook names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobHook {
    /// Coordinator pass: pick the next incomplete report.
    RunNextReport,
    /// Runner: generate and submit one report.
    RunReport,
}

impl JobHook {
    pub const ALL: [JobHook; 2] = [JobHook::RunNextReport, JobHook::RunReport];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RunNextReport => "run_next_report",
            Self::RunReport => "run_report",
        }
    }
}

impl std::fmt::Display for JobHook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobHook {
    type Err = QueueError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "run_next_report" => Ok(Self::RunNextReport),
            "run_report" => Ok(Self::RunReport),
            other => Err(QueueError::UnknownHook(other.to_string())),
        }
    }
}

/// A unit of pipeline work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineJob {
    RunNext,
    /// `rerun` is set only for operator-requested runs; a pipeline run of a
    /// report that is already submitted does nothing.
    RunReport { key: ReportKey, rerun: bool },
}

#[derive(Serialize, Deserialize)]
struct RunReportArgs {
    #[serde(rename = "type")]
    report_type: String,
    version: u32,
    #[serde(default)]
    rerun: bool,
}

impl PipelineJob {
    pub fn hook(&self) -> JobHook {
        match self {
            Self::RunNext => JobHook::RunNextReport,
            Self::RunReport { .. } => JobHook::RunReport,
        }
    }

    /// JSON arguments stored alongside the hook.
    pub fn args(&self) -> serde_json::Value {
        match self {
            Self::RunNext => serde_json::json!({}),
            Self::RunReport { key, rerun } => serde_json::json!({
                "type": key.report_type,
                "version": key.version,
                "rerun": rerun,
            }),
        }
    }

    /// Rebuild a job from its stored hook and args.
    pub fn decode(hook: &str, args: &serde_json::Value) -> Result<Self, QueueError> {
        match hook.parse::<JobHook>()? {
            JobHook::RunNextReport => Ok(Self::RunNext),
            JobHook::RunReport => {
                let parsed: RunReportArgs =
                    serde_json::from_value(args.clone()).map_err(|e| QueueError::InvalidArgs {
                        hook: hook.to_string(),
                        reason: e.to_string(),
                    })?;
                let key = ReportKey::new(parsed.report_type, parsed.version);
                if !key.is_valid() {
                    return Err(QueueError::InvalidArgs {
                        hook: hook.to_string(),
                        reason: format!("invalid report key {key}"),
                    });
                }
                Ok(Self::RunReport {
                    key,
                    rerun: parsed.rerun,
                })
            }
        }
    }
}

/// Lifecycle of a queued job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Complete,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Complete => "complete",
            Self::Failed => "failed",
        }
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "complete" => Ok(Self::Complete),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Unknown job status: {}", s)),
        }
    }
}

/// A job moved to `running` by [`JobQueue::claim_next`].
///
/// The hook and args are kept raw so a job that fails to decode can still
/// be marked failed.
#[derive(Debug, Clone)]
pub struct ClaimedJob {
    pub id: JobId,
    pub hook: String,
    pub args: serde_json::Value,
    pub attempts: u32,
}

impl ClaimedJob {
    pub fn decode(&self) -> Result<PipelineJob, QueueError> {
        PipelineJob::decode(&self.hook, &self.args)
    }
}

/// A queue row, for operator listings.
#[derive(Debug, Clone, Serialize)]
pub struct JobRecord {
    pub id: JobId,
    pub hook: String,
    pub args: serde_json::Value,
    pub group: String,
    pub status: JobStatus,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Asynchronous, at-least-once job queue with group and dedup queries.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Add a pending job to `group`.
    async fn enqueue(&self, job: &PipelineJob, group: &str) -> Result<JobId, QueueError>;

    /// Whether any job for `hook` is pending in `group`.
    async fn has_pending(&self, hook: JobHook, group: &str) -> Result<bool, QueueError>;

    /// Cancel every pending job for `hook` in `group`. Claimed jobs are left
    /// to finish. Returns the number cancelled.
    async fn unschedule_all(&self, hook: JobHook, group: &str) -> Result<usize, QueueError>;

    /// Atomically move the oldest pending job in `group` to `running`.
    async fn claim_next(&self, group: &str) -> Result<Option<ClaimedJob>, QueueError>;

    async fn complete(&self, id: JobId) -> Result<(), QueueError>;

    async fn fail(&self, id: JobId, error: &str) -> Result<(), QueueError>;

    /// Newest jobs first.
    async fn list_jobs(&self, group: &str, limit: usize) -> Result<Vec<JobRecord>, QueueError>;

    /// Delete completed jobs. Returns the number deleted.
    async fn clear_finished(&self, group: &str) -> Result<usize, QueueError>;
}
