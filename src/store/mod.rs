//! Persistence layer — libSQL-backed storage for reports, settings, audit
//! logs, and the job queue.

pub mod jobs;
pub mod libsql_backend;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use traits::Database;

/// Keys of the process-wide settings written by the pipeline.
pub mod setting_keys {
    /// Aggregate marker: `running`, `completed` or `failed`.
    pub const ONBOARDING_STATUS: &str = "onboarding_status";
    pub const REPORTS_LAST_ERROR: &str = "reports_last_error";
    pub const LAST_RUNNER_HEARTBEAT: &str = "last_runner_heartbeat";
}
