//! `JobQueue` over the `jobs` table of the libSQL backend.

use async_trait::async_trait;
use chrono::Utc;
use libsql::params;
use tracing::debug;

use crate::error::QueueError;
use crate::queue::{ClaimedJob, JobHook, JobId, JobQueue, JobRecord, JobStatus, PipelineJob};
use crate::store::libsql_backend::{LibSqlBackend, parse_datetime};

const JOB_COLUMNS: &str =
    "id, hook, args, group_name, status, attempts, last_error, created_at, updated_at";

/// SQLite primary result codes meaning the database cannot serve the queue
/// right now: BUSY, LOCKED, IOERR, CANTOPEN.
const UNAVAILABLE_CODES: [i32; 4] = [5, 6, 10, 14];

/// Map a backend error onto the queue contract. Connection-level failures
/// are `Unavailable`; everything else is a `Storage` error for `op`.
fn storage(op: &str, e: libsql::Error) -> QueueError {
    match &e {
        libsql::Error::ConnectionFailed(_) => QueueError::Unavailable,
        libsql::Error::SqliteFailure(code, _) if UNAVAILABLE_CODES.contains(&(code & 0xff)) => {
            QueueError::Unavailable
        }
        _ => QueueError::Storage(format!("{op}: {e}")),
    }
}

/// Map a libsql Row to a JobRecord. Column order matches JOB_COLUMNS.
fn row_to_job(row: &libsql::Row) -> Result<JobRecord, libsql::Error> {
    let args_str: String = row.get(2)?;
    let status_str: String = row.get(4)?;
    let attempts: i64 = row.get(5)?;
    let created_str: String = row.get(7)?;
    let updated_str: String = row.get(8)?;

    Ok(JobRecord {
        id: row.get(0)?,
        hook: row.get(1)?,
        args: serde_json::from_str(&args_str).unwrap_or(serde_json::Value::Null),
        group: row.get(3)?,
        status: status_str.parse().unwrap_or(JobStatus::Pending),
        attempts: u32::try_from(attempts).unwrap_or(0),
        last_error: row.get(6).ok(),
        created_at: parse_datetime(&created_str),
        updated_at: parse_datetime(&updated_str),
    })
}

#[async_trait]
impl JobQueue for LibSqlBackend {
    async fn enqueue(&self, job: &PipelineJob, group: &str) -> Result<JobId, QueueError> {
        let now = Utc::now().to_rfc3339();
        let args = job.args().to_string();
        let mut rows = self
            .conn()
            .query(
                "INSERT INTO jobs (hook, args, group_name, status, attempts, created_at, updated_at)
                 VALUES (?1, ?2, ?3, 'pending', 0, ?4, ?4)
                 RETURNING id",
                params![job.hook().as_str(), args, group, now],
            )
            .await
            .map_err(|e| storage("enqueue", e))?;

        let id: JobId = match rows.next().await {
            Ok(Some(row)) => row.get(0).map_err(|e| storage("enqueue", e))?,
            Ok(None) => return Err(QueueError::Storage("enqueue: no id returned".into())),
            Err(e) => return Err(storage("enqueue", e)),
        };

        debug!(job_id = id, hook = %job.hook(), group, "Job enqueued");
        Ok(id)
    }

    async fn has_pending(&self, hook: JobHook, group: &str) -> Result<bool, QueueError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT EXISTS(
                    SELECT 1 FROM jobs WHERE hook = ?1 AND group_name = ?2 AND status = 'pending'
                 )",
                params![hook.as_str(), group],
            )
            .await
            .map_err(|e| storage("has_pending", e))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(row.get::<i64>(0).unwrap_or(0) != 0),
            Ok(None) => Ok(false),
            Err(e) => Err(storage("has_pending", e)),
        }
    }

    async fn unschedule_all(&self, hook: JobHook, group: &str) -> Result<usize, QueueError> {
        let count = self
            .conn()
            .execute(
                "DELETE FROM jobs WHERE hook = ?1 AND group_name = ?2 AND status = 'pending'",
                params![hook.as_str(), group],
            )
            .await
            .map_err(|e| storage("unschedule_all", e))?;
        Ok(count as usize)
    }

    async fn claim_next(&self, group: &str) -> Result<Option<ClaimedJob>, QueueError> {
        let now = Utc::now().to_rfc3339();
        let mut rows = self
            .conn()
            .query(
                "UPDATE jobs
                 SET status = 'running', attempts = attempts + 1, updated_at = ?2
                 WHERE id = (
                    SELECT id FROM jobs
                    WHERE group_name = ?1 AND status = 'pending'
                    ORDER BY id ASC LIMIT 1
                 )
                 RETURNING id, hook, args, attempts",
                params![group, now],
            )
            .await
            .map_err(|e| storage("claim_next", e))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let args_str: String = row.get(2).map_err(|e| storage("claim_next", e))?;
                let attempts: i64 = row.get(3).map_err(|e| storage("claim_next", e))?;
                Ok(Some(ClaimedJob {
                    id: row.get(0).map_err(|e| storage("claim_next", e))?,
                    hook: row.get(1).map_err(|e| storage("claim_next", e))?,
                    args: serde_json::from_str(&args_str).unwrap_or(serde_json::Value::Null),
                    attempts: u32::try_from(attempts).unwrap_or(0),
                }))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(storage("claim_next", e)),
        }
    }

    async fn complete(&self, id: JobId) -> Result<(), QueueError> {
        let now = Utc::now().to_rfc3339();
        self.conn()
            .execute(
                "UPDATE jobs SET status = 'complete', last_error = NULL, updated_at = ?2
                 WHERE id = ?1",
                params![id, now],
            )
            .await
            .map_err(|e| storage("complete", e))?;
        Ok(())
    }

    async fn fail(&self, id: JobId, error: &str) -> Result<(), QueueError> {
        let now = Utc::now().to_rfc3339();
        self.conn()
            .execute(
                "UPDATE jobs SET status = 'failed', last_error = ?2, updated_at = ?3
                 WHERE id = ?1",
                params![id, error, now],
            )
            .await
            .map_err(|e| storage("fail", e))?;
        Ok(())
    }

    async fn list_jobs(&self, group: &str, limit: usize) -> Result<Vec<JobRecord>, QueueError> {
        let limit = limit.clamp(1, 1000) as i64;
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {JOB_COLUMNS} FROM jobs WHERE group_name = ?1
                     ORDER BY id DESC LIMIT ?2"
                ),
                params![group, limit],
            )
            .await
            .map_err(|e| storage("list_jobs", e))?;

        let mut jobs = Vec::new();
        while let Some(row) = rows.next().await.map_err(|e| storage("list_jobs", e))? {
            jobs.push(row_to_job(&row).map_err(|e| storage("list_jobs row parse", e))?);
        }
        Ok(jobs)
    }

    async fn clear_finished(&self, group: &str) -> Result<usize, QueueError> {
        let count = self
            .conn()
            .execute(
                "DELETE FROM jobs WHERE group_name = ?1 AND status = 'complete'",
                params![group],
            )
            .await
            .map_err(|e| storage("clear_finished", e))?;
        Ok(count as usize)
    }
}
