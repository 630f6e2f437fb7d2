//! Onboarding coordinator — drives the one-report-per-pass dispatch loop
//! and derives the aggregate status.

use std::sync::Arc;

use serde::Serialize;
use serde_json::json;

use crate::audit::{AuditLog, LogLevel, LogScope, StoredLog};
use crate::error::{Error, PipelineError, QueueError};
use crate::queue::{JobHook, JobId, JobQueue, JobRecord, PipelineJob};
use crate::reports::{ReportKey, ReportRegistry, ReportRow, ReportStatus};
use crate::store::{Database, setting_keys};

use super::state::{OnboardingStatus, PipelineMarker, derive_status};

/// Diagnostic stored when the queue refuses work.
pub const QUEUE_UNAVAILABLE_MESSAGE: &str = "Job queue not available.";

/// Result of [`OnboardingCoordinator::enqueue_next`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Enqueued(JobId),
    /// A coordinator job was already pending; nothing was added.
    AlreadyQueued,
}

/// Result of one coordinator pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunNextOutcome {
    /// A runner job was enqueued for this report.
    Enqueued(ReportKey),
    /// Every required report is submitted.
    Completed,
    /// Nothing eligible: the remaining reports failed and wait for a rerun.
    Stalled(Vec<ReportKey>),
}

/// Everything an operator screen needs in one read.
#[derive(Debug, Clone, Serialize)]
pub struct OnboardingSnapshot {
    pub status: OnboardingStatus,
    pub marker: Option<PipelineMarker>,
    pub last_error: Option<String>,
    pub last_runner_heartbeat: Option<String>,
    pub queue_active: bool,
    pub reports: Vec<ReportRow>,
}

/// Counts from [`OnboardingCoordinator::full_reset`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ResetSummary {
    pub jobs_unscheduled: usize,
    pub reports_cleared: usize,
}

pub struct OnboardingCoordinator {
    registry: Arc<ReportRegistry>,
    store: Arc<dyn Database>,
    queue: Arc<dyn JobQueue>,
    audit: AuditLog,
    group: String,
}

impl OnboardingCoordinator {
    pub fn new(
        registry: Arc<ReportRegistry>,
        store: Arc<dyn Database>,
        queue: Arc<dyn JobQueue>,
        audit: AuditLog,
        group: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            store,
            queue,
            audit,
            group: group.into(),
        }
    }

    pub fn registry(&self) -> &ReportRegistry {
        &self.registry
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    /// Seed pending rows, mark the pipeline running, and schedule a pass.
    pub async fn start(&self) -> Result<EnqueueOutcome, Error> {
        for def in self.registry.required() {
            let key = def.key();
            self.store.upsert_pending(&key).await?;
            self.store
                .delete_older_report_versions(&key.report_type, key.version)
                .await?;
        }

        self.set_marker(PipelineMarker::Running).await?;

        self.audit
            .info(
                LogScope::Admin,
                "pipeline_started",
                "Onboarding pipeline started.",
                json!({ "required": self.registry.required().len() }),
            )
            .await;

        self.enqueue_next().await
    }

    /// Schedule a coordinator pass unless one is already pending.
    ///
    /// The check-then-enqueue is not atomic; a concurrent duplicate yields a
    /// second pass that re-selects the same report or finds none.
    pub async fn enqueue_next(&self) -> Result<EnqueueOutcome, Error> {
        let pending = match self.queue.has_pending(JobHook::RunNextReport, &self.group).await {
            Ok(pending) => pending,
            Err(e) => return Err(self.queue_failure(e).await),
        };

        if pending {
            self.audit
                .debug(
                    LogScope::System,
                    "coordinator_already_queued",
                    "Coordinator job already pending.",
                    json!({ "group": self.group }),
                )
                .await;
            return Ok(EnqueueOutcome::AlreadyQueued);
        }

        let id = match self.queue.enqueue(&PipelineJob::RunNext, &self.group).await {
            Ok(id) => id,
            Err(e) => return Err(self.queue_failure(e).await),
        };

        self.audit
            .debug(
                LogScope::System,
                "coordinator_enqueued",
                "Coordinator job enqueued.",
                json!({ "job_id": id, "group": self.group }),
            )
            .await;
        Ok(EnqueueOutcome::Enqueued(id))
    }

    /// One coordinator pass: enqueue a runner for the first report, in
    /// registry order, that is absent, pending, or generated.
    ///
    /// Failed reports are skipped; they are retried only by an explicit rerun.
    pub async fn run_next(&self) -> Result<RunNextOutcome, Error> {
        let mut failed = Vec::new();

        for def in self.registry.required() {
            let key = def.key();
            let status = self.store.get_report(&key).await?.map(|r| r.status);
            match status {
                Some(ReportStatus::Submitted) => continue,
                Some(ReportStatus::Failed) => failed.push(key),
                None | Some(ReportStatus::Pending) | Some(ReportStatus::Generated) => {
                    self.enqueue_report(&key, false).await?;
                    return Ok(RunNextOutcome::Enqueued(key));
                }
            }
        }

        if !failed.is_empty() {
            tracing::info!(failed = failed.len(), "Pipeline stalled on failed reports");
            return Ok(RunNextOutcome::Stalled(failed));
        }

        self.set_marker(PipelineMarker::Completed).await?;
        self.audit
            .info(
                LogScope::Reports,
                "pipeline_completed",
                "All required reports submitted.",
                json!({}),
            )
            .await;
        Ok(RunNextOutcome::Completed)
    }

    /// Enqueue a runner job for an explicit key. With `rerun` the runner
    /// regenerates and resubmits even a submitted report.
    pub async fn enqueue_report(&self, key: &ReportKey, rerun: bool) -> Result<JobId, Error> {
        if !key.is_valid() {
            return Err(PipelineError::InvalidReportKey {
                report_type: key.report_type.clone(),
                version: key.version,
            }
            .into());
        }

        let job = PipelineJob::RunReport {
            key: key.clone(),
            rerun,
        };
        let id = match self.queue.enqueue(&job, &self.group).await {
            Ok(id) => id,
            Err(e) => return Err(self.queue_failure(e).await),
        };

        self.audit
            .report(
                LogLevel::Info,
                "report_enqueued",
                key,
                "Report job enqueued.",
                json!({ "job_id": id, "rerun": rerun }),
            )
            .await;
        Ok(id)
    }

    /// Operator rerun: regenerate and resubmit one report now.
    pub async fn rerun(&self, key: &ReportKey) -> Result<JobId, Error> {
        self.request_run(key, "rerun").await
    }

    /// Operator retry of a failed submission. Runs the full cycle.
    pub async fn retry_submit(&self, key: &ReportKey) -> Result<JobId, Error> {
        self.request_run(key, "retry_submit").await
    }

    async fn request_run(&self, key: &ReportKey, action: &str) -> Result<JobId, Error> {
        let id = self.enqueue_report(key, true).await?;
        self.audit
            .info(
                LogScope::Admin,
                "report_rerun_requested",
                "Operator requested a report run.",
                json!({
                    "action": action,
                    "report_type": key.report_type,
                    "report_version": key.version,
                    "job_id": id,
                }),
            )
            .await;
        Ok(id)
    }

    /// Whether a coordinator or runner job is pending. An unreachable queue
    /// reads as inactive.
    pub async fn is_queue_active(&self) -> bool {
        for hook in JobHook::ALL {
            match self.queue.has_pending(hook, &self.group).await {
                Ok(true) => return true,
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(hook = %hook, "Queue activity check failed: {}", e);
                    return false;
                }
            }
        }
        false
    }

    /// Aggregate status from the current rows and queue. Read-only.
    pub async fn effective_status(&self) -> Result<OnboardingStatus, Error> {
        let rows = self.required_statuses().await?;
        let queue_active = self.is_queue_active().await;
        Ok(derive_status(&rows, queue_active))
    }

    pub async fn snapshot(&self) -> Result<OnboardingSnapshot, Error> {
        let rows = self.required_statuses().await?;
        let queue_active = self.is_queue_active().await;

        let marker = self
            .store
            .get_setting(setting_keys::ONBOARDING_STATUS)
            .await?
            .as_ref()
            .and_then(PipelineMarker::from_setting);
        let last_error = self
            .store
            .get_setting(setting_keys::REPORTS_LAST_ERROR)
            .await?
            .and_then(|v| v.as_str().map(str::to_string));
        let last_runner_heartbeat = self
            .store
            .get_setting(setting_keys::LAST_RUNNER_HEARTBEAT)
            .await?
            .and_then(|v| v.as_str().map(str::to_string));

        Ok(OnboardingSnapshot {
            status: derive_status(&rows, queue_active),
            marker,
            last_error,
            last_runner_heartbeat,
            queue_active,
            reports: self.reports().await?,
        })
    }

    /// Rows for the required report types, for display.
    pub async fn reports(&self) -> Result<Vec<ReportRow>, Error> {
        Ok(self
            .store
            .list_reports_by_types(&self.registry.required_types())
            .await?)
    }

    pub async fn latest_report(&self, report_type: &str) -> Result<Option<ReportRow>, Error> {
        Ok(self.store.get_latest_report_by_type(report_type).await?)
    }

    // ── Operator actions ────────────────────────────────────────────

    /// Cancel pending coordinator and runner jobs. Claimed jobs finish.
    pub async fn unschedule(&self) -> Result<usize, Error> {
        let mut total = 0;
        for hook in JobHook::ALL {
            total += self.queue.unschedule_all(hook, &self.group).await?;
        }
        self.audit
            .warning(
                LogScope::Admin,
                "queue_unscheduled",
                "Pending pipeline jobs unscheduled.",
                json!({ "count": total }),
            )
            .await;
        Ok(total)
    }

    /// Forget the marker and its diagnostics.
    pub async fn reset_status(&self) -> Result<(), Error> {
        for key in [
            setting_keys::ONBOARDING_STATUS,
            setting_keys::REPORTS_LAST_ERROR,
            setting_keys::LAST_RUNNER_HEARTBEAT,
        ] {
            self.store.delete_setting(key).await?;
        }
        self.audit
            .warning(
                LogScope::Admin,
                "status_reset",
                "Onboarding status reset.",
                json!({}),
            )
            .await;
        Ok(())
    }

    pub async fn clear_reports(&self) -> Result<usize, Error> {
        let count = self.store.clear_reports().await?;
        self.audit
            .warning(
                LogScope::Admin,
                "reports_cleared",
                "Report rows cleared.",
                json!({ "count": count }),
            )
            .await;
        Ok(count)
    }

    /// Delete completed jobs from the queue.
    pub async fn clear_jobs(&self) -> Result<usize, Error> {
        let count = self.queue.clear_finished(&self.group).await?;
        self.audit
            .info(
                LogScope::Admin,
                "jobs_cleared",
                "Completed jobs cleared.",
                json!({ "count": count }),
            )
            .await;
        Ok(count)
    }

    /// Unschedule, reset the status, and clear all report rows.
    pub async fn full_reset(&self) -> Result<ResetSummary, Error> {
        let jobs_unscheduled = self.unschedule().await?;
        self.reset_status().await?;
        let reports_cleared = self.clear_reports().await?;
        Ok(ResetSummary {
            jobs_unscheduled,
            reports_cleared,
        })
    }

    pub async fn recent_logs(&self, limit: usize) -> Result<Vec<StoredLog>, Error> {
        Ok(self.store.latest_logs(limit).await?)
    }

    pub async fn recent_jobs(&self, limit: usize) -> Result<Vec<JobRecord>, Error> {
        Ok(self.queue.list_jobs(&self.group, limit).await?)
    }

    // ── Internals ───────────────────────────────────────────────────

    async fn required_statuses(&self) -> Result<Vec<Option<ReportStatus>>, Error> {
        let mut rows = Vec::with_capacity(self.registry.required().len());
        for def in self.registry.required() {
            rows.push(self.store.get_report(&def.key()).await?.map(|r| r.status));
        }
        Ok(rows)
    }

    async fn set_marker(&self, marker: PipelineMarker) -> Result<(), Error> {
        self.store
            .set_setting(setting_keys::ONBOARDING_STATUS, &json!(marker.as_str()))
            .await?;
        Ok(())
    }

    /// Record an unavailable queue as a fatal precondition, then hand the
    /// error back for propagation.
    async fn queue_failure(&self, err: QueueError) -> Error {
        if matches!(err, QueueError::Unavailable) {
            if let Err(e) = self.set_marker(PipelineMarker::Failed).await {
                tracing::error!("Failed to record pipeline failure: {}", e);
            }
            if let Err(e) = self
                .store
                .set_setting(
                    setting_keys::REPORTS_LAST_ERROR,
                    &json!(QUEUE_UNAVAILABLE_MESSAGE),
                )
                .await
            {
                tracing::error!("Failed to record queue diagnostic: {}", e);
            }
            self.audit
                .error(
                    LogScope::System,
                    "queue_unavailable",
                    QUEUE_UNAVAILABLE_MESSAGE,
                    json!({ "group": self.group }),
                )
                .await;
        }
        err.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::ClaimedJob;
    use crate::reports::{GenerationContext, SiteInfo, payload_hash};
    use crate::store::LibSqlBackend;
    use async_trait::async_trait;
    use chrono::Utc;

    const GROUP: &str = "beacon";

    fn registry() -> Arc<ReportRegistry> {
        Arc::new(ReportRegistry::new(GenerationContext::new(SiteInfo {
            name: "Acme".into(),
            description: String::new(),
            url: "https://acme.test/".into(),
        })))
    }

    async fn setup() -> (Arc<LibSqlBackend>, OnboardingCoordinator) {
        let db = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let coordinator = OnboardingCoordinator::new(
            registry(),
            db.clone(),
            db.clone(),
            AuditLog::new(db.clone()),
            GROUP,
        );
        (db, coordinator)
    }

    fn profile() -> ReportKey {
        ReportKey::new("website_profile", 1)
    }

    fn areas() -> ReportKey {
        ReportKey::new("website_content_areas", 1)
    }

    async fn submit(db: &LibSqlBackend, key: &ReportKey) {
        db.upsert_generated(key, "{}", &payload_hash("{}"), Utc::now())
            .await
            .unwrap();
        db.mark_submitted(key, Utc::now()).await.unwrap();
    }

    async fn pending_jobs(db: &LibSqlBackend, hook: JobHook) -> usize {
        db.list_jobs(GROUP, 100)
            .await
            .unwrap()
            .into_iter()
            .filter(|j| j.hook == hook.as_str() && j.status == crate::queue::JobStatus::Pending)
            .count()
    }

    /// Queue that refuses everything.
    struct DownQueue;

    #[async_trait]
    impl JobQueue for DownQueue {
        async fn enqueue(&self, _: &PipelineJob, _: &str) -> Result<JobId, QueueError> {
            Err(QueueError::Unavailable)
        }
        async fn has_pending(&self, _: JobHook, _: &str) -> Result<bool, QueueError> {
            Err(QueueError::Unavailable)
        }
        async fn unschedule_all(&self, _: JobHook, _: &str) -> Result<usize, QueueError> {
            Err(QueueError::Unavailable)
        }
        async fn claim_next(&self, _: &str) -> Result<Option<ClaimedJob>, QueueError> {
            Err(QueueError::Unavailable)
        }
        async fn complete(&self, _: JobId) -> Result<(), QueueError> {
            Err(QueueError::Unavailable)
        }
        async fn fail(&self, _: JobId, _: &str) -> Result<(), QueueError> {
            Err(QueueError::Unavailable)
        }
        async fn list_jobs(&self, _: &str, _: usize) -> Result<Vec<JobRecord>, QueueError> {
            Err(QueueError::Unavailable)
        }
        async fn clear_finished(&self, _: &str) -> Result<usize, QueueError> {
            Err(QueueError::Unavailable)
        }
    }

    // ── Status scenarios ────────────────────────────────────────────

    #[tokio::test]
    async fn empty_store_is_not_started() {
        let (_db, c) = setup().await;
        assert_eq!(c.effective_status().await.unwrap(), OnboardingStatus::NotStarted);
    }

    #[tokio::test]
    async fn pending_runner_job_is_running() {
        let (db, c) = setup().await;
        submit(&db, &profile()).await;
        db.enqueue(
            &PipelineJob::RunReport {
                key: areas(),
                rerun: false,
            },
            GROUP,
        )
            .await
            .unwrap();
        assert_eq!(c.effective_status().await.unwrap(), OnboardingStatus::Running);
    }

    #[tokio::test]
    async fn failed_row_needs_attention() {
        let (db, c) = setup().await;
        submit(&db, &profile()).await;
        db.mark_failed(&areas(), "Submit failed (500): boom")
            .await
            .unwrap();
        assert_eq!(
            c.effective_status().await.unwrap(),
            OnboardingStatus::NeedsAttention
        );
    }

    #[tokio::test]
    async fn all_submitted_is_completed_with_queue_activity() {
        let (db, c) = setup().await;
        submit(&db, &profile()).await;
        submit(&db, &areas()).await;
        db.enqueue(&PipelineJob::RunNext, GROUP).await.unwrap();
        assert_eq!(c.effective_status().await.unwrap(), OnboardingStatus::Completed);
    }

    #[tokio::test]
    async fn status_read_is_pure() {
        let (db, c) = setup().await;
        db.upsert_pending(&profile()).await.unwrap();
        let first = c.effective_status().await.unwrap();
        let second = c.effective_status().await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first, OnboardingStatus::Paused);
        assert_eq!(db.list_jobs(GROUP, 10).await.unwrap().len(), 0);
    }

    // ── Dispatch ────────────────────────────────────────────────────

    #[tokio::test]
    async fn start_seeds_marks_and_enqueues() {
        let (db, c) = setup().await;
        let outcome = c.start().await.unwrap();
        assert!(matches!(outcome, EnqueueOutcome::Enqueued(_)));

        for key in [profile(), areas()] {
            let row = db.get_report(&key).await.unwrap().unwrap();
            assert_eq!(row.status, ReportStatus::Pending);
        }
        assert_eq!(
            db.get_setting(setting_keys::ONBOARDING_STATUS).await.unwrap(),
            Some(json!("running"))
        );
        assert_eq!(pending_jobs(&db, JobHook::RunNextReport).await, 1);
        assert_eq!(c.effective_status().await.unwrap(), OnboardingStatus::Running);
    }

    #[tokio::test]
    async fn start_leaves_submitted_rows_alone() {
        let (db, c) = setup().await;
        submit(&db, &profile()).await;
        c.start().await.unwrap();
        let row = db.get_report(&profile()).await.unwrap().unwrap();
        assert_eq!(row.status, ReportStatus::Submitted);
    }

    #[tokio::test]
    async fn start_prunes_superseded_versions() {
        let (db, c) = setup().await;
        db.upsert_pending(&ReportKey::new("website_profile", 0))
            .await
            .unwrap();
        c.start().await.unwrap();
        assert_eq!(
            db.get_latest_report_by_type("website_profile")
                .await
                .unwrap()
                .unwrap()
                .version,
            1
        );
        assert_eq!(c.reports().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn coordinator_job_is_deduplicated() {
        let (db, c) = setup().await;
        assert!(matches!(
            c.enqueue_next().await.unwrap(),
            EnqueueOutcome::Enqueued(_)
        ));
        assert_eq!(c.enqueue_next().await.unwrap(), EnqueueOutcome::AlreadyQueued);
        assert_eq!(c.enqueue_next().await.unwrap(), EnqueueOutcome::AlreadyQueued);
        assert_eq!(pending_jobs(&db, JobHook::RunNextReport).await, 1);
    }

    #[tokio::test]
    async fn run_next_advances_one_report_in_order() {
        let (db, c) = setup().await;
        assert_eq!(
            c.run_next().await.unwrap(),
            RunNextOutcome::Enqueued(profile())
        );
        assert_eq!(pending_jobs(&db, JobHook::RunReport).await, 1);

        submit(&db, &profile()).await;
        db.unschedule_all(JobHook::RunReport, GROUP).await.unwrap();
        assert_eq!(c.run_next().await.unwrap(), RunNextOutcome::Enqueued(areas()));
    }

    #[tokio::test]
    async fn run_next_skips_failed_reports() {
        let (db, c) = setup().await;
        db.mark_failed(&profile(), "boom").await.unwrap();
        assert_eq!(c.run_next().await.unwrap(), RunNextOutcome::Enqueued(areas()));

        submit(&db, &areas()).await;
        assert_eq!(
            c.run_next().await.unwrap(),
            RunNextOutcome::Stalled(vec![profile()])
        );
        assert_ne!(
            db.get_setting(setting_keys::ONBOARDING_STATUS).await.unwrap(),
            Some(json!("completed"))
        );
    }

    #[tokio::test]
    async fn run_next_completes_when_all_submitted() {
        let (db, c) = setup().await;
        submit(&db, &profile()).await;
        submit(&db, &areas()).await;
        assert_eq!(c.run_next().await.unwrap(), RunNextOutcome::Completed);
        assert_eq!(
            db.get_setting(setting_keys::ONBOARDING_STATUS).await.unwrap(),
            Some(json!("completed"))
        );
        assert_eq!(db.list_jobs(GROUP, 10).await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn rerun_validates_key() {
        let (_db, c) = setup().await;
        for key in [ReportKey::new("", 1), ReportKey::new("website_profile", 0)] {
            let err = c.rerun(&key).await.unwrap_err();
            assert!(matches!(
                err,
                Error::Pipeline(PipelineError::InvalidReportKey { .. })
            ));
        }
    }

    #[tokio::test]
    async fn rerun_bypasses_selection() {
        let (db, c) = setup().await;
        submit(&db, &profile()).await;
        c.rerun(&profile()).await.unwrap();
        c.retry_submit(&areas()).await.unwrap();

        let jobs = db.list_jobs(GROUP, 10).await.unwrap();
        let keys: Vec<_> = jobs
            .iter()
            .map(|j| j.args["type"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(keys, vec!["website_content_areas", "website_profile"]);
        assert!(jobs.iter().all(|j| j.args["rerun"] == json!(true)));
    }

    #[tokio::test]
    async fn pipeline_selection_is_not_a_rerun() {
        let (db, c) = setup().await;
        c.run_next().await.unwrap();

        let jobs = db.list_jobs(GROUP, 10).await.unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].args["rerun"], json!(false));
    }

    // ── Queue unavailable ───────────────────────────────────────────

    #[tokio::test]
    async fn unavailable_queue_marks_pipeline_failed() {
        let db = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let c = OnboardingCoordinator::new(
            registry(),
            db.clone(),
            Arc::new(DownQueue),
            AuditLog::new(db.clone()),
            GROUP,
        );

        let err = c.start().await.unwrap_err();
        assert!(matches!(err, Error::Queue(QueueError::Unavailable)));
        assert_eq!(
            db.get_setting(setting_keys::ONBOARDING_STATUS).await.unwrap(),
            Some(json!("failed"))
        );

        let snapshot = c.snapshot().await.unwrap();
        assert_eq!(snapshot.marker, Some(PipelineMarker::Failed));
        assert_eq!(snapshot.last_error.as_deref(), Some(QUEUE_UNAVAILABLE_MESSAGE));
        assert!(!snapshot.queue_active);
        // Rows were seeded but nothing can run.
        assert_eq!(snapshot.status, OnboardingStatus::Paused);
    }

    // ── Operator actions ────────────────────────────────────────────

    #[tokio::test]
    async fn full_reset_clears_everything() {
        let (db, c) = setup().await;
        c.start().await.unwrap();
        c.rerun(&profile()).await.unwrap();
        db.set_setting(setting_keys::LAST_RUNNER_HEARTBEAT, &json!("now"))
            .await
            .unwrap();

        let summary = c.full_reset().await.unwrap();
        assert_eq!(
            summary,
            ResetSummary {
                jobs_unscheduled: 2,
                reports_cleared: 2
            }
        );

        let snapshot = c.snapshot().await.unwrap();
        assert_eq!(snapshot.status, OnboardingStatus::NotStarted);
        assert!(snapshot.marker.is_none());
        assert!(snapshot.last_runner_heartbeat.is_none());
        assert!(snapshot.reports.is_empty());

        let events: Vec<_> = c
            .recent_logs(50)
            .await
            .unwrap()
            .into_iter()
            .map(|l| l.event)
            .collect();
        for event in ["queue_unscheduled", "status_reset", "reports_cleared"] {
            assert!(events.iter().any(|e| e == event), "missing {event}");
        }
    }

    #[tokio::test]
    async fn clear_jobs_only_removes_completed() {
        let (db, c) = setup().await;
        let done = db.enqueue(&PipelineJob::RunNext, GROUP).await.unwrap();
        db.claim_next(GROUP).await.unwrap();
        db.complete(done).await.unwrap();
        db.enqueue(&PipelineJob::RunNext, GROUP).await.unwrap();

        assert_eq!(c.clear_jobs().await.unwrap(), 1);
        assert_eq!(c.recent_jobs(10).await.unwrap().len(), 1);
    }
}
