//! Typed job dispatch — the single place pipeline jobs are executed.

use std::sync::Arc;

use crate::error::Error;
use crate::onboarding::{OnboardingCoordinator, RunNextOutcome};
use crate::queue::PipelineJob;
use crate::reports::{ReportKey, ReportRunner, RunOutcome};

/// What a dispatched job did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// A coordinator pass ran.
    Coordinated(RunNextOutcome),
    /// A runner job ran; its result is recorded on the report row.
    Ran { key: ReportKey, outcome: RunOutcome },
}

pub struct PipelineDispatcher {
    coordinator: Arc<OnboardingCoordinator>,
    runner: Arc<ReportRunner>,
}

impl PipelineDispatcher {
    pub fn new(coordinator: Arc<OnboardingCoordinator>, runner: Arc<ReportRunner>) -> Self {
        Self {
            coordinator,
            runner,
        }
    }

    /// Execute one job.
    ///
    /// A runner job always schedules the next coordinator pass afterwards,
    /// whether the report was submitted or failed. Only infrastructure
    /// errors (store, queue) are returned; report failures are not.
    pub async fn dispatch(&self, job: PipelineJob) -> Result<DispatchOutcome, Error> {
        match job {
            PipelineJob::RunNext => {
                let outcome = self.coordinator.run_next().await?;
                tracing::debug!(?outcome, "Coordinator pass finished");
                Ok(DispatchOutcome::Coordinated(outcome))
            }
            PipelineJob::RunReport { key, rerun } => {
                let outcome = self.runner.run(&key, rerun).await;
                tracing::info!(
                    report_type = %key.report_type,
                    version = key.version,
                    rerun,
                    ?outcome,
                    "Report run finished"
                );
                self.coordinator.enqueue_next().await?;
                Ok(DispatchOutcome::Ran { key, outcome })
            }
        }
    }
}
