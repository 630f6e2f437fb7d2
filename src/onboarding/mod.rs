//! Onboarding — drives the required reports through the job queue and
//! derives the single status operators see.
//!
//! The coordinator seeds report rows, schedules one coordinator pass at a
//! time, and each pass advances at most one report. Status is never stored:
//! it is recomputed from the report rows and the queue on every read.

pub mod coordinator;
pub mod routes;
pub mod state;

pub use coordinator::{
    EnqueueOutcome, OnboardingCoordinator, OnboardingSnapshot, ResetSummary, RunNextOutcome,
};
pub use routes::{OnboardingRouteState, onboarding_routes};
pub use state::{OnboardingStatus, PipelineMarker, derive_status};
