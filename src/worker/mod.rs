//! Worker — executes queued pipeline jobs.
//!
//! - `dispatcher` — maps a typed `PipelineJob` onto the coordinator or runner
//! - `queue_worker` — claims jobs for one group, records completion/failure,
//!   and polls on an interval

pub mod dispatcher;
pub mod queue_worker;

pub use dispatcher::{DispatchOutcome, PipelineDispatcher};
pub use queue_worker::{QueueWorker, TickSummary, spawn_queue_worker};
