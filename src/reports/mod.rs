//! Reports — definitions, persisted rows, and the generate/submit cycle.

pub mod hash;
pub mod model;
pub mod registry;
pub mod runner;
pub mod submitter;

pub use hash::payload_hash;
pub use model::{ReportKey, ReportRow, ReportStatus};
pub use registry::{GenerationContext, ReportDefinition, ReportRegistry, SiteInfo};
pub use runner::{ReportRunner, RunOutcome};
pub use submitter::{ReportSubmitter, SubmissionEnvelope, SubmitResult};
