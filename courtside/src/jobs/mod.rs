//! Analysis job tracking and orchestration.

mod orchestrator;
mod registry;

pub use orchestrator::{AnalysisOutcome, FirstFrameOutcome, MissingInput, Orchestrator};
pub use registry::{AlreadyRunning, JobClaim, JobKind, JobRecord, JobRegistry, JobState};
