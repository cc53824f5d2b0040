//! Download engine: job generation, scheduling, coverage, merge and
//! orchestration.

pub mod coverage;
pub mod generator;
pub mod job;
pub mod merge;
pub mod orchestrator;
pub mod progress;
pub mod scheduler;

pub use coverage::{evaluate, Coverage, SkipReason};
pub use generator::{InstrumentJobs, JobGenerator};
pub use job::{DownloadJob, JobError};
pub use merge::merge;
pub use orchestrator::{
    DownloadSummary, JobFailure, JobOutcome, LowDataReport, Orchestrator, StepError,
};
pub use progress::{DownloadProgress, NoProgress, StdoutProgress};
pub use scheduler::{schedule, JobGroup};
