//! Pipeline orchestration: background runs, the run lock and live progress.

pub mod error;
pub mod lock;
pub mod orchestrator;
pub mod progress;
pub mod runner;

pub use error::PipelineError;
pub use lock::{Acquisition, RunLease, RunLock, INTERRUPTED_ERROR, PIPELINE_LOCK};
pub use orchestrator::{Orchestrator, TriggerOutcome};
pub use progress::{ProgressRegistry, ProgressState, RunKind, TaskProgress, TaskStatus};
pub use runner::{Collaborators, Pipeline, RunSummary};
