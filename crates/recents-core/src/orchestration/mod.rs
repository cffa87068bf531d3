pub mod enrichment;
pub mod job_queue;
pub mod pipeline;

pub use enrichment::Enricher;
pub use job_queue::{
    BackgroundJobQueue, CancellationToken, JobFuture, JobOperation, JobSnapshot,
};
pub use pipeline::{LoadRequest, RecentsLoadPipeline};

use crate::models::CoreError;

pub type OrchestrationResult<T> = Result<T, CoreError>;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CancellationMode {
    /// Raise the job's token and let it stop at its next loop boundary.
    Cooperative,
    /// Also abort the job's tokio task.
    Immediate,
}
