use thiserror::Error;

use crate::models::JobLane;

pub type CoreResult<T> = Result<T, CoreError>;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum CoreErrorKind {
    SourceUnavailable,
    EnrichmentFailure,
    InvalidInput,
    ParseFailure,
    Timeout,
    Cancelled,
    Internal,
}

#[derive(Clone, Debug, Eq, PartialEq, Error)]
#[error("{kind:?}: {message}")]
pub struct CoreError {
    pub lane: Option<JobLane>,
    pub task: Option<i32>,
    pub kind: CoreErrorKind,
    pub message: String,
}

impl CoreError {
    pub fn new(kind: CoreErrorKind, message: impl Into<String>) -> Self {
        Self {
            lane: None,
            task: None,
            kind,
            message: message.into(),
        }
    }

    pub fn in_lane(mut self, lane: JobLane) -> Self {
        self.lane = Some(lane);
        self
    }

    pub fn for_task(mut self, persistent_task_id: i32) -> Self {
        self.task = Some(persistent_task_id);
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.kind == CoreErrorKind::Cancelled
    }
}
