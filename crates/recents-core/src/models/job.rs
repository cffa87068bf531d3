use std::fmt::{Display, Formatter};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct JobId(pub u64);

impl Display for JobId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Category of background work. Each lane carries its own serialization and
/// scheduling rules.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum JobLane {
    /// Raw task fetch plus eager enrichment of the leading records.
    Fetch,
    /// Background sweep filling in labels and icons the fetch pass skipped.
    Completion,
    /// On-demand thumbnail capture for a single record.
    Thumbnail,
}

impl JobLane {
    pub fn is_serialized(self) -> bool {
        matches!(self, JobLane::Completion)
    }

    pub fn priority(self) -> JobPriority {
        match self {
            JobLane::Fetch | JobLane::Thumbnail => JobPriority::Foreground,
            JobLane::Completion => JobPriority::Background,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum JobPriority {
    Foreground,
    Background,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Cancelled,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Cancelled | JobStatus::Failed
        )
    }
}
