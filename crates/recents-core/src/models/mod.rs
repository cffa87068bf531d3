pub mod color;
pub mod component;
pub mod error;
pub mod image;
pub mod job;
pub mod raw_task;
pub mod snapshot;
pub mod task_record;

pub use component::{
    ComponentName, FLAG_ACTIVITY_EXCLUDE_FROM_RECENTS, FLAG_ACTIVITY_NEW_TASK,
    FLAG_ACTIVITY_RESET_TASK_IF_NEEDED, LaunchIntent, ResolvedActivity,
};
pub use error::{CoreError, CoreErrorKind, CoreResult};
pub use image::Image;
pub use job::{JobId, JobLane, JobPriority, JobStatus};
pub use raw_task::{RawTask, TaskColors};
pub use snapshot::{PipelineState, RawSet, RecentsSnapshot, RecordList, WorkingSet};
pub use task_record::{Presentation, TaskRecord, ThumbnailState};
