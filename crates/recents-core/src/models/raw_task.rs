use std::time::SystemTime;

use crate::models::{ComponentName, FLAG_ACTIVITY_EXCLUDE_FROM_RECENTS, LaunchIntent};

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub struct TaskColors {
    pub primary: Option<u32>,
    pub background: Option<u32>,
}

/// A recent task exactly as the host reports it, before any filtering.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RawTask {
    /// Negative when the task has no live process.
    pub task_id: i32,
    pub persistent_id: i32,
    pub base_intent: LaunchIntent,
    pub origin_activity: Option<ComponentName>,
    pub last_active_time: SystemTime,
    pub supports_split_screen: bool,
    pub in_multi_window_mode: bool,
    pub colors: Option<TaskColors>,
}

impl RawTask {
    pub fn new(task_id: i32, persistent_id: i32, base_intent: LaunchIntent) -> Self {
        Self {
            task_id,
            persistent_id,
            base_intent,
            origin_activity: None,
            last_active_time: SystemTime::now(),
            supports_split_screen: false,
            in_multi_window_mode: false,
            colors: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.task_id >= 0
    }

    pub fn is_excluded_from_recents(&self) -> bool {
        self.base_intent
            .has_flag(FLAG_ACTIVITY_EXCLUDE_FROM_RECENTS)
    }

    /// Intent to resolve on the host; the origin activity wins over the base component.
    pub fn target_intent(&self) -> LaunchIntent {
        self.base_intent.targeting(self.origin_activity.as_ref())
    }
}
