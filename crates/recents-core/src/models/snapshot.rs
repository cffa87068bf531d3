use std::ops::Deref;
use std::sync::Arc;

use crate::models::TaskRecord;

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub enum PipelineState {
    #[default]
    Idle,
    Loading,
}

/// Immutable, ordered list of shared records. Replaced wholesale at pass
/// boundaries; the records inside may still receive field updates.
#[derive(Clone, Debug, Default)]
pub struct RecordList {
    records: Arc<[Arc<TaskRecord>]>,
}

pub type WorkingSet = RecordList;
pub type RawSet = RecordList;

impl RecordList {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn persistent_ids(&self) -> Vec<i32> {
        self.records
            .iter()
            .map(|record| record.persistent_task_id())
            .collect()
    }

    pub fn find(&self, persistent_task_id: i32) -> Option<&Arc<TaskRecord>> {
        self.records
            .iter()
            .find(|record| record.persistent_task_id() == persistent_task_id)
    }

    pub fn same_list(&self, other: &RecordList) -> bool {
        Arc::ptr_eq(&self.records, &other.records)
    }
}

impl Deref for RecordList {
    type Target = [Arc<TaskRecord>];

    fn deref(&self) -> &Self::Target {
        &self.records
    }
}

impl From<Vec<Arc<TaskRecord>>> for RecordList {
    fn from(records: Vec<Arc<TaskRecord>>) -> Self {
        Self {
            records: records.into(),
        }
    }
}

/// What a consumer receives on publish.
#[derive(Clone, Debug, Default)]
pub struct RecentsSnapshot {
    pub working: WorkingSet,
    pub raw: RawSet,
}
