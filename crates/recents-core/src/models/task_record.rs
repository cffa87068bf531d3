use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;

use crate::models::color::is_bright_color;
use crate::models::{ComponentName, Image, LaunchIntent, RawTask, ResolvedActivity};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ThumbnailState {
    Absent,
    Loading,
    Loaded,
}

/// Presentation fields of a record, copied out under the record's lock so a
/// reader never observes a half-applied enrichment.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Presentation {
    pub label: Option<String>,
    pub icon: Option<Image>,
    pub thumbnail: Option<Image>,
    pub thumbnail_loading: bool,
    pub primary_color: Option<u32>,
    pub background_color: Option<u32>,
}

impl Presentation {
    pub fn thumbnail_state(&self) -> ThumbnailState {
        if self.thumbnail_loading {
            ThumbnailState::Loading
        } else if self.thumbnail.is_some() {
            ThumbnailState::Loaded
        } else {
            ThumbnailState::Absent
        }
    }
}

/// One entry of the recents list.
///
/// Identity and policy fields are fixed at construction. Presentation fields
/// are filled progressively by the enrichment stages; every change bumps the
/// record's version, which UIs can watch through [`TaskRecord::subscribe`].
#[derive(Debug)]
pub struct TaskRecord {
    task_id: i32,
    persistent_task_id: i32,
    component: ComponentName,
    launch_intent: LaunchIntent,
    supports_split_screen: bool,
    in_multi_window_mode: bool,
    is_locked: bool,
    is_excluded_from_recents: bool,
    enrichment: Mutex<()>,
    presentation: Mutex<Presentation>,
    version: watch::Sender<u64>,
}

impl TaskRecord {
    pub fn new(raw: &RawTask, resolved: ResolvedActivity, is_locked: bool) -> Self {
        let colors = raw.colors.unwrap_or_default();
        let (version, _) = watch::channel(0);
        Self {
            task_id: raw.task_id,
            persistent_task_id: raw.persistent_id,
            component: resolved.component,
            launch_intent: raw.target_intent().into_relaunch(),
            supports_split_screen: raw.supports_split_screen,
            in_multi_window_mode: raw.in_multi_window_mode,
            is_locked,
            is_excluded_from_recents: raw.is_excluded_from_recents(),
            enrichment: Mutex::new(()),
            presentation: Mutex::new(Presentation {
                primary_color: colors.primary,
                background_color: colors.background,
                ..Presentation::default()
            }),
            version,
        }
    }

    pub fn task_id(&self) -> i32 {
        self.task_id
    }

    pub fn persistent_task_id(&self) -> i32 {
        self.persistent_task_id
    }

    pub fn component(&self) -> &ComponentName {
        &self.component
    }

    pub fn package_name(&self) -> &str {
        &self.component.package
    }

    pub fn launch_intent(&self) -> &LaunchIntent {
        &self.launch_intent
    }

    pub fn supports_split_screen(&self) -> bool {
        self.supports_split_screen
    }

    pub fn is_in_multi_window_mode(&self) -> bool {
        self.in_multi_window_mode
    }

    pub fn is_locked(&self) -> bool {
        self.is_locked
    }

    pub fn is_excluded_from_recents(&self) -> bool {
        self.is_excluded_from_recents
    }

    pub fn target(&self) -> ResolvedActivity {
        ResolvedActivity::new(self.component.clone())
    }

    pub fn presentation(&self) -> Presentation {
        self.lock_presentation().clone()
    }

    pub fn label(&self) -> Option<String> {
        self.lock_presentation().label.clone()
    }

    /// Label for rendering; falls back to the package name until enriched.
    pub fn display_label(&self) -> String {
        self.label()
            .unwrap_or_else(|| self.component.package.clone())
    }

    pub fn icon(&self) -> Option<Image> {
        self.lock_presentation().icon.clone()
    }

    pub fn thumbnail(&self) -> Option<Image> {
        self.lock_presentation().thumbnail.clone()
    }

    pub fn thumbnail_state(&self) -> ThumbnailState {
        self.lock_presentation().thumbnail_state()
    }

    pub fn primary_color(&self) -> Option<u32> {
        self.lock_presentation().primary_color
    }

    pub fn background_color(&self) -> Option<u32> {
        self.lock_presentation().background_color
    }

    pub fn prefers_dark_label(&self) -> bool {
        self.primary_color().is_some_and(is_bright_color)
    }

    pub fn needs_task_info(&self) -> bool {
        let presentation = self.lock_presentation();
        presentation.label.is_none() || presentation.icon.is_none()
    }

    pub fn version(&self) -> u64 {
        *self.version.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.version.subscribe()
    }

    /// Held for the whole duration of one enrichment step on this record.
    pub(crate) fn enrichment_guard(&self) -> MutexGuard<'_, ()> {
        self.enrichment
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn set_task_info(&self, label: String, icon: Image) {
        self.mutate(|presentation| {
            presentation.label = Some(label);
            presentation.icon = Some(icon);
            true
        });
    }

    pub(crate) fn set_thumbnail(&self, thumbnail: Image) {
        self.mutate(|presentation| {
            presentation.thumbnail = Some(thumbnail);
            true
        });
    }

    /// Marks a thumbnail load as in flight. Returns `false` when one already is.
    pub(crate) fn begin_thumbnail_load(&self) -> bool {
        self.mutate(|presentation| {
            if presentation.thumbnail_loading {
                return false;
            }
            presentation.thumbnail_loading = true;
            true
        })
    }

    /// Ends a thumbnail load. An empty capture keeps whatever image was shown.
    pub(crate) fn finish_thumbnail_load(&self, thumbnail: Option<Image>) {
        self.mutate(|presentation| {
            presentation.thumbnail_loading = false;
            if let Some(thumbnail) = thumbnail {
                presentation.thumbnail = Some(thumbnail);
            }
            true
        });
    }

    /// Drops an in-flight loading mark without touching the loaded image.
    pub(crate) fn abandon_thumbnail_load(&self) {
        self.mutate(|presentation| {
            let was_loading = presentation.thumbnail_loading;
            presentation.thumbnail_loading = false;
            was_loading
        });
    }

    fn mutate(&self, change: impl FnOnce(&mut Presentation) -> bool) -> bool {
        let changed = {
            let mut presentation = self.lock_presentation();
            change(&mut presentation)
        };
        if changed {
            self.version
                .send_modify(|version| *version = version.wrapping_add(1));
        }
        changed
    }

    fn lock_presentation(&self) -> MutexGuard<'_, Presentation> {
        self.presentation
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::{TaskRecord, ThumbnailState};
    use crate::models::{
        ComponentName, FLAG_ACTIVITY_EXCLUDE_FROM_RECENTS, FLAG_ACTIVITY_NEW_TASK, Image,
        LaunchIntent, RawTask, ResolvedActivity, TaskColors,
    };

    fn record() -> TaskRecord {
        let component = ComponentName::new("com.example.notes", "com.example.notes.Main");
        let mut raw = RawTask::new(
            7,
            70,
            LaunchIntent::for_component(component.clone())
                .with_flags(FLAG_ACTIVITY_EXCLUDE_FROM_RECENTS),
        );
        raw.colors = Some(TaskColors {
            primary: Some(0xffff_ffff),
            background: None,
        });
        TaskRecord::new(&raw, ResolvedActivity::new(component), false)
    }

    #[test]
    fn fresh_record_renders_with_placeholders() {
        let record = record();
        assert_eq!(record.label(), None);
        assert_eq!(record.display_label(), "com.example.notes");
        assert!(record.needs_task_info());
        assert_eq!(record.thumbnail_state(), ThumbnailState::Absent);
        assert!(record.is_excluded_from_recents());
        assert!(record.launch_intent().has_flag(FLAG_ACTIVITY_NEW_TASK));
        assert!(record.prefers_dark_label());
    }

    #[test]
    fn enrichment_bumps_version_and_notifies_watchers() {
        let record = record();
        let watcher = record.subscribe();
        let before = record.version();

        record.set_task_info("Notes".to_string(), Image::solid(2, 2, 0xff00_ff00));

        assert!(record.version() > before);
        assert!(watcher.has_changed().unwrap());
        assert!(!record.needs_task_info());
        assert_eq!(record.display_label(), "Notes");
    }

    #[test]
    fn thumbnail_loading_flag_suppresses_duplicates() {
        let record = record();
        assert!(record.begin_thumbnail_load());
        assert!(!record.begin_thumbnail_load());
        assert_eq!(record.thumbnail_state(), ThumbnailState::Loading);

        record.finish_thumbnail_load(Some(Image::solid(1, 1, 0xff00_0000)));
        assert_eq!(record.thumbnail_state(), ThumbnailState::Loaded);
        assert!(record.begin_thumbnail_load());
    }

    #[test]
    fn empty_reload_keeps_previous_thumbnail() {
        let record = record();
        record.set_thumbnail(Image::solid(1, 1, 0xff00_0000));
        assert!(record.begin_thumbnail_load());

        record.finish_thumbnail_load(None);
        assert_eq!(record.thumbnail_state(), ThumbnailState::Loaded);
        assert!(record.begin_thumbnail_load());
    }

    #[test]
    fn abandoning_keeps_previous_thumbnail() {
        let record = record();
        record.set_thumbnail(Image::solid(1, 1, 0xff00_0000));
        assert!(record.begin_thumbnail_load());
        assert!(record.thumbnail().is_some());

        record.abandon_thumbnail_load();
        assert_eq!(record.thumbnail_state(), ThumbnailState::Loaded);
    }
}
