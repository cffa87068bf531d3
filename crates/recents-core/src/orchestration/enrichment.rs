use crate::host::{AssetKey, HostServices};
use crate::models::{Image, ResolvedActivity, TaskRecord};

/// Resolves labels, icons and thumbnails for records.
///
/// Every public operation holds the record's enrichment guard for its whole
/// duration, so two stages never write the same record at once. Failures
/// degrade to placeholders and are never reported upward.
pub struct Enricher {
    host: HostServices,
    default_icon: Image,
    thumbnail_permission: bool,
}

impl Enricher {
    pub fn new(host: HostServices, thumbnail_permission: bool) -> Self {
        let default_icon = host.icons.default_icon();
        Self {
            host,
            default_icon,
            thumbnail_permission,
        }
    }

    pub fn has_thumbnail_permission(&self) -> bool {
        self.thumbnail_permission
    }

    pub fn default_icon(&self) -> &Image {
        &self.default_icon
    }

    /// In-pass enrichment for the leading records of a fetch.
    pub fn enrich_eagerly(&self, record: &TaskRecord, with_icons: bool, with_thumbnails: bool) {
        let _guard = record.enrichment_guard();
        if with_icons {
            self.apply_task_info(record);
        }
        if with_thumbnails
            && self.thumbnail_permission
            && let Some(thumbnail) = self.capture(record.persistent_task_id())
        {
            record.set_thumbnail(thumbnail);
        }
    }

    /// Fills label and icon if still missing. Returns whether the record changed.
    pub fn complete_task_info(&self, record: &TaskRecord) -> bool {
        let _guard = record.enrichment_guard();
        if !record.needs_task_info() {
            return false;
        }
        self.apply_task_info(record);
        true
    }

    /// Captures a thumbnail for a record whose loading flag is already set,
    /// then clears the flag.
    pub fn finish_thumbnail(&self, record: &TaskRecord) {
        let _guard = record.enrichment_guard();
        let thumbnail = if self.thumbnail_permission {
            self.capture(record.persistent_task_id())
        } else {
            None
        };
        record.finish_thumbnail_load(thumbnail);
    }

    pub fn resolve_icon(&self, target: &ResolvedActivity, label: &str) -> Image {
        let themed = self.host.icon_pack_active();
        let key = AssetKey::icon(target.component.clone(), themed);
        if let Some(cached) = self.host.assets.icon(&key) {
            return cached;
        }

        match self.resolve_icon_uncached(target, label, themed) {
            Some(icon) => {
                self.host.assets.store_icon(key, icon.clone());
                icon
            }
            None => self.default_icon.clone(),
        }
    }

    fn apply_task_info(&self, record: &TaskRecord) {
        let target = record.target();
        let label = self.host.icons.resolve_label(&target);
        let icon = self.resolve_icon(&target, &label);
        record.set_task_info(label, icon);
    }

    fn resolve_icon_uncached(
        &self,
        target: &ResolvedActivity,
        label: &str,
        themed: bool,
    ) -> Option<Image> {
        let pack = self.host.icon_pack.as_ref().filter(|_| themed);
        if let Some(pack) = pack
            && let Some(icon) = pack.icon_override(target)
        {
            return Some(icon);
        }

        let base = self.host.icons.resolve_icon(target, themed)?;
        match pack {
            Some(pack) => Some(pack.compose(&base, label).unwrap_or(base)),
            None => Some(base),
        }
    }

    fn capture(&self, persistent_task_id: i32) -> Option<Image> {
        match self.host.thumbnails.capture_thumbnail(persistent_task_id) {
            Ok(thumbnail) => thumbnail,
            Err(error) => {
                tracing::debug!(
                    persistent_task_id,
                    kind = ?error.kind,
                    message = %error.message,
                    "thumbnail capture failed"
                );
                None
            }
        }
    }
}
