//! Collaborator contracts the pipeline consumes from, and publishes to, its host.
//!
//! All collaborator calls may be slow; the pipeline only ever invokes them
//! from worker threads, never from the thread that called into the pipeline.

pub mod asset_cache;
pub mod consumer;

use std::sync::Arc;

use crate::models::{
    ComponentName, CoreResult, Image, LaunchIntent, RawTask, RecentsSnapshot, ResolvedActivity,
};

pub use asset_cache::{AssetKey, InMemoryAssetCache};
pub use consumer::ChannelConsumer;

pub trait TaskSource: Send + Sync {
    /// Most recent first. May return fewer than `limit` entries, or none.
    fn list_recent_tasks(&self, limit: usize) -> CoreResult<Vec<RawTask>>;

    fn resolve_activity(&self, intent: &LaunchIntent) -> Option<ResolvedActivity>;

    fn home_activity(&self) -> Option<ComponentName>;
}

/// Label and icon lookup. Never fails outright: a missing icon is `None` and
/// the pipeline substitutes [`IconResolver::default_icon`].
pub trait IconResolver: Send + Sync {
    fn resolve_label(&self, target: &ResolvedActivity) -> String;

    fn resolve_icon(&self, target: &ResolvedActivity, icon_pack_active: bool) -> Option<Image>;

    fn default_icon(&self) -> Image {
        Image::transparent_placeholder()
    }
}

pub trait IconPack: Send + Sync {
    fn is_loaded(&self) -> bool;

    fn icon_override(&self, target: &ResolvedActivity) -> Option<Image>;

    /// Themes `base` with the pack's back, mask and upon layers.
    fn compose(&self, base: &Image, label: &str) -> Option<Image>;
}

pub trait ThumbnailSource: Send + Sync {
    fn capture_thumbnail(&self, persistent_task_id: i32) -> CoreResult<Option<Image>>;
}

/// Process-wide decoded icon cache. Implementations must tolerate concurrent
/// reads racing an `invalidate`.
pub trait AssetCache: Send + Sync {
    fn icon(&self, key: &AssetKey) -> Option<Image>;

    fn store_icon(&self, key: AssetKey, icon: Image);

    fn invalidate(&self);
}

/// Receiver of published recents snapshots.
///
/// `update` is invoked from pipeline worker threads and may be called again
/// before the previous call's UI work has finished; implementations marshal
/// onto their own update surface (see [`ChannelConsumer`]).
pub trait RecentsConsumer: Send + Sync {
    fn update(&self, snapshot: RecentsSnapshot);
}

#[derive(Clone)]
pub struct HostServices {
    pub tasks: Arc<dyn TaskSource>,
    pub icons: Arc<dyn IconResolver>,
    pub icon_pack: Option<Arc<dyn IconPack>>,
    pub thumbnails: Arc<dyn ThumbnailSource>,
    pub assets: Arc<dyn AssetCache>,
}

impl HostServices {
    pub fn new(
        tasks: Arc<dyn TaskSource>,
        icons: Arc<dyn IconResolver>,
        thumbnails: Arc<dyn ThumbnailSource>,
    ) -> Self {
        Self {
            tasks,
            icons,
            icon_pack: None,
            thumbnails,
            assets: Arc::new(InMemoryAssetCache::default()),
        }
    }

    pub fn with_icon_pack(mut self, icon_pack: Arc<dyn IconPack>) -> Self {
        self.icon_pack = Some(icon_pack);
        self
    }

    pub fn with_asset_cache(mut self, assets: Arc<dyn AssetCache>) -> Self {
        self.assets = assets;
        self
    }

    pub fn icon_pack_active(&self) -> bool {
        self.icon_pack
            .as_ref()
            .is_some_and(|pack| pack.is_loaded())
    }
}
