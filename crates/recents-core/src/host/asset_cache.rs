use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use crate::host::AssetCache;
use crate::models::{ComponentName, Image};

const DEFAULT_ASSET_CAPACITY: usize = 256;

#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct AssetKey {
    pub component: ComponentName,
    pub themed: bool,
}

impl AssetKey {
    pub fn icon(component: ComponentName, themed: bool) -> Self {
        Self { component, themed }
    }
}

pub struct InMemoryAssetCache {
    entries: RwLock<BTreeMap<AssetKey, Image>>,
    capacity: usize,
}

impl InMemoryAssetCache {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
            capacity: capacity.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryAssetCache {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_ASSET_CAPACITY)
    }
}

impl AssetCache for InMemoryAssetCache {
    fn icon(&self, key: &AssetKey) -> Option<Image> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn store_icon(&self, key: AssetKey, icon: Image) {
        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if !entries.contains_key(&key)
            && entries.len() >= self.capacity
            && let Some(evicted) = entries.keys().next().cloned()
        {
            entries.remove(&evicted);
        }
        entries.insert(key, icon);
    }

    fn invalidate(&self) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

#[cfg(test)]
mod tests {
    use super::{AssetKey, InMemoryAssetCache};
    use crate::host::AssetCache;
    use crate::models::{ComponentName, Image};

    fn key(package: &str, themed: bool) -> AssetKey {
        AssetKey::icon(ComponentName::new(package, format!("{package}.Main")), themed)
    }

    #[test]
    fn themed_and_plain_icons_are_cached_separately() {
        let cache = InMemoryAssetCache::default();
        cache.store_icon(key("a", false), Image::solid(1, 1, 1));
        assert!(cache.icon(&key("a", false)).is_some());
        assert!(cache.icon(&key("a", true)).is_none());
    }

    #[test]
    fn capacity_evicts_an_existing_entry() {
        let cache = InMemoryAssetCache::with_capacity(2);
        cache.store_icon(key("a", false), Image::solid(1, 1, 1));
        cache.store_icon(key("b", false), Image::solid(1, 1, 2));
        cache.store_icon(key("c", false), Image::solid(1, 1, 3));
        assert_eq!(cache.len(), 2);
        assert!(cache.icon(&key("c", false)).is_some());
    }

    #[test]
    fn invalidate_clears_everything() {
        let cache = InMemoryAssetCache::default();
        cache.store_icon(key("a", false), Image::solid(1, 1, 1));
        cache.invalidate();
        assert!(cache.is_empty());
    }
}
