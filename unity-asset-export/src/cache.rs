//! Result caches
//!
//! Keyed stores for encoded preview payloads. Values own externally visible
//! [`PreviewHandle`]s, so every eviction path (replace, remove, clear) runs the
//! value's release hook before the entry is dropped.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;
use unity_asset_export_core::{
    AsyncAssetCache, CacheKey, HandleRegistry, PreviewHandle, SkeletonItemKind,
};

/// Release hook run when a cached value leaves the cache
pub trait CacheRelease: Clone + Send + Sync + 'static {
    fn release(&self, registry: &dyn HandleRegistry);
}

/// Generic keyed cache with a release hook
pub struct ResultCache<V> {
    entries: RwLock<HashMap<CacheKey, V>>,
    registry: Arc<dyn HandleRegistry>,
}

impl<V: CacheRelease> ResultCache<V> {
    pub fn new(registry: Arc<dyn HandleRegistry>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            registry,
        }
    }

    /// Insert `value` unless the key is already cached.
    ///
    /// Returns the value that ends up cached. A rejected newcomer is released
    /// right away so its handles do not leak.
    pub async fn get_or_insert(&self, key: CacheKey, value: V) -> V {
        let mut entries = self.entries.write().await;
        if let Some(existing) = entries.get(&key) {
            value.release(self.registry.as_ref());
            return existing.clone();
        }
        entries.insert(key, value.clone());
        value
    }
}

#[async_trait]
impl<V: CacheRelease> AsyncAssetCache for ResultCache<V> {
    type Key = CacheKey;
    type Value = V;

    async fn get(&self, key: &CacheKey) -> Option<V> {
        self.entries.read().await.get(key).cloned()
    }

    async fn set(&self, key: CacheKey, value: V) {
        let replaced = self.entries.write().await.insert(key, value);
        if let Some(old) = replaced {
            old.release(self.registry.as_ref());
        }
    }

    async fn has(&self, key: &CacheKey) -> bool {
        self.entries.read().await.contains_key(key)
    }

    async fn remove(&self, key: &CacheKey) -> Option<V> {
        let removed = self.entries.write().await.remove(key);
        if let Some(value) = &removed {
            value.release(self.registry.as_ref());
        }
        removed
    }

    async fn clear(&self) {
        let mut entries = self.entries.write().await;
        debug!("releasing {} cached entries", entries.len());
        for value in entries.values() {
            value.release(self.registry.as_ref());
        }
        entries.clear();
    }

    async fn size(&self) -> usize {
        self.entries.read().await.len()
    }
}

/// Encoded payload plus the handle exposing it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobEntry {
    pub data: Bytes,
    pub mime: String,
    /// File extension the payload is exported with
    pub extension: String,
    pub handle: PreviewHandle,
}

impl BlobEntry {
    /// Register `data` with `registry` and wrap the new handle
    pub fn register(
        registry: &dyn HandleRegistry,
        data: Bytes,
        mime: &str,
        extension: &str,
    ) -> Self {
        Self {
            handle: registry.create(data.clone(), mime),
            mime: mime.to_string(),
            extension: extension.to_string(),
            data,
        }
    }
}

impl CacheRelease for BlobEntry {
    fn release(&self, registry: &dyn HandleRegistry) {
        registry.revoke(&self.handle);
    }
}

/// One member of a cached skeleton bundle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleItem {
    pub kind: SkeletonItemKind,
    pub name: String,
    pub data: Bytes,
    pub handle: PreviewHandle,
}

/// Ordered members of one skeleton bundle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleEntry {
    pub items: Arc<[BundleItem]>,
}

impl BundleEntry {
    pub fn new(items: Vec<BundleItem>) -> Self {
        Self {
            items: items.into(),
        }
    }
}

impl CacheRelease for BundleEntry {
    fn release(&self, registry: &dyn HandleRegistry) {
        for item in self.items.iter() {
            registry.revoke(&item.handle);
        }
    }
}

/// Cache of single encoded payloads (images, audio)
pub type BlobCache = ResultCache<BlobEntry>;

/// Cache of skeleton bundles
pub type BundleCache = ResultCache<BundleEntry>;

#[cfg(test)]
mod tests {
    use super::*;
    use unity_asset_export_core::{ContainerId, LocalHandleRegistry, ObjectId};

    fn key(path_id: i64) -> CacheKey {
        CacheKey::object(ObjectId::new(ContainerId::new("c0"), path_id))
    }

    fn blob(registry: &LocalHandleRegistry, data: &'static [u8]) -> BlobEntry {
        BlobEntry::register(registry, Bytes::from_static(data), "image/png", "png")
    }

    #[tokio::test]
    async fn test_get_set_has() {
        let registry = Arc::new(LocalHandleRegistry::new());
        let cache = BlobCache::new(registry.clone());

        assert!(!cache.has(&key(1)).await);
        cache.set(key(1), blob(&registry, b"one")).await;
        assert!(cache.has(&key(1)).await);
        assert_eq!(cache.get(&key(1)).await.unwrap().data.as_ref(), b"one");
        assert_eq!(cache.size().await, 1);
    }

    #[tokio::test]
    async fn test_clear_revokes_every_handle() {
        let registry = Arc::new(LocalHandleRegistry::new());
        let cache = BlobCache::new(registry.clone());
        cache.set(key(1), blob(&registry, b"one")).await;
        cache.set(key(2), blob(&registry, b"two")).await;
        assert_eq!(registry.live_count(), 2);

        cache.clear().await;
        assert_eq!(cache.size().await, 0);
        assert_eq!(registry.live_count(), 0);
        assert_eq!(registry.revoked_count(), 2);
    }

    #[tokio::test]
    async fn test_replace_and_remove_release_old_values() {
        let registry = Arc::new(LocalHandleRegistry::new());
        let cache = BlobCache::new(registry.clone());
        cache.set(key(1), blob(&registry, b"old")).await;
        cache.set(key(1), blob(&registry, b"new")).await;
        assert_eq!(registry.revoked_count(), 1);

        let removed = cache.remove(&key(1)).await.unwrap();
        assert_eq!(removed.data.as_ref(), b"new");
        assert_eq!(registry.live_count(), 0);
    }

    #[tokio::test]
    async fn test_get_or_insert_keeps_first_value() {
        let registry = Arc::new(LocalHandleRegistry::new());
        let cache = BlobCache::new(registry.clone());
        let first = cache.get_or_insert(key(1), blob(&registry, b"a")).await;
        let second = cache.get_or_insert(key(1), blob(&registry, b"b")).await;

        assert_eq!(first, second);
        assert!(registry.resolve(&first.handle).is_some());
        assert_eq!(registry.live_count(), 1);
    }

    #[tokio::test]
    async fn test_bundle_release_revokes_all_members() {
        let registry = Arc::new(LocalHandleRegistry::new());
        let cache = BundleCache::new(registry.clone());
        let items = ["hero.skel", "hero.atlas", "hero.png"]
            .iter()
            .zip([
                SkeletonItemKind::Skel,
                SkeletonItemKind::Atlas,
                SkeletonItemKind::Image,
            ])
            .map(|(name, kind)| BundleItem {
                kind,
                name: name.to_string(),
                data: Bytes::new(),
                handle: registry.create(Bytes::new(), kind.mime()),
            })
            .collect();
        cache.set(key(9), BundleEntry::new(items)).await;

        cache.clear().await;
        assert_eq!(registry.revoked_count(), 3);
    }
}
