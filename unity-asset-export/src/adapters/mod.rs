//! Per-kind asset adapters
//!
//! An [`Adapter`] wraps one decoded object and knows whether it can be
//! exported, what preview it offers and how to produce its preview payload
//! and export items. Heavy work (bitmap decoding, PNG encoding, audio
//! transcoding) goes through the shared [`AdapterContext`].

mod audio;
mod composite;
mod text;
mod texture;

pub use audio::{audio_mime, AudioAdapter};
pub use composite::{CompositeAdapter, CompositeMode};
pub use text::TextAdapter;
pub use texture::ImageAdapter;

use crate::cache::{BlobCache, BlobEntry, BundleCache};
use crate::image_pool::ImageConverterPool;
use crate::rename::legal_file_name;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;
use unity_asset_export_core::{
    AssetKind, AssetObject, AsyncAssetCache, AudioTranscoder, Bitmap, CacheKey, ExportItem,
    HandleRegistry, ObjectId, PreviewData, PreviewDetail, PreviewHandle, PreviewInfo, Result,
    TrackedFuture,
};

const PNG_MIME: &str = "image/png";

type Conversions = HashMap<CacheKey, TrackedFuture<Option<Bytes>>>;

/// Shared services used by every adapter
pub struct AdapterContext {
    blobs: BlobCache,
    bundles: BundleCache,
    converter: Arc<ImageConverterPool>,
    registry: Arc<dyn HandleRegistry>,
    transcoder: Option<Arc<dyn AudioTranscoder>>,
    conversions: Mutex<Conversions>,
}

impl AdapterContext {
    pub fn new(converter: Arc<ImageConverterPool>, registry: Arc<dyn HandleRegistry>) -> Self {
        Self {
            blobs: BlobCache::new(Arc::clone(&registry)),
            bundles: BundleCache::new(Arc::clone(&registry)),
            converter,
            registry,
            transcoder: None,
            conversions: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_audio_transcoder(mut self, transcoder: Arc<dyn AudioTranscoder>) -> Self {
        self.transcoder = Some(transcoder);
        self
    }

    pub fn blobs(&self) -> &BlobCache {
        &self.blobs
    }

    pub fn bundles(&self) -> &BundleCache {
        &self.bundles
    }

    pub fn converter(&self) -> &Arc<ImageConverterPool> {
        &self.converter
    }

    pub fn registry(&self) -> &Arc<dyn HandleRegistry> {
        &self.registry
    }

    pub fn transcoder(&self) -> Option<&Arc<dyn AudioTranscoder>> {
        self.transcoder.as_ref()
    }

    /// Drop in-flight bookkeeping and release every cached handle
    pub async fn clear(&self) {
        self.lock_conversions().clear();
        self.blobs.clear().await;
        self.bundles.clear().await;
    }

    fn lock_conversions(&self) -> std::sync::MutexGuard<'_, Conversions> {
        self.conversions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Join an in-flight conversion for `key`, or start a tracked one
    fn track_conversion<F>(&self, key: &CacheKey, decode: F) -> TrackedFuture<Option<Bytes>>
    where
        F: FnOnce() -> Result<Option<Bitmap>> + Send + 'static,
    {
        let mut conversions = self.lock_conversions();
        if let Some(existing) = conversions.get(key) {
            if !existing.is_rejected() {
                return existing.clone();
            }
        }

        let converter = Arc::clone(&self.converter);
        let tracked = TrackedFuture::spawn(async move {
            match tokio::task::spawn_blocking(decode).await?? {
                Some(bitmap) => converter.add_task(bitmap).await.map(Some),
                None => Ok(None),
            }
        });
        conversions.insert(key.clone(), tracked.clone());
        tracked
    }

    fn settle_conversion(&self, key: &CacheKey) {
        let mut conversions = self.lock_conversions();
        if conversions.get(key).is_some_and(|t| !t.is_pending()) {
            conversions.remove(key);
        }
    }

    /// Finished conversion result, if one is already available without waiting
    fn finished_conversion(&self, key: &CacheKey) -> Option<Option<Bytes>> {
        self.lock_conversions().get(key).and_then(|t| t.peek())
    }

    /// PNG preview of one image: cached handle, in-flight conversion, or a new
    /// tracked conversion whose result is cached.
    pub(crate) async fn preview_image<F>(
        &self,
        key: CacheKey,
        decode: F,
    ) -> Result<Option<PreviewHandle>>
    where
        F: FnOnce() -> Result<Option<Bitmap>> + Send + 'static,
    {
        if let Some(entry) = self.blobs.get(&key).await {
            return Ok(Some(entry.handle));
        }

        let tracked = self.track_conversion(&key, decode);
        let outcome = tracked.wait().await;
        let handle = match outcome {
            Ok(Some(data)) => match self.blobs.get(&key).await {
                // another waiter on the same conversion got here first
                Some(entry) => Some(entry.handle),
                None => Some(self.cache_blob(key.clone(), data, PNG_MIME, "png").await.handle),
            },
            Ok(None) => None,
            Err(e) => {
                self.settle_conversion(&key);
                return Err(e);
            }
        };
        self.settle_conversion(&key);
        Ok(handle)
    }

    /// PNG bytes for export. Uses the cache or a finished preview conversion;
    /// otherwise converts again without caching the result.
    pub(crate) async fn export_image<F>(&self, key: CacheKey, decode: F) -> Result<Option<Bytes>>
    where
        F: FnOnce() -> Result<Option<Bitmap>> + Send + 'static,
    {
        if let Some(entry) = self.blobs.get(&key).await {
            return Ok(Some(entry.data));
        }
        if let Some(finished) = self.finished_conversion(&key) {
            debug!("reusing finished conversion for {}", key);
            return Ok(finished);
        }

        match tokio::task::spawn_blocking(decode).await?? {
            Some(bitmap) => Ok(Some(self.converter.add_task(bitmap).await?)),
            None => Ok(None),
        }
    }

    /// Cache `data` under `key` with a fresh handle; an existing entry wins
    pub(crate) async fn cache_blob(
        &self,
        key: CacheKey,
        data: Bytes,
        mime: &str,
        extension: &str,
    ) -> BlobEntry {
        let entry = BlobEntry::register(self.registry.as_ref(), data, mime, extension);
        self.blobs.get_or_insert(key, entry).await
    }
}

/// The object an adapter works on
#[derive(Clone)]
pub struct AdapterTarget {
    pub id: ObjectId,
    pub object: Arc<dyn AssetObject>,
}

impl AdapterTarget {
    pub fn new(id: ObjectId, object: Arc<dyn AssetObject>) -> Self {
        Self { id, object }
    }

    /// Base file name: the legalized object name, or `Type#pathId` when unnamed
    pub fn file_stem(&self) -> String {
        let name = self.object.name();
        if name.trim().is_empty() {
            format!("{}#{}", self.object.kind().type_name(), self.id.path_id)
        } else {
            legal_file_name(name)
        }
    }

    pub fn cache_key(&self) -> CacheKey {
        CacheKey::object(self.id.clone())
    }

    pub fn sub_cache_key(&self, sub_key: &str) -> CacheKey {
        CacheKey::sub(self.id.clone(), sub_key)
    }
}

/// Closed set of adapters, selected by asset kind
pub enum Adapter {
    Text(TextAdapter),
    Image(ImageAdapter),
    Audio(AudioAdapter),
    Composite(CompositeAdapter),
    /// Kinds without preview or export support
    Unknown(AdapterTarget),
}

impl Adapter {
    pub fn for_object(id: ObjectId, object: Arc<dyn AssetObject>) -> Self {
        let target = AdapterTarget::new(id, object);
        match target.object.kind() {
            AssetKind::TextAsset => Self::Text(TextAdapter::new(target)),
            AssetKind::Texture2D | AssetKind::Sprite | AssetKind::Material => {
                Self::Image(ImageAdapter::new(target))
            }
            AssetKind::AudioClip => Self::Audio(AudioAdapter::new(target)),
            AssetKind::MonoBehaviour => Self::Composite(CompositeAdapter::new(target)),
            AssetKind::AssetBundle | AssetKind::Other(_) => Self::Unknown(target),
        }
    }

    pub fn target(&self) -> &AdapterTarget {
        match self {
            Self::Text(a) => a.target(),
            Self::Image(a) => a.target(),
            Self::Audio(a) => a.target(),
            Self::Composite(a) => a.target(),
            Self::Unknown(target) => target,
        }
    }

    pub fn can_export(&self) -> bool {
        match self {
            Self::Text(_) | Self::Image(_) | Self::Audio(_) => true,
            Self::Composite(a) => a.can_export(),
            Self::Unknown(_) => false,
        }
    }

    pub fn preview_detail(&self) -> PreviewDetail {
        match self {
            Self::Text(_) => PreviewDetail::Text,
            Self::Image(_) => PreviewDetail::Image,
            Self::Audio(_) => PreviewDetail::Audio,
            Self::Composite(a) => a.preview_detail(),
            Self::Unknown(_) => PreviewDetail::None,
        }
    }

    pub fn preview_info(&self) -> PreviewInfo {
        let object = &self.target().object;
        PreviewInfo {
            detail: self.preview_detail(),
            type_tree: object.type_tree(),
            inspect: object.dump(),
        }
    }

    /// Preview payload; `sub_key` selects one item of a composite object
    pub async fn preview_data(
        &self,
        ctx: &AdapterContext,
        sub_key: Option<&str>,
    ) -> Result<Option<PreviewData>> {
        match self {
            Self::Text(a) => Ok(a.preview_data()),
            Self::Image(a) => a.preview_data(ctx).await,
            Self::Audio(a) => a.preview_data(ctx).await,
            Self::Composite(a) => a.preview_data(ctx, sub_key).await,
            Self::Unknown(_) => Ok(None),
        }
    }

    /// Export items for this object; `None` when there is nothing to write
    pub async fn export(&self, ctx: &AdapterContext) -> Result<Option<Vec<ExportItem>>> {
        match self {
            Self::Text(a) => Ok(a.export()),
            Self::Image(a) => a.export(ctx).await,
            Self::Audio(a) => a.export(ctx).await,
            Self::Composite(a) => a.export(ctx).await,
            Self::Unknown(_) => Ok(None),
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scriptable asset objects for adapter tests

    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use unity_asset_export_core::{
        AudioSamples, ContainerId, ExportError, SkeletonBundle, SpriteEntry,
    };

    #[derive(Default)]
    pub struct FakeObject {
        pub path_id: i64,
        pub kind: Option<AssetKind>,
        pub name: String,
        pub text: Option<Bytes>,
        pub bitmap: Option<Bitmap>,
        pub fail_decode: bool,
        pub audio: Option<AudioSamples>,
        pub sprites: Vec<(SpriteEntry, Bitmap)>,
        pub skeleton: Option<SkeletonBundle>,
        pub decodes: AtomicUsize,
    }

    impl FakeObject {
        pub fn new(path_id: i64, kind: AssetKind, name: &str) -> Self {
            Self {
                path_id,
                kind: Some(kind),
                name: name.to_string(),
                ..Self::default()
            }
        }

        pub fn decode_count(&self) -> usize {
            self.decodes.load(Ordering::SeqCst)
        }
    }

    impl AssetObject for FakeObject {
        fn path_id(&self) -> i64 {
            self.path_id
        }

        fn kind(&self) -> AssetKind {
            self.kind
                .clone()
                .unwrap_or_else(|| AssetKind::Other("Unknown".to_string()))
        }

        fn name(&self) -> &str {
            &self.name
        }

        fn size(&self) -> u64 {
            0
        }

        fn text(&self) -> Option<Bytes> {
            self.text.clone()
        }

        fn raw_bitmap(&self) -> Result<Option<Bitmap>> {
            self.decodes.fetch_add(1, Ordering::SeqCst);
            if self.fail_decode {
                return Err(ExportError::decode(self.name.clone(), "corrupt texture"));
            }
            Ok(self.bitmap.clone())
        }

        fn audio(&self) -> Result<Option<AudioSamples>> {
            Ok(self.audio.clone())
        }

        fn sprites(&self) -> Vec<SpriteEntry> {
            self.sprites.iter().map(|(entry, _)| entry.clone()).collect()
        }

        fn sprite_bitmap(&self, key: &str) -> Result<Option<Bitmap>> {
            self.decodes.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .sprites
                .iter()
                .find(|(entry, _)| entry.key == key)
                .map(|(_, bitmap)| bitmap.clone()))
        }

        fn has_skeleton(&self) -> bool {
            self.skeleton.is_some()
        }

        fn skeleton(&self) -> Result<Option<SkeletonBundle>> {
            self.decodes.fetch_add(1, Ordering::SeqCst);
            Ok(self.skeleton.clone())
        }
    }

    pub fn solid(width: u32, height: u32) -> Bitmap {
        Bitmap::new(width, height, vec![200; (width * height * 4) as usize]).unwrap()
    }

    pub fn object_id(path_id: i64) -> ObjectId {
        ObjectId::new(ContainerId::new("container"), path_id)
    }

    pub fn context() -> (AdapterContext, Arc<unity_asset_export_core::LocalHandleRegistry>) {
        let registry = Arc::new(unity_asset_export_core::LocalHandleRegistry::new());
        let converter = Arc::new(ImageConverterPool::new(
            2,
            unity_asset_export_core::PngOptions::default(),
        ));
        (AdapterContext::new(converter, registry.clone()), registry)
    }

    pub fn adapter(object: FakeObject) -> (Adapter, Arc<FakeObject>) {
        let object = Arc::new(object);
        let adapter = Adapter::for_object(object_id(object.path_id), object.clone());
        (adapter, object)
    }
}
