use super::{AdapterContext, AdapterTarget};
use crate::cache::{BundleEntry, BundleItem};
use crate::image_pool::ConversionInput;
use crate::rename::legal_file_name;
use bytes::Bytes;
use futures::future::try_join_all;
use std::sync::Arc;
use tracing::debug;
use unity_asset_export_core::{
    AsyncAssetCache, ExportError, ExportItem, PreviewData, PreviewDetail, PreviewListItem, Result,
    SkeletonItemKind, SkeletonPreviewItem, SpriteEntry,
};

type SkeletonMember = (SkeletonItemKind, String, Bytes);

/// What a script object carries
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompositeMode {
    /// A sprite atlas: one PNG per packed sprite
    Sprites(Vec<SpriteEntry>),
    /// A skeleton animation bundle: skel, atlas and texture pages
    Skeleton,
    Empty,
}

/// Script objects that expand into several files
pub struct CompositeAdapter {
    target: AdapterTarget,
    mode: CompositeMode,
}

impl CompositeAdapter {
    pub fn new(target: AdapterTarget) -> Self {
        let sprites = target.object.sprites();
        let mode = if !sprites.is_empty() {
            CompositeMode::Sprites(sprites)
        } else if target.object.has_skeleton() {
            CompositeMode::Skeleton
        } else {
            CompositeMode::Empty
        };
        Self { target, mode }
    }

    pub fn target(&self) -> &AdapterTarget {
        &self.target
    }

    pub fn mode(&self) -> &CompositeMode {
        &self.mode
    }

    pub fn can_export(&self) -> bool {
        !matches!(self.mode, CompositeMode::Empty)
    }

    pub fn preview_detail(&self) -> PreviewDetail {
        match &self.mode {
            CompositeMode::Sprites(sprites) => PreviewDetail::ImageList(
                sprites
                    .iter()
                    .map(|s| PreviewListItem {
                        key: s.key.clone(),
                        name: s.name.clone(),
                    })
                    .collect(),
            ),
            CompositeMode::Skeleton => PreviewDetail::Skeleton,
            CompositeMode::Empty => PreviewDetail::None,
        }
    }

    pub async fn preview_data(
        &self,
        ctx: &AdapterContext,
        sub_key: Option<&str>,
    ) -> Result<Option<PreviewData>> {
        match (&self.mode, sub_key) {
            (CompositeMode::Sprites(sprites), Some(key)) => {
                if !sprites.iter().any(|s| s.key == key) {
                    return Ok(None);
                }
                let object = Arc::clone(&self.target.object);
                let sprite = key.to_string();
                let handle = ctx
                    .preview_image(self.target.sub_cache_key(key), move || {
                        object.sprite_bitmap(&sprite)
                    })
                    .await?;
                Ok(handle.map(PreviewData::Image))
            }
            (CompositeMode::Skeleton, _) => self.preview_skeleton(ctx).await,
            _ => Ok(None),
        }
    }

    pub async fn export(&self, ctx: &AdapterContext) -> Result<Option<Vec<ExportItem>>> {
        match &self.mode {
            CompositeMode::Sprites(sprites) => self.export_sprites(ctx, sprites).await.map(Some),
            CompositeMode::Skeleton => self.export_skeleton(ctx).await,
            CompositeMode::Empty => Ok(None),
        }
    }

    async fn export_sprites(
        &self,
        ctx: &AdapterContext,
        sprites: &[SpriteEntry],
    ) -> Result<Vec<ExportItem>> {
        let stem = self.target.file_stem();
        let exports = sprites.iter().map(|sprite| {
            let object = Arc::clone(&self.target.object);
            let key = sprite.key.clone();
            let name = format!("{}/{}.png", stem, legal_file_name(&sprite.name));
            async move {
                let data = ctx
                    .export_image(self.target.sub_cache_key(&key), move || {
                        object.sprite_bitmap(&key)
                    })
                    .await?;
                Ok::<_, ExportError>(data.map(|d| ExportItem::new(name, d)))
            }
        });

        Ok(try_join_all(exports).await?.into_iter().flatten().collect())
    }

    /// Decode the skeleton bundle and encode its texture pages in one batch.
    /// Members come back in bundle order: skel, atlas, then images.
    async fn load_skeleton(&self, ctx: &AdapterContext) -> Result<Option<Vec<SkeletonMember>>> {
        let object = Arc::clone(&self.target.object);
        let Some(bundle) = tokio::task::spawn_blocking(move || object.skeleton()).await?? else {
            return Ok(None);
        };

        let mut members: Vec<SkeletonMember> = bundle
            .skel
            .into_iter()
            .map(|(name, data)| (SkeletonItemKind::Skel, name, data))
            .chain(
                bundle
                    .atlas
                    .into_iter()
                    .map(|(name, data)| (SkeletonItemKind::Atlas, name, data)),
            )
            .collect();

        let (names, inputs): (Vec<String>, Vec<ConversionInput>) = bundle
            .images
            .into_iter()
            .enumerate()
            .map(|(index, (name, bitmap))| {
                (name, ConversionInput::new(index.to_string(), bitmap))
            })
            .unzip();
        let mut pages: Vec<Option<Bytes>> = vec![None; names.len()];
        let summary = ctx
            .converter()
            .add_tasks(inputs, |image| {
                let slot = image.key.parse::<usize>().ok();
                if let Some(page) = slot.and_then(|i| pages.get_mut(i)) {
                    *page = Some(image.data);
                }
            })
            .await;
        // a bundle missing a page is unusable, so it is neither cached nor exported
        if summary.failed > 0 {
            return Err(ExportError::Encode(format!(
                "{} of {} texture pages of {} failed to convert",
                summary.failed,
                names.len(),
                self.target.id
            )));
        }

        debug!(
            "{} skeleton pages converted for {}",
            summary.converted, self.target.id
        );
        for (name, page) in names.into_iter().zip(pages) {
            let data = page.ok_or_else(|| {
                ExportError::Encode(format!(
                    "texture page {} of {} was not converted",
                    name, self.target.id
                ))
            })?;
            members.push((SkeletonItemKind::Image, name, data));
        }
        Ok(Some(members))
    }

    async fn preview_skeleton(&self, ctx: &AdapterContext) -> Result<Option<PreviewData>> {
        let key = self.target.cache_key();
        let entry = match ctx.bundles().get(&key).await {
            Some(entry) => entry,
            None => {
                let Some(members) = self.load_skeleton(ctx).await? else {
                    return Ok(None);
                };
                let items = members
                    .into_iter()
                    .map(|(kind, name, data)| BundleItem {
                        handle: ctx.registry().create(data.clone(), kind.mime()),
                        kind,
                        name,
                        data,
                    })
                    .collect();
                ctx.bundles().get_or_insert(key, BundleEntry::new(items)).await
            }
        };

        Ok(Some(PreviewData::Skeleton(
            entry
                .items
                .iter()
                .map(|item| SkeletonPreviewItem {
                    kind: item.kind,
                    name: item.name.clone(),
                    handle: item.handle.clone(),
                })
                .collect(),
        )))
    }

    async fn export_skeleton(&self, ctx: &AdapterContext) -> Result<Option<Vec<ExportItem>>> {
        let cached = ctx.bundles().get(&self.target.cache_key()).await;
        let members: Vec<(String, Bytes)> = match cached {
            Some(entry) => entry
                .items
                .iter()
                .map(|item| (item.name.clone(), item.data.clone()))
                .collect(),
            None => match self.load_skeleton(ctx).await? {
                Some(members) => members
                    .into_iter()
                    .map(|(_, name, data)| (name, data))
                    .collect(),
                None => return Ok(None),
            },
        };

        let stem = self.target.file_stem();
        Ok(Some(
            members
                .into_iter()
                .map(|(name, data)| {
                    ExportItem::new(format!("{}/{}", stem, legal_file_name(&name)), data)
                })
                .collect(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;
    use unity_asset_export_core::{AssetKind, Bitmap, SkeletonBundle};

    fn atlas() -> FakeObject {
        let mut object = FakeObject::new(8, AssetKind::MonoBehaviour, "ui_atlas");
        object.sprites = vec![
            (
                SpriteEntry {
                    key: "g1".into(),
                    name: "button".into(),
                },
                solid(2, 2),
            ),
            (
                SpriteEntry {
                    key: "g2".into(),
                    name: "icon/star".into(),
                },
                solid(3, 3),
            ),
        ];
        object
    }

    fn spine() -> FakeObject {
        let mut object = FakeObject::new(9, AssetKind::MonoBehaviour, "hero");
        object.skeleton = Some(SkeletonBundle {
            skel: vec![("hero.skel".into(), Bytes::from_static(b"skel"))],
            atlas: vec![("hero.atlas".into(), Bytes::from_static(b"atlas"))],
            images: vec![
                ("hero.png".into(), solid(4, 4)),
                ("hero2.png".into(), solid(2, 2)),
            ],
        });
        object
    }

    #[test]
    fn test_sprite_list_detail() {
        let (adapter, _) = adapter(atlas());
        let PreviewDetail::ImageList(items) = adapter.preview_detail() else {
            panic!("expected an image list");
        };
        assert_eq!(items.len(), 2);
        assert_eq!(items[1].key, "g2");
        assert!(adapter.can_export());
    }

    #[tokio::test]
    async fn test_sprite_preview_by_sub_key() {
        let (ctx, _) = context();
        let (adapter, _) = adapter(atlas());

        assert!(matches!(
            adapter.preview_data(&ctx, Some("g1")).await.unwrap(),
            Some(PreviewData::Image(_))
        ));
        assert!(adapter.preview_data(&ctx, None).await.unwrap().is_none());
        assert!(adapter.preview_data(&ctx, Some("nope")).await.unwrap().is_none());
        assert_eq!(ctx.blobs().size().await, 1);
    }

    #[tokio::test]
    async fn test_sprites_export_into_object_folder() {
        let (ctx, _) = context();
        let (adapter, _) = adapter(atlas());

        let items = adapter.export(&ctx).await.unwrap().unwrap();
        let names: Vec<_> = items.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, ["ui_atlas/button.png", "ui_atlas/icon_star.png"]);
    }

    #[tokio::test]
    async fn test_skeleton_preview_is_cached_with_handles() {
        let (ctx, registry) = context();
        let (adapter, object) = adapter(spine());
        assert_eq!(adapter.preview_detail(), PreviewDetail::Skeleton);

        let Some(PreviewData::Skeleton(items)) = adapter.preview_data(&ctx, None).await.unwrap()
        else {
            panic!("expected a skeleton preview");
        };
        let kinds: Vec<_> = items.iter().map(|i| i.kind).collect();
        assert_eq!(
            kinds,
            [
                SkeletonItemKind::Skel,
                SkeletonItemKind::Atlas,
                SkeletonItemKind::Image,
                SkeletonItemKind::Image
            ]
        );
        assert_eq!(registry.live_count(), 4);
        assert_eq!(registry.resolve(&items[2].handle).unwrap().1, "image/png");

        adapter.preview_data(&ctx, None).await.unwrap();
        assert_eq!(object.decode_count(), 1);

        ctx.clear().await;
        assert_eq!(registry.live_count(), 0);
    }

    #[tokio::test]
    async fn test_skeleton_export_names() {
        let (ctx, registry) = context();
        let (adapter, _) = adapter(spine());

        let items = adapter.export(&ctx).await.unwrap().unwrap();
        let names: Vec<_> = items.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(
            names,
            ["hero/hero.skel", "hero/hero.atlas", "hero/hero.png", "hero/hero2.png"]
        );
        assert_eq!(items[0].data.as_ref(), b"skel");
        assert_eq!(registry.live_count(), 0);
    }

    #[tokio::test]
    async fn test_unconvertible_skeleton_page_fails_the_bundle() {
        let (ctx, registry) = context();
        let mut object = spine();
        if let Some(bundle) = object.skeleton.as_mut() {
            bundle
                .images
                .push(("empty.png".into(), Bitmap::new(0, 0, Vec::new()).unwrap()));
        }
        let (adapter, _) = adapter(object);

        let err = adapter.export(&ctx).await.unwrap_err();
        assert!(matches!(err, ExportError::Encode(_)));

        assert!(adapter.preview_data(&ctx, None).await.is_err());
        assert_eq!(ctx.bundles().size().await, 0);
        assert_eq!(registry.live_count(), 0);
    }

    #[test]
    fn test_empty_script_is_not_exportable() {
        let (adapter, _) = adapter(FakeObject::new(1, AssetKind::MonoBehaviour, "logic"));
        assert!(!adapter.can_export());
        assert_eq!(adapter.preview_detail(), PreviewDetail::None);
    }
}
