use super::{AdapterContext, AdapterTarget};
use std::sync::Arc;
use unity_asset_export_core::{ExportItem, PreviewData, Result};

/// Textures, sprites and materials: previewed and exported as PNG
pub struct ImageAdapter {
    target: AdapterTarget,
}

impl ImageAdapter {
    pub fn new(target: AdapterTarget) -> Self {
        Self { target }
    }

    pub fn target(&self) -> &AdapterTarget {
        &self.target
    }

    pub async fn preview_data(&self, ctx: &AdapterContext) -> Result<Option<PreviewData>> {
        let object = Arc::clone(&self.target.object);
        let handle = ctx
            .preview_image(self.target.cache_key(), move || object.raw_bitmap())
            .await?;
        Ok(handle.map(PreviewData::Image))
    }

    pub async fn export(&self, ctx: &AdapterContext) -> Result<Option<Vec<ExportItem>>> {
        let object = Arc::clone(&self.target.object);
        let data = ctx
            .export_image(self.target.cache_key(), move || object.raw_bitmap())
            .await?;
        Ok(data.map(|data| {
            vec![ExportItem::new(
                format!("{}.png", self.target.file_stem()),
                data,
            )]
        }))
    }
}
