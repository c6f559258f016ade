use super::AdapterTarget;
use unity_asset_export_core::{ExportItem, PreviewData};

/// Text assets: previewed as UTF-8, exported as `.txt`
pub struct TextAdapter {
    target: AdapterTarget,
}

impl TextAdapter {
    pub fn new(target: AdapterTarget) -> Self {
        Self { target }
    }

    pub fn target(&self) -> &AdapterTarget {
        &self.target
    }

    pub fn preview_data(&self) -> Option<PreviewData> {
        let text = self.target.object.text()?;
        Some(PreviewData::Text(String::from_utf8_lossy(&text).into_owned()))
    }

    pub fn export(&self) -> Option<Vec<ExportItem>> {
        let text = self.target.object.text()?;
        Some(vec![ExportItem::new(
            format!("{}.txt", self.target.file_stem()),
            text,
        )])
    }
}
