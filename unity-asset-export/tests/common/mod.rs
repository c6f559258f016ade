//! Shared fixtures: a line-based manifest decoder standing in for the binary
//! container parser.
//!
//! Each line is `path_id|Kind|name|container|payload`. Texture payloads are
//! `WxH` (or `broken`), audio payloads are `format:bytes`, text payloads are
//! the text itself.

#![allow(dead_code)]

use bytes::Bytes;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use unity_asset_export::{
    AssetKind, AssetManager, AssetObject, AudioSamples, AudioTranscoder, Bitmap,
    ContainerDecoder, DecodeOptions, DecodedContainer, ExportError, ExportProgress,
    ExportProgressFn, LocalHandleRegistry, ManagerConfig, ObjectId, Result, SourceFile,
};

pub struct ManifestObject {
    path_id: i64,
    kind: AssetKind,
    name: String,
    container: Option<String>,
    payload: String,
}

impl AssetObject for ManifestObject {
    fn path_id(&self) -> i64 {
        self.path_id
    }

    fn kind(&self) -> AssetKind {
        self.kind.clone()
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn size(&self) -> u64 {
        self.payload.len() as u64
    }

    fn container_path(&self) -> Option<&str> {
        self.container.as_deref()
    }

    fn text(&self) -> Option<Bytes> {
        Some(Bytes::from(self.payload.clone()))
    }

    fn raw_bitmap(&self) -> Result<Option<Bitmap>> {
        if self.payload == "broken" {
            return Err(ExportError::decode(&*self.name, "corrupt texture data"));
        }
        let Some((w, h)) = self.payload.split_once('x') else {
            return Ok(None);
        };
        let (w, h): (u32, u32) = match (w.parse(), h.parse()) {
            (Ok(w), Ok(h)) => (w, h),
            _ => return Ok(None),
        };
        Bitmap::new(w, h, vec![200; (w * h * 4) as usize]).map(Some)
    }

    fn audio(&self) -> Result<Option<AudioSamples>> {
        Ok(self
            .payload
            .split_once(':')
            .map(|(format, data)| AudioSamples {
                format: format.to_string(),
                data: Bytes::from(data.to_string()),
            }))
    }
}

/// Decodes manifests and counts how often it was asked to
#[derive(Default)]
pub struct ManifestDecoder {
    decodes: AtomicUsize,
}

impl ManifestDecoder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn decode_count(&self) -> usize {
        self.decodes.load(Ordering::SeqCst)
    }
}

impl ContainerDecoder for ManifestDecoder {
    fn decode(&self, data: Bytes, _options: &DecodeOptions) -> Result<DecodedContainer> {
        self.decodes.fetch_add(1, Ordering::SeqCst);
        let text = std::str::from_utf8(&data).map_err(|e| ExportError::Custom(e.to_string()))?;

        let mut objects: Vec<Arc<dyn AssetObject>> = Vec::new();
        for line in text.lines().filter(|l| !l.trim().is_empty()) {
            let fields: Vec<&str> = line.splitn(5, '|').collect();
            let &[path_id, kind, name, container, payload] = fields.as_slice() else {
                return Err(ExportError::Custom(format!("malformed line '{}'", line)));
            };
            let path_id = path_id
                .parse()
                .map_err(|_| ExportError::Custom(format!("bad path id '{}'", path_id)))?;
            objects.push(Arc::new(ManifestObject {
                path_id,
                kind: AssetKind::from_type_name(kind),
                name: name.to_string(),
                container: (!container.is_empty()).then(|| container.to_string()),
                payload: payload.to_string(),
            }));
        }
        Ok(DecodedContainer::new(objects))
    }
}

/// Prepends an ID3 tag to the bank bytes
pub struct TagTranscoder;

impl AudioTranscoder for TagTranscoder {
    fn fsb_to_mp3(&self, samples: &AudioSamples) -> Result<Bytes> {
        let mut mp3 = b"ID3".to_vec();
        mp3.extend_from_slice(&samples.data);
        Ok(Bytes::from(mp3))
    }
}

pub fn source(name: &str, lines: &[&str]) -> SourceFile {
    SourceFile::new(name, Bytes::from(lines.join("\n")))
}

pub fn test_config() -> ManagerConfig {
    ManagerConfig::default()
        .with_export_concurrency(2)
        .with_converter_threads(2)
        .with_progress_interval(Duration::ZERO)
}

pub fn manager(decoder: Arc<ManifestDecoder>) -> (AssetManager, Arc<LocalHandleRegistry>) {
    let registry = Arc::new(LocalHandleRegistry::new());
    let manager = AssetManager::builder(decoder)
        .config(test_config())
        .handle_registry(registry.clone())
        .build();
    (manager, registry)
}

/// Load `lines` as one file and return the listed object ids
pub async fn load(manager: &AssetManager, lines: &[&str]) -> Vec<ObjectId> {
    let report = manager
        .load_files(vec![source("level0.assets", lines)], None)
        .await;
    assert!(report.errors.is_empty(), "{:?}", report.errors);
    report.infos.into_iter().map(|info| info.id).collect()
}

pub fn export_recorder() -> (ExportProgressFn, Arc<Mutex<Vec<ExportProgress>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let on_progress: ExportProgressFn =
        Arc::new(move |p: ExportProgress| sink.lock().unwrap().push(p));
    (on_progress, seen)
}
