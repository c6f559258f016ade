//! Asset packs
//!
//! A pack is a ZIP archive of loose files. Every file entry becomes one
//! object whose kind follows the file extension; the entry's directory is
//! recorded as its container path.

use bytes::Bytes;
use std::io::{Cursor, Read};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;
use unity_asset_export::{
    AssetKind, AssetObject, AudioSamples, Bitmap, ContainerDecoder, DecodeOptions,
    DecodedContainer, Result,
};
use zip::ZipArchive;

const TEXT_EXTENSIONS: &[&str] = &["txt", "json", "xml", "csv", "skel", "atlas", "bytes"];
const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];
const AUDIO_EXTENSIONS: &[&str] = &["wav", "mp3", "ogg", "m4a", "fsb"];
const PREALLOC_LIMIT: u64 = 16 * 1024 * 1024;

fn kind_for_extension(extension: &str) -> AssetKind {
    if TEXT_EXTENSIONS.contains(&extension) {
        AssetKind::TextAsset
    } else if IMAGE_EXTENSIONS.contains(&extension) {
        AssetKind::Texture2D
    } else if AUDIO_EXTENSIONS.contains(&extension) {
        AssetKind::AudioClip
    } else {
        AssetKind::Other("Binary".to_string())
    }
}

/// One file of a pack
pub struct PackObject {
    path_id: i64,
    kind: AssetKind,
    name: String,
    extension: String,
    container: Option<String>,
    data: Bytes,
}

impl PackObject {
    fn from_entry(path_id: i64, entry_name: &str, data: Bytes) -> Self {
        let path = Path::new(entry_name);
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let container = path
            .parent()
            .map(|p| p.to_string_lossy().into_owned())
            .filter(|p| !p.is_empty());

        Self {
            path_id,
            kind: kind_for_extension(&extension),
            name,
            extension,
            container,
            data,
        }
    }
}

impl AssetObject for PackObject {
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
        self.data.len() as u64
    }

    fn container_path(&self) -> Option<&str> {
        self.container.as_deref()
    }

    fn text(&self) -> Option<Bytes> {
        (self.kind == AssetKind::TextAsset).then(|| self.data.clone())
    }

    fn raw_bitmap(&self) -> Result<Option<Bitmap>> {
        if self.kind != AssetKind::Texture2D {
            return Ok(None);
        }
        let rgba = image::load_from_memory(&self.data)?.to_rgba8();
        let (width, height) = rgba.dimensions();
        Bitmap::new(width, height, rgba.into_raw()).map(Some)
    }

    fn audio(&self) -> Result<Option<AudioSamples>> {
        if self.kind != AssetKind::AudioClip {
            return Ok(None);
        }
        Ok(Some(AudioSamples {
            format: self.extension.clone(),
            data: self.data.clone(),
        }))
    }
}

/// Decodes asset packs
#[derive(Debug, Default, Clone, Copy)]
pub struct PackDecoder;

impl ContainerDecoder for PackDecoder {
    fn decode(&self, data: Bytes, _options: &DecodeOptions) -> Result<DecodedContainer> {
        let mut archive = ZipArchive::new(Cursor::new(data))?;
        let mut objects: Vec<Arc<dyn AssetObject>> = Vec::with_capacity(archive.len());

        for index in 0..archive.len() {
            let mut entry = archive.by_index(index)?;
            if entry.is_dir() {
                continue;
            }
            let name = entry.name().to_string();
            // the declared size comes from the archive and is not trusted
            let mut buf = Vec::with_capacity(entry.size().min(PREALLOC_LIMIT) as usize);
            entry.read_to_end(&mut buf)?;
            debug!("pack entry {} ({} bytes)", name, buf.len());

            objects.push(Arc::new(PackObject::from_entry(
                index as i64 + 1,
                &name,
                Bytes::from(buf),
            )));
        }
        Ok(DecodedContainer::new(objects))
    }
}
