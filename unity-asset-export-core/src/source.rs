//! Container decoder interface
//!
//! The binary container decoder lives outside this workspace. The pipeline
//! only sees it through [`ContainerDecoder`] and [`AssetObject`].

use crate::config::DecodeOptions;
use crate::error::{ExportError, Result};
use crate::unity_types::{AssetKind, InspectValue};
use bytes::Bytes;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// Raw input file handed to the manager
#[derive(Clone)]
pub struct SourceFile {
    pub name: String,
    pub data: Bytes,
}

impl SourceFile {
    pub fn new<S: Into<String>>(name: S, data: Bytes) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }

    /// Read a file from disk asynchronously
    pub async fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = tokio::fs::read(path)
            .await
            .map_err(|e| ExportError::load(path.display().to_string(), e.to_string()))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self::new(name, Bytes::from(data)))
    }
}

impl fmt::Debug for SourceFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceFile")
            .field("name", &self.name)
            .field("len", &self.data.len())
            .finish()
    }
}

/// Decoded RGBA8 bitmap.
///
/// Bitmaps are passed by value into the conversion pool; once submitted the
/// caller no longer owns the pixel buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitmap {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl Bitmap {
    /// Create a bitmap, checking that `data` holds `width * height` RGBA pixels
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize * 4;
        if data.len() != expected {
            return Err(ExportError::Encode(format!(
                "RGBA data size mismatch: expected {} bytes for {}x{}, got {}",
                expected,
                width,
                height,
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn byte_len(&self) -> usize {
        self.data.len()
    }

    pub fn into_raw(self) -> Vec<u8> {
        self.data
    }
}

/// Audio payload as stored in the clip
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioSamples {
    /// Container format / file extension (`ogg`, `wav`, `m4a`, `fsb`, ...)
    pub format: String,
    pub data: Bytes,
}

impl AudioSamples {
    pub fn is_fsb(&self) -> bool {
        self.format.eq_ignore_ascii_case("fsb")
    }
}

/// One sprite packed inside an atlas object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpriteEntry {
    /// Stable sub-identifier (sprite guid)
    pub key: String,
    pub name: String,
}

/// Members of a skeleton animation bundle
#[derive(Debug, Clone, Default)]
pub struct SkeletonBundle {
    pub skel: Vec<(String, Bytes)>,
    pub atlas: Vec<(String, Bytes)>,
    pub images: Vec<(String, Bitmap)>,
}

impl SkeletonBundle {
    pub fn len(&self) -> usize {
        self.skel.len() + self.atlas.len() + self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One decoded entry of a container.
///
/// Accessors that do not apply to the object's kind keep their defaults.
pub trait AssetObject: Send + Sync {
    fn path_id(&self) -> i64;

    fn kind(&self) -> AssetKind;

    fn name(&self) -> &str;

    fn size(&self) -> u64;

    /// Container path recorded in the bundle for this object
    fn container_path(&self) -> Option<&str> {
        None
    }

    fn type_tree(&self) -> InspectValue {
        InspectValue::empty_object()
    }

    /// Structural dump of the object's fields
    fn dump(&self) -> InspectValue {
        InspectValue::empty_object()
    }

    /// Raw bytes of a text asset
    fn text(&self) -> Option<Bytes> {
        None
    }

    /// Decoded bitmap of a texture, sprite or material
    fn raw_bitmap(&self) -> Result<Option<Bitmap>> {
        Ok(None)
    }

    fn audio(&self) -> Result<Option<AudioSamples>> {
        Ok(None)
    }

    /// Sprites packed in this object (sprite atlases)
    fn sprites(&self) -> Vec<SpriteEntry> {
        Vec::new()
    }

    fn sprite_bitmap(&self, _key: &str) -> Result<Option<Bitmap>> {
        Ok(None)
    }

    /// Cheap check whether [`AssetObject::skeleton`] can yield anything
    fn has_skeleton(&self) -> bool {
        false
    }

    fn skeleton(&self) -> Result<Option<SkeletonBundle>> {
        Ok(None)
    }
}

/// Result of decoding one source file
#[derive(Default)]
pub struct DecodedContainer {
    pub objects: Vec<Arc<dyn AssetObject>>,
}

impl DecodedContainer {
    pub fn new(objects: Vec<Arc<dyn AssetObject>>) -> Self {
        Self { objects }
    }
}

/// External binary container decoder
pub trait ContainerDecoder: Send + Sync + 'static {
    fn decode(&self, data: Bytes, options: &DecodeOptions) -> Result<DecodedContainer>;
}

/// Converts FSB audio banks to MP3 so they can be exported
pub trait AudioTranscoder: Send + Sync + 'static {
    fn fsb_to_mp3(&self, samples: &AudioSamples) -> Result<Bytes>;
}
