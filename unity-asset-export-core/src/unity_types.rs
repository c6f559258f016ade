//! Unity types for the export pipeline
//!
//! Identifiers, asset kinds, export items and the preview/inspection values
//! handed back to the UI layer.

use bytes::Bytes;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Content hash of a container's source bytes
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContainerId(String);

impl ContainerId {
    pub fn new<S: Into<String>>(hash: S) -> Self {
        Self(hash.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Stable address of one decoded object: its container plus the path id
/// that is unique inside that container.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectId {
    pub container: ContainerId,
    pub path_id: i64,
}

impl ObjectId {
    pub fn new(container: ContainerId, path_id: i64) -> Self {
        Self { container, path_id }
    }

    /// Key used by the UI to address the object (`"{container}_{path_id}"`)
    pub fn key(&self) -> String {
        format!("{}_{}", self.container, self.path_id)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.container, self.path_id)
    }
}

/// Address of one cached decode/encode result.
///
/// `sub_key` selects a sub-item of a composite object, e.g. one sprite of an
/// atlas.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub object: ObjectId,
    pub sub_key: Option<String>,
}

impl CacheKey {
    pub fn object(object: ObjectId) -> Self {
        Self {
            object,
            sub_key: None,
        }
    }

    pub fn sub<S: Into<String>>(object: ObjectId, sub_key: S) -> Self {
        Self {
            object,
            sub_key: Some(sub_key.into()),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.sub_key {
            Some(sub) => write!(f, "{}-{}", self.object, sub),
            None => write!(f, "{}", self.object),
        }
    }
}

/// Unity class of a decoded object, as far as the export pipeline cares
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssetKind {
    TextAsset,
    Texture2D,
    Sprite,
    Material,
    AudioClip,
    MonoBehaviour,
    AssetBundle,
    Other(String),
}

impl AssetKind {
    /// Unity class name
    pub fn type_name(&self) -> &str {
        match self {
            Self::TextAsset => "TextAsset",
            Self::Texture2D => "Texture2D",
            Self::Sprite => "Sprite",
            Self::Material => "Material",
            Self::AudioClip => "AudioClip",
            Self::MonoBehaviour => "MonoBehaviour",
            Self::AssetBundle => "AssetBundle",
            Self::Other(name) => name,
        }
    }

    /// Create from a Unity class name
    pub fn from_type_name(name: &str) -> Self {
        match name {
            "TextAsset" => Self::TextAsset,
            "Texture2D" => Self::Texture2D,
            "Sprite" => Self::Sprite,
            "Material" => Self::Material,
            "AudioClip" => Self::AudioClip,
            "MonoBehaviour" => Self::MonoBehaviour,
            "AssetBundle" => Self::AssetBundle,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}

/// One file produced by an adapter, consumed once by a writer or archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportItem {
    pub name: String,
    pub data: Bytes,
}

impl ExportItem {
    pub fn new<S: Into<String>>(name: S, data: Bytes) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }
}

/// Structural value used for type trees and object dumps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InspectValue {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    String(String),
    Array(Vec<InspectValue>),
    Object(IndexMap<String, InspectValue>),
}

impl InspectValue {
    /// Empty object
    pub fn empty_object() -> Self {
        Self::Object(IndexMap::new())
    }
}

/// Entry of an image-list preview (one sprite of an atlas)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviewListItem {
    pub key: String,
    pub name: String,
}

/// What kind of preview an object supports
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "detail")]
pub enum PreviewDetail {
    None,
    Text,
    Image,
    ImageList(Vec<PreviewListItem>),
    Skeleton,
    Audio,
}

/// Preview descriptor: preview kind plus the structural views of the object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreviewInfo {
    pub detail: PreviewDetail,
    pub type_tree: InspectValue,
    pub inspect: InspectValue,
}

/// Externally visible reference to a cached payload (revocable)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PreviewHandle(String);

impl PreviewHandle {
    pub fn new<S: Into<String>>(id: S) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PreviewHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Kind of a skeleton bundle member
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SkeletonItemKind {
    Skel,
    Atlas,
    Image,
}

impl SkeletonItemKind {
    pub fn mime(&self) -> &'static str {
        match self {
            Self::Image => "image/png",
            Self::Skel | Self::Atlas => "text/plain",
        }
    }
}

/// One skeleton member as seen by the previewer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkeletonPreviewItem {
    pub kind: SkeletonItemKind,
    pub name: String,
    pub handle: PreviewHandle,
}

/// Kind-specific preview payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum PreviewData {
    Text(String),
    Image(PreviewHandle),
    Skeleton(Vec<SkeletonPreviewItem>),
    Audio(PreviewHandle),
}

/// Listing entry for one loaded object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectSummary {
    pub key: String,
    pub id: ObjectId,
    pub file_name: String,
    pub name: String,
    pub container: String,
    pub type_name: String,
    pub path_id: i64,
    pub size: u64,
    pub preview: PreviewInfo,
    pub search: String,
    pub can_export: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn object_id() -> ObjectId {
        ObjectId::new(ContainerId::new("abc"), 42)
    }

    #[test]
    fn test_object_key() {
        assert_eq!(object_id().key(), "abc_42");
    }

    #[test]
    fn test_cache_key_distinguishes_sub_items() {
        let whole = CacheKey::object(object_id());
        let sprite = CacheKey::sub(object_id(), "guid-1");
        assert_ne!(whole, sprite);
        assert_eq!(sprite.to_string(), "abc#42-guid-1");
    }

    #[test]
    fn test_asset_kind_names() {
        assert_eq!(AssetKind::from_type_name("Sprite"), AssetKind::Sprite);
        assert_eq!(
            AssetKind::from_type_name("Shader"),
            AssetKind::Other("Shader".to_string())
        );
        assert_eq!(AssetKind::AudioClip.type_name(), "AudioClip");
    }
}
