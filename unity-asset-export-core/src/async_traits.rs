//! Async trait definitions
//!
//! Seams of the export pipeline: cached results, export destinations and
//! progress reporting.

use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;

/// Load progress information
#[derive(Debug, Clone, PartialEq)]
pub struct LoadProgress {
    /// File currently being decoded
    pub name: String,
    /// Completion ratio (0.0 - 1.0)
    pub fraction: f32,
    /// Objects collected so far
    pub total_objects: usize,
}

/// Export progress information
#[derive(Debug, Clone, PartialEq)]
pub struct ExportProgress {
    /// Item currently being written
    pub name: String,
    /// Completion ratio (0.0 - 1.0)
    pub fraction: f32,
}

impl ExportProgress {
    /// Ratio of `finished` over `total`, clamped to 1.0. An empty batch is complete.
    pub fn ratio(finished: usize, total: usize) -> f32 {
        if total == 0 {
            1.0
        } else {
            (finished as f32 / total as f32).min(1.0)
        }
    }
}

/// Progress callback for file loading
pub type LoadProgressFn = Arc<dyn Fn(LoadProgress) + Send + Sync>;

/// Progress callback for exports (invoked from pool workers)
pub type ExportProgressFn = Arc<dyn Fn(ExportProgress) + Send + Sync>;

/// Asset cache trait
#[async_trait]
pub trait AsyncAssetCache: Send + Sync {
    type Key: Send + Sync + Clone;
    type Value: Send + Sync + Clone;

    /// Get cache item asynchronously
    async fn get(&self, key: &Self::Key) -> Option<Self::Value>;

    /// Set cache item asynchronously. A replaced entry is released.
    async fn set(&self, key: Self::Key, value: Self::Value);

    async fn has(&self, key: &Self::Key) -> bool;

    /// Remove cache item, releasing its handles
    async fn remove(&self, key: &Self::Key) -> Option<Self::Value>;

    /// Release every handle, then empty the cache
    async fn clear(&self);

    /// Get cache size
    async fn size(&self) -> usize;
}

/// Writable export target (a directory on disk, a test double, ...)
#[async_trait]
pub trait ExportDestination: Send + Sync {
    /// Write `data` to the relative `path`, creating parent directories.
    ///
    /// Must fail with [`crate::ExportError::WriteConflict`] when `path` already
    /// exists; existing files are never overwritten.
    async fn write_new(&self, path: &str, data: Bytes) -> Result<()>;
}
