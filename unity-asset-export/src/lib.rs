//! Unity Asset Export
//!
//! Concurrent preview and export pipeline for decoded Unity assets: loaded
//! containers are indexed by object, previews are produced lazily and cached
//! behind revocable handles, and batch exports stream through a bounded worker
//! pool into a directory or a single ZIP archive.
//!
//! # Key Features
//!
//! - **Bounded concurrency**: FIFO [`BoundedTaskPool`] for export writes
//! - **Image encoding**: [`ImageConverterPool`] turns raw RGBA into PNG on
//!   dedicated blocking threads, newest batch first
//! - **Adapters**: per-kind preview and export logic for text, images, audio,
//!   sprite atlases and skeleton bundles
//! - **Deterministic naming**: duplicate paths become `a (1).png`, `a (2).png`
//!
//! # Architecture
//!
//! - `manager.rs` - [`AssetManager`], the facade used by the UI layer
//! - `adapters/` - per-kind preview / export strategies
//! - `cache.rs` - result caches that release handles on eviction
//! - `task_pool.rs` / `image_pool.rs` - the two worker pools
//! - `archive.rs` / `destination.rs` - export sinks
//! - `rename.rs` - path legalization and de-duplication
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use unity_asset_export::{AssetManager, DirectoryDestination, GroupMethod, SourceFile};
//! # use unity_asset_export::ContainerDecoder;
//!
//! # async fn run(decoder: Arc<dyn ContainerDecoder>) -> unity_asset_export::Result<()> {
//! let manager = AssetManager::new(decoder);
//! let file = SourceFile::from_path("level0.assets").await?;
//! let report = manager.load_files(vec![file], None).await;
//!
//! let ids: Vec<_> = report.infos.iter().map(|info| info.id.clone()).collect();
//! let destination = Arc::new(DirectoryDestination::new("exported"));
//! if let Some(stats) = manager
//!     .export_assets(destination, &ids, GroupMethod::TypeName, None)
//!     .await
//! {
//!     println!("{} exported, {} skipped, {} failed", stats.success, stats.skip, stats.error);
//! }
//! # Ok(())
//! # }
//! ```

// Re-export core types
pub use unity_asset_export_core::*;

pub mod adapters;
pub mod archive;
pub mod cache;
pub mod destination;
pub mod image_pool;
pub mod manager;
pub mod rename;
pub mod task_pool;

// Re-export main types
pub use adapters::{Adapter, AdapterContext, AdapterTarget};
pub use archive::{ArchiveAssembler, ArchiveProgress, ArchiveProgressFn};
pub use cache::{
    BlobCache, BlobEntry, BundleCache, BundleEntry, BundleItem, CacheRelease, ResultCache,
};
pub use destination::DirectoryDestination;
pub use image_pool::{ConversionInput, ConversionSummary, ConvertedImage, ImageConverterPool};
pub use manager::{
    ArchiveExport, AssetManager, AssetManagerBuilder, FileLoadError, LoadReport, ManagerConfig,
    ManagerState,
};
pub use rename::{legal_file_name, RenameProcessor};
pub use task_pool::BoundedTaskPool;
