//! Unity Asset Export Core
//!
//! Shared foundation of the asset export pipeline: the error taxonomy, the data
//! model exchanged with the UI layer, the interface of the external container
//! decoder, and the small async primitives the pipeline is built from.
//!
//! # Key Features
//!
//! - **Decoder seam**: [`ContainerDecoder`] / [`AssetObject`] keep the binary
//!   format parser outside the pipeline
//! - **Trackable futures**: synchronously queryable settlement state
//! - **Revocable handles**: preview payloads exposed through [`HandleRegistry`]
//! - **Export accounting**: success / skip / error counters and progress pacing

pub mod async_traits;
pub mod config;
pub mod error;
pub mod handles;
pub mod metrics;
pub mod source;
pub mod tracked;
pub mod unity_types;

// Re-export main types
pub use async_traits::{
    AsyncAssetCache, ExportDestination, ExportProgress, ExportProgressFn, LoadProgress,
    LoadProgressFn,
};
pub use config::{
    default_converter_threads, default_export_concurrency, ArchiveCompression, ArchiveOptions,
    DecodeOptions, GroupMethod, PngCompression, PngOptions, DEFAULT_PROGRESS_INTERVAL,
};
pub use error::{ErrorContext, ExportError, Result};
pub use handles::{HandleRegistry, LocalHandleRegistry};
pub use metrics::{ExportCounters, ExportFailure, ExportStats, ProgressThrottle};
pub use source::{
    AssetObject, AudioSamples, AudioTranscoder, Bitmap, ContainerDecoder, DecodedContainer,
    SkeletonBundle, SourceFile, SpriteEntry,
};
pub use tracked::TrackedFuture;
pub use unity_types::{
    AssetKind, CacheKey, ContainerId, ExportItem, InspectValue, ObjectId, ObjectSummary,
    PreviewData, PreviewDetail, PreviewHandle, PreviewInfo, PreviewListItem, SkeletonItemKind,
    SkeletonPreviewItem,
};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
