//! Archive assembly
//!
//! Collects export items into a single zip archive. Entry names follow the
//! same duplicate-suffix rule as directory exports, tracked separately.

use crate::rename::{relative_export_path, NameDeduper};
use bytes::Bytes;
use std::io::{Cursor, Write};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};
use unity_asset_export_core::{
    ArchiveCompression, ArchiveOptions, ExportItem, ProgressThrottle, Result,
    DEFAULT_PROGRESS_INTERVAL,
};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Archive generation progress
#[derive(Debug, Clone, PartialEq)]
pub struct ArchiveProgress {
    /// Completion in percent (0.0 - 100.0)
    pub percent: f32,
    /// Entry being written, if any
    pub current_file: Option<String>,
}

pub type ArchiveProgressFn = Arc<dyn Fn(ArchiveProgress) + Send + Sync>;

/// Builds a zip archive from export items
#[derive(Debug, Default)]
pub struct ArchiveAssembler {
    entries: Vec<ExportItem>,
    names: NameDeduper,
    options: ArchiveOptions,
    progress_interval: Option<Duration>,
}

impl ArchiveAssembler {
    pub fn new(options: ArchiveOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    /// Minimum delay between two progress callbacks
    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = Some(interval);
        self
    }

    /// Add an item, renaming it on collision. Returns the entry name used.
    ///
    /// Names must be relative paths without `..` segments, as in directory
    /// exports.
    pub fn add(&mut self, item: ExportItem) -> Result<String> {
        relative_export_path(&item.name)?;
        let name = self.names.claim(item.name);
        self.entries.push(ExportItem::new(name.clone(), item.data));
        Ok(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry names in insertion order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.name.as_str())
    }

    /// Write the archive. Progress is throttled, the final 100% always fires.
    #[instrument(skip_all, fields(entries = self.entries.len()))]
    pub async fn generate(self, on_progress: Option<ArchiveProgressFn>) -> Result<Bytes> {
        let interval = self.progress_interval.unwrap_or(DEFAULT_PROGRESS_INTERVAL);
        let method = match self.options.compression {
            ArchiveCompression::Stored => CompressionMethod::Stored,
            ArchiveCompression::Deflated => CompressionMethod::Deflated,
        };
        let entries = self.entries;

        let data = tokio::task::spawn_blocking(move || -> Result<Vec<u8>> {
            let throttle = ProgressThrottle::new(interval);
            let options = SimpleFileOptions::default().compression_method(method);
            let total = entries.len();
            let mut writer = ZipWriter::new(Cursor::new(Vec::new()));

            for (index, entry) in entries.iter().enumerate() {
                writer.start_file(entry.name.as_str(), options)?;
                writer.write_all(&entry.data)?;

                if let Some(on_progress) = &on_progress {
                    if index + 1 < total && throttle.ready() {
                        on_progress(ArchiveProgress {
                            percent: (index + 1) as f32 / total as f32 * 100.0,
                            current_file: Some(entry.name.clone()),
                        });
                    }
                }
            }

            let cursor = writer.finish()?;
            if let Some(on_progress) = &on_progress {
                on_progress(ArchiveProgress {
                    percent: 100.0,
                    current_file: entries.last().map(|e| e.name.clone()),
                });
            }
            Ok(cursor.into_inner())
        })
        .await??;

        debug!("archive generated: {} bytes", data.len());
        Ok(Bytes::from(data))
    }
}
