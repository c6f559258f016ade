//! Asset manager
//!
//! Owns the loaded containers and drives loading, previewing and exporting.
//! Containers are deduplicated by a content hash of their source bytes, so
//! loading the same file twice decodes it once.

use crate::adapters::{Adapter, AdapterContext};
use crate::archive::{ArchiveAssembler, ArchiveProgress, ArchiveProgressFn};
use crate::image_pool::ImageConverterPool;
use crate::rename::{join_prefix, RenameProcessor};
use crate::task_pool::BoundedTaskPool;
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, error, info, instrument, warn};
use unity_asset_export_core::{
    default_converter_threads, default_export_concurrency, ArchiveOptions, AssetKind, AssetObject,
    AudioTranscoder, ContainerDecoder, ContainerId, DecodeOptions, ExportCounters,
    ExportDestination, ExportError, ExportItem, ExportProgress, ExportProgressFn, ExportStats,
    GroupMethod, HandleRegistry, LoadProgress, LoadProgressFn, LocalHandleRegistry, ObjectId,
    ObjectSummary, PngOptions, PreviewData, PreviewInfo, ProgressThrottle, Result, SourceFile,
    DEFAULT_PROGRESS_INTERVAL,
};

/// Manager configuration
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Concurrent writes during exports
    pub export_concurrency: usize,
    /// Converter threads of the default image pool
    pub converter_threads: usize,
    /// Minimum delay between two export progress callbacks
    pub progress_interval: Duration,
    pub decode_options: DecodeOptions,
    pub png: PngOptions,
    pub archive: ArchiveOptions,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            export_concurrency: default_export_concurrency(),
            converter_threads: default_converter_threads(),
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            decode_options: DecodeOptions::default(),
            png: PngOptions::default(),
            archive: ArchiveOptions::default(),
        }
    }
}

impl ManagerConfig {
    pub fn with_export_concurrency(mut self, concurrency: usize) -> Self {
        self.export_concurrency = concurrency.max(1);
        self
    }

    pub fn with_converter_threads(mut self, threads: usize) -> Self {
        self.converter_threads = threads.max(1);
        self
    }

    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }

    pub fn with_decode_options(mut self, options: DecodeOptions) -> Self {
        self.decode_options = options;
        self
    }

    pub fn with_png(mut self, png: PngOptions) -> Self {
        self.png = png;
        self
    }

    pub fn with_archive(mut self, archive: ArchiveOptions) -> Self {
        self.archive = archive;
        self
    }
}

/// What the manager is busy with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ManagerState {
    Idle,
    Loading,
    Exporting,
}

/// A file that could not be loaded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileLoadError {
    pub name: String,
    pub error: String,
}

/// Outcome of [`AssetManager::load_files`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadReport {
    pub errors: Vec<FileLoadError>,
    pub infos: Vec<ObjectSummary>,
    /// Files that contributed at least one object
    pub success_count: usize,
}

/// Archive produced by [`AssetManager::export_assets_to_archive`]
#[derive(Debug, Clone)]
pub struct ArchiveExport {
    pub data: Bytes,
    /// Entry names in archive order
    pub entries: Vec<String>,
    pub stats: ExportStats,
}

/// Items and group prefix of one expanded object, or the failing object
type Expansion =
    std::result::Result<Option<(Vec<ExportItem>, Option<String>)>, (ObjectId, ExportError)>;

struct Container {
    file_name: String,
    objects: IndexMap<i64, Arc<dyn AssetObject>>,
}

/// Clears a busy flag when dropped
struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

struct LoadingGuard<'a>(&'a AtomicUsize);

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Builder for [`AssetManager`]
pub struct AssetManagerBuilder {
    decoder: Arc<dyn ContainerDecoder>,
    config: ManagerConfig,
    converter: Option<Arc<ImageConverterPool>>,
    registry: Option<Arc<dyn HandleRegistry>>,
    transcoder: Option<Arc<dyn AudioTranscoder>>,
}

impl AssetManagerBuilder {
    pub fn config(mut self, config: ManagerConfig) -> Self {
        self.config = config;
        self
    }

    /// Share an existing conversion pool instead of creating one
    pub fn converter(mut self, converter: Arc<ImageConverterPool>) -> Self {
        self.converter = Some(converter);
        self
    }

    pub fn handle_registry(mut self, registry: Arc<dyn HandleRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn audio_transcoder(mut self, transcoder: Arc<dyn AudioTranscoder>) -> Self {
        self.transcoder = Some(transcoder);
        self
    }

    pub fn build(self) -> AssetManager {
        let converter = self.converter.unwrap_or_else(|| {
            Arc::new(ImageConverterPool::new(
                self.config.converter_threads,
                self.config.png,
            ))
        });
        let registry = self
            .registry
            .unwrap_or_else(|| Arc::new(LocalHandleRegistry::new()) as Arc<dyn HandleRegistry>);

        let mut context = AdapterContext::new(converter, registry);
        if let Some(transcoder) = self.transcoder {
            context = context.with_audio_transcoder(transcoder);
        }

        AssetManager {
            decoder: self.decoder,
            config: self.config,
            containers: RwLock::new(IndexMap::new()),
            context,
            loading: AtomicUsize::new(0),
            exporting: AtomicBool::new(false),
        }
    }
}

/// Loads containers and serves previews and exports of their objects
pub struct AssetManager {
    decoder: Arc<dyn ContainerDecoder>,
    config: ManagerConfig,
    containers: RwLock<IndexMap<ContainerId, Arc<Container>>>,
    context: AdapterContext,
    loading: AtomicUsize,
    exporting: AtomicBool,
}

impl AssetManager {
    /// Manager with default configuration, its own image pool and an
    /// in-process handle registry
    pub fn new(decoder: Arc<dyn ContainerDecoder>) -> Self {
        Self::builder(decoder).build()
    }

    pub fn builder(decoder: Arc<dyn ContainerDecoder>) -> AssetManagerBuilder {
        AssetManagerBuilder {
            decoder,
            config: ManagerConfig::default(),
            converter: None,
            registry: None,
            transcoder: None,
        }
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Shared adapter services (caches, converter, handles)
    pub fn context(&self) -> &AdapterContext {
        &self.context
    }

    pub fn state(&self) -> ManagerState {
        if self.exporting.load(Ordering::Acquire) {
            ManagerState::Exporting
        } else if self.loading.load(Ordering::Acquire) > 0 {
            ManagerState::Loading
        } else {
            ManagerState::Idle
        }
    }

    pub async fn container_count(&self) -> usize {
        self.containers.read().await.len()
    }

    /// Drop all containers and release every cached preview
    pub async fn clear(&self) {
        self.containers.write().await.clear();
        self.context.clear().await;
        info!("asset manager cleared");
    }

    fn try_begin_export(&self) -> Option<BusyGuard<'_>> {
        self.exporting
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| BusyGuard(&self.exporting))
    }

    /// Load files one after another. Failures are collected per file.
    #[instrument(skip_all, fields(files = files.len()))]
    pub async fn load_files(
        &self,
        files: Vec<SourceFile>,
        on_progress: Option<LoadProgressFn>,
    ) -> LoadReport {
        self.loading.fetch_add(1, Ordering::AcqRel);
        let _loading = LoadingGuard(&self.loading);

        let total = files.len();
        let mut report = LoadReport::default();
        for (index, file) in files.into_iter().enumerate() {
            if let Some(on_progress) = &on_progress {
                on_progress(LoadProgress {
                    name: file.name.clone(),
                    fraction: index as f32 / total as f32,
                    total_objects: report.infos.len(),
                });
            }

            let name = file.name.clone();
            match self.load_file(file).await {
                Ok(infos) => {
                    info!("{} objects loaded from {}", infos.len(), name);
                    if !infos.is_empty() {
                        report.success_count += 1;
                        report.infos.extend(infos);
                    }
                }
                Err(e) => {
                    error!("failed to load {}: {}", name, e);
                    report.errors.push(FileLoadError {
                        name,
                        error: e.to_string(),
                    });
                }
            }
        }

        if let Some(on_progress) = &on_progress {
            on_progress(LoadProgress {
                name: String::new(),
                fraction: 1.0,
                total_objects: report.infos.len(),
            });
        }
        report
    }

    async fn load_file(&self, file: SourceFile) -> Result<Vec<ObjectSummary>> {
        let SourceFile { name, data } = file;
        let (id, data) = tokio::task::spawn_blocking(move || {
            let hash = blake3::hash(&data).to_hex().to_string();
            (ContainerId::new(hash), data)
        })
        .await?;

        let existing = self.containers.read().await.get(&id).cloned();
        let container = match existing {
            Some(container) if container.file_name == name => container,
            Some(container) => {
                debug!("{} already loaded as container {}", name, id);
                // source-file grouping follows the name of the latest load
                let renamed = Arc::new(Container {
                    file_name: name.clone(),
                    objects: container.objects.clone(),
                });
                self.containers
                    .write()
                    .await
                    .insert(id.clone(), Arc::clone(&renamed));
                renamed
            }
            None => {
                let decoder = Arc::clone(&self.decoder);
                let options = self.config.decode_options.clone();
                let decoded = tokio::task::spawn_blocking(move || decoder.decode(data, &options))
                    .await?
                    .map_err(|e| match e {
                        ExportError::Load { .. } => e,
                        other => ExportError::load(name.clone(), other.to_string()),
                    })?;

                let objects = decoded
                    .objects
                    .into_iter()
                    .map(|object| (object.path_id(), object))
                    .collect();
                let container = Arc::new(Container {
                    file_name: name.clone(),
                    objects,
                });
                // a concurrent load of the same bytes may have won the race
                let mut containers = self.containers.write().await;
                Arc::clone(containers.entry(id.clone()).or_insert(container))
            }
        };

        Ok(container
            .objects
            .values()
            .filter(|object| object.kind() != AssetKind::AssetBundle)
            .map(|object| {
                summarize(ObjectId::new(id.clone(), object.path_id()), &name, object)
            })
            .collect())
    }

    async fn lookup(&self, id: &ObjectId) -> Option<(Arc<Container>, Arc<dyn AssetObject>)> {
        let containers = self.containers.read().await;
        let container = containers.get(&id.container)?;
        let object = container.objects.get(&id.path_id)?;
        Some((Arc::clone(container), Arc::clone(object)))
    }

    async fn adapter(&self, id: &ObjectId) -> Option<Adapter> {
        let (_, object) = self.lookup(id).await?;
        Some(Adapter::for_object(id.clone(), object))
    }

    /// Preview descriptor of one object
    pub async fn preview_info(&self, id: &ObjectId) -> Option<PreviewInfo> {
        Some(self.adapter(id).await?.preview_info())
    }

    /// Preview payload of one object. Failures are logged and read as `None`.
    #[instrument(skip_all, fields(object = %id))]
    pub async fn get_preview_data(
        &self,
        id: &ObjectId,
        sub_key: Option<&str>,
    ) -> Option<PreviewData> {
        let adapter = self.adapter(id).await?;
        match adapter.preview_data(&self.context, sub_key).await {
            Ok(data) => data,
            Err(e) => {
                warn!("preview of {} failed: {}", id, e);
                None
            }
        }
    }

    /// Export one object. Returns `None` while another export runs.
    #[instrument(skip_all, fields(object = %id))]
    pub async fn export_asset(
        &self,
        destination: Arc<dyn ExportDestination>,
        id: &ObjectId,
    ) -> Option<ExportStats> {
        let Some(_busy) = self.try_begin_export() else {
            warn!("export already running, request ignored");
            return None;
        };

        let counters = Arc::new(ExportCounters::with_failure_details());
        let Some(adapter) = self.adapter(id).await else {
            return Some(counters.snapshot());
        };
        if !adapter.can_export() {
            return Some(counters.snapshot());
        }

        let items = match adapter.export(&self.context).await {
            Ok(Some(items)) if !items.is_empty() => items,
            Ok(_) => return Some(counters.snapshot()),
            Err(e) => {
                counters.record_failure(&id.to_string(), &e);
                return Some(counters.snapshot());
            }
        };

        let pool = self.writer_pool(destination, Arc::clone(&counters), None);
        pool.add_tasks(RenameProcessor::new().process(items, None));
        if let Err(e) = pool.end().await {
            error!("export writers did not finish: {}", e);
        }
        Some(counters.snapshot())
    }

    /// Export many objects into `destination`, grouped by `group`.
    ///
    /// Progress is reported per written item against a total that grows as
    /// objects expand into several items and shrinks when they yield none.
    /// Returns `None` while another export runs.
    #[instrument(skip(self, destination, ids, on_progress), fields(objects = ids.len()))]
    pub async fn export_assets(
        &self,
        destination: Arc<dyn ExportDestination>,
        ids: &[ObjectId],
        group: GroupMethod,
        on_progress: Option<ExportProgressFn>,
    ) -> Option<ExportStats> {
        let Some(_busy) = self.try_begin_export() else {
            warn!("export already running, request ignored");
            return None;
        };

        let counters = Arc::new(ExportCounters::new());
        let tracker = Arc::new(ProgressTracker::new(
            ids.len(),
            self.config.progress_interval,
            on_progress.clone(),
        ));
        let pool = self.writer_pool(
            destination,
            Arc::clone(&counters),
            Some(Arc::clone(&tracker)),
        );
        let mut renamer = RenameProcessor::new();

        let mut expanded = stream::iter(ids)
            .map(|id| self.expand(id, group))
            .buffered(self.config.export_concurrency.max(1));
        while let Some(expansion) = expanded.next().await {
            match expansion {
                Ok(Some((items, prefix))) => {
                    tracker.grow(items.len() - 1);
                    pool.add_tasks(renamer.process(items, prefix.as_deref()));
                }
                Ok(None) => tracker.shrink(),
                Err((id, e)) => {
                    tracker.shrink();
                    counters.record_failure(&id.to_string(), &e);
                }
            }
        }

        if let Err(e) = pool.end().await {
            error!("export writers did not finish: {}", e);
        }
        tracker.finish();
        Some(counters.snapshot())
    }

    /// Export many objects into one zip archive.
    ///
    /// Progress runs from 0 to 0.5 while objects are expanded and from 0.5
    /// to 1 while the archive is written. `Ok(None)` while another export runs.
    #[instrument(skip(self, ids, on_progress), fields(objects = ids.len()))]
    pub async fn export_assets_to_archive(
        &self,
        ids: &[ObjectId],
        group: GroupMethod,
        on_progress: Option<ExportProgressFn>,
    ) -> Result<Option<ArchiveExport>> {
        let Some(_busy) = self.try_begin_export() else {
            warn!("export already running, request ignored");
            return Ok(None);
        };

        let counters = ExportCounters::new();
        let throttle = ProgressThrottle::new(self.config.progress_interval);
        let mut archive = ArchiveAssembler::new(self.config.archive)
            .with_progress_interval(self.config.progress_interval);

        let total = ids.len();
        let mut expanded = stream::iter(ids)
            .map(|id| self.expand(id, group))
            .buffered(self.config.export_concurrency.max(1))
            .enumerate();
        while let Some((index, expansion)) = expanded.next().await {
            match expansion {
                Ok(Some((items, prefix))) => {
                    for item in items {
                        let name = join_prefix(prefix.as_deref(), item.name);
                        let entry = match archive.add(ExportItem::new(name.clone(), item.data)) {
                            Ok(entry) => entry,
                            Err(e) => {
                                counters.record_failure(&name, &e);
                                continue;
                            }
                        };
                        counters.record_success();
                        if let Some(on_progress) = &on_progress {
                            if throttle.ready() {
                                on_progress(ExportProgress {
                                    name: entry,
                                    fraction: ExportProgress::ratio(index + 1, total) * 0.5,
                                });
                            }
                        }
                    }
                }
                Ok(None) => {}
                Err((id, e)) => counters.record_failure(&id.to_string(), &e),
            }
        }

        let entries: Vec<String> = archive.names().map(str::to_string).collect();
        let archive_progress: Option<ArchiveProgressFn> = on_progress.map(|on_progress| {
            Arc::new(move |p: ArchiveProgress| {
                on_progress(ExportProgress {
                    name: p.current_file.unwrap_or_default(),
                    fraction: 0.5 + p.percent / 200.0,
                })
            }) as ArchiveProgressFn
        });
        let data = archive.generate(archive_progress).await?;

        Ok(Some(ArchiveExport {
            data,
            entries,
            stats: counters.snapshot(),
        }))
    }

    /// Export items and group prefix of one object; `Ok(None)` when it
    /// contributes nothing
    async fn expand(&self, id: &ObjectId, group: GroupMethod) -> Expansion {
        let Some((container, object)) = self.lookup(id).await else {
            debug!("object {} is not loaded", id);
            return Ok(None);
        };
        let prefix = group_prefix(group, &container, object.as_ref());
        let adapter = Adapter::for_object(id.clone(), object);
        if !adapter.can_export() {
            return Ok(None);
        }

        match adapter.export(&self.context).await {
            Ok(Some(items)) if !items.is_empty() => Ok(Some((items, prefix))),
            Ok(_) => Ok(None),
            Err(e) => Err((id.clone(), e)),
        }
    }

    fn writer_pool(
        &self,
        destination: Arc<dyn ExportDestination>,
        counters: Arc<ExportCounters>,
        tracker: Option<Arc<ProgressTracker>>,
    ) -> BoundedTaskPool<ExportItem> {
        let on_error = Arc::clone(&counters);
        BoundedTaskPool::with_error_handler(
            self.config.export_concurrency,
            move |item: ExportItem, _| {
                let destination = Arc::clone(&destination);
                let counters = Arc::clone(&counters);
                let tracker = tracker.clone();
                async move {
                    if let Some(tracker) = &tracker {
                        tracker.item_started(&item.name);
                    }
                    destination.write_new(&item.name, item.data).await?;
                    counters.record_success();
                    Ok(())
                }
            },
            move |err, item, _| on_error.record_failure(&item.name, &err),
        )
    }
}

/// Running totals behind batch export progress
struct ProgressTracker {
    total: AtomicUsize,
    finished: AtomicUsize,
    throttle: ProgressThrottle,
    on_progress: Option<ExportProgressFn>,
}

impl ProgressTracker {
    fn new(total: usize, interval: Duration, on_progress: Option<ExportProgressFn>) -> Self {
        Self {
            total: AtomicUsize::new(total),
            finished: AtomicUsize::new(0),
            throttle: ProgressThrottle::new(interval),
            on_progress,
        }
    }

    fn grow(&self, extra: usize) {
        self.total.fetch_add(extra, Ordering::AcqRel);
    }

    fn shrink(&self) {
        let _ = self
            .total
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |t| t.checked_sub(1));
    }

    fn item_started(&self, name: &str) {
        let finished = self.finished.fetch_add(1, Ordering::AcqRel) + 1;
        let Some(on_progress) = &self.on_progress else {
            return;
        };
        if self.throttle.ready() {
            on_progress(ExportProgress {
                name: name.to_string(),
                fraction: ExportProgress::ratio(finished, self.total.load(Ordering::Acquire)),
            });
        }
    }

    /// Always emitted, regardless of throttling
    fn finish(&self) {
        if let Some(on_progress) = &self.on_progress {
            on_progress(ExportProgress {
                name: String::new(),
                fraction: 1.0,
            });
        }
    }
}

fn group_prefix(
    group: GroupMethod,
    container: &Container,
    object: &dyn AssetObject,
) -> Option<String> {
    let prefix = match group {
        GroupMethod::Flat => return None,
        GroupMethod::ContainerPath => object.container_path()?.to_string(),
        GroupMethod::TypeName => object.kind().type_name().to_string(),
        GroupMethod::SourceFile => container.file_name.clone(),
    };
    (!prefix.is_empty()).then_some(prefix)
}

fn summarize(id: ObjectId, file_name: &str, object: &Arc<dyn AssetObject>) -> ObjectSummary {
    let adapter = Adapter::for_object(id.clone(), Arc::clone(object));
    let name = object.name().to_string();
    ObjectSummary {
        key: id.key(),
        file_name: file_name.to_string(),
        search: name.to_lowercase(),
        container: object.container_path().unwrap_or_default().to_string(),
        type_name: object.kind().type_name().to_string(),
        path_id: object.path_id(),
        size: object.size(),
        preview: adapter.preview_info(),
        can_export: adapter.can_export(),
        name,
        id,
    }
}
