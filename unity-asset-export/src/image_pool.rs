//! Image conversion pool
//!
//! CPU-bound RGBA to PNG encoding runs on a fixed set of converter threads
//! backed by tokio's blocking pool. All threads share one task stack; each
//! submitted task carries its own reply channel, so results are correlated
//! by construction rather than by looking up task ids.

use bytes::Bytes;
use futures::stream::{FuturesUnordered, StreamExt};
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{ExtendedColorType, ImageEncoder};
use once_cell::sync::OnceCell;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;
use tracing::{debug, warn};
use unity_asset_export_core::{
    default_converter_threads, Bitmap, ExportError, PngCompression, PngOptions, Result,
};

/// Image submitted with an identifier chosen by the caller
#[derive(Debug)]
pub struct ConversionInput {
    pub key: String,
    pub bitmap: Bitmap,
}

impl ConversionInput {
    pub fn new<S: Into<String>>(key: S, bitmap: Bitmap) -> Self {
        Self {
            key: key.into(),
            bitmap,
        }
    }
}

/// One successfully encoded image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertedImage {
    pub key: String,
    pub data: Bytes,
}

/// Outcome of a batch submission
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConversionSummary {
    pub converted: usize,
    pub failed: usize,
}

struct ConversionTask {
    id: u64,
    bitmap: Bitmap,
    reply: oneshot::Sender<Result<Bytes>>,
}

/// Per-thread PNG encoder settings, created on first use
#[derive(Debug)]
struct PngContext {
    compression: CompressionType,
    filter: FilterType,
}

impl PngContext {
    fn new(options: PngOptions) -> Self {
        let (compression, filter) = match options.compression {
            PngCompression::Fast => (CompressionType::Fast, FilterType::NoFilter),
            PngCompression::Balanced => (CompressionType::Default, FilterType::Adaptive),
            PngCompression::Best => (CompressionType::Best, FilterType::Adaptive),
        };
        Self {
            compression,
            filter,
        }
    }

    fn encode(&self, bitmap: Bitmap) -> Result<Bytes> {
        let (width, height) = (bitmap.width(), bitmap.height());
        let raw = bitmap.into_raw();
        let mut out = Vec::with_capacity(raw.len() / 2);
        PngEncoder::new_with_quality(&mut out, self.compression, self.filter).write_image(
            &raw,
            width,
            height,
            ExtendedColorType::Rgba8,
        )?;
        Ok(Bytes::from(out))
    }
}

type TaskStack = Arc<Mutex<Vec<ConversionTask>>>;

fn pop_task(stack: &TaskStack) -> Option<ConversionTask> {
    stack.lock().ok()?.pop()
}

fn stack_is_empty(stack: &TaskStack) -> bool {
    stack.lock().map(|s| s.is_empty()).unwrap_or(true)
}

struct ConverterThread {
    index: usize,
    working: AtomicBool,
    context: OnceCell<PngContext>,
    options: PngOptions,
}

impl ConverterThread {
    /// Start draining the shared stack unless this thread already is
    fn run(self: &Arc<Self>, stack: &TaskStack) {
        if self.working.swap(true, Ordering::AcqRel) {
            return;
        }

        let thread = Arc::clone(self);
        let stack = Arc::clone(stack);
        tokio::task::spawn_blocking(move || loop {
            match pop_task(&stack) {
                Some(task) => thread.convert(task),
                None => {
                    thread.working.store(false, Ordering::Release);
                    // A task pushed between the pop and the store found this
                    // thread still working; reclaim it unless another run did.
                    if stack_is_empty(&stack) || thread.working.swap(true, Ordering::AcqRel) {
                        break;
                    }
                }
            }
        });
    }

    fn convert(&self, task: ConversionTask) {
        let context = self.context.get_or_init(|| {
            debug!("creating PNG encoder context on converter {}", self.index);
            PngContext::new(self.options)
        });
        let result = context.encode(task.bitmap);
        if let Err(e) = &result {
            warn!("conversion task {} failed: {}", task.id, e);
        }
        // The submitter may have stopped waiting
        let _ = task.reply.send(result);
    }
}

/// Fixed-size pool converting RGBA bitmaps to PNG.
///
/// Pending tasks are kept on a stack: the most recently submitted batch is
/// served first. Within one batch, tasks start in submission order.
pub struct ImageConverterPool {
    threads: Vec<Arc<ConverterThread>>,
    stack: TaskStack,
    next_id: AtomicU64,
}

impl ImageConverterPool {
    pub fn new(threads: usize, options: PngOptions) -> Self {
        let threads = (0..threads.max(1))
            .map(|index| {
                Arc::new(ConverterThread {
                    index,
                    working: AtomicBool::new(false),
                    context: OnceCell::new(),
                    options,
                })
            })
            .collect();

        Self {
            threads,
            stack: Arc::new(Mutex::new(Vec::new())),
            next_id: AtomicU64::new(0),
        }
    }

    /// Pool sized to the available cores minus one
    pub fn with_default_threads(options: PngOptions) -> Self {
        Self::new(default_converter_threads(), options)
    }

    pub fn thread_count(&self) -> usize {
        self.threads.len()
    }

    /// Converter threads that have created their encoder context
    pub fn initialized_threads(&self) -> usize {
        self.threads
            .iter()
            .filter(|t| t.context.get().is_some())
            .count()
    }

    fn submit(&self, bitmaps: Vec<Bitmap>) -> Vec<oneshot::Receiver<Result<Bytes>>> {
        let receivers = self.enqueue(bitmaps);
        for thread in &self.threads {
            thread.run(&self.stack);
        }
        receivers
    }

    /// Push one batch onto the stack without waking converters
    fn enqueue(&self, bitmaps: Vec<Bitmap>) -> Vec<oneshot::Receiver<Result<Bytes>>> {
        let mut receivers = Vec::with_capacity(bitmaps.len());
        let mut tasks = Vec::with_capacity(bitmaps.len());
        for bitmap in bitmaps {
            let (reply, receiver) = oneshot::channel();
            tasks.push(ConversionTask {
                id: self.next_id.fetch_add(1, Ordering::Relaxed),
                bitmap,
                reply,
            });
            receivers.push(receiver);
        }

        if let Ok(mut stack) = self.stack.lock() {
            // reversed so the batch's first task is popped first
            stack.extend(tasks.into_iter().rev());
        }
        receivers
    }

    async fn receive(receiver: oneshot::Receiver<Result<Bytes>>) -> Result<Bytes> {
        receiver
            .await
            .map_err(|_| ExportError::TaskJoin("converter dropped the task".to_string()))?
    }

    /// Encode one bitmap. The bitmap is moved into the pool.
    pub async fn add_task(&self, bitmap: Bitmap) -> Result<Bytes> {
        let mut receivers = self.submit(vec![bitmap]);
        match receivers.pop() {
            Some(receiver) => Self::receive(receiver).await,
            None => Err(ExportError::TaskJoin("no conversion task".to_string())),
        }
    }

    /// Encode a batch, invoking `on_converted` for each success as it
    /// completes. Resolves once every task has settled; failures are counted
    /// and logged but do not stop the batch.
    pub async fn add_tasks<F>(
        &self,
        inputs: Vec<ConversionInput>,
        mut on_converted: F,
    ) -> ConversionSummary
    where
        F: FnMut(ConvertedImage),
    {
        let (keys, bitmaps): (Vec<String>, Vec<Bitmap>) =
            inputs.into_iter().map(|i| (i.key, i.bitmap)).unzip();
        let mut pending: FuturesUnordered<_> = keys
            .into_iter()
            .zip(self.submit(bitmaps))
            .map(|(key, receiver)| async move { (key, Self::receive(receiver).await) })
            .collect();

        let mut summary = ConversionSummary::default();
        while let Some((key, outcome)) = pending.next().await {
            match outcome {
                Ok(data) => {
                    summary.converted += 1;
                    on_converted(ConvertedImage { key, data });
                }
                Err(e) => {
                    warn!("failed to convert image {}: {}", key, e);
                    summary.failed += 1;
                }
            }
        }
        summary
    }
}

impl Default for ImageConverterPool {
    fn default() -> Self {
        Self::with_default_threads(PngOptions::default())
    }
}
