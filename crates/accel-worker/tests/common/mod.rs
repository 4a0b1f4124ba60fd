//! Hermetic doubles shared by the worker integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

use accel_media::{
    downscale_dimensions, encode_jpeg, AccelConfig, Accelerated, Accelerator, Frame, FrameReader, FrameWriter,
    MediaResult, SoftwareAccelerator, VideoCodec,
};
use accel_models::{Category, JobParams, Kernel, Operation, PARAM_FACTOR, PARAM_KERNEL, PARAM_OPERATION};
use accel_queue::RetentionConfig;
use accel_storage::{JobHandle, JobStore, StoreConfig};
use accel_worker::{HandlerRegistry, JobExecutor, WorkerConfig};

/// Calls observed by a [`CountingAccelerator`].
#[derive(Debug, Clone, Default)]
pub struct Counters {
    pub loads: Arc<AtomicU64>,
    pub frames: Arc<AtomicU64>,
}

impl Counters {
    pub fn loads(&self) -> u64 {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::SeqCst)
    }
}

/// Software accelerator that counts profile loads and frames.
pub struct CountingAccelerator {
    inner: SoftwareAccelerator,
    counters: Counters,
}

impl CountingAccelerator {
    pub fn new(counters: Counters) -> Self {
        Self {
            inner: SoftwareAccelerator::new(),
            counters,
        }
    }
}

#[async_trait]
impl Accelerator for CountingAccelerator {
    fn name(&self) -> &'static str {
        "counting"
    }

    async fn load_profile(&mut self, operation: Operation) -> MediaResult<()> {
        self.counters.loads.fetch_add(1, Ordering::SeqCst);
        self.inner.load_profile(operation).await
    }

    async fn accelerate(&mut self, frame: &Frame, config: &AccelConfig) -> MediaResult<Accelerated> {
        self.counters.frames.fetch_add(1, Ordering::SeqCst);
        self.inner.accelerate(frame, config).await
    }
}

/// In-memory codec: decodes `frames` uniform frames and writes raw RGB24.
#[derive(Debug, Clone)]
pub struct FakeCodec {
    pub frames: u64,
    pub width: u32,
    pub height: u32,
    pub color: [u8; 3],
    pub hint: Option<u64>,
}

impl FakeCodec {
    pub fn new(frames: u64, width: u32, height: u32) -> Self {
        Self {
            frames,
            width,
            height,
            color: [200, 100, 50],
            hint: Some(frames),
        }
    }
}

struct FakeReader {
    remaining: u64,
    width: u32,
    height: u32,
    color: [u8; 3],
    hint: Option<u64>,
}

#[async_trait]
impl FrameReader for FakeReader {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn fps(&self) -> f64 {
        25.0
    }

    fn frame_count_hint(&self) -> Option<u64> {
        self.hint
    }

    async fn next_frame(&mut self) -> MediaResult<Option<Frame>> {
        if self.remaining == 0 {
            return Ok(None);
        }
        self.remaining -= 1;
        Ok(Some(Frame::filled(self.width, self.height, self.color)))
    }

    async fn finish(self: Box<Self>) -> MediaResult<()> {
        Ok(())
    }
}

struct FakeWriter {
    path: PathBuf,
    data: Vec<u8>,
}

#[async_trait]
impl FrameWriter for FakeWriter {
    async fn write_frame(&mut self, frame: &Frame) -> MediaResult<()> {
        self.data.extend_from_slice(frame.data());
        Ok(())
    }

    async fn finish(self: Box<Self>) -> MediaResult<()> {
        tokio::fs::write(&self.path, &self.data).await?;
        Ok(())
    }
}

#[async_trait]
impl VideoCodec for FakeCodec {
    async fn open_reader(&self, input: &Path, max_width: u32, max_height: u32) -> MediaResult<Box<dyn FrameReader>> {
        tokio::fs::metadata(input).await?;
        let (width, height) = downscale_dimensions(self.width, self.height, max_width, max_height)?;
        Ok(Box::new(FakeReader {
            remaining: self.frames,
            width,
            height,
            color: self.color,
            hint: self.hint,
        }))
    }

    async fn open_writer(&self, output: &Path, _width: u32, _height: u32, _fps: f64) -> MediaResult<Box<dyn FrameWriter>> {
        Ok(Box::new(FakeWriter {
            path: output.to_path_buf(),
            data: Vec::new(),
        }))
    }

    async fn merge_audio(&self, video: &Path, _audio_source: &Path, output: &Path) -> MediaResult<()> {
        tokio::fs::copy(video, output).await?;
        Ok(())
    }
}

pub fn test_config() -> WorkerConfig {
    WorkerConfig {
        poll_interval: Duration::from_millis(10),
        progress_every: 5,
        video_max_width: 64,
        video_max_height: 36,
        retention: RetentionConfig {
            image_limit: 100,
            video_limit: 100,
        },
        ..WorkerConfig::default()
    }
}

pub struct Harness {
    pub dir: TempDir,
    pub store: JobStore,
    pub counters: Counters,
    pub executor: JobExecutor,
}

impl Harness {
    pub async fn new(config: WorkerConfig, codec: FakeCodec) -> Self {
        Self::with_handlers(config, HandlerRegistry::standard(Arc::new(codec))).await
    }

    pub async fn with_handlers(config: WorkerConfig, handlers: HandlerRegistry) -> Self {
        let dir = TempDir::new().unwrap();
        let store = JobStore::new(StoreConfig::new(dir.path()));
        store.init().await.unwrap();

        let counters = Counters::default();
        let accelerator = Box::new(CountingAccelerator::new(counters.clone()));
        let executor = JobExecutor::new(config, store.clone(), accelerator, handlers);

        Self {
            dir,
            store,
            counters,
            executor,
        }
    }

    /// Run queued jobs until none is pending.
    pub async fn drain(&self) -> usize {
        let mut processed = 0;
        while self.executor.run_once().await.unwrap() {
            processed += 1;
        }
        processed
    }
}

pub fn jpeg(color: [u8; 3]) -> Vec<u8> {
    encode_jpeg(&Frame::filled(16, 16, color)).unwrap()
}

/// Write a job the way the admission path does.
pub async fn submit(
    store: &JobStore,
    category: Category,
    operation: Operation,
    params: &JobParams,
    input: &[u8],
) -> JobHandle {
    let staged = store.create(category).await.unwrap();
    let input_name = match category {
        Category::Image => "in.jpg",
        Category::Video => "in.mp4",
    };
    store.store_input(&staged, input_name, input).await.unwrap();
    store
        .set_parameter(&staged, PARAM_OPERATION, operation.as_str())
        .await
        .unwrap();
    if operation == Operation::Filter {
        let kernel = params.kernel.unwrap_or(Kernel::IDENTITY);
        store
            .set_parameter(&staged, PARAM_KERNEL, &kernel.to_param_string())
            .await
            .unwrap();
        store
            .set_parameter(&staged, PARAM_FACTOR, &params.factor.to_string())
            .await
            .unwrap();
    }
    let handle = store.commit(staged).await.unwrap();
    // creation timestamps must differ for a stable FIFO order
    tokio::time::sleep(Duration::from_millis(3)).await;
    handle
}

pub async fn submit_gray_image(store: &JobStore) -> JobHandle {
    submit(store, Category::Image, Operation::Grayscale, &JobParams::grayscale(), &jpeg([255, 0, 0])).await
}
