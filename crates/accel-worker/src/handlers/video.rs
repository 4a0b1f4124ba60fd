//! Video handler.
//!
//! Frames stream from the codec reader through the accelerator into the
//! codec writer one at a time, so memory stays bounded by a single frame.
//! The silent intermediate lives in the job's work area until the audio of
//! the original is merged back during `merging`.

use std::sync::Arc;

use async_trait::async_trait;

use accel_media::{encode_thumbnail, AccelConfig, FrameReader, FrameWriter, VideoCodec};
use accel_models::{JobStage, Progress, Timing};

use super::{HandlerOutput, JobContext, JobHandler};
use crate::engine::Engine;
use crate::error::{WorkerError, WorkerResult};

const SILENT_VIDEO: &str = "video.mp4";
const MERGED_VIDEO: &str = "merged.mp4";

pub struct VideoHandler {
    codec: Arc<dyn VideoCodec>,
}

impl VideoHandler {
    pub fn new(codec: Arc<dyn VideoCodec>) -> Self {
        Self { codec }
    }
}

#[async_trait]
impl JobHandler for VideoHandler {
    fn name(&self) -> &'static str {
        "video"
    }

    async fn handle(&self, ctx: &JobContext<'_>, engine: &mut Engine) -> WorkerResult<HandlerOutput> {
        let operation = ctx.job.operation;

        if engine.ensure_profile(operation).await? {
            ctx.logger.log_progress(&format!("profile {} loaded", operation));
        }
        ctx.publish(JobStage::KernelLoaded, None).await?;

        let input = ctx.handle.path(&ctx.job.input);
        let silent = ctx.store.work_path(ctx.handle, SILENT_VIDEO);

        let mut reader = self
            .codec
            .open_reader(&input, ctx.config.video_max_width, ctx.config.video_max_height)
            .await?;
        let mut writer = match self
            .codec
            .open_writer(&silent, reader.width(), reader.height(), reader.fps())
            .await
        {
            Ok(writer) => writer,
            Err(e) => {
                let _ = reader.finish().await;
                return Err(e.into());
            }
        };

        let frames = transform_frames(ctx, engine, reader.as_mut(), writer.as_mut()).await;
        let closed_reader = reader.finish().await;
        let closed_writer = writer.finish().await;
        let (timing, total) = frames?;
        closed_reader?;
        closed_writer?;

        ctx.publish(JobStage::Merging, Some(Progress::new(total, total))).await?;
        let merged = ctx.store.work_path(ctx.handle, MERGED_VIDEO);
        self.codec.merge_audio(&silent, &input, &merged).await?;
        ctx.store
            .store_output_file(ctx.handle, ctx.job.category.output_file_name(), &merged)
            .await?;
        ctx.store.clear_work(ctx.handle).await?;

        ctx.logger.log_progress(&format!("{} frames, {}", total, timing.display()));

        Ok(HandlerOutput {
            timing,
            progress: Progress::new(total, total),
        })
    }
}

/// Pump every frame through the accelerator. Returns the accumulated timing
/// and the final progress total.
async fn transform_frames(
    ctx: &JobContext<'_>,
    engine: &mut Engine,
    reader: &mut dyn FrameReader,
    writer: &mut dyn FrameWriter,
) -> WorkerResult<(Timing, u64)> {
    let every = ctx.config.progress_every.max(1);
    let hint = reader.frame_count_hint().unwrap_or(0);
    let mut timing = Timing {
        total_ms: 0.0,
        frames: 0,
    };

    ctx.publish(JobStage::Processing, Some(Progress::new(0, hint))).await?;

    while let Some(frame) = reader.next_frame().await? {
        let config = AccelConfig::for_frame(ctx.job.operation, &frame, &ctx.job.params);
        let out = engine.accelerate(&frame, &config).await?;

        if timing.frames == 0 {
            match encode_thumbnail(&out.frame) {
                Ok(thumb) => ctx.store.store_thumbnail(ctx.handle, &thumb).await?,
                Err(e) => ctx.logger.log_warning(&format!("thumbnail skipped: {}", e)),
            }
        }

        writer.write_frame(&out.frame).await?;
        timing.total_ms += out.elapsed_ms;
        timing.frames += 1;

        if timing.frames % every == 0 {
            // the container estimate can fall short of the real count
            let total = hint.max(timing.frames);
            ctx.publish(JobStage::Processing, Some(Progress::new(timing.frames, total)))
                .await?;
        }
    }

    if timing.frames == 0 {
        return Err(WorkerError::processing_failed("video contains no frames"));
    }

    let total = timing.frames;
    ctx.publish(JobStage::Processing, Some(Progress::new(total, total))).await?;
    Ok((timing, total))
}
