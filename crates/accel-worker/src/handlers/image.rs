//! Still image handler.

use async_trait::async_trait;

use accel_media::{decode_image, encode_jpeg, encode_thumbnail, AccelConfig};
use accel_models::{JobStage, Progress, Timing};

use super::{HandlerOutput, JobContext, JobHandler};
use crate::engine::Engine;
use crate::error::WorkerResult;

/// One frame in, one JPEG out.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageHandler;

#[async_trait]
impl JobHandler for ImageHandler {
    fn name(&self) -> &'static str {
        "image"
    }

    async fn handle(&self, ctx: &JobContext<'_>, engine: &mut Engine) -> WorkerResult<HandlerOutput> {
        let operation = ctx.job.operation;

        if engine.ensure_profile(operation).await? {
            ctx.logger.log_progress(&format!("profile {} loaded", operation));
        }
        ctx.publish(JobStage::KernelLoaded, None).await?;

        let bytes = ctx.store.read_input(ctx.handle, &ctx.job.input).await?;
        let frame = decode_image(&bytes)?;
        ctx.publish(JobStage::Processing, Some(Progress::new(0, 1))).await?;

        let config = AccelConfig::for_frame(operation, &frame, &ctx.job.params);
        let out = engine.accelerate(&frame, &config).await?;

        let jpeg = encode_jpeg(&out.frame)?;
        ctx.store
            .store_output(ctx.handle, ctx.job.category.output_file_name(), &jpeg)
            .await?;

        match encode_thumbnail(&out.frame) {
            Ok(thumb) => ctx.store.store_thumbnail(ctx.handle, &thumb).await?,
            Err(e) => ctx.logger.log_warning(&format!("thumbnail skipped: {}", e)),
        }

        ctx.logger.log_progress(&format!(
            "{}x{} frame accelerated in {:.2} ms",
            frame.width(),
            frame.height(),
            out.elapsed_ms
        ));

        Ok(HandlerOutput {
            timing: Timing::single(out.elapsed_ms),
            progress: Progress::new(1, 1),
        })
    }
}
