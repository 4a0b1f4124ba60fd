//! Software reference rendering for `compare=true` submissions.

use accel_media::{decode_image, encode_jpeg, AccelConfig, Accelerator, SoftwareAccelerator};
use accel_models::Submission;

use crate::error::ApiResult;

/// Software rendering of an image submission.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceResult {
    pub jpeg: Vec<u8>,
    pub elapsed_ms: f64,
}

/// Render `submission` with the software accelerator.
pub async fn render_reference(submission: &Submission) -> ApiResult<ReferenceResult> {
    let frame = decode_image(&submission.payload)?;
    let config = AccelConfig::for_frame(submission.operation, &frame, &submission.params);

    let mut accelerator = SoftwareAccelerator::with_profile(submission.operation);
    let out = accelerator.accelerate(&frame, &config).await?;

    Ok(ReferenceResult {
        jpeg: encode_jpeg(&out.frame)?,
        elapsed_ms: out.elapsed_ms,
    })
}
