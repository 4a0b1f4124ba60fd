//! Accelerator interface.
//!
//! An accelerator transforms one RGB24 frame under a small integer
//! configuration and reports how long the device spent on it. Implementations
//! are driven from a single owner: the worker loop holds the only instance, so
//! methods take `&mut self` and no locking is involved.

use async_trait::async_trait;

use accel_models::{JobParams, Kernel, Operation};

use crate::error::MediaResult;
use crate::frame::Frame;

/// Per-frame accelerator configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccelConfig {
    pub operation: Operation,
    pub width: u32,
    pub height: u32,
    /// Divisor applied after convolution
    pub factor: u32,
    pub kernel: Option<Kernel>,
}

impl AccelConfig {
    /// Configuration for `frame` under the given operation parameters.
    pub fn for_frame(operation: Operation, frame: &Frame, params: &JobParams) -> Self {
        Self {
            operation,
            width: frame.width(),
            height: frame.height(),
            factor: params.factor.max(1),
            kernel: params.kernel,
        }
    }
}

/// Output of one accelerator invocation.
#[derive(Debug, Clone)]
pub struct Accelerated {
    pub frame: Frame,
    /// Time spent on the device, in milliseconds
    pub elapsed_ms: f64,
}

#[async_trait]
pub trait Accelerator: Send {
    /// Name of this backend for logging.
    fn name(&self) -> &'static str;

    /// Activate the profile (bitstream, shader, ...) for `operation`.
    ///
    /// Expensive. Callers cache the active operation and only call this on
    /// change.
    async fn load_profile(&mut self, operation: Operation) -> MediaResult<()>;

    /// Transform one frame with the active profile.
    async fn accelerate(&mut self, frame: &Frame, config: &AccelConfig) -> MediaResult<Accelerated>;
}
