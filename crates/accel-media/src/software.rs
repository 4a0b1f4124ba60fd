//! Pure-Rust accelerator.
//!
//! Computes the same transforms as the hardware kernels: BT.601 luma
//! replicated to all three channels, and a 3×3 integer convolution per channel
//! with symmetric edge handling, divided by the factor and clamped to a byte.

use std::time::Instant;

use async_trait::async_trait;
use tracing::debug;

use accel_models::{Kernel, Operation};

use crate::accelerator::{AccelConfig, Accelerated, Accelerator};
use crate::error::{MediaError, MediaResult};
use crate::frame::Frame;

/// Software implementation of [`Accelerator`].
#[derive(Debug, Default)]
pub struct SoftwareAccelerator {
    active: Option<Operation>,
    profile_loads: u64,
}

impl SoftwareAccelerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Software accelerator with `operation` already active.
    pub fn with_profile(operation: Operation) -> Self {
        Self {
            active: Some(operation),
            profile_loads: 0,
        }
    }

    /// Number of profile loads so far.
    pub fn profile_loads(&self) -> u64 {
        self.profile_loads
    }
}

#[async_trait]
impl Accelerator for SoftwareAccelerator {
    fn name(&self) -> &'static str {
        "software"
    }

    async fn load_profile(&mut self, operation: Operation) -> MediaResult<()> {
        self.active = Some(operation);
        self.profile_loads += 1;
        debug!("Software profile active: {}", operation);
        Ok(())
    }

    async fn accelerate(&mut self, frame: &Frame, config: &AccelConfig) -> MediaResult<Accelerated> {
        if self.active != Some(config.operation) {
            return Err(MediaError::ProfileNotLoaded {
                expected: config.operation.to_string(),
            });
        }
        if frame.width() != config.width || frame.height() != config.height {
            return Err(MediaError::invalid_frame(format!(
                "configured for {}x{}, got {}x{}",
                config.width,
                config.height,
                frame.width(),
                frame.height()
            )));
        }

        let started = Instant::now();
        let frame = apply(frame, config)?;
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

        Ok(Accelerated { frame, elapsed_ms })
    }
}

/// Run the configured operation on `frame`.
pub fn apply(frame: &Frame, config: &AccelConfig) -> MediaResult<Frame> {
    match config.operation {
        Operation::Grayscale => Ok(grayscale(frame)),
        Operation::Filter => {
            let kernel = config
                .kernel
                .ok_or_else(|| MediaError::accelerator("filter requires a kernel"))?;
            if config.factor == 0 {
                return Err(MediaError::accelerator("factor must be positive"));
            }
            Ok(convolve(frame, &kernel, config.factor))
        }
    }
}

/// BT.601 luma, written to all three channels.
pub fn grayscale(frame: &Frame) -> Frame {
    let mut out = frame.clone();
    for px in out.data_mut().chunks_exact_mut(Frame::CHANNELS) {
        let luma = (299 * px[0] as u32 + 587 * px[1] as u32 + 114 * px[2] as u32 + 500) / 1000;
        let luma = luma.min(255) as u8;
        px.fill(luma);
    }
    out
}

/// 3×3 convolution per channel with symmetric boundary, divided by `factor`.
pub fn convolve(frame: &Frame, kernel: &Kernel, factor: u32) -> Frame {
    let w = frame.width() as i64;
    let h = frame.height() as i64;
    let src = frame.data();
    let factor = factor.max(1) as i64;
    let mut out = frame.clone();
    let dst = out.data_mut();

    for y in 0..h {
        for x in 0..w {
            for c in 0..Frame::CHANNELS {
                let mut acc: i64 = 0;
                for ky in 0..3i64 {
                    for kx in 0..3i64 {
                        // true convolution: the kernel is flipped
                        let sy = reflect(y + 1 - ky, h);
                        let sx = reflect(x + 1 - kx, w);
                        let v = src[((sy * w + sx) as usize) * Frame::CHANNELS + c] as i64;
                        acc += kernel.at(ky as usize, kx as usize) as i64 * v;
                    }
                }
                dst[((y * w + x) as usize) * Frame::CHANNELS + c] = (acc / factor).clamp(0, 255) as u8;
            }
        }
    }
    out
}

/// Mirror an out-of-range index back inside `0..n`, repeating the edge.
fn reflect(i: i64, n: i64) -> i64 {
    if i < 0 {
        (-i - 1).min(n - 1)
    } else if i >= n {
        (2 * n - i - 1).max(0)
    } else {
        i
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use accel_models::JobParams;

    fn gradient(width: u32, height: u32) -> Frame {
        let mut data = Vec::new();
        for y in 0..height {
            for x in 0..width {
                data.extend_from_slice(&[(10 * y + x) as u8, 100, 200]);
            }
        }
        Frame::new(width, height, data).unwrap()
    }

    #[test]
    fn test_identity_filter_round_trip() {
        let frame = gradient(5, 4);
        assert_eq!(convolve(&frame, &Kernel::IDENTITY, 1), frame);
    }

    #[test]
    fn test_kernel_is_flipped() {
        let frame = gradient(3, 3);
        let kernel = Kernel([1, 0, 0, 0, 0, 0, 0, 0, 0]);
        let out = convolve(&frame, &kernel, 1);
        assert_eq!(out.pixel(0, 0)[0], 11);
        // bottom-right samples past the edge, mirrored back onto it
        assert_eq!(out.pixel(2, 2)[0], 22);
    }

    #[test]
    fn test_box_blur_keeps_uniform_frame() {
        let frame = Frame::filled(4, 4, [90, 45, 9]);
        let out = convolve(&frame, &Kernel([1; 9]), 9);
        assert_eq!(out, frame);
    }

    #[test]
    fn test_results_are_clamped() {
        let frame = Frame::filled(2, 2, [200, 10, 0]);
        let bright = convolve(&frame, &Kernel([0, 0, 0, 0, 4, 0, 0, 0, 0]), 1);
        assert_eq!(bright.pixel(0, 0), [255, 40, 0]);

        let dark = convolve(&frame, &Kernel([0, 0, 0, 0, -1, 0, 0, 0, 0]), 1);
        assert_eq!(dark.pixel(1, 1), [0, 0, 0]);
    }

    #[test]
    fn test_grayscale() {
        let frame = Frame::new(3, 1, vec![255, 255, 255, 255, 0, 0, 0, 0, 0]).unwrap();
        let out = grayscale(&frame);
        assert_eq!(out.pixel(0, 0), [255, 255, 255]);
        assert_eq!(out.pixel(1, 0), [76, 76, 76]);
        assert_eq!(out.pixel(2, 0), [0, 0, 0]);
    }

    #[test]
    fn test_reflect() {
        assert_eq!(reflect(-1, 5), 0);
        assert_eq!(reflect(5, 5), 4);
        assert_eq!(reflect(2, 5), 2);
        assert_eq!(reflect(-1, 1), 0);
        assert_eq!(reflect(1, 1), 0);
    }

    #[tokio::test]
    async fn test_accelerate_requires_loaded_profile() {
        let frame = gradient(2, 2);
        let params = JobParams::grayscale();
        let config = AccelConfig::for_frame(Operation::Grayscale, &frame, &params);

        let mut accel = SoftwareAccelerator::new();
        assert!(matches!(
            accel.accelerate(&frame, &config).await,
            Err(MediaError::ProfileNotLoaded { .. })
        ));

        accel.load_profile(Operation::Grayscale).await.unwrap();
        let out = accel.accelerate(&frame, &config).await.unwrap();
        assert_eq!(out.frame, grayscale(&frame));
        assert!(out.elapsed_ms >= 0.0);
        assert_eq!(accel.profile_loads(), 1);
    }

    #[tokio::test]
    async fn test_accelerate_rejects_mismatched_dimensions() {
        let frame = gradient(2, 2);
        let mut config = AccelConfig::for_frame(Operation::Grayscale, &frame, &JobParams::grayscale());
        config.width = 3;

        let mut accel = SoftwareAccelerator::with_profile(Operation::Grayscale);
        assert!(accel.accelerate(&frame, &config).await.is_err());
    }
}
