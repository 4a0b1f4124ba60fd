//! Media plumbing for the accelerator worker.
//!
//! This crate provides:
//! - RGB24 frames and the accelerator interface
//! - A pure-Rust software accelerator used as reference and fallback
//! - JPEG/PNG still codec via the `image` crate
//! - Frame-level video decode/encode and audio merge via the FFmpeg CLI

pub mod accelerator;
pub mod command;
pub mod error;
pub mod frame;
pub mod probe;
pub mod software;
pub mod still;
pub mod video;

pub use accelerator::{AccelConfig, Accelerated, Accelerator};
pub use command::FfmpegCommand;
pub use error::{MediaError, MediaResult};
pub use frame::Frame;
pub use probe::{probe_video, VideoInfo};
pub use software::SoftwareAccelerator;
pub use still::{decode_image, encode_jpeg, encode_thumbnail};
pub use video::{downscale_dimensions, FfmpegCodec, FrameReader, FrameWriter, VideoCodec};
