//! FFmpeg command builder and runner.

use std::path::Path;
use std::process::Stdio;

use tokio::process::{Child, Command};
use tracing::debug;

use crate::error::{MediaError, MediaResult};

/// Builder for FFmpeg commands with any number of inputs.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    /// Arguments before the first `-i` and between inputs
    args: Vec<String>,
    /// Output arguments (after the last input)
    output_args: Vec<String>,
    /// Output target (file path or `pipe:1`)
    output: String,
    /// Log level
    log_level: String,
}

impl FfmpegCommand {
    /// Create a new FFmpeg command writing to `output`.
    pub fn new(output: impl Into<String>) -> Self {
        Self {
            args: Vec::new(),
            output_args: Vec::new(),
            output: output.into(),
            log_level: "error".to_string(),
        }
    }

    /// Command writing to a file.
    pub fn to_file(output: impl AsRef<Path>) -> Self {
        Self::new(output.as_ref().to_string_lossy().to_string())
    }

    /// Add an input argument; applies to the next input.
    pub fn input_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add an input source.
    pub fn input(self, source: impl Into<String>) -> Self {
        self.input_arg("-i").input_arg(source)
    }

    /// Add an input file.
    pub fn input_file(self, path: impl AsRef<Path>) -> Self {
        let source = path.as_ref().to_string_lossy().to_string();
        self.input(source)
    }

    /// Add output arguments (after the inputs).
    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    /// Add multiple output arguments.
    pub fn output_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Declare the next input as raw RGB24 frames of the given size.
    pub fn rawvideo_rgb24_input(self, width: u32, height: u32, fps: f64) -> Self {
        self.input_arg("-f")
            .input_arg("rawvideo")
            .input_arg("-pix_fmt")
            .input_arg("rgb24")
            .input_arg("-s")
            .input_arg(format!("{}x{}", width, height))
            .input_arg("-r")
            .input_arg(format!("{:.3}", fps))
    }

    /// Set video filter.
    pub fn video_filter(self, filter: impl Into<String>) -> Self {
        self.output_arg("-vf").output_arg(filter)
    }

    /// Set video codec.
    pub fn video_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:v").output_arg(codec)
    }

    /// Set preset.
    pub fn preset(self, preset: impl Into<String>) -> Self {
        self.output_arg("-preset").output_arg(preset)
    }

    /// Set log level.
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Build the command arguments.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = vec![
            "-y".to_string(),
            "-hide_banner".to_string(),
            "-v".to_string(),
            self.log_level.clone(),
        ];
        args.extend(self.args.iter().cloned());
        args.extend(self.output_args.iter().cloned());
        args.push(self.output.clone());
        args
    }

    /// Spawn FFmpeg with the given stdio for streaming use.
    pub fn spawn(&self, stdin: Stdio, stdout: Stdio) -> MediaResult<Child> {
        which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)?;

        let args = self.build_args();
        debug!("Spawning FFmpeg: ffmpeg {}", args.join(" "));

        Command::new("ffmpeg")
            .args(&args)
            .stdin(stdin)
            .stdout(stdout)
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| MediaError::ffmpeg_failed(format!("Failed to spawn FFmpeg: {}", e), None, None))
    }

    /// Run to completion.
    pub async fn run(&self) -> MediaResult<()> {
        let child = self.spawn(Stdio::null(), Stdio::null())?;
        let output = child.wait_with_output().await?;

        if output.status.success() {
            Ok(())
        } else {
            Err(MediaError::ffmpeg_failed(
                "FFmpeg exited with non-zero status",
                Some(String::from_utf8_lossy(&output.stderr).to_string()),
                output.status.code(),
            ))
        }
    }
}
