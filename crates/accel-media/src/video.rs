//! Frame-level video decode and encode.
//!
//! The worker never touches container formats itself. It pulls RGB24 frames
//! from a [`FrameReader`], pushes transformed frames into a [`FrameWriter`],
//! and finally asks the codec to put the original audio back.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::command::FfmpegCommand;
use crate::error::{MediaError, MediaResult};
use crate::frame::Frame;
use crate::probe::probe_video;

/// Source of decoded frames.
#[async_trait]
pub trait FrameReader: Send {
    /// Width of the frames yielded (after any downscale).
    fn width(&self) -> u32;

    /// Height of the frames yielded (after any downscale).
    fn height(&self) -> u32;

    fn fps(&self) -> f64;

    /// Expected number of frames, if the container reports or implies one.
    fn frame_count_hint(&self) -> Option<u64>;

    /// Next frame, or `None` at end of stream.
    async fn next_frame(&mut self) -> MediaResult<Option<Frame>>;

    /// Release the decoder and surface any error it reported.
    async fn finish(self: Box<Self>) -> MediaResult<()>;
}

/// Sink for encoded frames.
#[async_trait]
pub trait FrameWriter: Send {
    async fn write_frame(&mut self, frame: &Frame) -> MediaResult<()>;

    /// Flush and close the output.
    async fn finish(self: Box<Self>) -> MediaResult<()>;
}

/// Video codec backend.
#[async_trait]
pub trait VideoCodec: Send + Sync {
    /// Open `input` for decoding, downscaled to fit within `max_width`×`max_height`.
    async fn open_reader(&self, input: &Path, max_width: u32, max_height: u32) -> MediaResult<Box<dyn FrameReader>>;

    /// Open `output` for encoding frames of the given size.
    async fn open_writer(&self, output: &Path, width: u32, height: u32, fps: f64) -> MediaResult<Box<dyn FrameWriter>>;

    /// Write `output` with the video of `video` and the audio, if any, of `audio_source`.
    async fn merge_audio(&self, video: &Path, audio_source: &Path, output: &Path) -> MediaResult<()>;
}

/// Fit `width`×`height` within `max_width`×`max_height`.
///
/// Preserves the aspect ratio, never upscales, and rounds both sides down to
/// even values as required by 4:2:0 encoders. Fails when a side would end up
/// below 2 pixels.
pub fn downscale_dimensions(width: u32, height: u32, max_width: u32, max_height: u32) -> MediaResult<(u32, u32)> {
    if width < 2 || height < 2 {
        return Err(MediaError::invalid_frame(format!(
            "{}x{} video is too small to encode",
            width, height
        )));
    }

    let (w, h) = (width as u64, height as u64);
    let (max_w, max_h) = (max_width.max(2) as u64, max_height.max(2) as u64);

    let (w, h) = if w <= max_w && h <= max_h {
        (w, h)
    } else if w * max_h >= h * max_w {
        (max_w, h * max_w / w)
    } else {
        (w * max_h / h, max_h)
    };

    let (w, h) = ((w as u32) & !1, (h as u32) & !1);
    if w < 2 || h < 2 {
        return Err(MediaError::invalid_frame(format!(
            "{}x{} video cannot be scaled to fit {}x{}",
            width, height, max_width, max_height
        )));
    }
    Ok((w, h))
}

/// FFmpeg CLI implementation of [`VideoCodec`].
#[derive(Debug, Clone)]
pub struct FfmpegCodec {
    preset: String,
}

impl Default for FfmpegCodec {
    fn default() -> Self {
        Self {
            preset: "veryfast".to_string(),
        }
    }
}

impl FfmpegCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// x264 preset used when encoding.
    pub fn with_preset(mut self, preset: impl Into<String>) -> Self {
        self.preset = preset.into();
        self
    }
}

#[async_trait]
impl VideoCodec for FfmpegCodec {
    async fn open_reader(&self, input: &Path, max_width: u32, max_height: u32) -> MediaResult<Box<dyn FrameReader>> {
        let info = probe_video(input).await?;
        let (width, height) = downscale_dimensions(info.width, info.height, max_width, max_height)?;
        if (width, height) != (info.width, info.height) {
            info!(
                "Downscaling video from {}x{} to {}x{}",
                info.width, info.height, width, height
            );
        }

        let mut child = FfmpegCommand::new("pipe:1")
            .input_file(input)
            .video_filter(format!("scale={}:{}", width, height))
            .output_args(["-an", "-f", "rawvideo", "-pix_fmt", "rgb24"])
            .spawn(Stdio::null(), Stdio::piped())?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| MediaError::ffmpeg_failed("Failed to capture FFmpeg stdout", None, None))?;
        let stderr = collect_stderr(&mut child);

        Ok(Box::new(FfmpegFrameReader {
            child,
            stdout: BufReader::new(stdout),
            stderr,
            width,
            height,
            fps: info.fps,
            frame_count: info.frame_count,
        }))
    }

    async fn open_writer(&self, output: &Path, width: u32, height: u32, fps: f64) -> MediaResult<Box<dyn FrameWriter>> {
        let mut child = FfmpegCommand::to_file(output)
            .rawvideo_rgb24_input(width, height, fps)
            .input("pipe:0")
            .video_codec("libx264")
            .preset(self.preset.clone())
            .output_args(["-pix_fmt", "yuv420p", "-an"])
            .spawn(Stdio::piped(), Stdio::null())?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| MediaError::ffmpeg_failed("Failed to capture FFmpeg stdin", None, None))?;
        let stderr = collect_stderr(&mut child);

        Ok(Box::new(FfmpegFrameWriter {
            child,
            stdin: Some(stdin),
            stderr,
            width,
            height,
        }))
    }

    async fn merge_audio(&self, video: &Path, audio_source: &Path, output: &Path) -> MediaResult<()> {
        debug!("Merging audio from {} into {}", audio_source.display(), video.display());
        FfmpegCommand::to_file(output)
            .input_file(video)
            .input_file(audio_source)
            .output_args(["-map", "0:v:0", "-map", "1:a:0?", "-c", "copy", "-shortest"])
            .run()
            .await
    }
}

fn collect_stderr(child: &mut Child) -> JoinHandle<String> {
    let stderr = child.stderr.take();
    tokio::spawn(async move {
        let mut text = String::new();
        if let Some(mut stderr) = stderr {
            let _ = stderr.read_to_string(&mut text).await;
        }
        text
    })
}

async fn finish_child(mut child: Child, stderr: JoinHandle<String>, what: &str) -> MediaResult<()> {
    let status = child.wait().await?;
    let stderr = stderr.await.unwrap_or_default();
    if status.success() {
        Ok(())
    } else {
        Err(MediaError::ffmpeg_failed(
            format!("FFmpeg {} exited with non-zero status", what),
            Some(stderr),
            status.code(),
        ))
    }
}

/// Fill `buf` from `reader`. Returns the number of bytes read, short only at EOF.
async fn read_full<R: AsyncRead + Unpin>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

struct FfmpegFrameReader {
    child: Child,
    stdout: BufReader<ChildStdout>,
    stderr: JoinHandle<String>,
    width: u32,
    height: u32,
    fps: f64,
    frame_count: Option<u64>,
}

#[async_trait]
impl FrameReader for FfmpegFrameReader {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn fps(&self) -> f64 {
        self.fps
    }

    fn frame_count_hint(&self) -> Option<u64> {
        self.frame_count
    }

    async fn next_frame(&mut self) -> MediaResult<Option<Frame>> {
        let mut buf = vec![0u8; Frame::byte_len(self.width, self.height)];
        match read_full(&mut self.stdout, &mut buf).await? {
            0 => Ok(None),
            n if n == buf.len() => Frame::new(self.width, self.height, buf).map(Some),
            n => Err(MediaError::InvalidVideo(format!(
                "truncated frame: got {} of {} bytes",
                n,
                buf.len()
            ))),
        }
    }

    async fn finish(self: Box<Self>) -> MediaResult<()> {
        let FfmpegFrameReader { child, stdout, stderr, .. } = *self;
        drop(stdout);
        finish_child(child, stderr, "decode").await
    }
}

struct FfmpegFrameWriter {
    child: Child,
    stdin: Option<ChildStdin>,
    stderr: JoinHandle<String>,
    width: u32,
    height: u32,
}

#[async_trait]
impl FrameWriter for FfmpegFrameWriter {
    async fn write_frame(&mut self, frame: &Frame) -> MediaResult<()> {
        if frame.width() != self.width || frame.height() != self.height {
            return Err(MediaError::invalid_frame(format!(
                "encoder expects {}x{}, got {}x{}",
                self.width,
                self.height,
                frame.width(),
                frame.height()
            )));
        }
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| MediaError::ffmpeg_failed("Encoder already closed", None, None))?;
        stdin.write_all(frame.data()).await.map_err(|e| {
            MediaError::ffmpeg_failed(format!("Failed to write frame to FFmpeg: {}", e), None, None)
        })
    }

    async fn finish(self: Box<Self>) -> MediaResult<()> {
        let FfmpegFrameWriter { child, stdin, stderr, .. } = *self;
        if let Some(mut stdin) = stdin {
            stdin.shutdown().await?;
        }
        finish_child(child, stderr, "encode").await
    }
}
