//! Still image codec.

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::ColorType;

use crate::error::MediaResult;
use crate::frame::Frame;

/// JPEG quality used for results and thumbnails.
pub const JPEG_QUALITY: u8 = 90;

/// Longest edge of a thumbnail.
pub const THUMBNAIL_MAX_EDGE: u32 = 320;

/// Decode any supported image into an RGB24 frame.
pub fn decode_image(bytes: &[u8]) -> MediaResult<Frame> {
    let image = image::load_from_memory(bytes)?.to_rgb8();
    Frame::from_rgb_image(image)
}

/// Encode a frame as JPEG.
pub fn encode_jpeg(frame: &Frame) -> MediaResult<Vec<u8>> {
    let mut buf = Cursor::new(Vec::new());
    JpegEncoder::new_with_quality(&mut buf, JPEG_QUALITY).encode(
        frame.data(),
        frame.width(),
        frame.height(),
        ColorType::Rgb8,
    )?;
    Ok(buf.into_inner())
}

/// Encode a downsized JPEG preview of `frame`. Small frames are kept as is.
pub fn encode_thumbnail(frame: &Frame) -> MediaResult<Vec<u8>> {
    let longest = frame.width().max(frame.height());
    if longest <= THUMBNAIL_MAX_EDGE {
        return encode_jpeg(frame);
    }

    let scale = THUMBNAIL_MAX_EDGE as f64 / longest as f64;
    let width = ((frame.width() as f64 * scale).round() as u32).max(1);
    let height = ((frame.height() as f64 * scale).round() as u32).max(1);

    let resized = image::imageops::resize(&frame.to_rgb_image()?, width, height, FilterType::Triangle);
    encode_jpeg(&Frame::from_rgb_image(resized)?)
}
