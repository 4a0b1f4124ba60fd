//! RGB24 frames.

use image::RgbImage;

use crate::error::{MediaError, MediaResult};

/// An H×W×3 byte matrix in row-major RGB order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl Frame {
    pub const CHANNELS: usize = 3;

    /// Wrap raw RGB24 bytes. The buffer length must match the dimensions.
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> MediaResult<Self> {
        if width == 0 || height == 0 {
            return Err(MediaError::invalid_frame(format!("empty frame {}x{}", width, height)));
        }
        let expected = Self::byte_len(width, height);
        if data.len() != expected {
            return Err(MediaError::invalid_frame(format!(
                "{}x{} frame needs {} bytes, got {}",
                width,
                height,
                expected,
                data.len()
            )));
        }
        Ok(Self { width, height, data })
    }

    /// A frame with every pixel set to `rgb`.
    pub fn filled(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let pixels = width as usize * height as usize;
        let data = rgb.iter().copied().cycle().take(pixels * Self::CHANNELS).collect();
        Self { width, height, data }
    }

    /// Bytes needed for a `width`×`height` frame.
    pub fn byte_len(width: u32, height: u32) -> usize {
        width as usize * height as usize * Self::CHANNELS
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    /// Pixel at (`x`, `y`).
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 3] {
        let i = (y as usize * self.width as usize + x as usize) * Self::CHANNELS;
        [self.data[i], self.data[i + 1], self.data[i + 2]]
    }

    pub fn from_rgb_image(image: RgbImage) -> MediaResult<Self> {
        let (width, height) = image.dimensions();
        Self::new(width, height, image.into_raw())
    }

    pub fn to_rgb_image(&self) -> MediaResult<RgbImage> {
        RgbImage::from_raw(self.width, self.height, self.data.clone())
            .ok_or_else(|| MediaError::invalid_frame("buffer does not match dimensions"))
    }
}
