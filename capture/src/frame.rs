//! Video frames and their encodings.

use std::io::Cursor;
use std::sync::Arc;

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ExtendedColorType, GrayImage, RgbImage};
use thiserror::Error;

/// JPEG quality for still frames sent to the remote service.
pub const DEFAULT_JPEG_QUALITY: u8 = 85;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("frame buffer is {actual} bytes, expected {expected} for {width}x{height} RGB")]
    SizeMismatch {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },
    #[error("failed to encode frame: {0}")]
    Encode(#[from] image::ImageError),
}

/// One RGB8 frame from the camera.
///
/// Pixel data is reference counted so a frame can be handed to a decoder
/// and encoded for upload without copying.
#[derive(Clone)]
pub struct VideoFrame {
    width: u32,
    height: u32,
    rgb: Arc<[u8]>,
}

impl std::fmt::Debug for VideoFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoFrame")
            .field("width", &self.width)
            .field("height", &self.height)
            .finish_non_exhaustive()
    }
}

impl VideoFrame {
    pub fn from_rgb(width: u32, height: u32, rgb: Vec<u8>) -> Result<Self, FrameError> {
        let expected = width as usize * height as usize * 3;
        if rgb.len() != expected {
            return Err(FrameError::SizeMismatch {
                width,
                height,
                expected,
                actual: rgb.len(),
            });
        }
        Ok(Self {
            width,
            height,
            rgb: rgb.into(),
        })
    }

    #[must_use]
    pub fn from_image(image: &DynamicImage) -> Self {
        let rgb = image.to_rgb8();
        let (width, height) = rgb.dimensions();
        Self {
            width,
            height,
            rgb: rgb.into_raw().into(),
        }
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[must_use]
    pub fn rgb(&self) -> &[u8] {
        &self.rgb
    }

    /// Encode as baseline JPEG at `quality` (1-100).
    pub fn to_jpeg(&self, quality: u8) -> Result<Vec<u8>, FrameError> {
        let mut out = Cursor::new(Vec::new());
        {
            let mut encoder = JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100));
            encoder.encode(&self.rgb, self.width, self.height, ExtendedColorType::Rgb8)?;
        }
        Ok(out.into_inner())
    }

    /// Greyscale copy for software decoders.
    #[must_use]
    pub fn to_luma(&self) -> GrayImage {
        match RgbImage::from_raw(self.width, self.height, self.rgb.to_vec()) {
            Some(rgb) => DynamicImage::ImageRgb8(rgb).to_luma8(),
            None => GrayImage::new(self.width, self.height),
        }
    }
}
