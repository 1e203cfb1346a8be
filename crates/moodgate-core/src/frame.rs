use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage, RgbImage, RgbaImage};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame has zero size ({width}x{height})")]
    Empty { width: u32, height: u32 },
    #[error("frame buffer length {got} does not match {width}x{height}x{channels} = {expected}")]
    BufferLength {
        width: u32,
        height: u32,
        channels: u8,
        expected: usize,
        got: usize,
    },
    #[error("unsupported channel count: {0} (expected 1, 3 or 4)")]
    UnsupportedChannels(u8),
    #[error("frame dimensions {width}x{height}x{channels} exceed the addressable buffer size")]
    TooLarge { width: u32, height: u32, channels: u8 },
}

/// A single captured frame at native resolution, stored as packed RGB.
#[derive(Debug, Clone)]
pub struct Frame {
    image: RgbImage,
}

impl Frame {
    pub fn new(image: RgbImage) -> Self {
        Self { image }
    }

    /// Build a frame from a raw interleaved buffer as delivered by a capture
    /// layer. Grayscale and RGBA buffers are converted to RGB.
    pub fn from_raw(
        width: u32,
        height: u32,
        channels: u8,
        data: Vec<u8>,
    ) -> Result<Self, FrameError> {
        if !matches!(channels, 1 | 3 | 4) {
            return Err(FrameError::UnsupportedChannels(channels));
        }
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|n| n.checked_mul(channels as usize))
            .ok_or(FrameError::TooLarge {
                width,
                height,
                channels,
            })?;
        if data.len() != expected {
            return Err(FrameError::BufferLength {
                width,
                height,
                channels,
                expected,
                got: data.len(),
            });
        }

        let length_error = |got| FrameError::BufferLength {
            width,
            height,
            channels,
            expected,
            got,
        };
        let got = data.len();
        let image = match channels {
            1 => GrayImage::from_raw(width, height, data)
                .map(|gray| DynamicImage::ImageLuma8(gray).into_rgb8()),
            3 => RgbImage::from_raw(width, height, data),
            _ => RgbaImage::from_raw(width, height, data)
                .map(|rgba| DynamicImage::ImageRgba8(rgba).into_rgb8()),
        }
        .ok_or_else(|| length_error(got))?;

        Ok(Self { image })
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn is_empty(&self) -> bool {
        self.image.width() == 0 || self.image.height() == 0
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn into_image(self) -> RgbImage {
        self.image
    }

    /// Produce the analysis copy of this frame at `width`x`height`.
    ///
    /// The returned buffer is owned by the caller and dropped at the end of
    /// the analysis cycle; the frame itself is left untouched.
    pub fn downscale(&self, width: u32, height: u32) -> Result<RgbImage, FrameError> {
        if self.is_empty() {
            return Err(FrameError::Empty {
                width: self.width(),
                height: self.height(),
            });
        }
        Ok(imageops::resize(&self.image, width, height, FilterType::Triangle))
    }
}

impl From<RgbImage> for Frame {
    fn from(image: RgbImage) -> Self {
        Self::new(image)
    }
}
