//! Owned interleaved 8-bit images and the handful of imaging primitives the
//! pipeline needs from the `image` crate.

use image::{imageops::FilterType, DynamicImage, GenericImageView, RgbImage, RgbaImage};

use crate::errors::{MatteError, Result};

/// Row-major, channel-interleaved 8-bit image with 3 (RGB) or 4 (RGBA) channels.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RasterImage {
    width: u32,
    height: u32,
    channels: u8,
    data: Vec<u8>,
}

impl RasterImage {
    pub fn from_raw(width: u32, height: u32, channels: u8, data: Vec<u8>) -> Result<Self> {
        if channels != 3 && channels != 4 {
            return Err(MatteError::UnsupportedFormat { channels });
        }
        if width == 0 || height == 0 {
            return Err(MatteError::invalid_image(format!(
                "zero dimension: {width}x{height}"
            )));
        }
        let expected = width as usize * height as usize * channels as usize;
        if data.len() != expected {
            return Err(MatteError::invalid_image(format!(
                "buffer holds {} bytes, {width}x{height}x{channels} needs {expected}",
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            channels,
            data,
        })
    }

    /// Decodes any format the `image` crate was built with. Images that carry
    /// an alpha channel become RGBA, everything else RGB.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let image = image::load_from_memory(bytes)?;
        Self::from_dynamic(image)
    }

    pub fn from_dynamic(image: DynamicImage) -> Result<Self> {
        let (width, height) = image.dimensions();
        if image.color().has_alpha() {
            Self::from_raw(width, height, 4, image.into_rgba8().into_raw())
        } else {
            Self::from_raw(width, height, 3, image.into_rgb8().into_raw())
        }
    }

    pub const fn width(&self) -> u32 {
        self.width
    }

    pub const fn height(&self) -> u32 {
        self.height
    }

    pub const fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub const fn channels(&self) -> u8 {
        self.channels
    }

    pub const fn has_alpha(&self) -> bool {
        self.channels == 4
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    pub fn pixel(&self, x: u32, y: u32) -> &[u8] {
        let c = self.channels as usize;
        let start = (y as usize * self.width as usize + x as usize) * c;
        &self.data[start..start + c]
    }

    pub fn to_dynamic(&self) -> DynamicImage {
        // Lengths are checked on construction, so from_raw cannot fail here.
        if self.has_alpha() {
            RgbaImage::from_raw(self.width, self.height, self.data.clone())
                .map(DynamicImage::ImageRgba8)
                .unwrap_or_else(|| DynamicImage::new_rgba8(self.width, self.height))
        } else {
            RgbImage::from_raw(self.width, self.height, self.data.clone())
                .map(DynamicImage::ImageRgb8)
                .unwrap_or_else(|| DynamicImage::new_rgb8(self.width, self.height))
        }
    }

    /// RGB view of the pixels, dropping alpha if present.
    pub fn to_rgb8(&self) -> RgbImage {
        self.to_dynamic().into_rgb8()
    }

    pub fn to_rgba8(&self) -> RgbaImage {
        self.to_dynamic().into_rgba8()
    }

    /// Aspect-preserving resize that fills `width x height` completely and
    /// crops the centred overflow ("cover" fit).
    ///
    /// The source is cropped to the target aspect ratio before resampling, so
    /// the intermediate never exceeds the source.
    pub fn resize_cover(&self, width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(MatteError::invalid_image(format!(
                "cannot resize to {width}x{height}"
            )));
        }
        let (x, y, crop_width, crop_height) = cover_crop(self.width, self.height, width, height);
        let resized = self
            .extract_region(x, y, crop_width, crop_height)?
            .to_dynamic()
            .resize_exact(width, height, FilterType::Lanczos3);
        Self::from_dynamic(resized)
    }

    /// Copies a rectangular region, keeping the channel layout.
    pub fn extract_region(&self, x: u32, y: u32, width: u32, height: u32) -> Result<Self> {
        let fits = x.checked_add(width).is_some_and(|right| right <= self.width)
            && y.checked_add(height).is_some_and(|bottom| bottom <= self.height);
        if !fits || width == 0 || height == 0 {
            return Err(MatteError::invalid_image(format!(
                "region ({x}, {y}, {width}, {height}) outside {}x{}",
                self.width, self.height
            )));
        }

        let c = self.channels as usize;
        let stride = self.width as usize * c;
        let row_len = width as usize * c;
        let mut data = Vec::with_capacity(row_len * height as usize);
        for row in y as usize..(y + height) as usize {
            let start = row * stride + x as usize * c;
            data.extend_from_slice(&self.data[start..start + row_len]);
        }
        Self::from_raw(width, height, self.channels, data)
    }
}

/// Centred `(x, y, width, height)` window of a `src_width x src_height` image
/// with the aspect ratio of `width x height`.
fn cover_crop(src_width: u32, src_height: u32, width: u32, height: u32) -> (u32, u32, u32, u32) {
    let (sw, sh) = (u64::from(src_width), u64::from(src_height));
    let (tw, th) = (u64::from(width), u64::from(height));
    if sw * th > sh * tw {
        let crop = ((2 * sh * tw + th) / (2 * th)).clamp(1, sw) as u32;
        ((src_width - crop) / 2, 0, crop, src_height)
    } else {
        let crop = ((2 * sw * th + tw) / (2 * tw)).clamp(1, sh) as u32;
        (0, (src_height - crop) / 2, src_width, crop)
    }
}
