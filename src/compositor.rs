use image::{
    codecs::png::{CompressionType, FilterType, PngEncoder},
    ExtendedColorType, GrayImage, ImageEncoder, RgbaImage,
};

use crate::config::MattingConfig;
use crate::errors::{MatteError, Result};
use crate::raster::RasterImage;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PngOptions {
    /// 0 (fastest) ..= 9 (smallest).
    pub compression_level: u8,
    pub adaptive_filtering: bool,
}

impl Default for PngOptions {
    fn default() -> Self {
        Self {
            compression_level: 6,
            adaptive_filtering: false,
        }
    }
}

impl From<&MattingConfig> for PngOptions {
    fn from(config: &MattingConfig) -> Self {
        Self {
            compression_level: config.png_compression_level,
            adaptive_filtering: config.adaptive_filtering,
        }
    }
}

impl PngOptions {
    fn compression(&self) -> CompressionType {
        match self.compression_level {
            0..=3 => CompressionType::Fast,
            4..=6 => CompressionType::Default,
            _ => CompressionType::Best,
        }
    }

    fn filter(&self) -> FilterType {
        if self.adaptive_filtering {
            FilterType::Adaptive
        } else {
            FilterType::NoFilter
        }
    }
}

/// Copies the original RGB channels and attaches `alpha` as the fourth.
pub fn compose(original: &RasterImage, alpha: &GrayImage) -> Result<RgbaImage> {
    if original.dimensions() != alpha.dimensions() {
        return Err(MatteError::invalid_image(format!(
            "image is {}x{} but alpha is {}x{}",
            original.width(),
            original.height(),
            alpha.width(),
            alpha.height()
        )));
    }

    let channels = original.channels() as usize;
    let data = original
        .as_bytes()
        .chunks_exact(channels)
        .zip(alpha.as_raw())
        .flat_map(|(pixel, &a)| [pixel[0], pixel[1], pixel[2], a])
        .collect();

    RgbaImage::from_raw(original.width(), original.height(), data)
        .ok_or_else(|| MatteError::invalid_image("composited buffer size mismatch"))
}

/// Encodes an RGBA image as PNG. Output is deterministic for fixed options.
pub fn encode_png(image: &RgbaImage, options: &PngOptions) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    PngEncoder::new_with_quality(&mut bytes, options.compression(), options.filter())
        .write_image(
            image.as_raw(),
            image.width(),
            image.height(),
            ExtendedColorType::Rgba8,
        )
        .map_err(|source| MatteError::Encode {
            operation: "png encode".to_string(),
            source,
        })?;
    Ok(bytes)
}

/// PNG encoding for raster images of either channel layout.
pub fn encode_raster_png(image: &RasterImage, options: &PngOptions) -> Result<Vec<u8>> {
    let color = if image.has_alpha() {
        ExtendedColorType::Rgba8
    } else {
        ExtendedColorType::Rgb8
    };
    let mut bytes = Vec::new();
    PngEncoder::new_with_quality(&mut bytes, options.compression(), options.filter())
        .write_image(image.as_bytes(), image.width(), image.height(), color)
        .map_err(|source| MatteError::Encode {
            operation: "png encode".to_string(),
            source,
        })?;
    Ok(bytes)
}
