use ndarray::prelude::*;
use nshare::AsNdarray3;

use crate::errors::{MatteError, Result};
use crate::raster::RasterImage;

/// Square foreground-probability grid at model resolution, row-major.
#[derive(Clone, Debug, PartialEq)]
pub struct Mask {
    size: u32,
    values: Vec<f32>,
}

impl Mask {
    pub fn from_values(size: u32, values: Vec<f32>) -> Result<Self> {
        let expected = size as usize * size as usize;
        if size == 0 || values.len() != expected {
            return Err(MatteError::contract(format!(
                "mask holds {} values, a {size}x{size} grid needs {expected}",
                values.len()
            )));
        }
        Ok(Self { size, values })
    }

    pub fn from_fn(size: u32, f: impl Fn(u32, u32) -> f32) -> Self {
        let values = (0..size)
            .flat_map(|y| (0..size).map(move |x| (x, y)))
            .map(|(x, y)| f(x, y))
            .collect();
        Self { size, values }
    }

    pub const fn size(&self) -> u32 {
        self.size
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    #[inline]
    pub fn get(&self, x: u32, y: u32) -> f32 {
        self.values[y as usize * self.size as usize + x as usize]
    }

    /// Element-wise transform into a new mask of the same size.
    pub fn map(&self, f: impl Fn(f32) -> f32) -> Self {
        Self {
            size: self.size,
            values: self.values.iter().map(|&v| f(v)).collect(),
        }
    }
}

#[inline]
fn normalize(value: u8) -> f32 {
    (f32::from(value) / 255.0 - 0.5) / 0.5
}

/// Builds the `[1, 3, size, size]` channel-planar input tensor.
///
/// The image is cover-fitted to `size x size` with Lanczos3 and any alpha
/// channel is dropped. Plane 0 is red, 1 green, 2 blue.
pub fn encode(image: &RasterImage, size: u32) -> Result<Array4<f32>> {
    let _span = tracing::debug_span!("tensor_encode", size).entered();

    let resized = image.resize_cover(size, size)?.to_rgb8();
    let planes = resized.as_ndarray3();
    Ok(planes.mapv(normalize).insert_axis(Axis(0)))
}

/// Reinterprets raw model output as a `size x size` mask. No clamping here.
pub fn decode(raw: Vec<f32>, size: u32) -> Result<Mask> {
    Mask::from_values(size, raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, Rgb, RgbImage};

    fn solid(width: u32, height: u32, color: [u8; 3]) -> RasterImage {
        RasterImage::from_dynamic(DynamicImage::ImageRgb8(RgbImage::from_pixel(
            width,
            height,
            Rgb(color),
        )))
        .unwrap()
    }

    #[test]
    fn test_encode_is_channel_planar() -> Result<()> {
        let tensor = encode(&solid(8, 8, [255, 0, 51]), 4)?;
        assert_eq!(tensor.shape(), &[1, 3, 4, 4]);

        for y in 0..4 {
            for x in 0..4 {
                assert!((tensor[[0, 0, y, x]] - 1.0).abs() < 1e-6);
                assert!((tensor[[0, 1, y, x]] + 1.0).abs() < 1e-6);
                assert!((tensor[[0, 2, y, x]] + 0.6).abs() < 1e-6);
            }
        }
        Ok(())
    }

    #[test]
    fn test_encode_keeps_spatial_order_within_planes() -> Result<()> {
        // Left half black, right half white; planes must not be interleaved.
        let image = RgbImage::from_fn(4, 4, |x, _| {
            if x < 2 {
                Rgb([0, 0, 0])
            } else {
                Rgb([255, 255, 255])
            }
        });
        let raster = RasterImage::from_dynamic(DynamicImage::ImageRgb8(image))?;
        let tensor = encode(&raster, 4)?;

        for c in 0..3 {
            assert!(tensor[[0, c, 1, 0]] < -0.9);
            assert!(tensor[[0, c, 1, 3]] > 0.9);
        }
        Ok(())
    }

    #[test]
    fn test_encode_drops_alpha() -> Result<()> {
        let raster = RasterImage::from_raw(2, 2, 4, [10, 20, 30, 0].repeat(4))?;
        let tensor = encode(&raster, 2)?;
        assert_eq!(tensor.shape(), &[1, 3, 2, 2]);
        Ok(())
    }

    #[test]
    fn test_encode_rejects_zero_size() {
        assert!(matches!(
            encode(&solid(4, 4, [0, 0, 0]), 0),
            Err(MatteError::InvalidImage { .. })
        ));
    }

    #[test]
    fn test_decode_checks_length() -> Result<()> {
        let mask = decode(vec![0.25; 16], 4)?;
        assert_eq!(mask.size(), 4);
        assert_eq!(mask.get(3, 3), 0.25);

        assert!(matches!(
            decode(vec![0.0; 15], 4),
            Err(MatteError::ModelContract { .. })
        ));
        Ok(())
    }
}
