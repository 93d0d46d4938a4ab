use image::GrayImage;
use rayon::prelude::*;

use crate::errors::{MatteError, Result};
use crate::tensor::Mask;

/// Placement of the model-space square inside the target image.
///
/// The square is scaled by `min(width, height) / S` and centred, so one axis
/// is letterboxed whenever the target is not square.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FitGeometry {
    pub size: u32,
    pub scale: f64,
    pub offset_x: f64,
    pub offset_y: f64,
}

impl FitGeometry {
    pub fn new(size: u32, width: u32, height: u32) -> Self {
        let s = f64::from(size);
        let scale = (f64::from(width) / s).min(f64::from(height) / s);
        Self {
            size,
            scale,
            offset_x: (f64::from(width) - s * scale) / 2.0,
            offset_y: (f64::from(height) - s * scale) / 2.0,
        }
    }

    /// Mask-space coordinate of a target pixel.
    #[inline]
    pub fn to_mask(&self, x: u32, y: u32) -> (f64, f64) {
        (
            (f64::from(x) - self.offset_x) / self.scale,
            (f64::from(y) - self.offset_y) / self.scale,
        )
    }

    #[inline]
    fn contains(&self, mx: f64, my: f64) -> bool {
        let last = f64::from(self.size - 1);
        (0.0..=last).contains(&mx) && (0.0..=last).contains(&my)
    }
}

fn bilinear(mask: &Mask, mx: f64, my: f64) -> f64 {
    let last = mask.size() - 1;
    let x1 = mx.floor() as u32;
    let y1 = my.floor() as u32;
    let x2 = (x1 + 1).min(last);
    let y2 = (y1 + 1).min(last);
    let fx = mx - f64::from(x1);
    let fy = my - f64::from(y1);

    let v11 = f64::from(mask.get(x1, y1));
    let v21 = f64::from(mask.get(x2, y1));
    let v12 = f64::from(mask.get(x1, y2));
    let v22 = f64::from(mask.get(x2, y2));

    v11 * (1.0 - fx) * (1.0 - fy) + v21 * fx * (1.0 - fy) + v12 * (1.0 - fx) * fy + v22 * fx * fy
}

/// Projects a model-resolution mask onto a `width x height` alpha channel.
///
/// Pixels whose mask-space coordinate falls outside `[0, S-1]` get alpha 0.
pub fn remap(mask: &Mask, width: u32, height: u32) -> Result<GrayImage> {
    if width == 0 || height == 0 {
        return Err(MatteError::invalid_image(format!(
            "cannot remap onto {width}x{height}"
        )));
    }
    let _span = tracing::debug_span!("remap", width, height).entered();

    let fit = FitGeometry::new(mask.size(), width, height);
    let mut alpha = vec![0u8; width as usize * height as usize];
    alpha
        .par_chunks_mut(width as usize)
        .enumerate()
        .for_each(|(y, row)| {
            for (x, out) in row.iter_mut().enumerate() {
                let (mx, my) = fit.to_mask(x as u32, y as u32);
                if fit.contains(mx, my) {
                    let value = bilinear(mask, mx, my).clamp(0.0, 1.0);
                    *out = (value * 255.0).round() as u8;
                }
            }
        });

    GrayImage::from_raw(width, height, alpha)
        .ok_or_else(|| MatteError::invalid_image("alpha buffer size mismatch"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geometry_letterboxes_tall_targets() {
        let fit = FitGeometry::new(1024, 800, 1200);
        assert!((fit.scale - 800.0 / 1024.0).abs() < 1e-12);
        assert_eq!(fit.offset_x, 0.0);
        assert_eq!(fit.offset_y, 200.0);

        let fit = FitGeometry::new(1024, 2000, 1000);
        assert_eq!(fit.offset_x, 500.0);
        assert_eq!(fit.offset_y, 0.0);
    }

    #[test]
    fn test_alpha_only_inside_centred_square() -> Result<()> {
        let mask = Mask::from_fn(1024, |_, _| 1.0);
        let alpha = remap(&mask, 800, 1200)?;
        assert_eq!(alpha.dimensions(), (800, 1200));

        for (x, y, pixel) in alpha.enumerate_pixels() {
            let inside = (200..1000).contains(&y);
            assert_eq!(pixel.0[0] > 0, inside, "pixel ({x}, {y})");
            if inside {
                assert_eq!(pixel.0[0], 255);
            }
        }
        Ok(())
    }

    #[test]
    fn test_identity_when_sizes_match() -> Result<()> {
        let mask = Mask::from_fn(8, |x, y| ((x + y) % 2) as f32);
        let alpha = remap(&mask, 8, 8)?;
        for (x, y, pixel) in alpha.enumerate_pixels() {
            let expected = if (x + y) % 2 == 1 { 255 } else { 0 };
            assert_eq!(pixel.0[0], expected);
        }
        Ok(())
    }

    #[test]
    fn test_bilinear_midpoint() -> Result<()> {
        // Upscaling a 2x2 mask by 2: target pixel 1 sits halfway between cells.
        let mask = Mask::from_values(2, vec![0.0, 1.0, 0.0, 1.0])?;
        let alpha = remap(&mask, 4, 4)?;
        assert_eq!(alpha.get_pixel(0, 0).0[0], 0);
        assert_eq!(alpha.get_pixel(1, 0).0[0], 128);
        assert_eq!(alpha.get_pixel(2, 0).0[0], 255);
        // (3 - 0) / 2 = 1.5 lies past the last cell.
        assert_eq!(alpha.get_pixel(3, 0).0[0], 0);
        Ok(())
    }

    #[test]
    fn test_values_are_clamped() -> Result<()> {
        let mask = Mask::from_fn(4, |x, _| if x < 2 { -5.0 } else { 9.0 });
        let alpha = remap(&mask, 4, 4)?;
        assert_eq!(alpha.get_pixel(0, 0).0[0], 0);
        assert_eq!(alpha.get_pixel(3, 3).0[0], 255);
        Ok(())
    }

    #[test]
    fn test_zero_target_is_rejected() {
        let mask = Mask::from_fn(4, |_, _| 1.0);
        assert!(remap(&mask, 0, 4).is_err());
    }
}
