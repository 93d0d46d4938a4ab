use image::GrayImage;
use rayon::prelude::*;

/// 3x3 Gaussian weights, centre fixed at 1.
fn kernel(radius: u32) -> [[f32; 3]; 3] {
    let two_r2 = 2.0 * (radius as f32).powi(2);
    let mut weights = [[0.0; 3]; 3];
    for (row, dy) in weights.iter_mut().zip(-1i32..=1) {
        for (weight, dx) in row.iter_mut().zip(-1i32..=1) {
            let dist2 = (dx * dx + dy * dy) as f32;
            *weight = if dist2 == 0.0 {
                1.0
            } else {
                (-dist2 / two_r2).exp()
            };
        }
    }
    weights
}

/// Softens partially transparent edge pixels with a weighted 3x3 average.
///
/// Pixels at exactly 0 or 255 are left untouched, and every sample is read
/// from the input so the result does not depend on traversal order.
pub fn feather(alpha: &GrayImage, radius: u32) -> GrayImage {
    if radius == 0 {
        return alpha.clone();
    }
    let _span = tracing::debug_span!("feather", radius).entered();

    let weights = kernel(radius);
    let (width, height) = alpha.dimensions();
    let src = alpha.as_raw();
    let mut out = src.clone();

    out.par_chunks_mut(width as usize)
        .enumerate()
        .for_each(|(y, row)| {
            let y = y as i64;
            for (x, value) in row.iter_mut().enumerate() {
                if *value == 0 || *value == 255 {
                    continue;
                }
                let x = x as i64;
                let mut sum = 0.0f32;
                let mut total = 0.0f32;
                for (dy, weight_row) in (-1i64..=1).zip(&weights) {
                    let ny = y + dy;
                    if ny < 0 || ny >= i64::from(height) {
                        continue;
                    }
                    for (dx, &w) in (-1i64..=1).zip(weight_row) {
                        let nx = x + dx;
                        if nx < 0 || nx >= i64::from(width) {
                            continue;
                        }
                        let neighbour = src[(ny * i64::from(width) + nx) as usize];
                        sum += f32::from(neighbour) * w;
                        total += w;
                    }
                }
                *value = (sum / total).round().clamp(0.0, 255.0) as u8;
            }
        });

    // Same dimensions as the input, so this cannot fail.
    GrayImage::from_raw(width, height, out).unwrap_or_else(|| alpha.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn test_kernel_weights() {
        let k = kernel(2);
        assert_eq!(k[1][1], 1.0);
        assert!((k[0][1] - (-1.0f32 / 8.0).exp()).abs() < 1e-6);
        assert!((k[0][0] - (-2.0f32 / 8.0).exp()).abs() < 1e-6);
        assert_eq!(k[0][0], k[2][2]);
    }

    #[test]
    fn test_opaque_and_transparent_pixels_unchanged() {
        let alpha = GrayImage::from_fn(16, 16, |x, y| match (x + 3 * y) % 5 {
            0 => Luma([0]),
            1 => Luma([255]),
            2 => Luma([17]),
            3 => Luma([200]),
            _ => Luma([128]),
        });
        let feathered = feather(&alpha, 2);

        for (x, y, pixel) in alpha.enumerate_pixels() {
            if pixel.0[0] == 0 || pixel.0[0] == 255 {
                assert_eq!(feathered.get_pixel(x, y), pixel);
            }
        }
    }

    #[test]
    fn test_edge_pixel_is_averaged() {
        // A single partial pixel surrounded by opaque ones moves towards 255.
        let mut alpha = GrayImage::from_pixel(3, 3, Luma([255]));
        alpha.put_pixel(1, 1, Luma([55]));
        let feathered = feather(&alpha, 2);

        let k = kernel(2);
        let ring: f32 = k.iter().flatten().sum::<f32>() - 1.0;
        let expected = ((55.0 + 255.0 * ring) / (1.0 + ring)).round() as u8;
        assert_eq!(feathered.get_pixel(1, 1).0[0], expected);
        assert!(feathered.get_pixel(1, 1).0[0] > 55);
    }

    #[test]
    fn test_corner_uses_in_bounds_neighbours_only() {
        let mut alpha = GrayImage::from_pixel(2, 2, Luma([100]));
        alpha.put_pixel(1, 1, Luma([100]));
        let feathered = feather(&alpha, 2);
        assert_eq!(feathered.get_pixel(0, 0).0[0], 100);
    }

    #[test]
    fn test_zero_radius_is_identity() {
        let alpha = GrayImage::from_fn(4, 4, |x, _| Luma([x as u8 * 60]));
        assert_eq!(feather(&alpha, 0), alpha);
    }
}
