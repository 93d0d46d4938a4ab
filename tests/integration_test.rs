use std::sync::Arc;
use std::time::Duration;

use image::{DynamicImage, GenericImageView, Rgb, RgbImage};

use booth_matte::{
    compositor::{encode_raster_png, PngOptions},
    mocks::{KeyedMockModel, MockSegmentationModel},
    BackgroundRemover, MattingConfig, RasterImage, SegmentationModel,
};

fn png(image: RgbImage) -> Vec<u8> {
    let raster = RasterImage::from_dynamic(DynamicImage::ImageRgb8(image)).unwrap();
    encode_raster_png(&raster, &PngOptions::default()).unwrap()
}

fn remover<M: SegmentationModel>(model: M, permits: usize) -> BackgroundRemover<M> {
    let config = MattingConfig::default().with_max_concurrent_inferences(permits);
    BackgroundRemover::new(Arc::new(model), &config).unwrap()
}

#[test]
fn test_output_dimensions_match_input() {
    let remover = remover(MockSegmentationModel::new(64).with_mask(|x, _| x as f32 / 63.0), 2);

    for (w, h) in [(1, 1), (64, 64), (300, 120), (97, 211)] {
        let input = png(RgbImage::from_pixel(w, h, Rgb([90, 60, 30])));
        let output = remover.remove_background(&input).unwrap();
        let decoded = image::load_from_memory(&output).unwrap();
        assert_eq!(decoded.dimensions(), (w, h));
        assert!(decoded.color().has_alpha());
    }
}

#[test]
fn test_solid_color_has_no_spurious_edges() {
    let input = png(RgbImage::from_pixel(1024, 1024, Rgb([200, 40, 40])));

    let background = remover(MockSegmentationModel::new(1024), 1);
    let alpha: Vec<u8> = image::load_from_memory(&background.remove_background(&input).unwrap())
        .unwrap()
        .to_rgba8()
        .pixels()
        .map(|p| p.0[3])
        .collect();
    assert!(alpha.iter().all(|&a| a == 0));

    let keyed = remover(KeyedMockModel::new(1024), 1);
    let alpha: Vec<u8> = image::load_from_memory(&keyed.remove_background(&input).unwrap())
        .unwrap()
        .to_rgba8()
        .pixels()
        .map(|p| p.0[3])
        .collect();
    assert!(alpha.iter().all(|&a| a == alpha[0]));
}

#[test]
fn test_matte_follows_image_content() {
    // Red on the left, black on the right: the keyed mock only sees what the
    // tensor encoder produced, so a flipped or interleaved layout shows up here.
    let image = RgbImage::from_fn(128, 128, |x, _| {
        if x < 64 {
            Rgb([255, 0, 0])
        } else {
            Rgb([0, 0, 0])
        }
    });
    let remover = remover(KeyedMockModel::new(64), 1);
    let output = image::load_from_memory(&remover.remove_background(&png(image)).unwrap())
        .unwrap()
        .to_rgba8();

    for y in [0, 40, 126] {
        assert_eq!(output.get_pixel(10, y).0, [255, 0, 0, 255]);
        assert_eq!(output.get_pixel(117, y).0, [0, 0, 0, 0]);
    }
}

#[test]
fn test_panels_respect_inference_bound() {
    let model = MockSegmentationModel::new(16).with_latency(Duration::from_millis(15));
    let remover = remover(model, 2);

    let input = png(RgbImage::from_pixel(90, 90, Rgb([1, 2, 3])));
    let panels = remover.remove_background_split_panels(&input, 3, 3).unwrap();

    assert_eq!(panels.len(), 9);
    assert_eq!(remover.model().calls(), 9);
    assert!(remover.model().peak_in_flight() <= 2);
    assert_eq!(remover.inference_permits().available(), 2);
}

#[test]
fn test_undecodable_input_is_reported() {
    let remover = remover(MockSegmentationModel::new(8), 1);
    let err = remover.remove_background(b"not an image").unwrap_err();
    assert!(matches!(err, booth_matte::MatteError::InvalidImage { .. }));
}
