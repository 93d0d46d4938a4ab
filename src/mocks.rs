use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ndarray::prelude::*;

use crate::errors::{MatteError, Result};
use crate::traits::SegmentationModel;

type MaskFn = dyn Fn(u32, u32) -> f32 + Send + Sync;

/// Deterministic stand-in for the segmentation network.
///
/// Returns a mask computed from cell coordinates (all zeros by default) and
/// records how many inferences ran concurrently.
#[derive(Clone)]
pub struct MockSegmentationModel {
    pub image_size: u32,
    mask: Arc<MaskFn>,
    latency: Duration,
    calls: Arc<AtomicUsize>,
    in_flight: Arc<AtomicUsize>,
    peak_in_flight: Arc<AtomicUsize>,
}

impl MockSegmentationModel {
    pub fn new(image_size: u32) -> Self {
        Self {
            image_size,
            mask: Arc::new(|_, _| 0.0),
            latency: Duration::ZERO,
            calls: Arc::new(AtomicUsize::new(0)),
            in_flight: Arc::new(AtomicUsize::new(0)),
            peak_in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_mask(mut self, mask: impl Fn(u32, u32) -> f32 + Send + Sync + 'static) -> Self {
        self.mask = Arc::new(mask);
        self
    }

    pub const fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

fn check_shape(tensor: &ArrayView4<f32>, size: u32) -> Result<()> {
    let size = size as usize;
    if tensor.shape() != [1, 3, size, size] {
        return Err(MatteError::contract(format!(
            "input tensor shape {:?}, model expects [1, 3, {size}, {size}]",
            tensor.shape()
        )));
    }
    Ok(())
}

impl SegmentationModel for MockSegmentationModel {
    fn input_size(&self) -> u32 {
        self.image_size
    }

    fn infer(&self, tensor: ArrayView4<f32>) -> Result<Vec<f32>> {
        check_shape(&tensor, self.image_size)?;
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.latency.is_zero() {
            std::thread::sleep(self.latency);
        }

        let size = self.image_size;
        let values = (0..size)
            .flat_map(|y| (0..size).map(move |x| (x, y)))
            .map(|(x, y)| (self.mask)(x, y))
            .collect();

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(values)
    }
}

/// Mock whose output follows the image content rather than fixed coordinates:
/// cells whose red plane is brighter than mid-grey count as foreground.
#[derive(Clone, Debug)]
pub struct KeyedMockModel {
    pub image_size: u32,
}

impl KeyedMockModel {
    pub const fn new(image_size: u32) -> Self {
        Self { image_size }
    }
}

impl SegmentationModel for KeyedMockModel {
    fn input_size(&self) -> u32 {
        self.image_size
    }

    fn infer(&self, tensor: ArrayView4<f32>) -> Result<Vec<f32>> {
        check_shape(&tensor, self.image_size)?;
        Ok(tensor
            .slice(s![0, 0, .., ..])
            .iter()
            .map(|&red| if red > 0.0 { 1.0 } else { 0.0 })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_model_predict() -> Result<()> {
        let mock = MockSegmentationModel::new(8).with_mask(|x, _| x as f32);
        let input_tensor = Array4::<f32>::zeros((1, 3, 8, 8));

        let result = mock.infer(input_tensor.view())?;
        assert_eq!(result.len(), 64);
        assert_eq!(result[7], 7.0);
        assert_eq!(mock.calls(), 1);
        Ok(())
    }

    #[test]
    fn test_mock_model_checks_shape() {
        let mock = MockSegmentationModel::new(8);
        let input_tensor = Array4::<f32>::zeros((1, 3, 4, 4));
        assert!(matches!(
            mock.infer(input_tensor.view()),
            Err(MatteError::ModelContract { .. })
        ));
    }

    #[test]
    fn test_keyed_mock_follows_red_plane() -> Result<()> {
        let mock = KeyedMockModel::new(2);
        let mut input_tensor = Array4::<f32>::from_elem((1, 3, 2, 2), -1.0);
        input_tensor[[0, 0, 1, 0]] = 1.0;
        input_tensor[[0, 1, 0, 0]] = 1.0;
        assert_eq!(mock.infer(input_tensor.view())?, [0.0, 0.0, 1.0, 0.0]);
        Ok(())
    }
}
