use crate::errors::Result;
use ndarray::prelude::*;

/// Abstraction over the segmentation network.
///
/// The pipeline only depends on this trait, so the ONNX-backed `Model` and the
/// deterministic doubles in `mocks` are interchangeable.
pub trait SegmentationModel: Send + Sync {
    /// Side length `S` of the square `[1, 3, S, S]` input.
    fn input_size(&self) -> u32;

    /// Runs one inference and returns the flattened `S*S` output.
    fn infer(&self, tensor: ArrayView4<f32>) -> Result<Vec<f32>>;
}
