//! Background removal and grid tiling for photo booth pose strips.
//!
//! Single-image matting runs
//! decode → [`tensor::encode`] → [`SegmentationModel::infer`] → [`refine::refine`]
//! → [`remap::remap`] → [`feather::feather`] → [`compositor::compose`] → PNG.
//! Multi-pose rounds pack reference images with [`compose_grid`], hand the
//! canvas to an external generator, then cut and matte its answer with
//! [`BackgroundRemover::remove_background_split_panels`].

pub mod compositor;
pub mod config;
pub mod data_url;
pub mod errors;
pub mod feather;
pub mod grid;
pub mod model;
pub mod pipeline;
pub mod raster;
pub mod refine;
pub mod remap;
pub mod semaphore;
pub mod tensor;
pub mod traits;

pub mod mocks;

pub use config::MattingConfig;
pub use errors::{MatteError, Result};
pub use grid::{GridLayout, PanelRect};
pub use model::{Model, ModelCache, ModelHandle, ModelOptions};
pub use pipeline::{compose_grid, BackgroundRemover, Panel, PanelSplit};
pub use raster::RasterImage;
pub use tensor::Mask;
pub use traits::*;
