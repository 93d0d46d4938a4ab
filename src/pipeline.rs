use std::sync::Arc;
use std::time::Instant;

use image::RgbaImage;
use rayon::prelude::*;

use crate::{
    compositor::{self, PngOptions},
    config::MattingConfig,
    data_url,
    errors::{MatteError, Result},
    feather, grid,
    model::{ModelCache, ModelHandle, ModelOptions},
    raster::RasterImage,
    refine::{self, RefineParams},
    remap,
    semaphore::Semaphore,
    tensor,
    traits::SegmentationModel,
};

/// Whether a request is matted whole or cut into grid panels first.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PanelSplit {
    None,
    Grid { rows: u32, cols: u32 },
}

/// One matted panel of a split request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Panel {
    /// 1-based, row-major.
    pub index: usize,
    pub png: Vec<u8>,
}

impl Panel {
    pub fn filename(&self) -> String {
        format!("panel-{}.png", self.index)
    }

    pub fn to_data_url(&self) -> String {
        data_url::encode_png(&self.png)
    }
}

/// Background-removal service: owns the model handle, the tuning parameters
/// and the bound on concurrent inferences.
pub struct BackgroundRemover<M: SegmentationModel> {
    model: Arc<M>,
    refine: RefineParams,
    feather_radius: u32,
    png: PngOptions,
    inference_permits: Semaphore,
}

impl<M: SegmentationModel> BackgroundRemover<M> {
    pub fn new(model: Arc<M>, config: &MattingConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            model,
            refine: RefineParams::from(config),
            feather_radius: config.feather_radius,
            png: PngOptions::from(config),
            inference_permits: Semaphore::new(config.max_concurrent_inferences),
        })
    }

    pub fn model(&self) -> &Arc<M> {
        &self.model
    }

    pub const fn inference_permits(&self) -> &Semaphore {
        &self.inference_permits
    }

    /// Runs the full matting pipeline on a decoded image and returns the
    /// RGBA result at the image's native resolution.
    pub fn matte(&self, image: &RasterImage) -> Result<RgbaImage> {
        let started = Instant::now();
        let size = self.model.input_size();
        let (width, height) = image.dimensions();

        let input = tensor::encode(image, size)?;
        let preprocess_ms = started.elapsed().as_millis() as u64;

        let inference_started = Instant::now();
        let raw = {
            let _permit = self.inference_permits.acquire();
            self.model.infer(input.view())?
        };
        let inference_ms = inference_started.elapsed().as_millis() as u64;

        let mask = refine::refine(&tensor::decode(raw, size)?, self.refine);
        let alpha = remap::remap(&mask, width, height)?;
        let alpha = feather::feather(&alpha, self.feather_radius);
        let matted = compositor::compose(image, &alpha)?;

        tracing::debug!(
            width,
            height,
            preprocess_ms,
            inference_ms,
            total_ms = started.elapsed().as_millis() as u64,
            "matte finished"
        );
        Ok(matted)
    }

    fn matte_to_png(&self, image: &RasterImage) -> Result<Vec<u8>> {
        let matted = self.matte(image)?;
        let encode_started = Instant::now();
        let png = compositor::encode_png(&matted, &self.png)?;
        tracing::debug!(
            encode_ms = encode_started.elapsed().as_millis() as u64,
            bytes = png.len(),
            "png encoded"
        );
        Ok(png)
    }

    /// Matting for one encoded image, optionally split into grid panels
    /// first. Panels are returned row-major.
    pub fn process(&self, image_bytes: &[u8], split: PanelSplit) -> Result<Vec<Vec<u8>>> {
        let image = RasterImage::decode(image_bytes)?;
        match split {
            PanelSplit::None => Ok(vec![self.matte_to_png(&image)?]),
            PanelSplit::Grid { rows, cols } => {
                tracing::info!(
                    width = image.width(),
                    height = image.height(),
                    rows,
                    cols,
                    "splitting image into panels"
                );
                grid::split(&image, rows, cols)?
                    .par_iter()
                    .map(|panel| self.matte_to_png(panel))
                    .collect()
            }
        }
    }

    pub fn remove_background(&self, image_bytes: &[u8]) -> Result<Vec<u8>> {
        let started = Instant::now();
        let png = self
            .process(image_bytes, PanelSplit::None)?
            .into_iter()
            .next()
            .unwrap_or_default();
        tracing::info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            "background removed"
        );
        Ok(png)
    }

    /// Data-URL in, data-URL out: the form the web layer posts panels in.
    pub fn remove_background_data_url(&self, url: &str) -> Result<String> {
        let (mime, bytes) = data_url::decode(url)?;
        if !mime.starts_with("image/") {
            return Err(MatteError::DataUrl {
                reason: format!("`{mime}` is not an image type"),
            });
        }
        Ok(data_url::encode_png(&self.remove_background(&bytes)?))
    }

    pub fn remove_background_split_panels(
        &self,
        image_bytes: &[u8],
        rows: u32,
        cols: u32,
    ) -> Result<Vec<Vec<u8>>> {
        let started = Instant::now();
        let panels = self.process(image_bytes, PanelSplit::Grid { rows, cols })?;
        tracing::info!(
            panels = panels.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "panels processed"
        );
        Ok(panels)
    }

    /// Same as [`Self::remove_background_split_panels`] with 1-based indices
    /// attached for the response payload.
    pub fn split_panels(&self, image_bytes: &[u8], rows: u32, cols: u32) -> Result<Vec<Panel>> {
        Ok(self
            .remove_background_split_panels(image_bytes, rows, cols)?
            .into_iter()
            .enumerate()
            .map(|(i, png)| Panel { index: i + 1, png })
            .collect())
    }
}

impl BackgroundRemover<crate::model::Model> {
    /// Loads the configured model through `cache`, reusing it if another
    /// remover already did.
    pub fn with_onnx_model(cache: &ModelCache, config: &MattingConfig) -> Result<Self> {
        let handle: ModelHandle =
            cache.load_once(&config.model_path, &ModelOptions::from(config))?;
        if handle.concurrency() < config.max_concurrent_inferences {
            tracing::warn!(
                sessions = handle.concurrency(),
                requested = config.max_concurrent_inferences,
                "cached model has fewer sessions than inference permits"
            );
        }
        Self::new(handle, config)
    }
}

/// Packs encoded images into one `rows x cols` PNG, each cover-fitted into a
/// `cell_size` square.
pub fn compose_grid<B: AsRef<[u8]>>(
    images: &[B],
    rows: u32,
    cols: u32,
    cell_size: u32,
) -> Result<Vec<u8>> {
    let decoded = images
        .iter()
        .map(|bytes| RasterImage::decode(bytes.as_ref()))
        .collect::<Result<Vec<_>>>()?;
    let canvas = grid::compose(&decoded, rows, cols, cell_size)?;
    compositor::encode_raster_png(&canvas, &PngOptions::default())
}
