use std::{
    path::Path,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Instant,
};

use ndarray::prelude::*;
use once_cell::sync::OnceCell;
use ort::{
    session::{builder::GraphOptimizationLevel, Session},
    value::TensorRef,
};
use parking_lot::{Mutex, MutexGuard};

use crate::{
    config::MattingConfig,
    errors::{MatteError, Result},
    traits::SegmentationModel,
};

/// Shared, read-only handle to a loaded model.
pub type ModelHandle = Arc<Model>;

#[derive(Clone, Debug)]
pub struct ModelOptions {
    /// Used when the model declares dynamic spatial dimensions.
    pub input_size: u32,
    pub intra_threads: usize,
    pub warm_up: bool,
    /// Number of independent sessions, i.e. how many inferences can run at once.
    pub sessions: usize,
}

impl Default for ModelOptions {
    fn default() -> Self {
        Self {
            input_size: 1024,
            intra_threads: 0,
            warm_up: false,
            sessions: 1,
        }
    }
}

impl From<&MattingConfig> for ModelOptions {
    fn from(config: &MattingConfig) -> Self {
        Self {
            input_size: config.model_input_size,
            intra_threads: config.intra_threads,
            warm_up: config.warm_up,
            sessions: config.max_concurrent_inferences,
        }
    }
}

fn model_error<E>(operation: impl Into<String>) -> impl FnOnce(E) -> MatteError
where
    E: std::error::Error + Send + Sync + 'static,
{
    let operation = operation.into();
    move |e| MatteError::Model {
        operation,
        source: Box::new(e),
    }
}

/// Fixed set of independently locked slots.
///
/// `checkout` takes the first free slot, starting from a rotating index, and
/// only blocks when every slot is busy.
pub struct SessionPool<T> {
    slots: Vec<Mutex<T>>,
    next: AtomicUsize,
}

impl<T> SessionPool<T> {
    pub fn new(items: Vec<T>) -> Result<Self> {
        if items.is_empty() {
            return Err(MatteError::Configuration {
                message: "session pool needs at least one session".to_string(),
            });
        }
        Ok(Self {
            slots: items.into_iter().map(Mutex::new).collect(),
            next: AtomicUsize::new(0),
        })
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn checkout(&self) -> MutexGuard<'_, T> {
        let count = self.slots.len();
        let start = self.next.fetch_add(1, Ordering::Relaxed) % count;
        (0..count)
            .find_map(|i| self.slots[(start + i) % count].try_lock())
            .unwrap_or_else(|| self.slots[start].lock())
    }
}

/// ONNX Runtime sessions with their discovered input/output contract.
pub struct Model {
    input_size: u32,
    input_name: String,
    output_name: String,
    sessions: SessionPool<Session>,
}

fn build_session(model_path: &Path, options: &ModelOptions) -> Result<Session> {
    let mut builder = Session::builder()
        .map_err(model_error("session builder init"))?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(model_error("graph optimization level"))?;
    if options.intra_threads > 0 {
        builder = builder
            .with_intra_threads(options.intra_threads)
            .map_err(model_error("intra-op thread count"))?;
    }
    builder
        .commit_from_file(model_path)
        .map_err(model_error(format!(
            "load model file {}",
            model_path.display()
        )))
}

impl Model {
    /// Loads `options.sessions` sessions of the same model so that many
    /// inferences can run side by side.
    pub fn load(model_path: &Path, options: &ModelOptions) -> Result<Self> {
        if !model_path.is_file() {
            return Err(MatteError::ModelNotFound {
                path: model_path.to_path_buf(),
            });
        }
        if options.sessions == 0 {
            return Err(MatteError::Configuration {
                message: "model needs at least one session".to_string(),
            });
        }

        let started = Instant::now();
        let session = build_session(model_path, options)?;

        let (input_name, dims) = match session.inputs.as_slice() {
            [input] => {
                let dims: Vec<i64> = input
                    .input_type
                    .tensor_shape()
                    .ok_or_else(|| MatteError::contract("model input is not a tensor"))?
                    .iter()
                    .copied()
                    .collect();
                (input.name.clone(), dims)
            }
            inputs => {
                return Err(MatteError::contract(format!(
                    "expected exactly one model input, found {}",
                    inputs.len()
                )))
            }
        };
        let output_name = match session.outputs.as_slice() {
            [output] => output.name.clone(),
            outputs => {
                return Err(MatteError::contract(format!(
                    "expected exactly one model output, found {}",
                    outputs.len()
                )))
            }
        };
        let input_size = resolve_input_size(&dims, options.input_size)?;

        let mut sessions = Vec::with_capacity(options.sessions);
        sessions.push(session);
        for _ in 1..options.sessions {
            sessions.push(build_session(model_path, options)?);
        }

        tracing::info!(
            model = %model_path.display(),
            input = %input_name,
            output = %output_name,
            input_size,
            sessions = sessions.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "segmentation model loaded"
        );

        let model = Self {
            input_size,
            input_name,
            output_name,
            sessions: SessionPool::new(sessions)?,
        };

        if options.warm_up {
            let size = input_size as usize;
            let blank = Array4::<f32>::zeros((1, 3, size, size));
            for _ in 0..model.sessions.capacity() {
                model.run(blank.view())?;
            }
            tracing::debug!("warm-up inference finished");
        }

        Ok(model)
    }

    /// How many inferences this model can run at the same time.
    pub fn concurrency(&self) -> usize {
        self.sessions.capacity()
    }

    fn run(&self, tensor: ArrayView4<f32>) -> Result<Vec<f32>> {
        let size = self.input_size as usize;
        if tensor.shape() != [1, 3, size, size] {
            return Err(MatteError::contract(format!(
                "input tensor shape {:?}, model expects [1, 3, {size}, {size}]",
                tensor.shape()
            )));
        }

        let input = tensor.as_standard_layout();
        let mut session = self.sessions.checkout();
        let outputs = session
            .run(ort::inputs![
                self.input_name.as_str() => TensorRef::from_array_view(&input)?
            ])
            .map_err(model_error("inference"))?;
        let values: Vec<f32> = outputs[self.output_name.as_str()]
            .try_extract_array::<f32>()?
            .iter()
            .copied()
            .collect();

        if values.len() != size * size {
            return Err(MatteError::contract(format!(
                "model produced {} values, expected {}",
                values.len(),
                size * size
            )));
        }
        Ok(values)
    }
}

impl SegmentationModel for Model {
    fn input_size(&self) -> u32 {
        self.input_size
    }

    fn infer(&self, tensor: ArrayView4<f32>) -> Result<Vec<f32>> {
        self.run(tensor)
    }
}

/// Validates a declared `[N, C, H, W]` input shape and picks the square size.
///
/// Dynamic dimensions are reported as values `<= 0`; spatial ones fall back
/// to `fallback`.
fn resolve_input_size(dims: &[i64], fallback: u32) -> Result<u32> {
    let [batch, channels, height, width] = dims else {
        return Err(MatteError::contract(format!(
            "expected a rank-4 input, model declares {dims:?}"
        )));
    };
    if *batch > 1 {
        return Err(MatteError::contract(format!(
            "batch dimension must be 1, model declares {batch}"
        )));
    }
    if *channels > 0 && *channels != 3 {
        return Err(MatteError::contract(format!(
            "model expects {channels} input channels, only RGB is supported"
        )));
    }
    match (*height > 0, *width > 0) {
        (true, true) if height == width => Ok(*height as u32),
        (true, true) => Err(MatteError::contract(format!(
            "input must be square, model declares {height}x{width}"
        ))),
        (true, false) => Ok(*height as u32),
        (false, true) => Ok(*width as u32),
        (false, false) => Ok(fallback),
    }
}

/// Process-wide cache that constructs the model at most once.
///
/// Concurrent first calls block on the same initialisation; only one of them
/// runs the loader. A failed load leaves the cache empty.
pub struct ModelCache<M = Model> {
    cell: OnceCell<Arc<M>>,
}

impl<M> Default for ModelCache<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M> ModelCache<M> {
    pub const fn new() -> Self {
        Self {
            cell: OnceCell::new(),
        }
    }

    pub fn get(&self) -> Option<Arc<M>> {
        self.cell.get().cloned()
    }

    pub fn get_or_try_init(&self, init: impl FnOnce() -> Result<M>) -> Result<Arc<M>> {
        self.cell.get_or_try_init(|| init().map(Arc::new)).cloned()
    }
}

impl ModelCache<Model> {
    pub fn load_once(&self, model_path: &Path, options: &ModelOptions) -> Result<ModelHandle> {
        self.get_or_try_init(|| Model::load(model_path, options))
    }
}
