use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
    sync::atomic::{AtomicUsize, Ordering},
    thread,
};

use anyhow::{bail, ensure, Context, Result};
use booth_matte::{
    compose_grid, BackgroundRemover, MattingConfig, Model, ModelCache, PanelSplit,
};
use clap::{Parser, Subcommand};
use image::ImageFormat;
use indicatif::{ParallelProgressIterator, ProgressBar, ProgressStyle};
use rayon::{prelude::*, ThreadPoolBuilder};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Log per-stage timings
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Remove the background of every image under a directory
    Remove {
        input_dir: PathBuf,

        #[arg(default_value = "output")]
        output_dir: PathBuf,

        /// Cut each image into ROWSxCOLS panels before matting, e.g. 2x2
        #[arg(long)]
        split: Option<GridSpec>,

        #[arg(short = 'j', long, default_value_t = thread::available_parallelism().map_or(1, |n| n.get()))]
        num_threads: usize,

        #[command(flatten)]
        matting: MattingConfig,
    },
    /// Pack images into one grid PNG, row-major
    Compose {
        #[arg(required = true)]
        images: Vec<PathBuf>,

        #[arg(short, long)]
        output: PathBuf,

        #[arg(long, default_value_t = 2)]
        rows: u32,

        #[arg(long, default_value_t = 2)]
        cols: u32,

        #[arg(long, default_value_t = 512)]
        cell_size: u32,
    },
}

#[derive(Clone, Copy, Debug)]
struct GridSpec {
    rows: u32,
    cols: u32,
}

impl FromStr for GridSpec {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (rows, cols) = s
            .split_once(['x', 'X'])
            .ok_or_else(|| format!("`{s}` is not ROWSxCOLS"))?;
        let parse = |v: &str| {
            v.trim()
                .parse::<u32>()
                .ok()
                .filter(|&n| n > 0)
                .ok_or_else(|| format!("`{v}` is not a positive integer"))
        };
        Ok(Self {
            rows: parse(rows)?,
            cols: parse(cols)?,
        })
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .init();

    match cli.command {
        Command::Remove {
            input_dir,
            output_dir,
            split,
            num_threads,
            matting,
        } => remove(&input_dir, &output_dir, split, num_threads, &matting),
        Command::Compose {
            images,
            output,
            rows,
            cols,
            cell_size,
        } => compose(&images, &output, rows, cols, cell_size),
    }
}

fn remove(
    input_dir: &Path,
    output_dir: &Path,
    split: Option<GridSpec>,
    num_threads: usize,
    matting: &MattingConfig,
) -> Result<()> {
    ensure!(input_dir.exists(), "Input directory does not exist");

    ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .build_global()?;

    let cache: ModelCache<Model> = ModelCache::new();
    let remover = BackgroundRemover::with_onnx_model(&cache, matting)
        .context("Failed to initialise background remover")?;

    let split = split.map_or(PanelSplit::None, |g| PanelSplit::Grid {
        rows: g.rows,
        cols: g.cols,
    });

    let image_paths = WalkDir::new(input_dir)
        .into_iter()
        .filter_map(std::result::Result::ok)
        .filter(|e| e.file_type().is_file())
        .filter(|e| ImageFormat::from_path(e.path()).is_ok())
        .map(|e| e.into_path())
        .collect::<Vec<_>>();

    if image_paths.is_empty() {
        tracing::warn!(dir = %input_dir.display(), "no images found");
        return Ok(());
    }

    let progress_bar = ProgressBar::new(image_paths.len() as u64);
    progress_bar.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{elapsed}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec} {eta})",
        )?
        .progress_chars("#>-"),
    );

    let failures = AtomicUsize::new(0);
    image_paths
        .par_iter()
        .progress_with(progress_bar.clone())
        .for_each(|path| {
            if let Err(e) = process_file(&remover, path, input_dir, output_dir, split) {
                failures.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(path = %path.display(), "{e:#}");
            }
        });

    progress_bar.finish();

    let failures = failures.into_inner();
    if failures > 0 {
        bail!("{failures} of {} images failed", image_paths.len());
    }
    Ok(())
}

fn process_file(
    remover: &BackgroundRemover<Model>,
    path: &Path,
    input_dir: &Path,
    output_dir: &Path,
    split: PanelSplit,
) -> Result<()> {
    let bytes =
        fs::read(path).with_context(|| format!("Failed to read image: {}", path.display()))?;
    let pngs = remover
        .process(&bytes, split)
        .with_context(|| format!("Failed to process image: {}", path.display()))?;

    let relative = path.strip_prefix(input_dir)?;
    let target = output_dir.join(relative);

    let outputs: Vec<(PathBuf, Vec<u8>)> = match split {
        PanelSplit::None => pngs
            .into_iter()
            .map(|png| (target.with_extension("png"), png))
            .collect(),
        PanelSplit::Grid { .. } => {
            let dir = target.with_extension("");
            pngs.into_iter()
                .enumerate()
                .map(|(i, png)| (dir.join(format!("panel-{}.png", i + 1)), png))
                .collect()
        }
    };

    for (output_path, png) in outputs {
        if let Some(parent) = output_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&output_path, png)
            .with_context(|| format!("Failed to save image: {}", output_path.display()))?;
    }
    Ok(())
}

fn compose(images: &[PathBuf], output: &Path, rows: u32, cols: u32, cell_size: u32) -> Result<()> {
    let bytes = images
        .iter()
        .map(|path| {
            fs::read(path).with_context(|| format!("Failed to read image: {}", path.display()))
        })
        .collect::<Result<Vec<_>>>()?;

    let png = compose_grid(&bytes, rows, cols, cell_size).context("Failed to compose grid")?;
    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(output, png)
        .with_context(|| format!("Failed to save image: {}", output.display()))?;

    tracing::info!(
        images = images.len(),
        rows,
        cols,
        cell_size,
        output = %output.display(),
        "grid composed"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_spec_parsing() {
        let spec: GridSpec = "2x3".parse().unwrap();
        assert_eq!((spec.rows, spec.cols), (2, 3));
        let spec: GridSpec = "4X1".parse().unwrap();
        assert_eq!((spec.rows, spec.cols), (4, 1));

        assert!("2".parse::<GridSpec>().is_err());
        assert!("0x2".parse::<GridSpec>().is_err());
        assert!("ax2".parse::<GridSpec>().is_err());
    }

    #[test]
    fn test_cli_definition() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
