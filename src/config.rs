use clap::Args;
use std::path::PathBuf;
use std::thread;

use crate::errors::{MatteError, Result};

/// Tunables recognised by the matting core.
///
/// `mask_threshold`, `mask_gamma` and `feather_radius` were tuned by eye on
/// portrait photos; they are defaults, not derived constants.
#[derive(Args, Clone, Debug)]
pub struct MattingConfig {
    #[arg(short, long)]
    pub model_path: PathBuf,

    /// Square input size used when the model reports dynamic spatial dims
    #[arg(long, default_value_t = 1024)]
    pub model_input_size: u32,

    #[arg(long, default_value_t = 0.4)]
    pub mask_threshold: f32,

    #[arg(long, default_value_t = 0.8)]
    pub mask_gamma: f32,

    #[arg(long, default_value_t = 2)]
    pub feather_radius: u32,

    /// 0 (fastest) ..= 9 (smallest)
    #[arg(long, default_value_t = 6)]
    pub png_compression_level: u8,

    #[arg(long)]
    pub adaptive_filtering: bool,

    /// Upper bound on inferences running at the same time
    #[arg(long, default_value_t = default_parallelism())]
    pub max_concurrent_inferences: usize,

    /// ONNX Runtime intra-op threads per session (0 lets the runtime decide)
    #[arg(long, default_value_t = 0)]
    pub intra_threads: usize,

    /// Run one blank inference right after the model is loaded
    #[arg(long)]
    pub warm_up: bool,
}

impl Default for MattingConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("models/rmbg-1.4-quantized.onnx"),
            model_input_size: 1024,
            mask_threshold: 0.4,
            mask_gamma: 0.8,
            feather_radius: 2,
            png_compression_level: 6,
            adaptive_filtering: false,
            max_concurrent_inferences: default_parallelism(),
            intra_threads: 0,
            warm_up: false,
        }
    }
}

impl MattingConfig {
    pub fn with_model_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.model_path = path.into();
        self
    }

    pub const fn with_max_concurrent_inferences(mut self, permits: usize) -> Self {
        self.max_concurrent_inferences = permits;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.mask_threshold) {
            return Err(configuration(format!(
                "mask_threshold must be within [0, 1], got {}",
                self.mask_threshold
            )));
        }
        if !(self.mask_gamma.is_finite() && self.mask_gamma > 0.0) {
            return Err(configuration(format!(
                "mask_gamma must be a positive number, got {}",
                self.mask_gamma
            )));
        }
        if self.png_compression_level > 9 {
            return Err(configuration(format!(
                "png_compression_level must be within 0..=9, got {}",
                self.png_compression_level
            )));
        }
        if self.model_input_size == 0 {
            return Err(configuration("model_input_size must be non-zero"));
        }
        if self.max_concurrent_inferences == 0 {
            return Err(configuration("max_concurrent_inferences must be non-zero"));
        }
        Ok(())
    }
}

fn configuration(message: impl Into<String>) -> MatteError {
    MatteError::Configuration {
        message: message.into(),
    }
}

fn default_parallelism() -> usize {
    thread::available_parallelism().map_or(1, |n| n.get())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_deployment() {
        let config = MattingConfig::default();
        assert_eq!(config.model_input_size, 1024);
        assert_eq!(config.mask_threshold, 0.4);
        assert_eq!(config.mask_gamma, 0.8);
        assert_eq!(config.feather_radius, 2);
        assert_eq!(config.png_compression_level, 6);
        assert!(config.max_concurrent_inferences >= 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_out_of_range_values() {
        let cases = [
            MattingConfig {
                mask_threshold: 1.5,
                ..MattingConfig::default()
            },
            MattingConfig {
                mask_gamma: 0.0,
                ..MattingConfig::default()
            },
            MattingConfig {
                png_compression_level: 10,
                ..MattingConfig::default()
            },
            MattingConfig {
                model_input_size: 0,
                ..MattingConfig::default()
            },
            MattingConfig::default().with_max_concurrent_inferences(0),
        ];

        for config in cases {
            assert!(matches!(
                config.validate(),
                Err(MatteError::Configuration { .. })
            ));
        }
    }
}
