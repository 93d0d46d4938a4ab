use std::path::PathBuf;
use thiserror::Error;

/// Structured error types for the matting pipeline and grid tiler.
///
/// Every failure is reported synchronously to the immediate caller. Nothing in
/// the crate retries: configuration errors (missing model, broken model
/// contract) stay broken on retry, and data errors reproduce deterministically.
#[derive(Error, Debug)]
pub enum MatteError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Invalid image: {reason}")]
    InvalidImage { reason: String },

    #[error("Unsupported format: {channels} channel(s), expected 3 (RGB) or 4 (RGBA)")]
    UnsupportedFormat { channels: u8 },

    #[error("Model file not found: {path:?}")]
    ModelNotFound { path: PathBuf },

    #[error("Model contract violated: {reason}")]
    ModelContract { reason: String },

    #[error("Model error: {operation} failed")]
    Model {
        operation: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Invalid grid geometry: {reason}")]
    InvalidGridGeometry { reason: String },

    #[error("Encode error: {operation} failed")]
    Encode {
        operation: String,
        #[source]
        source: image::ImageError,
    },

    #[error("Invalid data URL: {reason}")]
    DataUrl { reason: String },
}

pub type Result<T> = std::result::Result<T, MatteError>;

impl MatteError {
    pub(crate) fn invalid_image(reason: impl Into<String>) -> Self {
        Self::InvalidImage {
            reason: reason.into(),
        }
    }

    pub(crate) fn contract(reason: impl Into<String>) -> Self {
        Self::ModelContract {
            reason: reason.into(),
        }
    }

    pub(crate) fn grid(reason: impl Into<String>) -> Self {
        Self::InvalidGridGeometry {
            reason: reason.into(),
        }
    }
}

/// Convert ONNX Runtime errors to model errors.
///
/// Call sites that know which step failed build `MatteError::Model` with that
/// operation directly; this covers the remaining `?` sites.
impl From<ort::Error> for MatteError {
    fn from(err: ort::Error) -> Self {
        Self::Model {
            operation: "ort operation".to_string(),
            source: Box::new(err),
        }
    }
}

/// Decoding failures surface as invalid images; encode paths wrap
/// `image::ImageError` in `MatteError::Encode` themselves.
impl From<image::ImageError> for MatteError {
    fn from(err: image::ImageError) -> Self {
        Self::InvalidImage {
            reason: err.to_string(),
        }
    }
}

impl From<base64::DecodeError> for MatteError {
    fn from(err: base64::DecodeError) -> Self {
        Self::DataUrl {
            reason: err.to_string(),
        }
    }
}
