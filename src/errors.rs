use std::path::PathBuf;
use thiserror::Error;

type BoxedSource = Box<dyn std::error::Error + Send + Sync>;

/// Structured error types for background removal.
///
/// Only [`RembgError::Model`] is treated as fatal by the processing entry points.
/// Every other variant describes a single image and is turned into a failed
/// outcome by the caller instead of aborting the run.
#[derive(Error, Debug)]
pub enum RembgError {
    #[error("Filesystem error: {operation} failed for {path:?}")]
    FileSystem {
        path: PathBuf,
        operation: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Image processing error: {operation} failed (source: {path})")]
    ImageProcessing {
        path: String,
        operation: String,
        #[source]
        source: BoxedSource,
    },

    #[error("Download error: {url}: {reason}")]
    Download { url: String, reason: String },

    #[error("Model error: {operation} failed")]
    Model {
        operation: String,
        #[source]
        source: BoxedSource,
    },

    #[error("Pipeline error: {reason}")]
    Pipeline { reason: String },
}

impl RembgError {
    pub fn model(operation: impl Into<String>, source: impl Into<BoxedSource>) -> Self {
        Self::Model {
            operation: operation.into(),
            source: source.into(),
        }
    }

    /// Whether the error must abort the whole run.
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Model { .. })
    }
}

pub type Result<T> = std::result::Result<T, RembgError>;

/// Fallback for I/O errors raised without path context.
///
/// Code that knows the path should construct [`RembgError::FileSystem`] directly.
impl From<std::io::Error> for RembgError {
    fn from(err: std::io::Error) -> Self {
        Self::FileSystem {
            path: PathBuf::from("unknown"),
            operation: "unknown".to_string(),
            source: err,
        }
    }
}

impl From<image::ImageError> for RembgError {
    fn from(err: image::ImageError) -> Self {
        Self::ImageProcessing {
            path: "unknown".to_string(),
            operation: "image processing".to_string(),
            source: Box::new(err),
        }
    }
}

impl From<reqwest::Error> for RembgError {
    fn from(err: reqwest::Error) -> Self {
        let url = err
            .url()
            .map_or_else(|| "unknown".to_string(), ToString::to_string);
        let reason = if err.is_timeout() {
            format!("request timed out: {err}")
        } else if err.is_connect() {
            format!("connection failed: {err}")
        } else {
            format!("request failed: {err}")
        };
        Self::Download { url, reason }
    }
}

impl From<ort::Error> for RembgError {
    fn from(err: ort::Error) -> Self {
        Self::model("ort operation", err)
    }
}

impl From<hf_hub::api::sync::ApiError> for RembgError {
    fn from(err: hf_hub::api::sync::ApiError) -> Self {
        Self::model("model download", err)
    }
}

/// Shape errors come out of tensor handling around inference, so they are
/// reported against the pipeline rather than as a separate category.
impl From<ndarray::ShapeError> for RembgError {
    fn from(err: ndarray::ShapeError) -> Self {
        Self::Pipeline {
            reason: format!("tensor shape conversion: {err}"),
        }
    }
}
