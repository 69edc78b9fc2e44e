//! Error types and handling
//!
//! Application-level error type that the CLI commands report. Each layer
//! keeps its own error enum; this one wraps them at the edge.

use crate::capture::CaptureError;
use crate::config::ConfigError;
use crate::export::{PersistenceError, PipelineError};
use crate::recorder::RecordingError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Capture error: {0}")]
    Capture(#[from] CaptureError),

    #[error("Recording error: {0}")]
    Recording(#[from] RecordingError),

    #[error("Transform error: {0}")]
    Transform(#[from] PipelineError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),
}

impl AppError {
    /// Whether the process cannot continue after this error.
    ///
    /// Only configuration problems and capture graph failures at start-up are
    /// fatal; everything else degrades back to an idle recorder.
    pub fn is_fatal(&self) -> bool {
        match self {
            AppError::Config(_) => true,
            AppError::Capture(e) => e.is_configuration(),
            _ => false,
        }
    }
}

/// Serializable error summary for status output
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

impl From<AppError> for ErrorResponse {
    fn from(error: AppError) -> Self {
        let code = match &error {
            AppError::Io(_) => "IO_ERROR",
            AppError::Config(_) => "CONFIG_ERROR",
            AppError::Capture(_) => "CAPTURE_ERROR",
            AppError::Recording(_) => "RECORDING_ERROR",
            AppError::Transform(_) => "TRANSFORM_ERROR",
            AppError::Persistence(_) => "PERSISTENCE_ERROR",
        };

        ErrorResponse {
            code: code.to_string(),
            message: error.to_string(),
        }
    }
}
