//! Capture error types

use super::traits::{CameraPosition, MediaKind};
use thiserror::Error;

/// Failures acquiring a capture device
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("No {kind} device available{}", position_suffix(.position))]
    NotFound {
        kind: MediaKind,
        position: Option<CameraPosition>,
    },

    #[error("Device busy: {0}")]
    Busy(String),

    #[error("Device error: {0}")]
    Other(String),
}

fn position_suffix(position: &Option<CameraPosition>) -> String {
    match position {
        Some(p) => format!(" for {} camera", p),
        None => String::new(),
    }
}

/// Capture graph and recording errors
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error("Capture graph configuration failed: {0}")]
    Configuration(String),

    #[error("No video input configured")]
    NoVideoInput,

    #[error("Insufficient storage: {available} bytes free, {required} required")]
    InsufficientStorage { available: u64, required: u64 },

    #[error("A recording is already in progress")]
    AlreadyRecording,

    #[error("Recording failed: {0}")]
    Sink(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CaptureError {
    /// Errors that prevent the capture graph from being built at all
    pub fn is_configuration(&self) -> bool {
        matches!(self, CaptureError::Device(_) | CaptureError::Configuration(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_message_names_position() {
        let err = DeviceError::NotFound {
            kind: MediaKind::Video,
            position: Some(CameraPosition::Back),
        };
        assert_eq!(err.to_string(), "No video device available for back camera");

        let err = DeviceError::NotFound {
            kind: MediaKind::Audio,
            position: None,
        };
        assert_eq!(err.to_string(), "No audio device available");
    }
}
