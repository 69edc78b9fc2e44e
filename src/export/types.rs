//! Export types and configuration
//!
//! Types shared by the transform stages: track metadata, encoder preset,
//! export jobs, progress reporting and errors.

use super::geometry::LayerPlan;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Pixel dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Metadata of the first video track of a movie
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoTrackInfo {
    /// Stored (pre-rotation) width
    pub width: u32,
    /// Stored (pre-rotation) height
    pub height: u32,
    pub fps: f64,
    pub duration_secs: f64,
    pub has_audio: bool,
}

impl VideoTrackInfo {
    /// Track dimensions ignoring any display rotation
    pub fn natural_size(&self) -> Size {
        Size::new(self.width, self.height)
    }
}

/// One of the two transform stages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransformStage {
    Crop,
    Resize,
}

impl fmt::Display for TransformStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransformStage::Crop => write!(f, "crop"),
            TransformStage::Resize => write!(f, "resize"),
        }
    }
}

/// Encoder settings for a stage export
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncoderPreset {
    /// H.264 constant rate factor (lower is better)
    pub crf: u8,
    /// x264 speed preset
    pub speed: &'static str,
    pub audio_bitrate: &'static str,
}

impl EncoderPreset {
    /// Highest quality export. CRF 1 is visually lossless; CRF 0 has
    /// compatibility issues with yuv420p output.
    pub const HIGHEST_QUALITY: EncoderPreset = EncoderPreset {
        crf: 1,
        speed: "veryslow",
        audio_bitrate: "192k",
    };
}

impl Default for EncoderPreset {
    fn default() -> Self {
        Self::HIGHEST_QUALITY
    }
}

/// A single stage export: read `input`, render through `plan`, write `output`
#[derive(Debug, Clone)]
pub struct ExportJob {
    pub stage: TransformStage,
    pub input: PathBuf,
    pub output: PathBuf,
    /// Natural size of the input track
    pub source: Size,
    pub plan: LayerPlan,
    /// Rendered time range starts at zero and lasts at most this long
    pub max_duration_secs: u32,
    pub frame_rate: u32,
    pub preset: EncoderPreset,
}

/// Pipeline progress stages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum ExportStage {
    /// Reading the captured file
    Preparing,
    /// Stage 1: crop to square
    Cropping,
    /// Stage 2: resize to target
    Resizing,
    /// Handing the result to the persistence sink
    Saving,
    /// Pipeline completed
    Complete,
    /// Pipeline aborted
    Error { message: String },
}

/// Pipeline progress information
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportProgress {
    /// Progress percentage (0.0 to 100.0)
    pub percent: f32,
    pub stage: ExportStage,
}

impl ExportProgress {
    pub fn preparing() -> Self {
        Self {
            percent: 0.0,
            stage: ExportStage::Preparing,
        }
    }

    pub fn cropping() -> Self {
        Self {
            percent: 5.0,
            stage: ExportStage::Cropping,
        }
    }

    pub fn resizing() -> Self {
        Self {
            percent: 50.0,
            stage: ExportStage::Resizing,
        }
    }

    pub fn saving() -> Self {
        Self {
            percent: 95.0,
            stage: ExportStage::Saving,
        }
    }

    pub fn complete() -> Self {
        Self {
            percent: 100.0,
            stage: ExportStage::Complete,
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            percent: 0.0,
            stage: ExportStage::Error { message },
        }
    }
}

/// Stage export errors
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("FFmpeg error: {0}")]
    Ffmpeg(String),

    #[error("Probe failed: {0}")]
    Probe(String),

    #[error("No video track in {0:?}")]
    NoVideoTrack(PathBuf),

    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),
}

/// A failed pipeline run. Files produced by earlier stages stay on disk.
#[derive(Error, Debug)]
#[error("{stage} stage failed: {source}")]
pub struct PipelineError {
    pub stage: TransformStage,
    #[source]
    pub source: ExportError,
}

impl PipelineError {
    pub fn new(stage: TransformStage, source: ExportError) -> Self {
        Self { stage, source }
    }
}

/// Persistence sink errors
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("File is not compatible with the library: {0:?}")]
    Incompatible(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_error_names_stage() {
        let err = PipelineError::new(TransformStage::Resize, ExportError::Ffmpeg("boom".into()));
        assert_eq!(err.to_string(), "resize stage failed: FFmpeg error: boom");
    }

    #[test]
    fn test_progress_serializes_tagged() {
        let json = serde_json::to_value(ExportProgress::error("bad".into())).unwrap();
        assert_eq!(json["stage"]["type"], "error");
        assert_eq!(json["stage"]["message"], "bad");
    }

    #[test]
    fn test_highest_quality_preset() {
        let preset = EncoderPreset::default();
        assert_eq!(preset.crf, 1);
        assert_eq!(preset.speed, "veryslow");
    }
}
