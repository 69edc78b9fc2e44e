//! CLI command handlers
//!
//! # Commands
//! - `record`: interactive camera recording with automatic crop and resize
//! - `transform`: run the crop and resize stages on an existing movie

pub mod export;
pub mod recording;

pub use export::{handle_transform, TransformOptions};
pub use recording::{handle_record, RecordOptions};

use crate::config::{CaptureConfig, ConfigError};
use crate::export::{FfmpegExporter, LibrarySink, TransformPipeline, TransformSpec};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Load the configuration file and apply command line overrides
pub fn load_config(
    path: Option<&Path>,
    max_duration: Option<u32>,
    library: Option<PathBuf>,
) -> Result<CaptureConfig, ConfigError> {
    let mut config = CaptureConfig::load(path)?;

    if let Some(max_duration) = max_duration {
        config.max_duration_secs = max_duration;
    }
    if let Some(library) = library {
        config.library_dir = library;
    }

    config.validate()?;
    Ok(config)
}

/// Pipeline backed by ffmpeg that saves into the configured library
pub fn build_pipeline(config: &CaptureConfig) -> TransformPipeline {
    TransformPipeline::new(
        Arc::new(FfmpegExporter::new()),
        Arc::new(LibrarySink::new(config.library_dir.clone())),
        TransformSpec::from_config(config),
        config.temp_dir.clone(),
    )
}
