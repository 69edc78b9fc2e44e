//! Transform command handler
//!
//! Runs the crop and resize stages on a movie that is already on disk.

use super::{build_pipeline, load_config};
use crate::utils::AppError;
use std::path::PathBuf;

/// Options for `squarecam transform`
#[derive(Debug, Clone)]
pub struct TransformOptions {
    pub input: PathBuf,
    pub config: Option<PathBuf>,
    pub library: Option<PathBuf>,
}

pub async fn handle_transform(options: TransformOptions) -> anyhow::Result<()> {
    let config =
        load_config(options.config.as_deref(), None, options.library).map_err(AppError::from)?;

    if !options.input.is_file() {
        anyhow::bail!("Input file not found: {}", options.input.display());
    }

    tracing::info!("Transforming {:?}", options.input);

    let pipeline = build_pipeline(&config);
    let output = pipeline
        .run(&options.input, |progress| {
            tracing::info!("Transform progress: {:?} ({:.0}%)", progress.stage, progress.percent);
        })
        .await
        .map_err(AppError::from)?;

    println!("Cropped: {}", output.cropped.display());
    println!("Final:   {}", output.final_path.display());
    match output.saved {
        Some(saved) => println!("Saved:   {}", saved.display()),
        None => println!("Saved:   (persistence failed, see log)"),
    }
    Ok(())
}
