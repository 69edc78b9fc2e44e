//! Transform pipeline orchestration
//!
//! Runs the post-capture chain on a finished recording: crop to a square,
//! resize to the target, then hand the result to the persistence sink.
//! Each stage reads the file the previous one produced and writes a fresh
//! file of its own. Intermediate files are left in the work directory.

use super::geometry::{LayerPlan, TransformSpec};
use super::persistence::PersistenceSink;
use super::types::{
    ExportError, ExportJob, ExportProgress, PipelineError, Size, TransformStage, VideoTrackInfo,
};
use crate::utils::paths::unique_movie_path;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Media backend for the transform stages.
#[async_trait]
pub trait MediaExporter: Send + Sync {
    /// Read the first video track's metadata
    async fn probe(&self, path: &Path) -> Result<VideoTrackInfo, ExportError>;

    /// Render `job.input` through `job.plan` into `job.output`
    async fn export(&self, job: &ExportJob) -> Result<(), ExportError>;
}

/// Files produced by a pipeline run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOutput {
    pub raw: PathBuf,
    pub cropped: PathBuf,
    pub final_path: PathBuf,
    /// Where the persistence sink stored the clip, if it accepted it
    pub saved: Option<PathBuf>,
}

/// Crop, resize and persist a recording
pub struct TransformPipeline {
    exporter: Arc<dyn MediaExporter>,
    sink: Arc<dyn PersistenceSink>,
    spec: TransformSpec,
    work_dir: PathBuf,
}

impl TransformPipeline {
    pub fn new(
        exporter: Arc<dyn MediaExporter>,
        sink: Arc<dyn PersistenceSink>,
        spec: TransformSpec,
        work_dir: PathBuf,
    ) -> Self {
        Self {
            exporter,
            sink,
            spec,
            work_dir,
        }
    }

    pub fn spec(&self) -> &TransformSpec {
        &self.spec
    }

    /// Run both stages and persist the result.
    ///
    /// The resize stage only starts once cropping succeeded, and the sink is
    /// only consulted after resizing succeeded. A persistence failure is
    /// logged and does not fail the run.
    pub async fn run<F>(&self, raw: &Path, progress: F) -> Result<PipelineOutput, PipelineError>
    where
        F: Fn(ExportProgress) + Send + Sync,
    {
        tracing::info!("Starting transform pipeline for {:?}", raw);
        progress(ExportProgress::preparing());

        progress(ExportProgress::cropping());
        let cropped = match self.crop_to_square(raw).await {
            Ok(path) => path,
            Err(e) => {
                tracing::error!("Transform pipeline failed: {}", e);
                progress(ExportProgress::error(e.to_string()));
                return Err(e);
            }
        };

        progress(ExportProgress::resizing());
        let final_path = match self.resize(&cropped).await {
            Ok(path) => path,
            Err(e) => {
                tracing::error!("Transform pipeline failed: {}", e);
                progress(ExportProgress::error(e.to_string()));
                return Err(e);
            }
        };

        progress(ExportProgress::saving());
        let saved = self.persist(&final_path).await;

        progress(ExportProgress::complete());
        tracing::info!("Transform pipeline finished: {:?}", final_path);

        Ok(PipelineOutput {
            raw: raw.to_path_buf(),
            cropped,
            final_path,
            saved,
        })
    }

    /// Stage 1: rotate the landscape capture upright and centre-crop it to a
    /// square whose side is the capture height.
    pub async fn crop_to_square(&self, input: &Path) -> Result<PathBuf, PipelineError> {
        let stage = TransformStage::Crop;
        let natural = self.probe(stage, input).await?;

        if natural.height > natural.width {
            tracing::warn!(
                "Crop stage got a portrait track ({}); output will be letterboxed",
                natural
            );
        }

        let plan = LayerPlan::crop_to_square(natural);
        self.run_stage(stage, input, natural, plan).await
    }

    /// Stage 2: scale the square clip to the target resolution.
    pub async fn resize(&self, input: &Path) -> Result<PathBuf, PipelineError> {
        let stage = TransformStage::Resize;
        let natural = self.probe(stage, input).await?;
        let plan = LayerPlan::resize(natural, self.spec.resize_target);
        self.run_stage(stage, input, natural, plan).await
    }

    async fn probe(&self, stage: TransformStage, input: &Path) -> Result<Size, PipelineError> {
        let info = self
            .exporter
            .probe(input)
            .await
            .map_err(|e| PipelineError::new(stage, e))?;
        Ok(info.natural_size())
    }

    async fn run_stage(
        &self,
        stage: TransformStage,
        input: &Path,
        source: Size,
        plan: LayerPlan,
    ) -> Result<PathBuf, PipelineError> {
        tokio::fs::create_dir_all(&self.work_dir)
            .await
            .map_err(|e| PipelineError::new(stage, e.into()))?;

        let job = ExportJob {
            stage,
            input: input.to_path_buf(),
            output: unique_movie_path(&self.work_dir),
            source,
            plan,
            max_duration_secs: self.spec.max_duration_secs,
            frame_rate: self.spec.frame_rate,
            preset: self.spec.preset,
        };

        tracing::debug!(
            "{} stage: {} -> {} ({:?} -> {:?})",
            stage,
            source,
            job.plan.render_size,
            job.input,
            job.output
        );

        self.exporter
            .export(&job)
            .await
            .map_err(|e| PipelineError::new(stage, e))?;

        Ok(job.output)
    }

    async fn persist(&self, path: &Path) -> Option<PathBuf> {
        if !self.sink.is_compatible(path).await {
            tracing::error!("Persistence sink rejected {:?}: incompatible file", path);
            return None;
        }

        match self.sink.save(path).await {
            Ok(saved) => Some(saved.path),
            Err(e) => {
                tracing::error!("Failed to save {:?}: {}", path, e);
                None
            }
        }
    }
}
