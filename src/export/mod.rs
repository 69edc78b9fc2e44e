//! Post-capture transform
//!
//! Turns a finished recording into the final clip: crop to a square, resize
//! to the target resolution, then persist.

pub mod ffmpeg;
pub mod geometry;
pub mod persistence;
pub mod pipeline;
pub mod types;

pub use ffmpeg::FfmpegExporter;
pub use geometry::{AffineTransform, LayerPlan, TransformSpec};
pub use persistence::{LibrarySink, PersistenceSink, SavedClip};
pub use pipeline::{MediaExporter, PipelineOutput, TransformPipeline};
pub use types::{
    EncoderPreset, ExportError, ExportJob, ExportProgress, ExportStage, PersistenceError,
    PipelineError, Size, TransformStage, VideoTrackInfo,
};
