//! Capture session manager
//!
//! Owns the capture graph and the recording sink. Everything that touches the
//! graph goes through here, inside a configuration transaction.

use super::error::CaptureError;
use super::graph::CaptureGraph;
use super::traits::{
    CameraPosition, CaptureDeviceProvider, MediaKind, PreviewLayer, PreviewSurface,
    RecordingCallback, RecordingRequest, RecordingSink, Resolution, StorageProbe,
    VideoGravity, VideoOrientation,
};
use crate::config::CaptureConfig;
use crate::utils::paths::unique_movie_path;
use std::path::PathBuf;
use std::sync::{Arc, Weak};

/// Live capture session: inputs, preview and file recording
pub struct CaptureSession {
    provider: Arc<dyn CaptureDeviceProvider>,
    sink: Box<dyn RecordingSink>,
    storage: Arc<dyn StorageProbe>,
    preview: Weak<dyn PreviewSurface>,
    graph: CaptureGraph,
    temp_dir: PathBuf,
    min_free_disk_bytes: u64,
    resolution: Resolution,
    frame_rate: u32,
    stabilization: bool,
}

impl CaptureSession {
    /// Build the capture graph and start it.
    ///
    /// Acquires the default camera and (unless disabled) the microphone,
    /// attaches the preview and the recording output, and commits it all in
    /// one transaction. Any device failure here is a configuration error.
    pub async fn initialize(
        config: &CaptureConfig,
        provider: Arc<dyn CaptureDeviceProvider>,
        sink: Box<dyn RecordingSink>,
        storage: Arc<dyn StorageProbe>,
        preview: &Arc<dyn PreviewSurface>,
    ) -> Result<Self, CaptureError> {
        tracing::info!(
            "Initializing capture session ({} camera, audio: {})",
            config.default_position,
            config.capture_audio
        );

        let video = provider
            .acquire_input(MediaKind::Video, Some(config.default_position))
            .await?;
        let audio = if config.capture_audio {
            Some(provider.acquire_input(MediaKind::Audio, None).await?)
        } else {
            None
        };

        let mut graph = CaptureGraph::new();
        {
            let mut tx = graph.begin_configuration();
            tx.add_input(video)?;
            if let Some(audio) = audio {
                tx.add_input(audio)?;
            }
            tx.attach_preview();
            tx.attach_output();
            tx.commit()?;
        }

        preview.attach(PreviewLayer {
            gravity: VideoGravity::ResizeAspectFill,
            orientation: VideoOrientation::Portrait,
            resolution: config.session_preset,
        });

        graph.set_running(true);
        tracing::info!("Capture session running");

        Ok(Self {
            provider,
            sink,
            storage,
            preview: Arc::downgrade(preview),
            graph,
            temp_dir: config.temp_dir.clone(),
            min_free_disk_bytes: config.min_free_disk_bytes,
            resolution: config.session_preset,
            frame_rate: config.frame_rate,
            stabilization: config.stabilization,
        })
    }

    pub fn graph(&self) -> &CaptureGraph {
        &self.graph
    }

    pub fn active_position(&self) -> Option<CameraPosition> {
        self.graph.active_position()
    }

    pub fn is_recording(&self) -> bool {
        self.sink.is_recording()
    }

    /// Swap the active camera for the opposite one and return its position.
    ///
    /// The old input is removed and the new one added inside a single
    /// transaction. If the new camera cannot be acquired the transaction is
    /// discarded and the old camera stays active. The audio input and the
    /// recording output are left alone; an active recording continues.
    pub async fn switch_camera(&mut self) -> Result<CameraPosition, CaptureError> {
        let current = self
            .graph
            .active_position()
            .ok_or(CaptureError::NoVideoInput)?;
        let target = current.opposite();

        tracing::info!("Switching camera: {} -> {}", current, target);

        let provider = Arc::clone(&self.provider);
        let new_input = {
            let mut tx = self.graph.begin_configuration();
            tx.remove_input(MediaKind::Video);

            let input = match provider
                .acquire_input(MediaKind::Video, Some(target))
                .await
            {
                Ok(input) => input,
                Err(e) => {
                    tracing::warn!("Camera switch to {} failed: {}", target, e);
                    return Err(e.into());
                }
            };

            tx.add_input(input.clone())?;
            tx.commit()?;
            input
        };

        if self.sink.is_recording() {
            if let Err(e) = self.sink.video_input_changed(&new_input).await {
                tracing::warn!("Recording sink did not accept the new camera: {}", e);
            }
        }

        if let Some(preview) = self.preview.upgrade() {
            preview.camera_changed(target);
        }

        Ok(target)
    }

    /// Begin writing a new movie file and return its path.
    ///
    /// `on_finish` fires once when the file is closed, carrying the final
    /// path or the error that ended the recording.
    pub async fn start_recording(
        &mut self,
        on_finish: RecordingCallback,
    ) -> Result<PathBuf, CaptureError> {
        let video = self
            .graph
            .video_input()
            .cloned()
            .ok_or(CaptureError::NoVideoInput)?;

        if self.sink.is_recording() {
            return Err(CaptureError::AlreadyRecording);
        }

        tokio::fs::create_dir_all(&self.temp_dir).await?;
        self.check_free_space()?;

        let orientation = match self.preview.upgrade() {
            Some(preview) => preview.orientation(),
            None => {
                tracing::debug!("Preview is gone; recording in portrait");
                VideoOrientation::Portrait
            }
        };

        let output_path = unique_movie_path(&self.temp_dir);
        let request = RecordingRequest {
            output_path: output_path.clone(),
            orientation,
            video,
            audio: self.graph.audio_input().cloned(),
            resolution: self.resolution,
            frame_rate: self.frame_rate,
            stabilization: self.stabilization,
        };

        self.sink.start_recording(request, on_finish).await?;
        tracing::info!("Recording to {:?} ({:?})", output_path, orientation);
        Ok(output_path)
    }

    /// Ask the sink to stop. The completion callback reports the outcome.
    pub async fn stop_recording(&mut self) -> Result<(), CaptureError> {
        if !self.sink.is_recording() {
            tracing::debug!("Stop requested with no active recording");
            return Ok(());
        }
        tracing::info!("Stopping recording");
        self.sink.stop_recording().await
    }

    /// Stop any recording and mark the graph stopped
    pub async fn shutdown(&mut self) {
        if let Err(e) = self.stop_recording().await {
            tracing::warn!("Failed to stop recording during shutdown: {}", e);
        }
        self.graph.set_running(false);
        tracing::info!("Capture session stopped");
    }

    fn check_free_space(&self) -> Result<(), CaptureError> {
        match self.storage.available_bytes(&self.temp_dir) {
            Ok(Some(available)) if available < self.min_free_disk_bytes => {
                tracing::warn!(
                    "Refusing to record: {} bytes free, {} required",
                    available,
                    self.min_free_disk_bytes
                );
                Err(CaptureError::InsufficientStorage {
                    available,
                    required: self.min_free_disk_bytes,
                })
            }
            Ok(Some(_)) => Ok(()),
            Ok(None) => {
                tracing::debug!("Free space unknown for {:?}", self.temp_dir);
                Ok(())
            }
            Err(e) => {
                tracing::error!("Free space check failed for {:?}: {}", self.temp_dir, e);
                Err(CaptureError::Io(e))
            }
        }
    }
}
