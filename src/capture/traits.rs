//! Capture trait definitions
//!
//! Contracts for the collaborators the capture session depends on: the
//! device provider, the preview surface, the file-recording sink and the
//! free-space probe. Concrete hardware lives behind these traits.

use super::error::{CaptureError, DeviceError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Which camera a video input comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraPosition {
    Front,
    Back,
}

impl CameraPosition {
    /// The other camera
    pub fn opposite(self) -> Self {
        match self {
            CameraPosition::Front => CameraPosition::Back,
            CameraPosition::Back => CameraPosition::Front,
        }
    }
}

impl fmt::Display for CameraPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CameraPosition::Front => write!(f, "front"),
            CameraPosition::Back => write!(f, "back"),
        }
    }
}

/// Kind of media an input produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Video,
    Audio,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaKind::Video => write!(f, "video"),
            MediaKind::Audio => write!(f, "audio"),
        }
    }
}

/// Video resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

/// Orientation applied to recorded frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum VideoOrientation {
    #[default]
    Portrait,
    PortraitUpsideDown,
    LandscapeRight,
    LandscapeLeft,
}

impl VideoOrientation {
    /// Clockwise display rotation in degrees for a landscape sensor
    pub fn rotation_degrees(self) -> u32 {
        match self {
            VideoOrientation::LandscapeRight => 0,
            VideoOrientation::Portrait => 90,
            VideoOrientation::LandscapeLeft => 180,
            VideoOrientation::PortraitUpsideDown => 270,
        }
    }
}

/// An acquired capture input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInput {
    /// Backend-specific device identifier
    pub id: String,

    /// Human readable name
    pub name: String,

    pub kind: MediaKind,

    /// Camera position (video inputs only)
    pub position: Option<CameraPosition>,

    /// Backend input format (e.g. `v4l2`)
    pub format: String,
}

/// Source of capture inputs.
#[async_trait]
pub trait CaptureDeviceProvider: Send + Sync {
    /// Acquire an input for a media kind. `position` selects the camera for
    /// video and is ignored for audio.
    async fn acquire_input(
        &self,
        kind: MediaKind,
        position: Option<CameraPosition>,
    ) -> Result<DeviceInput, DeviceError>;
}

/// How preview frames fill the surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum VideoGravity {
    Resize,
    ResizeAspect,
    #[default]
    ResizeAspectFill,
}

/// Description of the live preview handed to the preview surface
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewLayer {
    pub gravity: VideoGravity,
    pub orientation: VideoOrientation,
    pub resolution: Resolution,
}

/// Surface that displays the live preview. The capture session only holds a
/// weak reference to it.
pub trait PreviewSurface: Send + Sync {
    /// Attach the live preview
    fn attach(&self, layer: PreviewLayer);

    /// Current preview orientation
    fn orientation(&self) -> VideoOrientation;

    /// The active camera changed
    fn camera_changed(&self, _position: CameraPosition) {}
}

/// Completion callback for a recording: the final path, or the error that
/// ended it. Invoked exactly once per successfully started recording.
pub type RecordingCallback = Box<dyn FnOnce(Result<PathBuf, CaptureError>) + Send + 'static>;

/// Parameters of one file recording
#[derive(Debug, Clone)]
pub struct RecordingRequest {
    pub output_path: PathBuf,
    pub orientation: VideoOrientation,
    pub video: DeviceInput,
    pub audio: Option<DeviceInput>,
    pub resolution: Resolution,
    pub frame_rate: u32,
    pub stabilization: bool,
}

/// File-recording output of the capture graph.
#[async_trait]
pub trait RecordingSink: Send + Sync {
    /// Begin writing to `request.output_path`. `on_finish` fires once the
    /// file is closed, whether by `stop_recording` or by a failure.
    async fn start_recording(
        &mut self,
        request: RecordingRequest,
        on_finish: RecordingCallback,
    ) -> Result<(), CaptureError>;

    /// Ask the sink to stop. Completion is reported through the callback.
    async fn stop_recording(&mut self) -> Result<(), CaptureError>;

    fn is_recording(&self) -> bool;

    /// The graph swapped its video input while this sink is attached.
    async fn video_input_changed(&mut self, _input: &DeviceInput) -> Result<(), CaptureError> {
        Ok(())
    }
}

/// Free space lookup for the recording directory.
pub trait StorageProbe: Send + Sync {
    /// Bytes available to unprivileged writers, or `None` when the platform
    /// cannot tell.
    fn available_bytes(&self, dir: &Path) -> std::io::Result<Option<u64>>;
}
